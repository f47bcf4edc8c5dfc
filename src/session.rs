use crate::channel::{unstuff, LineChannel};
use crate::config::SessionConfig;
use crate::error::{CaptureError, ChannelError, Result};
use crate::message::Message;
use std::net::SocketAddr;
use tracing::{debug, info, trace, warn};

/// Last successfully processed command. Ordered by protocol progress.
///
/// The session only stores the marker; deciding which transitions are legal is up to the
/// dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Command {
    #[default]
    Uninitialized,
    Helo,
    MailFrom,
    RcptTo,
    Data,
}

/// Protocol state for one accepted connection.
#[derive(Debug)]
pub struct Session {
    channel: LineChannel,
    config: SessionConfig,
    // Bytes read off the channel that do not yet form a complete line
    input: Vec<u8>,
    client_domain: Option<String>,
    last_command: Command,
    message: Message,
}

impl Session {
    /// Starts a session on `channel`. An invalid `config` is rejected here rather than
    /// surfacing later as a broken read.
    pub fn new(channel: LineChannel, config: SessionConfig) -> Result<Self> {
        config.validate()?;
        let channel = channel.with_max_line_len(config.max_line_len);
        info!(parent: channel.span(), "New client session");
        Ok(Self {
            channel,
            config,
            input: Vec::new(),
            client_domain: None,
            last_command: Command::Uninitialized,
            message: Message::new(),
        })
    }

    pub fn endpoint(&self) -> SocketAddr {
        self.channel.endpoint()
    }

    pub fn client_domain(&self) -> Option<&str> {
        self.client_domain.as_deref()
    }

    pub fn set_client_domain(&mut self, domain: impl Into<String>) {
        self.client_domain = Some(domain.into());
    }

    pub fn last_command(&self) -> Command {
        self.last_command
    }

    pub fn set_last_command(&mut self, command: Command) {
        self.last_command = command;
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn message_mut(&mut self) -> &mut Message {
        &mut self.message
    }

    /// Direct access to the transport, e.g. for multi-line replies.
    ///
    /// Bytes already pulled into the session's reassembly buffer are not visible through the
    /// channel's own line reads.
    pub fn channel(&self) -> &LineChannel {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut LineChannel {
        &mut self.channel
    }

    pub fn tls_available(&self) -> bool {
        self.config.tls.is_some()
    }

    /// Returns the next CRLF-terminated line, or `Ok(None)` once the peer has closed.
    ///
    /// An unterminated tail left at end-of-stream is discarded. A line longer than the
    /// configured maximum fails with `ChannelError::LineTooLong` and the buffered bytes are dropped.
    pub async fn read_line(&mut self) -> Result<Option<String>> {
        let max = self.config.max_line_len;
        let mut chunk = vec![0u8; self.config.read_chunk_size];
        loop {
            if let Some(line) = self.take_buffered_line() {
                if line.len() > max {
                    return Err(self.line_too_long(max));
                }
                trace!(parent: self.channel.span(), line = %line, "Read line");
                return Ok(Some(line));
            }
            // max content bytes plus a CR still waiting for its LF
            if self.input.len() > max + 1 {
                return Err(self.line_too_long(max));
            }

            let count = self.channel.read_chunk(&mut chunk).await?;
            if count == 0 {
                if !self.input.is_empty() {
                    debug!(
                        parent: self.channel.span(),
                        discarded_bytes = self.input.len(),
                        "Stream ended inside a line"
                    );
                    self.input.clear();
                }
                return Ok(None);
            }
            self.input.extend_from_slice(&chunk[..count]);
        }
    }

    fn line_too_long(&mut self, max: usize) -> CaptureError {
        warn!(
            parent: self.channel.span(),
            max_line_len = max,
            discarded_bytes = self.input.len(),
            "Line too long"
        );
        self.input.clear();
        ChannelError::LineTooLong { max }.into()
    }

    fn take_buffered_line(&mut self) -> Option<String> {
        let end = self.input.windows(2).position(|pair| pair == b"\r\n")?;
        let line = String::from_utf8_lossy(&self.input[..end]).into_owned();
        self.input.drain(..end + 2);
        Some(line)
    }

    /// Writes `data` followed by CRLF. `data` must not contain a line break itself.
    pub async fn write_line(&mut self, data: &str) -> Result<()> {
        if data.contains(['\r', '\n']) {
            return Err(CaptureError::InvalidOperation(
                "line data must not contain CR or LF".to_string(),
            ));
        }
        self.channel.send_line(data).await?;
        trace!(parent: self.channel.span(), line = %data, "Wrote line");
        Ok(())
    }

    /// Reads a DATA payload into the current message, one unstuffed line plus CRLF at a time.
    ///
    /// Returns the number of lines appended once the lone `"."` line arrives, or `None` if the
    /// stream ended first.
    pub async fn receive_data_into_message(&mut self) -> Result<Option<usize>> {
        let mut appended = 0;
        while let Some(line) = self.read_line().await? {
            match unstuff(line) {
                Some(line) => {
                    self.message.append(&line);
                    self.message.append("\r\n");
                    appended += 1;
                }
                None => {
                    debug!(
                        parent: self.channel.span(),
                        lines = appended,
                        bytes = self.message.len(),
                        "Received message data"
                    );
                    return Ok(Some(appended));
                }
            }
        }
        Ok(None)
    }

    /// Starts a fresh message on the same connection and hands back the previous one.
    pub fn reset(&mut self) -> Message {
        debug!(parent: self.channel.span(), "Resetting session");
        self.input.clear();
        self.last_command = Command::Helo;
        std::mem::replace(&mut self.message, Message::new())
    }

    /// Swaps the plain channel for a TLS one using the configured identity.
    ///
    /// Without an identity this fails up front and the plain channel stays usable. A failed
    /// handshake leaves the session closed.
    pub async fn upgrade_to_encrypted(&mut self) -> Result<()> {
        let identity = self.config.tls_identity()?.clone();

        if !self.input.is_empty() {
            warn!(
                parent: self.channel.span(),
                discarded_bytes = self.input.len(),
                "Discarding buffered plaintext before TLS handshake"
            );
            self.input.clear();
        }

        let detached = LineChannel::detached(self.channel.endpoint(), self.channel.span().clone());
        let plain = std::mem::replace(&mut self.channel, detached);
        self.channel = plain.upgrade(&identity).await?;
        Ok(())
    }

    pub async fn close(&mut self) {
        self.channel.close().await;
    }
}
