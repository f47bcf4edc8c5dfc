use crate::config::DEFAULT_MAX_LINE_LEN;
use crate::error::{ChannelError, Result};
use crate::tls::TlsIdentity;
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, error, info, info_span, trace, warn, Span};

/// Any byte stream a channel can drive: plain TCP, an in-memory duplex, or TLS on top of either.
pub trait Duplex: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Duplex for T {}

type Stream = BufReader<Box<dyn Duplex>>;

/// Line-oriented SMTP transport over one accepted connection.
///
/// Owns the stream exclusively. Every log record is emitted under the span the channel was
/// created with, so callers decide where connection logs go.
pub struct LineChannel {
    stream: Option<Stream>,
    endpoint: SocketAddr,
    span: Span,
    max_line_len: usize,
}

impl LineChannel {
    pub fn new<S: Duplex + 'static>(stream: S, endpoint: SocketAddr) -> Self {
        let span = info_span!(
            "smtp_connection",
            peer_addr = %endpoint,
            conn_id = %nanoid::nanoid!(10)
        );
        Self::with_span(stream, endpoint, span)
    }

    pub fn with_span<S: Duplex + 'static>(stream: S, endpoint: SocketAddr, span: Span) -> Self {
        let boxed: Box<dyn Duplex> = Box::new(stream);
        Self {
            stream: Some(BufReader::new(boxed)),
            endpoint,
            span,
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }

    pub fn from_tcp(stream: TcpStream) -> Result<Self> {
        let endpoint = stream.peer_addr()?;
        Ok(Self::new(stream, endpoint))
    }

    // Channel with no stream behind it; every I/O call reports Closed.
    pub(crate) fn detached(endpoint: SocketAddr, span: Span) -> Self {
        Self {
            stream: None,
            endpoint,
            span,
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }

    /// Caps the length of a received line, terminator excluded.
    pub fn with_max_line_len(mut self, max_line_len: usize) -> Self {
        self.max_line_len = max_line_len;
        self
    }

    pub fn max_line_len(&self) -> usize {
        self.max_line_len
    }

    pub fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    /// Writes `"<code> <text>\r\n"` and flushes.
    pub async fn send_response(&mut self, code: u16, text: &str) -> Result<()> {
        let response = format!("{code} {text}");
        self.write_line(&response, true).await?;
        debug!(parent: &self.span, client_response = %response, "Sent response");
        Ok(())
    }

    /// Writes a continuation line `"<code>-<text>\r\n"` of a multi-line reply.
    ///
    /// Not flushed; the closing [`send_response`](Self::send_response) flushes the whole reply.
    pub async fn send_partial(&mut self, code: u16, text: &str) -> Result<()> {
        let response = format!("{code}-{text}");
        self.write_line(&response, false).await?;
        debug!(parent: &self.span, client_response = %response, "Sent partial response");
        Ok(())
    }

    /// Writes `line` followed by CRLF and flushes.
    pub async fn send_line(&mut self, line: &str) -> Result<()> {
        self.write_line(line, true).await
    }

    async fn write_line(&mut self, line: &str, flush: bool) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(ChannelError::Closed)?;
        let mut bytes = Vec::with_capacity(line.len() + 2);
        bytes.extend_from_slice(line.as_bytes());
        bytes.extend_from_slice(b"\r\n");
        stream.write_all(&bytes).await?;
        if flush {
            stream.flush().await?;
        }
        Ok(())
    }

    /// Waits for the next line and returns it without its terminator.
    ///
    /// `Ok(None)` means the peer closed the stream. A final unterminated line is still returned.
    /// A line longer than [`max_line_len`](Self::max_line_len) fails with
    /// `ChannelError::LineTooLong`; the rest of that line is left unread.
    pub async fn receive_line(&mut self) -> Result<Option<String>> {
        let max = self.max_line_len;
        let stream = self.stream.as_mut().ok_or(ChannelError::Closed)?;
        let mut buf = Vec::new();
        let mut limited = (&mut *stream).take(max as u64 + 2);
        if limited.read_until(b'\n', &mut buf).await? == 0 {
            debug!(parent: &self.span, "Client disconnected");
            return Ok(None);
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        }
        if buf.len() > max {
            warn!(parent: &self.span, max_line_len = max, "Line too long");
            return Err(ChannelError::LineTooLong { max }.into());
        }
        let line = String::from_utf8_lossy(&buf).into_owned();
        trace!(parent: &self.span, line = %line, "Received line");
        Ok(Some(line))
    }

    /// Raw read used by callers that frame lines themselves. Returns 0 at end-of-stream.
    pub async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or(ChannelError::Closed)?;
        Ok(stream.read(buf).await?)
    }

    pub fn receive_lines(&mut self) -> Lines<'_> {
        Lines {
            channel: self,
            finished: false,
        }
    }

    /// Lines of a DATA payload, dot-unstuffed, up to (not including) the lone `"."` line.
    pub fn receive_data(&mut self) -> DataLines<'_> {
        DataLines {
            lines: self.receive_lines(),
            finished: false,
        }
    }

    /// Command lines up to (not including) a line that is exactly `"QUIT"`.
    pub fn receive_commands(&mut self) -> Commands<'_> {
        Commands {
            lines: self.receive_lines(),
            finished: false,
        }
    }

    /// Runs a server-side TLS handshake on this connection and returns the encrypted channel.
    ///
    /// Plaintext that arrived before the handshake and was not consumed is dropped.
    pub async fn upgrade(mut self, identity: &TlsIdentity) -> Result<LineChannel> {
        let reader = self.stream.take().ok_or(ChannelError::Closed)?;
        let pending = reader.buffer().len();
        if pending > 0 {
            warn!(
                parent: &self.span,
                discarded_bytes = pending,
                "Discarding plaintext received before TLS handshake"
            );
        }

        info!(parent: &self.span, "Starting TLS handshake");
        match identity.acceptor().accept(reader.into_inner()).await {
            Ok(tls_stream) => {
                info!(parent: &self.span, "TLS session established");
                Ok(LineChannel::with_span(tls_stream, self.endpoint, self.span)
                    .with_max_line_len(self.max_line_len))
            }
            Err(e) => {
                error!(parent: &self.span, error = %e, "TLS handshake failed");
                Err(ChannelError::Handshake(e.to_string()).into())
            }
        }
    }

    /// Shuts the stream down. Calling it again is a no-op.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                debug!(parent: &self.span, error = %e, "Error shutting down stream");
            }
            info!(parent: &self.span, "Connection closed");
        }
    }
}

impl std::fmt::Debug for LineChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineChannel")
            .field("endpoint", &self.endpoint)
            .field("closed", &self.is_closed())
            .finish()
    }
}

// Dot-unstuffing for one DATA line. None marks the end-of-data line.
pub(crate) fn unstuff(line: String) -> Option<String> {
    if line == "." {
        None
    } else if line.starts_with('.') {
        Some(line[1..].to_string())
    } else {
        Some(line)
    }
}

/// Lazily read lines; ends at end-of-stream and stays ended.
pub struct Lines<'a> {
    channel: &'a mut LineChannel,
    finished: bool,
}

impl Lines<'_> {
    pub async fn next(&mut self) -> Result<Option<String>> {
        if self.finished {
            return Ok(None);
        }
        let line = self.channel.receive_line().await?;
        self.finished = line.is_none();
        Ok(line)
    }
}

pub struct DataLines<'a> {
    lines: Lines<'a>,
    finished: bool,
}

impl DataLines<'_> {
    pub async fn next(&mut self) -> Result<Option<String>> {
        if self.finished {
            return Ok(None);
        }
        let line = self.lines.next().await?.and_then(unstuff);
        self.finished = line.is_none();
        Ok(line)
    }

    pub async fn collect_all(mut self) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        while let Some(line) = self.next().await? {
            lines.push(line);
        }
        Ok(lines)
    }
}

pub struct Commands<'a> {
    lines: Lines<'a>,
    finished: bool,
}

impl Commands<'_> {
    pub async fn next(&mut self) -> Result<Option<String>> {
        if self.finished {
            return Ok(None);
        }
        let line = self.lines.next().await?.filter(|line| line != "QUIT");
        self.finished = line.is_none();
        Ok(line)
    }

    pub async fn collect_all(mut self) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        while let Some(line) = self.next().await? {
            lines.push(line);
        }
        Ok(lines)
    }
}
