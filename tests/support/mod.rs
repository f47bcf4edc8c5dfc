// Minimal command dispatcher used by the integration tests to drive the capture core the way a
// real listener would: one task per connection, lockstep command/reply.
#![allow(dead_code)]

use anyhow::Result;
use smtp_capture::{
    CaptureError, Command, EmailAddress, LineChannel, Message, Session, SessionConfig,
    TlsIdentity,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, warn};

pub const CA_PEM: &[u8] = include_bytes!("../fixtures/ca.pem");
pub const SERVER_PEM: &[u8] = include_bytes!("../fixtures/server.pem");
pub const SERVER_KEY: &[u8] = include_bytes!("../fixtures/server.key");

pub fn tls_identity() -> TlsIdentity {
    TlsIdentity::from_pem(SERVER_PEM, SERVER_KEY).expect("fixture identity must load")
}

/// Binds an ephemeral port and captures every completed message into the returned receiver.
pub async fn start_capture_server(
    config: SessionConfig,
) -> Result<(SocketAddr, mpsc::UnboundedReceiver<Message>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let config = config.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let channel = match LineChannel::from_tcp(stream) {
                    Ok(channel) => channel,
                    Err(e) => {
                        error!(error = %e, "Failed to set up channel");
                        return;
                    }
                };
                let mut session = match Session::new(channel, config) {
                    Ok(session) => session,
                    Err(e) => {
                        error!(error = %e, "Rejected session configuration");
                        return;
                    }
                };
                if let Err(e) = dispatch(&mut session, &tx).await {
                    if !e.is_connection_ended() {
                        error!(error = %e, "Session failed");
                    }
                }
                session.close().await;
            });
        }
    });

    Ok((addr, rx))
}

fn argument<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    if !head.eq_ignore_ascii_case(prefix) {
        return None;
    }
    line[prefix.len()..].split_whitespace().next()
}

async fn dispatch(
    session: &mut Session,
    captured: &mpsc::UnboundedSender<Message>,
) -> Result<(), CaptureError> {
    let mut encrypted = false;
    session
        .channel_mut()
        .send_response(220, "localhost smtp-capture ready")
        .await?;

    while let Some(line) = session.read_line().await? {
        let verb = line
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase();

        match verb.as_str() {
            "EHLO" | "HELO" => {
                let domain = line.split_whitespace().nth(1).unwrap_or_default().to_string();
                session.reset();
                session.set_client_domain(domain.clone());
                let channel = session.channel_mut();
                if verb == "HELO" {
                    channel.send_response(250, "localhost").await?;
                    continue;
                }
                channel
                    .send_partial(250, &format!("localhost Hello {domain}"))
                    .await?;
                if !encrypted && session.tls_available() {
                    session.channel_mut().send_partial(250, "STARTTLS").await?;
                }
                session.channel_mut().send_response(250, "HELP").await?;
            }
            "STARTTLS" => {
                if encrypted || !session.tls_available() {
                    session.write_line("454 TLS not available").await?;
                    continue;
                }
                session.write_line("220 Ready to start TLS").await?;
                session.upgrade_to_encrypted().await?;
                encrypted = true;
                session.set_last_command(Command::Uninitialized);
            }
            "MAIL" => match argument(&line, "MAIL FROM:").map(str::parse::<EmailAddress>) {
                Some(Ok(from)) => {
                    session.reset();
                    session.message_mut().set_from_address(from);
                    session.set_last_command(Command::MailFrom);
                    session.write_line("250 OK").await?;
                }
                _ => session.write_line("501 Syntax error in parameters").await?,
            },
            "RCPT" => {
                if session.last_command() < Command::MailFrom {
                    session.write_line("503 Bad sequence of commands").await?;
                    continue;
                }
                match argument(&line, "RCPT TO:").map(str::parse::<EmailAddress>) {
                    Some(Ok(to)) => {
                        session.message_mut().add_to_address(to);
                        session.set_last_command(Command::RcptTo);
                        session.write_line("250 OK").await?;
                    }
                    _ => session.write_line("501 Syntax error in parameters").await?,
                }
            }
            "DATA" => {
                if session.last_command() != Command::RcptTo {
                    session.write_line("503 Bad sequence of commands").await?;
                    continue;
                }
                session.set_last_command(Command::Data);
                session
                    .write_line("354 Start mail input; end with <CRLF>.<CRLF>")
                    .await?;
                if session.receive_data_into_message().await?.is_none() {
                    warn!("Client disconnected during DATA");
                    break;
                }
                let message = session.reset();
                let _ = captured.send(message);
                session.write_line("250 OK: Message captured").await?;
            }
            "RSET" => {
                session.reset();
                session.write_line("250 OK").await?;
            }
            "NOOP" => session.write_line("250 OK").await?,
            "QUIT" => {
                session.write_line("221 Bye").await?;
                break;
            }
            _ => {
                warn!(command = %line, "Unrecognized command");
                session
                    .write_line("500 Syntax error, command unrecognized")
                    .await?;
            }
        }
    }
    Ok(())
}
