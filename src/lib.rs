//! In-process SMTP acceptor core for capturing outbound mail in tests.
//!
//! The crate provides the pieces a command dispatcher needs to speak just enough SMTP for a
//! client to believe its mail was delivered:
//!
//! - [`LineChannel`]: CRLF line framing, numeric replies and STARTTLS over any byte stream.
//! - [`Session`]: per-connection state (client domain, last command, the message in progress).
//! - [`Message`]: the captured DATA payload with lazily parsed headers and MIME parts.
//!
//! ```no_run
//! use smtp_capture::{Command, LineChannel, Session, SessionConfig};
//! use tokio::net::TcpListener;
//!
//! # async fn serve() -> anyhow::Result<()> {
//! let listener = TcpListener::bind("127.0.0.1:2525").await?;
//! let (stream, _) = listener.accept().await?;
//! let mut session = Session::new(LineChannel::from_tcp(stream)?, SessionConfig::new())?;
//!
//! session.channel_mut().send_response(220, "localhost ready").await?;
//! while let Some(line) = session.read_line().await? {
//!     if line.eq_ignore_ascii_case("QUIT") {
//!         session.write_line("221 Bye").await?;
//!         break;
//!     }
//!     session.set_last_command(Command::Helo);
//!     session.write_line("250 OK").await?;
//! }
//! session.close().await;
//! # Ok(())
//! # }
//! ```

pub mod address;
pub mod channel;
pub mod config;
pub mod error;
pub mod headers;
pub mod message;
pub mod session;
pub mod tls;

pub use address::EmailAddress;
pub use channel::{Commands, DataLines, Duplex, LineChannel, Lines};
pub use config::SessionConfig;
pub use error::{AddressError, CaptureError, ChannelError, ConfigError, Result};
pub use headers::Headers;
pub use message::{Message, MessagePart};
pub use session::{Command, Session};
pub use tls::TlsIdentity;
