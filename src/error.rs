use std::fmt;
use std::io;

// Error types for the capture core
#[derive(Debug)]
pub enum CaptureError {
    // Transport errors: the dispatcher must stop driving the session
    Channel(ChannelError),
    // Configuration errors: fatal to the operation, never retried
    Config(ConfigError),
    // Envelope address errors
    Address(AddressError),
    // Misuse of an operation by the caller
    InvalidOperation(String),
}

#[derive(Debug)]
pub enum ChannelError {
    Closed,
    Handshake(String),
    LineTooLong { max: usize },
    Io(io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    CertificateNotProvided,
    InvalidCertificate(String),
    InvalidPrivateKey(String),
    InvalidChunkSize(usize),
    InvalidLineLength(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    Empty,
    MissingAt(String),
    EmptyLocalPart(String),
    EmptyDomain(String),
    ContainsWhitespace(String),
}

pub type Result<T, E = CaptureError> = std::result::Result<T, E>;

impl CaptureError {
    /// True when the peer is gone (closed channel, EOF mid-operation or a dead socket).
    pub fn is_connection_ended(&self) -> bool {
        match self {
            CaptureError::Channel(ChannelError::Closed) => true,
            CaptureError::Channel(ChannelError::Io(e)) => matches!(
                e.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::Channel(e) => write!(f, "Channel error: {e}"),
            CaptureError::Config(e) => write!(f, "Configuration error: {e}"),
            CaptureError::Address(e) => write!(f, "Address error: {e}"),
            CaptureError::InvalidOperation(msg) => write!(f, "Invalid operation: {msg}"),
        }
    }
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelError::Closed => write!(f, "channel closed"),
            ChannelError::Handshake(msg) => write!(f, "TLS handshake failed: {msg}"),
            ChannelError::LineTooLong { max } => write!(f, "line too long (max {max} bytes)"),
            ChannelError::Io(e) => write!(f, "I/O failure: {e}"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::CertificateNotProvided => write!(
                f,
                "Unable to upgrade to an encrypted connection: certificate not provided"
            ),
            ConfigError::InvalidCertificate(msg) => write!(f, "Invalid certificate: {msg}"),
            ConfigError::InvalidPrivateKey(msg) => write!(f, "Invalid private key: {msg}"),
            ConfigError::InvalidChunkSize(size) => {
                write!(f, "Invalid read chunk size: {size} (expected 1..=65536)")
            }
            ConfigError::InvalidLineLength(len) => {
                write!(f, "Invalid max line length: {len} (expected 1000..=1048576)")
            }
        }
    }
}

impl fmt::Display for AddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressError::Empty => write!(f, "empty address"),
            AddressError::MissingAt(addr) => write!(f, "missing '@' in address: {addr}"),
            AddressError::EmptyLocalPart(addr) => write!(f, "empty local part in address: {addr}"),
            AddressError::EmptyDomain(addr) => write!(f, "empty domain in address: {addr}"),
            AddressError::ContainsWhitespace(addr) => {
                write!(f, "whitespace in address: {addr}")
            }
        }
    }
}

impl std::error::Error for CaptureError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CaptureError::Channel(e) => Some(e),
            CaptureError::Config(e) => Some(e),
            CaptureError::Address(e) => Some(e),
            CaptureError::InvalidOperation(_) => None,
        }
    }
}

impl std::error::Error for ChannelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ChannelError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl std::error::Error for ConfigError {}
impl std::error::Error for AddressError {}

impl From<ChannelError> for CaptureError {
    fn from(err: ChannelError) -> Self {
        CaptureError::Channel(err)
    }
}

impl From<ConfigError> for CaptureError {
    fn from(err: ConfigError) -> Self {
        CaptureError::Config(err)
    }
}

impl From<AddressError> for CaptureError {
    fn from(err: AddressError) -> Self {
        CaptureError::Address(err)
    }
}

impl From<io::Error> for CaptureError {
    fn from(err: io::Error) -> Self {
        CaptureError::Channel(ChannelError::Io(err))
    }
}
