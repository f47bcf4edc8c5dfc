use crate::error::ConfigError;
use crate::tls::TlsIdentity;
use anyhow::{Context, Result};
use std::env;

pub const DEFAULT_READ_CHUNK_SIZE: usize = 1024;
pub const MAX_READ_CHUNK_SIZE: usize = 64 * 1024;
pub const DEFAULT_MAX_LINE_LEN: usize = 8 * 1024;
// RFC 5321 text line limit without the CRLF
pub const MIN_MAX_LINE_LEN: usize = 1000;
pub const MAX_MAX_LINE_LEN: usize = 1024 * 1024;

// Per-session configuration supplied by whoever accepts the connection
#[derive(Debug, Clone)]
pub struct SessionConfig {
    // Bytes requested per raw read while reassembling lines
    pub read_chunk_size: usize,
    // Longest line accepted before the read fails, excluding the terminator
    pub max_line_len: usize,
    // Identity used for STARTTLS; None disables the upgrade
    pub tls: Option<TlsIdentity>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            max_line_len: DEFAULT_MAX_LINE_LEN,
            tls: None,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tls(mut self, identity: TlsIdentity) -> Self {
        self.tls = Some(identity);
        self
    }

    pub fn with_read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size;
        self
    }

    pub fn with_max_line_len(mut self, len: usize) -> Self {
        self.max_line_len = len;
        self
    }

    // Builds a configuration from SMTP_CAPTURE_* environment variables and validates it
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(raw) = env::var("SMTP_CAPTURE_READ_CHUNK") {
            config.read_chunk_size = raw
                .parse::<usize>()
                .context("Failed to parse SMTP_CAPTURE_READ_CHUNK as an integer")?;
        }

        if let Ok(raw) = env::var("SMTP_CAPTURE_MAX_LINE") {
            config.max_line_len = raw
                .parse::<usize>()
                .context("Failed to parse SMTP_CAPTURE_MAX_LINE as an integer")?;
        }

        let cert = env::var("SMTP_CAPTURE_TLS_CERT").ok();
        let key = env::var("SMTP_CAPTURE_TLS_KEY").ok();
        config.tls = match (cert, key) {
            (Some(cert), Some(key)) => Some(TlsIdentity::from_pem_files(cert, key)?),
            (None, None) => None,
            _ => anyhow::bail!(
                "SMTP_CAPTURE_TLS_CERT and SMTP_CAPTURE_TLS_KEY must be set together"
            ),
        };

        config
            .validate()
            .map_err(|e| anyhow::anyhow!("Configuration validation failed: {}", e))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_read_chunk_size()?;
        self.validate_max_line_len()?;
        Ok(())
    }

    fn validate_read_chunk_size(&self) -> Result<(), ConfigError> {
        if self.read_chunk_size == 0 || self.read_chunk_size > MAX_READ_CHUNK_SIZE {
            return Err(ConfigError::InvalidChunkSize(self.read_chunk_size));
        }
        Ok(())
    }

    fn validate_max_line_len(&self) -> Result<(), ConfigError> {
        if !(MIN_MAX_LINE_LEN..=MAX_MAX_LINE_LEN).contains(&self.max_line_len) {
            return Err(ConfigError::InvalidLineLength(self.max_line_len));
        }
        Ok(())
    }

    pub(crate) fn tls_identity(&self) -> Result<&TlsIdentity, ConfigError> {
        self.tls.as_ref().ok_or(ConfigError::CertificateNotProvided)
    }
}
