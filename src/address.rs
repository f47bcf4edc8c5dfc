use crate::error::AddressError;
use std::fmt;
use std::str::FromStr;

/// Envelope address from `MAIL FROM` or `RCPT TO`.
///
/// Stored in canonical form: the local part as given, the domain lower-cased. Equality and
/// hashing use that form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EmailAddress {
    canonical: String,
    at: usize,
}

impl EmailAddress {
    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    pub fn local_part(&self) -> &str {
        &self.canonical[..self.at]
    }

    pub fn domain(&self) -> &str {
        &self.canonical[self.at + 1..]
    }
}

impl FromStr for EmailAddress {
    type Err = AddressError;

    // Accepts "user@domain" with optional surrounding angle brackets
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let bare = trimmed
            .strip_prefix('<')
            .and_then(|rest| rest.strip_suffix('>'))
            .unwrap_or(trimmed);

        if bare.is_empty() {
            return Err(AddressError::Empty);
        }
        if bare.contains(char::is_whitespace) {
            return Err(AddressError::ContainsWhitespace(bare.to_string()));
        }
        let (local, domain) = bare
            .rsplit_once('@')
            .ok_or_else(|| AddressError::MissingAt(bare.to_string()))?;
        if local.is_empty() {
            return Err(AddressError::EmptyLocalPart(bare.to_string()));
        }
        if domain.is_empty() {
            return Err(AddressError::EmptyDomain(bare.to_string()));
        }

        Ok(Self {
            canonical: format!("{local}@{}", domain.to_ascii_lowercase()),
            at: local.len(),
        })
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}
