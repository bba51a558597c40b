use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhoneError {
    #[error("invalid phone number: {0}")]
    Invalid(String),
}

/// Normalized E.164 phone number without the leading `+`.
///
/// Accepts `+2547XXXXXXXX`, `2547XXXXXXXX` and local `07XXXXXXXX` input;
/// a leading zero is replaced with the Kenyan country prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Msisdn(String);

impl Msisdn {
    pub fn parse(input: &str) -> Result<Self, PhoneError> {
        let compact: String = input
            .trim()
            .trim_start_matches('+')
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .collect();

        let normalized = if let Some(rest) = compact.strip_prefix('0') {
            format!("254{rest}")
        } else {
            compact
        };

        if normalized.len() < 10
            || normalized.len() > 15
            || !normalized.chars().all(|c| c.is_ascii_digit())
        {
            return Err(PhoneError::Invalid(input.trim().to_string()));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Msisdn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
