//! Validated value types shared by the consent and admin services.
//!
//! Anything crossing an HTTP or file boundary is parsed into one of these types
//! first, so the rest of the workspace never sees an unchecked identifier or
//! an out-of-range decision value.

use std::fmt;
use std::str::FromStr;

/// Maximum length of a participant or record identifier.
pub const MAX_ID_LEN: usize = 64;

/// Errors raised while parsing identifiers and decisions.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IdError {
    #[error("identifier cannot be empty")]
    Empty,
    #[error("identifier exceeds maximum length of {MAX_ID_LEN} characters")]
    TooLong,
    #[error("identifier contains invalid characters (only alphanumeric, '-', '_' allowed)")]
    InvalidCharacters,
    #[error("unknown consent response '{0}' (expected accept, more_info or decline)")]
    UnknownDecision(String),
}

/// Externally supplied identifier naming one study participant.
///
/// The same rules apply to patient record identifiers used in document routes,
/// since both end up in storage keys and remote file paths:
/// - 1 to [`MAX_ID_LEN`] characters after trimming
/// - ASCII alphanumerics, `-` and `_` only
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn parse(input: &str) -> Result<Self, IdError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(IdError::Empty);
        }
        if trimmed.len() > MAX_ID_LEN {
            return Err(IdError::TooLong);
        }
        let ok = trimmed
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if !ok {
            return Err(IdError::InvalidCharacters);
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ParticipantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for ParticipantId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl serde::Serialize for ParticipantId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for ParticipantId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ParticipantId::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A participant's consent decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentDecision {
    Accept,
    MoreInfo,
    Decline,
}

impl ConsentDecision {
    /// Wire and storage value.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::MoreInfo => "more_info",
            Self::Decline => "decline",
        }
    }

    /// Human-readable label used in notification emails.
    pub fn label(self) -> &'static str {
        match self {
            Self::Accept => "Accepted",
            Self::MoreInfo => "Needs more information",
            Self::Decline => "Declined",
        }
    }
}

impl fmt::Display for ConsentDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsentDecision {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "accept" => Ok(Self::Accept),
            "more_info" => Ok(Self::MoreInfo),
            "decline" => Ok(Self::Decline),
            other => Err(IdError::UnknownDecision(other.to_owned())),
        }
    }
}
