//! Maps raw upstream failures into a closed taxonomy.
//!
//! Classification happens exactly once per failed attempt. Everything downstream
//! of this module branches on [`ErrorKind`], never on message text.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use crate::upstream::{RawErrorType, UpstreamError};

/// Cool-down suggested after an IP block
pub const IP_BLOCK_COOL_DOWN: Duration = Duration::from_secs(15 * 60);

/// Cool-down suggested after rate limiting
pub const RATE_LIMIT_COOL_DOWN: Duration = Duration::from_secs(5 * 60);

static IP_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\bip\b.*\b(block|ban)|\b(block|ban)\w*\b.*\bip\b").unwrap());

static BOT_CHECK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"not a (ro)?bot").unwrap());

/// Closed set of failure kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidUrl,
    VideoUnavailable,
    CaptionsDisabled,
    NoTranscript,
    RegionRestricted,
    Private,
    RateLimited,
    IpBlocked,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidUrl => "invalid URL",
            ErrorKind::VideoUnavailable => "video unavailable",
            ErrorKind::CaptionsDisabled => "captions disabled",
            ErrorKind::NoTranscript => "no transcript",
            ErrorKind::RegionRestricted => "region restricted",
            ErrorKind::Private => "private video",
            ErrorKind::RateLimited => "rate limited",
            ErrorKind::IpBlocked => "IP blocked",
            ErrorKind::Unknown => "unknown error",
        }
    }

    /// Whether another attempt of the same operation may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimited | ErrorKind::IpBlocked | ErrorKind::Unknown
        )
    }

    /// Failures that hold for the video as a whole, whatever strategy is used
    pub fn is_identity_terminal(&self) -> bool {
        matches!(
            self,
            ErrorKind::InvalidUrl | ErrorKind::VideoUnavailable | ErrorKind::Private
        )
    }

    /// Failures that only rule out the language that was asked for
    pub fn is_language_scoped(&self) -> bool {
        matches!(self, ErrorKind::NoTranscript | ErrorKind::CaptionsDisabled)
    }

    /// Remediation text shown to the user verbatim
    pub fn suggestion(&self) -> &'static str {
        match self {
            ErrorKind::InvalidUrl => {
                "Check the URL. Use a YouTube watch, youtu.be short link or embed URL."
            }
            ErrorKind::VideoUnavailable => {
                "This video is unavailable. It may have been deleted or made private."
            }
            ErrorKind::CaptionsDisabled => {
                "Captions are disabled for this video. Try finding a video with captions enabled."
            }
            ErrorKind::NoTranscript => {
                "No transcript exists in the requested language. Try another language."
            }
            ErrorKind::RegionRestricted => {
                "This video is not available in your region. Try a different video."
            }
            ErrorKind::Private => "This video is private. Try a public video instead.",
            ErrorKind::RateLimited => {
                "Too many requests were sent to YouTube. Wait 5-10 minutes before trying again."
            }
            ErrorKind::IpBlocked => {
                "YouTube has temporarily blocked your IP address. Wait 15-30 minutes, or switch to a different network before trying again."
            }
            ErrorKind::Unknown => {
                "Make sure the video is public and has captions, then try again."
            }
        }
    }

    /// Recommended cool-down before the user tries again
    pub fn suggested_wait(&self) -> Option<Duration> {
        match self {
            ErrorKind::IpBlocked => Some(IP_BLOCK_COOL_DOWN),
            ErrorKind::RateLimited => Some(RATE_LIMIT_COOL_DOWN),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure mapped into the taxonomy. Never mutated after creation.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{kind}: {raw_detail}")]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub retryable: bool,
    pub suggestion: String,
    pub raw_detail: String,
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind, raw_detail: impl Into<String>) -> Self {
        Self {
            kind,
            retryable: kind.is_retryable(),
            suggestion: kind.suggestion().to_string(),
            raw_detail: raw_detail.into(),
        }
    }

    pub fn suggested_wait(&self) -> Option<Duration> {
        self.kind.suggested_wait()
    }
}

impl From<UpstreamError> for ClassifiedError {
    fn from(error: UpstreamError) -> Self {
        classify(&error.message, error.error_type)
    }
}

/// Classify a raw failure. Keyword rules are checked in precedence order and the
/// first match wins; the raw type only decides when no keyword matches.
pub fn classify(raw_text: &str, raw_type: RawErrorType) -> ClassifiedError {
    let text = raw_text.to_lowercase();

    let kind = if IP_BLOCK.is_match(&text) || text.contains("cloud provider") || BOT_CHECK.is_match(&text) {
        ErrorKind::IpBlocked
    } else if text.contains("too many requests") || text.contains("http error 429") {
        ErrorKind::RateLimited
    } else if text.contains("region") || text.contains("country") {
        ErrorKind::RegionRestricted
    } else if text.contains("private") {
        ErrorKind::Private
    } else if text.contains("disabled") {
        ErrorKind::CaptionsDisabled
    } else if text.contains("unavailable") {
        ErrorKind::VideoUnavailable
    } else {
        match raw_type {
            RawErrorType::InvalidUrl => ErrorKind::InvalidUrl,
            RawErrorType::NoTranscriptFound => ErrorKind::NoTranscript,
            RawErrorType::TranscriptsDisabled => ErrorKind::CaptionsDisabled,
            RawErrorType::VideoUnavailable => ErrorKind::VideoUnavailable,
            _ => ErrorKind::Unknown,
        }
    };

    tracing::debug!("Classified {} failure as {}", raw_type.as_str(), kind);
    ClassifiedError::new(kind, raw_text)
}
