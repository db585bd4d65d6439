use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod youtube;

/// A single timed caption line as delivered by the upstream service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Caption text
    pub text: String,

    /// Start time in seconds
    pub start_seconds: f64,

    /// Duration in seconds
    pub duration_seconds: f64,
}

/// A caption track advertised for a video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackInfo {
    /// Language code such as `en` or `pt-BR`
    pub language_code: String,

    /// Human readable language name, if the service reports one
    pub language_name: Option<String>,

    /// True for automatic speech recognition tracks
    pub is_generated: bool,

    /// True when the service can machine-translate this track
    pub is_translatable: bool,
}

/// Metadata returned by the identity probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    /// Canonical video id as reported by the service
    pub video_id: String,

    pub title: Option<String>,

    pub author: Option<String>,

    pub duration_seconds: Option<f64>,
}

/// Shape of a raw upstream failure, before classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RawErrorType {
    InvalidUrl,
    VideoUnavailable,
    TranscriptsDisabled,
    NoTranscriptFound,
    Http,
    Process,
    Parse,
    Other,
}

impl RawErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RawErrorType::InvalidUrl => "InvalidUrl",
            RawErrorType::VideoUnavailable => "VideoUnavailable",
            RawErrorType::TranscriptsDisabled => "TranscriptsDisabled",
            RawErrorType::NoTranscriptFound => "NoTranscriptFound",
            RawErrorType::Http => "Http",
            RawErrorType::Process => "Process",
            RawErrorType::Parse => "Parse",
            RawErrorType::Other => "Other",
        }
    }
}

/// Unclassified failure reported by a [`CaptionProvider`]
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("{} error: {message}", error_type.as_str())]
pub struct UpstreamError {
    pub error_type: RawErrorType,
    pub message: String,
}

impl UpstreamError {
    pub fn new(error_type: RawErrorType, message: impl Into<String>) -> Self {
        Self {
            error_type,
            message: message.into(),
        }
    }

    pub fn no_transcript(language: &str) -> Self {
        Self::new(
            RawErrorType::NoTranscriptFound,
            format!("No transcripts were found for the requested language code: {}", language),
        )
    }

    pub fn transcripts_disabled() -> Self {
        Self::new(
            RawErrorType::TranscriptsDisabled,
            "Subtitles are disabled for this video",
        )
    }
}

/// Raw access to the captioning service.
///
/// Implementations perform exactly one upstream request per call and never retry;
/// pacing, retries and classification are the caller's job.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CaptionProvider: Send + Sync {
    /// Resolve a watch URL to the service's own metadata record
    async fn probe_identity(&self, url: &str) -> Result<VideoMetadata, UpstreamError>;

    /// List caption tracks in the order the service reports them
    async fn list_tracks(&self, video_id: &str) -> Result<Vec<TrackInfo>, UpstreamError>;

    /// Fetch the track for one specific language
    async fn fetch_track(&self, video_id: &str, language: &str)
        -> Result<Vec<Segment>, UpstreamError>;

    /// Fetch whatever default track the service offers, without language negotiation
    async fn fetch_raw(&self, video_id: &str) -> Result<Vec<Segment>, UpstreamError>;
}
