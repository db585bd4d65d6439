//! TubeScribe - resilient YouTube transcript retrieval with a bounded local cache
//!
//! This library fetches caption transcripts from YouTube while keeping the request
//! rate low enough to avoid upstream blocking, falls back across several retrieval
//! strategies when a language or track is missing, and persists the results in a
//! size-bounded on-disk cache.

pub mod cache;
pub mod classify;
pub mod cli;
pub mod config;
pub mod fetch;
pub mod identity;
pub mod output;
pub mod throttle;
pub mod transcribe;
pub mod upstream;
pub mod utils;

pub use cache::{ArtifactKind, CacheKey, CacheStats, CacheStore};
pub use classify::{classify, ClassifiedError, ErrorKind};
pub use cli::{Cli, Commands, OutputFormat};
pub use config::Config;
pub use fetch::{FetchFailure, Fetcher, Strategy};
pub use identity::{IdentityResolver, VideoIdentity};
pub use throttle::{Backoff, RateLimiter};
pub use transcribe::{TranscriptArtifact, TranscriptResult, TranscriptService};
pub use upstream::{CaptionProvider, Segment, TrackInfo, UpstreamError, VideoMetadata};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Error types specific to TubeScribe
#[derive(thiserror::Error, Debug)]
pub enum TubeScribeError {
    #[error("Cache I/O failed for {path}: {source}")]
    CacheIo {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cache record is corrupt: {0}")]
    CacheCorrupt(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
