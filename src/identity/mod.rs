use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use url::Url;

use crate::classify::{ClassifiedError, ErrorKind};
use crate::fetch::retry::{RetryExecutor, RetryPolicy};
use crate::fetch::FetchFailure;
use crate::throttle::RateLimiter;
use crate::upstream::{CaptionProvider, VideoMetadata};
use crate::utils::extract_domain;

/// Default upper bound on accepted URL length
pub const DEFAULT_MAX_URL_LENGTH: usize = 2048;

/// Hosts accepted as YouTube, after `www.` is stripped
const ALLOWED_HOSTS: &[&str] = &[
    "youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "youtube-nocookie.com",
    "youtu.be",
];

static VIDEO_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").unwrap());

/// A resolved video. `canonical_id` is the cache and rate-limit key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoIdentity {
    pub raw_url: String,
    pub canonical_id: String,
}

/// Outcome of a successful resolution
#[derive(Debug, Clone)]
pub struct Resolved {
    pub identity: VideoIdentity,
    pub metadata: VideoMetadata,
    /// Upstream calls spent on this resolution; zero when served from memory
    pub attempts: u32,
}

/// Extract the video id from any accepted URL shape without touching the network
pub fn parse_video_id(url: &str, max_url_length: usize) -> Result<String, ClassifiedError> {
    let invalid = |reason: &str| ClassifiedError::new(ErrorKind::InvalidUrl, format!("{}: {}", reason, url));

    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(invalid("Empty URL"));
    }
    if trimmed.len() > max_url_length {
        return Err(invalid("URL is too long"));
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let parsed = Url::parse(&with_scheme).map_err(|_| invalid("Invalid URL format"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid("URL must use HTTP or HTTPS protocol"));
    }

    let domain = extract_domain(parsed.as_str())
        .map(|d| d.to_lowercase())
        .ok_or_else(|| invalid("URL has no host"))?;
    if !ALLOWED_HOSTS.contains(&domain.as_str()) {
        return Err(invalid("Not a YouTube URL"));
    }

    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    let candidate = if domain == "youtu.be" {
        segments.first().map(|s| s.to_string())
    } else {
        match segments.as_slice() {
            ["watch", ..] | [] => parsed
                .query_pairs()
                .find(|(key, _)| key == "v")
                .map(|(_, value)| value.into_owned()),
            ["embed" | "v" | "shorts" | "live", id, ..] => Some(id.to_string()),
            _ => None,
        }
    };

    match candidate {
        Some(id) if VIDEO_ID.is_match(&id) => Ok(id),
        Some(_) => Err(invalid("Malformed video id")),
        None => Err(invalid("No video id in URL")),
    }
}

/// Canonical watch URL for a video id, used for probing and display
pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}

/// Validates source URLs and resolves them to a canonical identity
pub struct IdentityResolver {
    provider: Arc<dyn CaptionProvider>,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
    max_url_length: usize,
    resolved: Mutex<HashMap<String, VideoMetadata>>,
}

impl IdentityResolver {
    pub fn new(
        provider: Arc<dyn CaptionProvider>,
        limiter: Arc<RateLimiter>,
        policy: RetryPolicy,
        max_url_length: usize,
    ) -> Self {
        Self {
            provider,
            limiter,
            policy,
            max_url_length,
            resolved: Mutex::new(HashMap::new()),
        }
    }

    /// Validate `url` and resolve its canonical identity with a live probe.
    ///
    /// Results are remembered per video id for the life of the resolver, so URL
    /// variants of an already-resolved video cost no upstream request.
    pub async fn resolve(&self, url: &str) -> Result<Resolved, FetchFailure> {
        let candidate =
            parse_video_id(url, self.max_url_length).map_err(|error| FetchFailure::new(error, 0))?;

        if let Some(metadata) = self.remembered(&candidate) {
            tracing::debug!("Identity for {} already resolved", candidate);
            return Ok(Resolved {
                identity: VideoIdentity {
                    raw_url: url.to_string(),
                    canonical_id: metadata.video_id.clone(),
                },
                metadata,
                attempts: 0,
            });
        }

        let probe_url = watch_url(&candidate);
        let mut executor = RetryExecutor::new(&self.limiter, &self.policy);
        let result = executor
            .run("identity probe", || self.provider.probe_identity(&probe_url))
            .await;
        let metadata = result.map_err(|error| FetchFailure::new(error, executor.attempts()))?;

        tracing::info!("Resolved {} to video {}", url, metadata.video_id);
        self.resolved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(candidate, metadata.clone());

        Ok(Resolved {
            identity: VideoIdentity {
                raw_url: url.to_string(),
                canonical_id: metadata.video_id.clone(),
            },
            metadata,
            attempts: executor.attempts(),
        })
    }

    fn remembered(&self, candidate: &str) -> Option<VideoMetadata> {
        self.resolved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(candidate)
            .cloned()
    }
}
