//! Transcript acquisition pipeline.
//!
//! [`TranscriptService`] ties the pieces together: resolve the URL, look in the
//! cache, run the strategy chain on a miss, and store what came back.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::cache::{ArtifactKind, CacheKey, CacheStore};
use crate::config::Config;
use crate::fetch::retry::{RetryExecutor, RetryPolicy};
use crate::fetch::{AvailabilityProber, FetchFailure, Fetcher, Strategy};
use crate::identity::{IdentityResolver, VideoIdentity};
use crate::throttle::RateLimiter;
use crate::upstream::youtube::YoutubeProvider;
use crate::upstream::{CaptionProvider, Segment, TrackInfo, VideoMetadata};

/// Public video used to check whether the upstream is reachable at all
pub const ACCESS_CHECK_URL: &str = "https://www.youtube.com/watch?v=aircAruvnKk";

/// A retrieved transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptArtifact {
    /// Segment texts joined with single spaces
    pub text: String,

    /// Timed segments in upstream order
    pub segments: Vec<Segment>,

    /// Language actually served
    pub language: String,

    /// True for automatic speech recognition captions
    pub is_generated: bool,

    /// Strategy that produced this transcript
    pub strategy_used: Strategy,
}

impl TranscriptArtifact {
    pub fn new(segments: Vec<Segment>, language: impl Into<String>, is_generated: bool, strategy_used: Strategy) -> Self {
        let text = segments
            .iter()
            .map(|segment| segment.text.trim())
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        Self {
            text,
            segments,
            language: language.into(),
            is_generated,
            strategy_used,
        }
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }

    /// End of the last segment, in seconds
    pub fn duration_seconds(&self) -> f64 {
        self.segments
            .last()
            .map(|s| s.start_seconds + s.duration_seconds)
            .unwrap_or(0.0)
    }
}

/// Everything known about one video besides the transcript; stored as the
/// metadata artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub metadata: VideoMetadata,
    pub tracks: Vec<TrackInfo>,
}

/// What [`TranscriptService::get_transcript`] returns
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptResult {
    pub identity: VideoIdentity,
    pub artifact: TranscriptArtifact,
    pub metadata: Option<VideoMetadata>,
    /// Probed tracks; empty when the probe failed
    pub tracks: Vec<TrackInfo>,
    /// Upstream calls made for this request
    pub attempts: u32,
    pub from_cache: bool,
}

/// Resolves, fetches and caches transcripts
pub struct TranscriptService {
    provider: Arc<dyn CaptionProvider>,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
    resolver: IdentityResolver,
    fetcher: Fetcher,
    cache: Option<CacheStore>,
}

impl TranscriptService {
    pub fn new(
        provider: Arc<dyn CaptionProvider>,
        limiter: Arc<RateLimiter>,
        policy: RetryPolicy,
        max_url_length: usize,
        cache: Option<CacheStore>,
    ) -> Self {
        let resolver = IdentityResolver::new(provider.clone(), limiter.clone(), policy, max_url_length);
        let fetcher = Fetcher::new(provider.clone(), limiter.clone(), policy);

        Self {
            provider,
            limiter,
            policy,
            resolver,
            fetcher,
            cache,
        }
    }

    /// Build the production service. A cache that cannot be opened is logged and
    /// left out rather than failing startup.
    pub fn from_config(config: &Config, limiter: Arc<RateLimiter>) -> Result<Self> {
        let provider = Arc::new(YoutubeProvider::new(
            config.upstream.yt_dlp_path.clone(),
            config.request_timeout(),
        ));

        let cache = if config.cache.enabled {
            let dir = config.cache_dir()?;
            match CacheStore::open(&dir, config.max_cache_bytes()) {
                Ok(store) => Some(store),
                Err(e) => {
                    tracing::warn!("Cache disabled: {}", e);
                    None
                }
            }
        } else {
            None
        };

        Ok(Self::new(
            provider,
            limiter,
            config.retry_policy(),
            config.upstream.max_url_length,
            cache,
        ))
    }

    pub fn cache(&self) -> Option<&CacheStore> {
        self.cache.as_ref()
    }

    /// Get a transcript for `url`, from the cache when possible
    pub async fn get_transcript(
        &self,
        url: &str,
        preferred_language: &str,
    ) -> Result<TranscriptResult, FetchFailure> {
        let resolved = self.resolver.resolve(url).await?;
        let identity = resolved.identity;
        let key = CacheKey::for_identity(&identity.canonical_id);

        if let Some(artifact) = self.cached_transcript(&key) {
            let record = self.cached_metadata(&key);
            tracing::info!("Using cached transcript for {}", identity.canonical_id);
            return Ok(TranscriptResult {
                identity,
                artifact,
                metadata: Some(resolved.metadata),
                tracks: record.map(|r| r.tracks).unwrap_or_default(),
                attempts: resolved.attempts,
                from_cache: true,
            });
        }

        let outcome = self
            .fetcher
            .fetch(&identity, preferred_language)
            .await
            .map_err(|failure| FetchFailure::new(failure.error, failure.attempts + resolved.attempts))?;

        if let Some(cache) = &self.cache {
            store_json(cache, &key, ArtifactKind::Transcript, &outcome.artifact);
            store_json(
                cache,
                &key,
                ArtifactKind::Metadata,
                &MetadataRecord {
                    metadata: resolved.metadata.clone(),
                    tracks: outcome.tracks.clone(),
                },
            );
        }

        Ok(TranscriptResult {
            identity,
            artifact: outcome.artifact,
            metadata: Some(resolved.metadata),
            tracks: outcome.tracks,
            attempts: resolved.attempts + outcome.attempts,
            from_cache: false,
        })
    }

    /// List the caption tracks available for `url`
    pub async fn list_tracks(&self, url: &str) -> Result<(VideoIdentity, Vec<TrackInfo>), FetchFailure> {
        let resolved = self.resolver.resolve(url).await?;

        let mut executor = RetryExecutor::new(&self.limiter, &self.policy);
        let prober = AvailabilityProber::new(self.provider.as_ref());
        let result = prober.list_tracks(&mut executor, &resolved.identity).await;
        let tracks =
            result.map_err(|error| FetchFailure::new(error, resolved.attempts + executor.attempts()))?;

        Ok((resolved.identity, tracks))
    }

    /// Probe a known public video to see whether the upstream is letting us in
    pub async fn check_access(&self) -> Result<Vec<TrackInfo>, FetchFailure> {
        self.list_tracks(ACCESS_CHECK_URL).await.map(|(_, tracks)| tracks)
    }

    fn cached_transcript(&self, key: &CacheKey) -> Option<TranscriptArtifact> {
        let bytes = self.cache.as_ref()?.get(key, ArtifactKind::Transcript)?;
        match serde_json::from_slice(&bytes) {
            Ok(artifact) => Some(artifact),
            Err(e) => {
                tracing::warn!("Cached transcript for {} is unreadable: {}", key.canonical_id(), e);
                None
            }
        }
    }

    fn cached_metadata(&self, key: &CacheKey) -> Option<MetadataRecord> {
        let bytes = self.cache.as_ref()?.get(key, ArtifactKind::Metadata)?;
        serde_json::from_slice(&bytes).ok()
    }
}

fn store_json<T: Serialize>(cache: &CacheStore, key: &CacheKey, kind: ArtifactKind, value: &T) {
    match serde_json::to_vec(value) {
        Ok(bytes) => {
            cache.put(key, kind, &bytes);
        }
        Err(e) => tracing::warn!("Could not serialize {} for cache: {}", kind.as_str(), e),
    }
}
