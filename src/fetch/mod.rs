//! Multi-strategy transcript retrieval.
//!
//! The fetcher walks a fixed chain of [`Strategy`] values. Each upstream request
//! runs through one [`RetryExecutor`], which paces it with the shared rate
//! limiter, retries transient failures with backoff and classifies the rest.
//! Language-scoped failures move on to the next language, exhausted or
//! non-retryable failures move on to the next strategy, and identity-level
//! failures stop the whole fetch.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

use crate::classify::{ClassifiedError, ErrorKind};
use crate::identity::VideoIdentity;
use crate::throttle::RateLimiter;
use crate::transcribe::TranscriptArtifact;
use crate::upstream::{CaptionProvider, Segment, TrackInfo};

pub mod prober;
pub mod retry;
pub mod strategy;

pub use prober::AvailabilityProber;
pub use retry::{RetryExecutor, RetryPolicy};
pub use strategy::{FetchState, Strategy, TrackRequest, AUTO_DETECTED};

/// A failed fetch: the last classified error and how many upstream calls were spent
#[derive(thiserror::Error, Debug, Clone, PartialEq, Serialize)]
#[error("{error} (after {attempts} attempts)")]
pub struct FetchFailure {
    pub error: ClassifiedError,
    pub attempts: u32,
}

impl FetchFailure {
    pub fn new(error: ClassifiedError, attempts: u32) -> Self {
        Self { error, attempts }
    }

    pub fn kind(&self) -> ErrorKind {
        self.error.kind
    }
}

/// A successful fetch
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub artifact: TranscriptArtifact,
    pub tracks: Vec<TrackInfo>,
    pub attempts: u32,
}

/// Runs the strategy chain for one video
pub struct Fetcher {
    provider: Arc<dyn CaptionProvider>,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
}

impl Fetcher {
    pub fn new(provider: Arc<dyn CaptionProvider>, limiter: Arc<RateLimiter>, policy: RetryPolicy) -> Self {
        Self {
            provider,
            limiter,
            policy,
        }
    }

    /// Probe the available tracks and walk the strategy chain until one succeeds
    pub async fn fetch(
        &self,
        identity: &VideoIdentity,
        preferred_language: &str,
    ) -> Result<FetchOutcome, FetchFailure> {
        let video_id = identity.canonical_id.as_str();
        let mut executor = RetryExecutor::new(&self.limiter, &self.policy);
        let mut state = FetchState::Init;
        let mut last_error: Option<ClassifiedError> = None;
        // languages that already came back missing or disabled
        let mut ruled_out: HashSet<String> = HashSet::new();

        transition(video_id, &mut state, FetchState::Probing);
        let prober = AvailabilityProber::new(self.provider.as_ref());
        let tracks = match prober.list_tracks(&mut executor, identity).await {
            Ok(tracks) => tracks,
            Err(error) if error.kind.is_identity_terminal() => {
                transition(video_id, &mut state, FetchState::Failure);
                return Err(FetchFailure::new(error, executor.attempts()));
            }
            Err(error) => {
                tracing::warn!(
                    "Could not list tracks for {} ({}), trying without them",
                    video_id,
                    error.kind
                );
                last_error = Some(error);
                Vec::new()
            }
        };

        for strategy in Strategy::ORDER {
            transition(video_id, &mut state, strategy.state());

            let requests: Vec<TrackRequest> = strategy
                .requests(preferred_language, &tracks)
                .into_iter()
                .filter(|request| match request {
                    TrackRequest::Language(language) => !ruled_out.contains(language),
                    TrackRequest::Raw => true,
                })
                .collect();
            if requests.is_empty() {
                tracing::debug!("Nothing to try for {} strategy", strategy);
                continue;
            }

            for request in requests {
                let result = self.request(&mut executor, video_id, &request).await;

                let error = match result {
                    Ok(segments) => {
                        let artifact = build_artifact(strategy, &request, segments, &tracks);
                        transition(video_id, &mut state, FetchState::Success);
                        tracing::info!(
                            "Fetched {} transcript for {} via {} strategy ({} attempts)",
                            artifact.language,
                            video_id,
                            strategy,
                            executor.attempts()
                        );
                        return Ok(FetchOutcome {
                            artifact,
                            tracks,
                            attempts: executor.attempts(),
                        });
                    }
                    Err(error) => error,
                };

                if error.kind.is_identity_terminal() {
                    tracing::warn!("Giving up on {}: {}", video_id, error);
                    transition(video_id, &mut state, FetchState::Failure);
                    return Err(FetchFailure::new(error, executor.attempts()));
                }

                let language_scoped = error.kind.is_language_scoped();
                if let (true, TrackRequest::Language(language)) = (language_scoped, &request) {
                    ruled_out.insert(language.clone());
                }
                last_error = Some(error);
                if !language_scoped {
                    tracing::debug!("Abandoning {} strategy for {}", strategy, video_id);
                    break;
                }
            }
        }

        transition(video_id, &mut state, FetchState::Failure);
        let error = last_error.unwrap_or_else(|| {
            ClassifiedError::new(
                ErrorKind::NoTranscript,
                "No transcript available in any supported language",
            )
        });
        Err(FetchFailure::new(error, executor.attempts()))
    }

    async fn request(
        &self,
        executor: &mut RetryExecutor<'_>,
        video_id: &str,
        request: &TrackRequest,
    ) -> Result<Vec<Segment>, ClassifiedError> {
        let segments = match request {
            TrackRequest::Language(language) => {
                let label = format!("{} transcript", language);
                executor
                    .run(&label, || self.provider.fetch_track(video_id, language))
                    .await?
            }
            TrackRequest::Raw => {
                executor
                    .run("raw transcript", || self.provider.fetch_raw(video_id))
                    .await?
            }
        };

        if segments.is_empty() {
            return Err(ClassifiedError::new(
                ErrorKind::NoTranscript,
                "Transcript track is empty",
            ));
        }

        Ok(segments)
    }
}

fn transition(video_id: &str, state: &mut FetchState, next: FetchState) {
    tracing::debug!("Fetch {}: {} -> {}", video_id, state, next);
    *state = next;
}

fn build_artifact(
    strategy: Strategy,
    request: &TrackRequest,
    segments: Vec<Segment>,
    tracks: &[TrackInfo],
) -> TranscriptArtifact {
    let (language, is_generated) = match request {
        TrackRequest::Language(language) => {
            (language.clone(), strategy::is_generated_language(language, tracks))
        }
        TrackRequest::Raw => (AUTO_DETECTED.to_string(), true),
    };

    TranscriptArtifact::new(segments, language, is_generated, strategy)
}
