use crate::classify::ClassifiedError;
use crate::identity::VideoIdentity;
use crate::upstream::{CaptionProvider, TrackInfo};

use super::retry::RetryExecutor;

/// Asks the upstream which caption tracks a video has
pub struct AvailabilityProber<'a> {
    provider: &'a dyn CaptionProvider,
}

impl<'a> AvailabilityProber<'a> {
    pub fn new(provider: &'a dyn CaptionProvider) -> Self {
        Self { provider }
    }

    /// List tracks in probe order. Paced and retried through `executor` like any
    /// other upstream call.
    pub async fn list_tracks(
        &self,
        executor: &mut RetryExecutor<'_>,
        identity: &VideoIdentity,
    ) -> Result<Vec<TrackInfo>, ClassifiedError> {
        let tracks = executor
            .run("track listing", || self.provider.list_tracks(&identity.canonical_id))
            .await?;

        tracing::debug!(
            "Video {} has {} caption tracks: {}",
            identity.canonical_id,
            tracks.len(),
            tracks
                .iter()
                .map(|t| {
                    if t.is_generated {
                        format!("{} (auto)", t.language_code)
                    } else {
                        t.language_code.clone()
                    }
                })
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(tracks)
    }
}
