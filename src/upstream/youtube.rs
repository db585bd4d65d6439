use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::{CaptionProvider, RawErrorType, Segment, TrackInfo, UpstreamError, VideoMetadata};

/// Suffix yt-dlp puts on the untranslated speech-recognition track
const ORIGINAL_TRACK_SUFFIX: &str = "-orig";

/// Caption format we ask for; it carries per-line timing
const CAPTION_FORMAT: &str = "json3";

/// YouTube caption provider using yt-dlp for discovery and plain HTTP for caption payloads
pub struct YoutubeProvider {
    yt_dlp_path: String,
    http: reqwest::Client,
}

impl YoutubeProvider {
    pub fn new(yt_dlp_path: impl Into<String>, request_timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });

        Self {
            yt_dlp_path: yt_dlp_path.into(),
            http,
        }
    }

    fn watch_url(video_id: &str) -> String {
        format!(
            "https://www.youtube.com/watch?v={}",
            urlencoding::encode(video_id)
        )
    }

    /// Get video information using yt-dlp
    async fn get_video_info(&self, url: &str) -> Result<Value, UpstreamError> {
        tracing::debug!("Extracting video info for: {}", url);

        let output = Command::new(&self.yt_dlp_path)
            .args(["--dump-json", "--skip-download", "--no-playlist", url])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                UpstreamError::new(
                    RawErrorType::Process,
                    format!("Could not run {}: {}", self.yt_dlp_path, e),
                )
            })?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let error_type = if error.contains("Unsupported URL") || error.contains("is not a valid URL") {
                RawErrorType::InvalidUrl
            } else {
                RawErrorType::Process
            };
            return Err(UpstreamError::new(error_type, format!("yt-dlp failed: {}", error)));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| UpstreamError::new(RawErrorType::Parse, format!("Invalid yt-dlp output: {}", e)))
    }

    /// Download a json3 caption payload
    async fn download_captions(&self, caption_url: &str) -> Result<Vec<Segment>, UpstreamError> {
        let response = self
            .http
            .get(caption_url)
            .send()
            .await
            .map_err(|e| UpstreamError::new(RawErrorType::Http, e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(UpstreamError::new(
                RawErrorType::Http,
                "HTTP Error 429: Too Many Requests",
            ));
        }
        if !status.is_success() {
            return Err(UpstreamError::new(
                RawErrorType::Http,
                format!("HTTP Error {}", status),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| UpstreamError::new(RawErrorType::Http, e.to_string()))?;

        parse_json3(&body)
    }
}

#[async_trait]
impl CaptionProvider for YoutubeProvider {
    async fn probe_identity(&self, url: &str) -> Result<VideoMetadata, UpstreamError> {
        let info = self.get_video_info(url).await?;

        let video_id = info["id"]
            .as_str()
            .ok_or_else(|| UpstreamError::new(RawErrorType::Parse, "yt-dlp output has no video id"))?
            .to_string();

        Ok(VideoMetadata {
            video_id,
            title: info["title"].as_str().map(|s| s.to_string()),
            author: info["uploader"].as_str().map(|s| s.to_string()),
            duration_seconds: info["duration"].as_f64(),
        })
    }

    async fn list_tracks(&self, video_id: &str) -> Result<Vec<TrackInfo>, UpstreamError> {
        let info = self.get_video_info(&Self::watch_url(video_id)).await?;
        Ok(parse_tracks(&info))
    }

    async fn fetch_track(
        &self,
        video_id: &str,
        language: &str,
    ) -> Result<Vec<Segment>, UpstreamError> {
        let info = self.get_video_info(&Self::watch_url(video_id)).await?;

        if !has_any_captions(&info) {
            return Err(UpstreamError::transcripts_disabled());
        }

        let caption_url = caption_url_for_language(&info, language)
            .ok_or_else(|| UpstreamError::no_transcript(language))?;

        tracing::debug!("Downloading {} captions for {}", language, video_id);
        self.download_captions(&caption_url).await
    }

    async fn fetch_raw(&self, video_id: &str) -> Result<Vec<Segment>, UpstreamError> {
        let info = self.get_video_info(&Self::watch_url(video_id)).await?;

        let caption_url = default_caption_url(&info).ok_or_else(UpstreamError::transcripts_disabled)?;

        tracing::debug!("Downloading default captions for {}", video_id);
        self.download_captions(&caption_url).await
    }
}

fn caption_map<'a>(info: &'a Value, field: &str) -> Option<&'a serde_json::Map<String, Value>> {
    info.get(field).and_then(|v| v.as_object())
}

fn has_any_captions(info: &Value) -> bool {
    ["subtitles", "automatic_captions"]
        .iter()
        .filter_map(|field| caption_map(info, field))
        .any(|map| !map.is_empty())
}

/// Pick the json3 URL out of one language's format list
fn json3_url(formats: &Value) -> Option<String> {
    formats
        .as_array()?
        .iter()
        .find(|format| format["ext"].as_str() == Some(CAPTION_FORMAT))
        .and_then(|format| format["url"].as_str())
        .map(|s| s.to_string())
}

/// Manual subtitles first, then the untranslated ASR track, then a machine translation
fn caption_url_for_language(info: &Value, language: &str) -> Option<String> {
    let manual = caption_map(info, "subtitles").and_then(|map| map.get(language));
    if let Some(url) = manual.and_then(json3_url) {
        return Some(url);
    }

    let automatic = caption_map(info, "automatic_captions")?;
    let original_key = format!("{}{}", language, ORIGINAL_TRACK_SUFFIX);
    automatic
        .get(&original_key)
        .and_then(json3_url)
        .or_else(|| automatic.get(language).and_then(json3_url))
}

fn default_caption_url(info: &Value) -> Option<String> {
    let automatic = caption_map(info, "automatic_captions");
    let manual = caption_map(info, "subtitles");

    automatic
        .and_then(|map| {
            map.iter()
                .filter(|(key, _)| key.ends_with(ORIGINAL_TRACK_SUFFIX))
                .find_map(|(_, formats)| json3_url(formats))
        })
        .or_else(|| {
            manual.and_then(|map| {
                map.iter()
                    .filter(|(key, _)| key.as_str() != "live_chat")
                    .find_map(|(_, formats)| json3_url(formats))
            })
        })
        .or_else(|| automatic.and_then(|map| map.values().find_map(json3_url)))
}

/// Build the track list from a yt-dlp info document
pub(crate) fn parse_tracks(info: &Value) -> Vec<TrackInfo> {
    let automatic = caption_map(info, "automatic_captions");
    let translatable = automatic.map(|map| !map.is_empty()).unwrap_or(false);
    let mut tracks = Vec::new();

    if let Some(manual) = caption_map(info, "subtitles") {
        for (code, formats) in manual {
            if code == "live_chat" {
                continue;
            }
            tracks.push(TrackInfo {
                language_code: code.clone(),
                language_name: formats[0]["name"].as_str().map(|s| s.to_string()),
                is_generated: false,
                is_translatable: translatable,
            });
        }
    }

    if let Some(automatic) = automatic {
        for (key, formats) in automatic {
            if let Some(code) = key.strip_suffix(ORIGINAL_TRACK_SUFFIX) {
                tracks.push(TrackInfo {
                    language_code: code.to_string(),
                    language_name: formats[0]["name"].as_str().map(|s| s.to_string()),
                    is_generated: true,
                    is_translatable: true,
                });
            }
        }
    }

    tracks
}

#[derive(Debug, Deserialize)]
struct Json3Document {
    #[serde(default)]
    events: Vec<Json3Event>,
}

#[derive(Debug, Deserialize)]
struct Json3Event {
    #[serde(rename = "tStartMs", default)]
    start_ms: u64,
    #[serde(rename = "dDurationMs", default)]
    duration_ms: u64,
    #[serde(default)]
    segs: Vec<Json3Seg>,
}

#[derive(Debug, Deserialize)]
struct Json3Seg {
    #[serde(default)]
    utf8: String,
}

/// Parse a json3 caption payload into timed segments
pub(crate) fn parse_json3(body: &str) -> Result<Vec<Segment>, UpstreamError> {
    let document: Json3Document = serde_json::from_str(body)
        .map_err(|e| UpstreamError::new(RawErrorType::Parse, format!("Invalid caption payload: {}", e)))?;

    let segments = document
        .events
        .into_iter()
        .filter_map(|event| {
            let text = event
                .segs
                .iter()
                .map(|seg| seg.utf8.as_str())
                .collect::<String>()
                .replace('\n', " ");
            let text = text.trim();
            if text.is_empty() {
                return None;
            }
            Some(Segment {
                text: text.to_string(),
                start_seconds: event.start_ms as f64 / 1000.0,
                duration_seconds: event.duration_ms as f64 / 1000.0,
            })
        })
        .collect();

    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_info() -> Value {
        json!({
            "id": "dQw4w9WgXcQ",
            "subtitles": {
                "de": [{"ext": "vtt", "url": "https://example.com/de.vtt", "name": "German"},
                       {"ext": "json3", "url": "https://example.com/de.json3", "name": "German"}],
                "live_chat": [{"ext": "json", "url": "https://example.com/chat"}]
            },
            "automatic_captions": {
                "en-orig": [{"ext": "json3", "url": "https://example.com/en-orig.json3", "name": "English (Original)"}],
                "fr": [{"ext": "json3", "url": "https://example.com/fr.json3", "name": "French"}]
            }
        })
    }

    #[test]
    fn test_parse_tracks_manual_then_generated() {
        let tracks = parse_tracks(&sample_info());

        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].language_code, "de");
        assert!(!tracks[0].is_generated);
        assert_eq!(tracks[0].language_name.as_deref(), Some("German"));
        assert_eq!(tracks[1].language_code, "en");
        assert!(tracks[1].is_generated);
    }

    #[test]
    fn test_caption_url_for_language() {
        let info = sample_info();

        assert_eq!(
            caption_url_for_language(&info, "de").as_deref(),
            Some("https://example.com/de.json3")
        );
        assert_eq!(
            caption_url_for_language(&info, "en").as_deref(),
            Some("https://example.com/en-orig.json3")
        );
        assert_eq!(
            caption_url_for_language(&info, "fr").as_deref(),
            Some("https://example.com/fr.json3")
        );
        assert_eq!(caption_url_for_language(&info, "ja"), None);
    }

    #[test]
    fn test_default_caption_url_prefers_original_asr() {
        assert_eq!(
            default_caption_url(&sample_info()).as_deref(),
            Some("https://example.com/en-orig.json3")
        );
        assert_eq!(default_caption_url(&json!({"id": "x"})), None);
        assert!(!has_any_captions(&json!({"subtitles": {}, "automatic_captions": {}})));
    }

    #[test]
    fn test_parse_json3() {
        let body = r#"{"events": [
            {"tStartMs": 0, "dDurationMs": 1500, "segs": [{"utf8": "Hello"}, {"utf8": " world"}]},
            {"tStartMs": 1500, "dDurationMs": 10},
            {"tStartMs": 1600, "dDurationMs": 10, "segs": [{"utf8": "\n"}]},
            {"tStartMs": 2000, "dDurationMs": 2500, "segs": [{"utf8": "second\nline"}]}
        ]}"#;

        let segments = parse_json3(body).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "Hello world");
        assert_eq!(segments[0].duration_seconds, 1.5);
        assert_eq!(segments[1].text, "second line");
        assert_eq!(segments[1].start_seconds, 2.0);
    }

    #[test]
    fn test_parse_json3_rejects_garbage() {
        let err = parse_json3("<html>").unwrap_err();
        assert_eq!(err.error_type, RawErrorType::Parse);
    }
}
