use serde::{Deserialize, Serialize};
use std::fmt;

use crate::upstream::TrackInfo;

/// Language reported for transcripts fetched without language negotiation
pub const AUTO_DETECTED: &str = "auto-detected";

/// Fallback language tried right after the preferred one
pub const DEFAULT_LANGUAGE: &str = "en";

/// Retrieval strategies, tried in [`Strategy::ORDER`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    /// Preferred language, then English, then every other probed language
    PreferredLanguage,
    /// Best single probed track, manual captions first
    AnyTrack,
    /// Whatever the service serves by default
    RawFallback,
}

impl Strategy {
    pub const ORDER: [Strategy; 3] = [
        Strategy::PreferredLanguage,
        Strategy::AnyTrack,
        Strategy::RawFallback,
    ];

    /// 1-based position in the fallback chain
    pub fn number(&self) -> u8 {
        match self {
            Strategy::PreferredLanguage => 1,
            Strategy::AnyTrack => 2,
            Strategy::RawFallback => 3,
        }
    }

    pub fn state(&self) -> FetchState {
        match self {
            Strategy::PreferredLanguage => FetchState::PreferredLanguage,
            Strategy::AnyTrack => FetchState::AnyTrack,
            Strategy::RawFallback => FetchState::RawFallback,
        }
    }

    /// The requests this strategy will make, in order
    pub fn requests(&self, preferred_language: &str, tracks: &[TrackInfo]) -> Vec<TrackRequest> {
        match self {
            Strategy::PreferredLanguage => language_order(preferred_language, tracks)
                .into_iter()
                .map(TrackRequest::Language)
                .collect(),
            Strategy::AnyTrack => select_any_track(tracks)
                .map(|track| TrackRequest::Language(track.language_code.clone()))
                .into_iter()
                .collect(),
            Strategy::RawFallback => vec![TrackRequest::Raw],
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::PreferredLanguage => write!(f, "preferred language"),
            Strategy::AnyTrack => write!(f, "any track"),
            Strategy::RawFallback => write!(f, "raw fallback"),
        }
    }
}

/// One upstream transcript request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackRequest {
    Language(String),
    Raw,
}

/// States of the fetch state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    Init,
    Probing,
    PreferredLanguage,
    AnyTrack,
    RawFallback,
    Success,
    Failure,
}

impl fmt::Display for FetchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FetchState::Init => "INIT",
            FetchState::Probing => "PROBING",
            FetchState::PreferredLanguage => "STRATEGY_1_PREFERRED_LANG",
            FetchState::AnyTrack => "STRATEGY_2_ANY_TRACK",
            FetchState::RawFallback => "STRATEGY_3_RAW_FALLBACK",
            FetchState::Success => "SUCCESS",
            FetchState::Failure => "FAILURE",
        };
        f.write_str(name)
    }
}

/// `[preferred if not "en"] ++ ["en"] ++ [other probed languages]`, without duplicates
pub fn language_order(preferred_language: &str, tracks: &[TrackInfo]) -> Vec<String> {
    let mut languages: Vec<String> = Vec::new();

    let preferred = preferred_language.trim();
    if !preferred.is_empty() && preferred != DEFAULT_LANGUAGE {
        languages.push(preferred.to_string());
    }
    languages.push(DEFAULT_LANGUAGE.to_string());

    for track in tracks {
        if !languages.contains(&track.language_code) {
            languages.push(track.language_code.clone());
        }
    }

    languages
}

/// First manually created track, else the first probed track
pub fn select_any_track(tracks: &[TrackInfo]) -> Option<&TrackInfo> {
    tracks
        .iter()
        .find(|track| !track.is_generated)
        .or_else(|| tracks.first())
}

/// Whether captions in `language` are machine generated, judged from the probe
pub fn is_generated_language(language: &str, tracks: &[TrackInfo]) -> bool {
    let matching = || tracks.iter().filter(|track| track.language_code == language);
    !matching().any(|track| !track.is_generated) && matching().any(|track| track.is_generated)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(code: &str, generated: bool) -> TrackInfo {
        TrackInfo {
            language_code: code.to_string(),
            language_name: None,
            is_generated: generated,
            is_translatable: true,
        }
    }

    #[test]
    fn test_language_order_preferred_first() {
        let tracks = vec![track("de", false), track("en", true), track("fr", true)];
        assert_eq!(language_order("fr", &tracks), vec!["fr", "en", "de"]);
    }

    #[test]
    fn test_language_order_english_preferred() {
        let tracks = vec![track("es", true)];
        assert_eq!(language_order("en", &tracks), vec!["en", "es"]);
        assert_eq!(language_order("", &[]), vec!["en"]);
    }

    #[test]
    fn test_select_any_track_prefers_manual() {
        let tracks = vec![track("en", true), track("ja", false), track("de", false)];
        assert_eq!(select_any_track(&tracks).unwrap().language_code, "ja");

        let generated_only = vec![track("ko", true), track("en", true)];
        assert_eq!(select_any_track(&generated_only).unwrap().language_code, "ko");

        assert!(select_any_track(&[]).is_none());
    }

    #[test]
    fn test_requests_per_strategy() {
        let tracks = vec![track("de", true)];

        assert_eq!(
            Strategy::PreferredLanguage.requests("es", &tracks),
            vec![
                TrackRequest::Language("es".to_string()),
                TrackRequest::Language("en".to_string()),
                TrackRequest::Language("de".to_string()),
            ]
        );
        assert_eq!(
            Strategy::AnyTrack.requests("es", &tracks),
            vec![TrackRequest::Language("de".to_string())]
        );
        assert!(Strategy::AnyTrack.requests("es", &[]).is_empty());
        assert_eq!(Strategy::RawFallback.requests("es", &tracks), vec![TrackRequest::Raw]);
    }

    #[test]
    fn test_is_generated_language() {
        let tracks = vec![track("en", true), track("en", false), track("fr", true)];
        assert!(!is_generated_language("en", &tracks));
        assert!(is_generated_language("fr", &tracks));
        assert!(!is_generated_language("de", &tracks));
    }
}
