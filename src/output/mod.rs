use anyhow::Result;
use std::path::Path;

use crate::cache::{CacheEntry, CacheStats};
use crate::cli::OutputFormat;
use crate::transcribe::TranscriptResult;
use crate::upstream::TrackInfo;
use crate::utils::{format_duration, format_file_size, format_timestamp};

/// Save transcript to file
pub async fn save_to_file(
    result: &TranscriptResult,
    path: &Path,
    format: &OutputFormat,
    include_timestamps: bool,
) -> Result<()> {
    let content = render(result, format, include_timestamps)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs_err::create_dir_all(parent)?;
    }
    fs_err::write(path, content)?;
    Ok(())
}

/// Print transcript to console
pub fn print_to_console(result: &TranscriptResult, format: &OutputFormat, include_timestamps: bool) -> Result<()> {
    println!("{}", render(result, format, include_timestamps)?);
    Ok(())
}

fn render(result: &TranscriptResult, format: &OutputFormat, include_timestamps: bool) -> Result<String> {
    Ok(match format {
        OutputFormat::Text => format_as_text(result, include_timestamps),
        OutputFormat::Json => format_as_json(result)?,
    })
}

/// Plain transcript, optionally one timestamped line per segment
pub fn format_as_text(result: &TranscriptResult, include_timestamps: bool) -> String {
    if !include_timestamps {
        return result.artifact.text.clone();
    }

    result
        .artifact
        .segments
        .iter()
        .map(|segment| format!("[{}] {}", format_timestamp(segment.start_seconds), segment.text.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_as_json(result: &TranscriptResult) -> Result<String> {
    Ok(serde_json::to_string_pretty(result)?)
}

/// One-paragraph summary of where a transcript came from
pub fn format_summary(result: &TranscriptResult) -> String {
    let mut lines = Vec::new();

    if let Some(title) = result.metadata.as_ref().and_then(|m| m.title.as_deref()) {
        lines.push(format!("Title: {}", title));
    }
    if let Some(author) = result.metadata.as_ref().and_then(|m| m.author.as_deref()) {
        lines.push(format!("Channel: {}", author));
    }
    lines.push(format!("Video: {}", result.identity.canonical_id));

    let kind = if result.artifact.is_generated { "auto-generated" } else { "manual" };
    lines.push(format!("Language: {} ({})", result.artifact.language, kind));
    lines.push(format!(
        "Strategy: {}{}",
        result.artifact.strategy_used,
        if result.from_cache { ", from cache" } else { "" }
    ));
    lines.push(format!(
        "Length: {} words, {}",
        result.artifact.word_count(),
        format_duration(result.artifact.duration_seconds())
    ));

    lines.join("\n")
}

pub fn format_tracks(tracks: &[TrackInfo]) -> String {
    if tracks.is_empty() {
        return "No caption tracks found".to_string();
    }

    tracks
        .iter()
        .map(|track| {
            let name = track.language_name.as_deref().unwrap_or("");
            let kind = if track.is_generated { "auto" } else { "manual" };
            format!("  {:<10} {:<24} {}", track.language_code, name, kind)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_cache_stats(stats: &CacheStats) -> String {
    format!(
        "Cache usage: {} of {} ({:.2}%), {} files",
        format_file_size(stats.total_bytes),
        format_file_size(stats.max_bytes),
        stats.usage_percent,
        stats.file_count
    )
}

pub fn format_cache_entries(entries: &[CacheEntry]) -> String {
    if entries.is_empty() {
        return "Cache is empty".to_string();
    }

    let mut sorted: Vec<&CacheEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));

    sorted
        .iter()
        .map(|entry| {
            format!(
                "  {:<12} {:<10} {:>10}  {}",
                entry.canonical_id.as_deref().unwrap_or("?"),
                entry.kind.as_str(),
                format_file_size(entry.size_bytes),
                entry.modified_at.format("%Y-%m-%d %H:%M:%S")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
