use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "tubescribe",
    about = "TubeScribe - Fetch YouTube transcripts politely, with fallbacks and a local cache",
    version,
    long_about = "A CLI tool for retrieving YouTube caption transcripts. Requests are paced to avoid upstream blocking, several retrieval strategies are tried when a language is missing, and results are kept in a size-bounded local cache."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Cache directory (overrides the config file)
    #[arg(long, global = true, env = "TUBESCRIBE_CACHE_DIR", value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch the transcript of a video
    Transcript {
        /// YouTube URL (watch, youtu.be, embed, shorts)
        #[arg(value_name = "URL")]
        url: String,

        /// Preferred language code (defaults to the configured language)
        #[arg(short, long, value_name = "LANG")]
        language: Option<String>,

        /// Output file path (prints to console if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Include segment timestamps in text output
        #[arg(long)]
        timestamps: bool,

        /// Skip the cache for this request
        #[arg(long)]
        no_cache: bool,
    },

    /// List the caption tracks a video offers
    Tracks {
        #[arg(value_name = "URL")]
        url: String,
    },

    /// Check whether YouTube is currently blocking this machine
    Check,

    /// Inspect and manage the local cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Show or locate the configuration file
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },
}

#[derive(Subcommand, Clone, Debug)]
pub enum CacheAction {
    /// Show cache size and usage
    Stats,
    /// List cached entries
    List,
    /// Delete everything in the cache
    Clear,
    /// Delete the cached artifacts of one video
    Delete {
        /// Video URL or 11-character video id
        #[arg(value_name = "VIDEO")]
        video: String,
    },
}

#[derive(ValueEnum, Clone, Debug, PartialEq)]
pub enum OutputFormat {
    /// Plain text
    Text,
    /// JSON with segments and metadata
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_transcript_command() {
        let cli = Cli::try_parse_from([
            "tubescribe",
            "transcript",
            "https://youtu.be/dQw4w9WgXcQ",
            "-l",
            "de",
            "--format",
            "json",
            "--no-cache",
        ])
        .unwrap();

        match cli.command {
            Commands::Transcript {
                url,
                language,
                format,
                no_cache,
                timestamps,
                output,
            } => {
                assert_eq!(url, "https://youtu.be/dQw4w9WgXcQ");
                assert_eq!(language.as_deref(), Some("de"));
                assert_eq!(format, OutputFormat::Json);
                assert!(no_cache);
                assert!(!timestamps);
                assert!(output.is_none());
            }
            _ => panic!("expected transcript command"),
        }
    }

    #[test]
    fn test_parse_cache_delete_with_global_flags() {
        let cli = Cli::try_parse_from([
            "tubescribe",
            "cache",
            "delete",
            "dQw4w9WgXcQ",
            "--cache-dir",
            "/tmp/tubescribe",
            "-q",
        ])
        .unwrap();

        assert!(cli.quiet);
        assert_eq!(cli.cache_dir, Some(PathBuf::from("/tmp/tubescribe")));
        assert!(matches!(
            cli.command,
            Commands::Cache {
                action: CacheAction::Delete { ref video }
            } if video == "dQw4w9WgXcQ"
        ));
    }
}
