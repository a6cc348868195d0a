//! Artifact cache commands

use anyhow::{Context, Result};
use clap::Subcommand;
use doodle_cache::{ArtifactKind, ContentCache};
use doodle_gen::orchestrator::clean_scratch;
use doodle_gen::DoodleConfig;
use std::process::ExitCode;

#[derive(Subcommand)]
pub enum CacheCommands {
    /// Show the number and total size of cached artifacts
    Stats {
        /// Only count one kind (image or audio)
        #[arg(long, value_parser = parse_kind)]
        kind: Option<ArtifactKind>,

        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// List cached artifacts
    List {
        /// Only list one kind (image or audio)
        #[arg(long, value_parser = parse_kind)]
        kind: Option<ArtifactKind>,
    },

    /// Delete cached artifacts so the next run regenerates them
    Clear {
        /// Only clear one kind (image or audio)
        #[arg(long, value_parser = parse_kind)]
        kind: Option<ArtifactKind>,
    },
}

fn parse_kind(s: &str) -> Result<ArtifactKind, String> {
    match s {
        "image" | "images" => Ok(ArtifactKind::Image),
        "audio" => Ok(ArtifactKind::Audio),
        _ => Err(format!("unknown artifact kind '{}'; valid values: image, audio", s)),
    }
}

pub fn run(cmd: CacheCommands) -> Result<ExitCode> {
    let config = DoodleConfig::load()?;
    let cache = ContentCache::open(&config.generation.cache_dir)
        .with_context(|| format!("Failed to open cache at {}", config.generation.cache_dir.display()))?;

    match cmd {
        CacheCommands::Stats { kind, format } => run_stats(&cache, kind, &format)?,
        CacheCommands::List { kind } => run_list(&cache, kind),
        CacheCommands::Clear { kind } => {
            let removed = cache.clear(kind)?;
            println!("Removed {} cached artifact(s) from {}", removed, cache.root().display());
            if kind.is_none() {
                let scratch = clean_scratch(&config.generation.scratch_dir);
                if scratch > 0 {
                    println!("Removed {} scratch file(s)", scratch);
                }
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn run_stats(cache: &ContentCache, kind: Option<ArtifactKind>, format: &str) -> Result<()> {
    match format {
        "json" => {
            let mut report = serde_json::Map::new();
            for k in ArtifactKind::ALL {
                if kind.is_none() || kind == Some(k) {
                    report.insert(k.dir_name().to_string(), serde_json::to_value(cache.stats(Some(k)))?);
                }
            }
            report.insert("total".to_string(), serde_json::to_value(cache.stats(kind))?);
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        "text" => {
            println!("Cache: {}", cache.root().display());
            for k in ArtifactKind::ALL {
                if kind.is_none() || kind == Some(k) {
                    let stats = cache.stats(Some(k));
                    println!("  {:<7} {:>5} file(s)  {}", k.dir_name(), stats.entries, format_size(stats.total_bytes));
                }
            }
            let total = cache.stats(kind);
            println!("  {:<7} {:>5} file(s)  {}", "total", total.entries, format_size(total.total_bytes));
        }
        other => anyhow::bail!("Unknown format '{}'. Use: text, json", other),
    }
    Ok(())
}

fn run_list(cache: &ContentCache, kind: Option<ArtifactKind>) {
    let entries = cache.entries(kind);
    if entries.is_empty() {
        println!("Cache is empty.");
        return;
    }
    for entry in &entries {
        println!(
            "  {:<5} scene {:<3} {:>10}  {}  {}",
            entry.key.kind.to_string(),
            entry.scene_id.to_string(),
            format_size(entry.size_bytes),
            entry.created_at.format("%Y-%m-%d %H:%M"),
            entry.path.display()
        );
    }
    println!("{} artifact(s)", entries.len());
}

fn format_size(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    let b = bytes as f64;
    if b >= KIB * KIB {
        format!("{:.1} MiB", b / (KIB * KIB))
    } else if b >= KIB {
        format!("{:.1} KiB", b / KIB)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kind() {
        assert_eq!(parse_kind("image"), Ok(ArtifactKind::Image));
        assert_eq!(parse_kind("audio"), Ok(ArtifactKind::Audio));
        assert!(parse_kind("video").is_err());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KiB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MiB");
    }
}
