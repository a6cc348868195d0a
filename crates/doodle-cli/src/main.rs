//! Doodle CLI - Command-line interface for the Doodle video pipeline

mod commands;

use clap::{Parser, Subcommand};
use commands::{cache, hardware, run, validate};
use doodle_core::{DoodleError, QualityLevel};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "doodle")]
#[command(about = "Generate narrated doodle scenes from a script", long_about = None)]
#[command(version)]
struct Cli {
    /// Log debug output (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the image and narration of every scene in a script
    Run {
        /// Path to the script (.json, .md or .markdown)
        #[arg(short, long)]
        input: PathBuf,

        /// Quality preset (fast, balanced, high)
        #[arg(short, long, default_value = "balanced", value_parser = parse_quality)]
        quality: QualityLevel,

        /// Regenerate every artifact instead of reusing cached ones
        #[arg(long)]
        no_cache: bool,

        /// Where to write the run manifest (default: .doodle/runs/<title>.toml)
        #[arg(long)]
        manifest: Option<PathBuf>,

        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Check a script without generating anything
    Validate {
        /// Path to the script
        script: PathBuf,
    },

    /// Show the detected hardware tier and the presets it resolves to
    Hardware {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Artifact cache operations
    #[command(subcommand)]
    Cache(cache::CacheCommands),
}

fn parse_quality(s: &str) -> Result<QualityLevel, String> {
    s.parse().map_err(|e: DoodleError| e.to_string())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Run {
            input,
            quality,
            no_cache,
            manifest,
            format,
        } => run::run(run::RunArgs {
            input,
            quality,
            no_cache,
            manifest,
            format,
        }),
        Commands::Validate { script } => validate::run(&script),
        Commands::Hardware { format } => hardware::run(&format),
        Commands::Cache(cmd) => cache::run(cmd),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            commands::exit_code_for_error(&e)
        }
    }
}
