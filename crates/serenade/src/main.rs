//! serenade - analyze a performance and get the character's reaction
//!
//! Subcommands:
//! - `serenade analyze <path>` - Run the full pipeline on an audio or MIDI file
//! - `serenade config` - Print the effective configuration and its sources

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serenade::{Engine, GameResult};
use serenade_conf::GameConfig;

#[derive(Parser)]
#[command(name = "serenade")]
#[command(about = "Turn a short performance into chord, mood, and dialogue")]
#[command(version)]
struct Cli {
    /// Config file to use instead of ./serenade.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze an audio (.wav, .mp3, .ogg, .webm, .flac) or MIDI (.mid, .midi) file
    Analyze {
        path: PathBuf,

        /// Print the result as JSON on stdout
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, sources) = GameConfig::load_with_sources_from(cli.config.as_deref())
        .context("Failed to load configuration")?;

    match cli.command {
        Commands::Config => {
            print!("{}", config.to_toml());
            println!();
            for file in &sources.files {
                println!("# loaded: {}", file.display());
            }
            for var in &sources.env_overrides {
                println!("# env: {}", var);
            }
            Ok(())
        }
        Commands::Analyze { path, json } => {
            let telemetry = serenade::telemetry::init(&config.telemetry)
                .context("Failed to initialize telemetry")?;

            let outcome = analyze(&config, &path, json).await;
            telemetry.shutdown();
            outcome
        }
    }
}

async fn analyze(config: &GameConfig, path: &Path, json: bool) -> Result<()> {
    let engine = Engine::from_config(config)
        .await
        .context("Failed to build engine")?;
    tracing::debug!(sinks = ?engine.sink_names(), "engine ready");

    let result = engine
        .process_file(path)
        .await
        .with_context(|| format!("Failed to process {}", path.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(&result);
    }
    Ok(())
}

fn print_summary(result: &GameResult) {
    println!("chord:    {}", result.chord_label().unwrap_or("(none)"));
    if let Some(key) = &result.key {
        println!("key:      {}", key.label());
    }

    match &result.emotion {
        Some(emotion) => {
            println!("emotion:  {} ({:.0}%)", emotion.label, emotion.confidence * 100.0);
            for (label, p) in &emotion.probabilities {
                println!("          {:<12} {:.3}", label, p);
            }
        }
        None => println!("emotion:  (none)"),
    }

    if !result.progression.is_empty() {
        let labels: Vec<String> = result
            .progression
            .iter()
            .map(|c| format!("{}@{:.1}s", c.label, c.start_seconds))
            .collect();
        println!("changes:  {}", labels.join(" "));
    }

    if !result.descriptors.is_empty() {
        println!("features:");
        for (key, value) in result.descriptors.iter() {
            println!("          {:<20} {}", key, value);
        }
    }

    match &result.dialogue {
        Some(turn) => println!("\n{}", turn.content),
        None => println!("\n(no dialogue)"),
    }
}
