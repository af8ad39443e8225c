use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facegate_core::Descriptor;
use facegate_session::SessionConfig;
use std::path::{Path, PathBuf};

mod replay;

#[derive(Parser)]
#[command(
    name = "facegate",
    about = "Single-user face login: descriptor matching and session replay"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare two descriptor files (JSON arrays of numbers)
    Distance {
        a: PathBuf,
        b: PathBuf,
        /// Acceptance threshold (default: FACEGATE_THRESHOLD or 0.5)
        #[arg(short, long)]
        threshold: Option<f32>,
    },
    /// Replay a recorded session script through registration and verification
    Replay {
        /// JSON script with the enrollment detection and the verification frames
        script: PathBuf,
        /// TOML config file; overrides FACEGATE_* environment variables
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Stop after this many verification reports (default: one per scripted frame)
        #[arg(long)]
        cycles: Option<usize>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Distance { a, b, threshold } => {
            let threshold = threshold.unwrap_or_else(|| SessionConfig::from_env().threshold);
            let a = load_descriptor(&a)?;
            let b = load_descriptor(&b)?;
            println!("{}", compare(&a, &b, threshold)?);
        }
        Commands::Replay {
            script,
            config,
            cycles,
        } => {
            let config = SessionConfig::load(config.as_deref())?;
            let script = replay::ReplayScript::load(&script)?;
            tracing::info!(
                frames = script.frames.len(),
                threshold = config.threshold,
                "replaying session"
            );

            let summary = {
                let mut stdout = std::io::stdout().lock();
                replay::run(script, config, cycles, &mut stdout).await?
            };
            println!("{}", serde_json::json!({ "summary": summary }));
        }
    }

    Ok(())
}

fn load_descriptor(path: &Path) -> Result<Descriptor> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read descriptor {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid descriptor {}", path.display()))
}

/// Distance and decision for two descriptors, as printed by `facegate distance`.
fn compare(a: &Descriptor, b: &Descriptor, threshold: f32) -> Result<serde_json::Value> {
    let distance = facegate_core::distance(a, b)?;
    Ok(serde_json::json!({
        "distance": distance,
        "threshold": threshold,
        "accepted": facegate_core::decide(distance, threshold),
    }))
}
