use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use attend_core::{Embedding, ReferenceIdentity, DEFAULT_SIMILARITY_THRESHOLD};

#[derive(Parser)]
#[command(name = "attend", about = "Attend offline tools: inspect and match population snapshots")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the identities in a population snapshot
    List {
        /// Path to a population JSON file
        population: PathBuf,
    },
    /// Compare two embedding files and print their cosine similarity
    Compare {
        /// First embedding JSON file
        a: PathBuf,
        /// Second embedding JSON file
        b: PathBuf,
    },
    /// Match one embedding against a population snapshot
    Match {
        /// Path to a population JSON file
        population: PathBuf,
        /// Embedding JSON file to match
        embedding: PathBuf,
        /// Minimum similarity for a reported match
        #[arg(short, long, default_value_t = DEFAULT_SIMILARITY_THRESHOLD)]
        threshold: f32,
    },
}

fn load_population(path: &PathBuf) -> Result<Vec<ReferenceIdentity>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading population file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn load_embedding(path: &PathBuf) -> Result<Embedding> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading embedding file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::List { population } => {
            let identities = load_population(&population)?;
            println!("{} identities", identities.len());
            for identity in &identities {
                println!(
                    "{}  {}  ({} dims)",
                    identity.id,
                    identity.display_name,
                    identity.embedding.values.len()
                );
            }
        }
        Commands::Compare { a, b } => {
            let left = load_embedding(&a)?;
            let right = load_embedding(&b)?;
            println!("{:.4}", left.similarity(&right));
        }
        Commands::Match {
            population,
            embedding,
            threshold,
        } => {
            let identities = load_population(&population)?;
            let probe = load_embedding(&embedding)?;

            let mut scored: Vec<(f32, &ReferenceIdentity)> = identities
                .iter()
                .map(|identity| (probe.similarity(&identity.embedding), identity))
                .filter(|(similarity, _)| *similarity >= threshold)
                .collect();
            scored.sort_by(|a, b| b.0.total_cmp(&a.0));

            if scored.is_empty() {
                println!("no match at threshold {threshold}");
            } else {
                for (similarity, identity) in scored {
                    println!(
                        "{:.4}  {}  {}",
                        similarity, identity.id, identity.display_name
                    );
                }
            }
        }
    }

    Ok(())
}
