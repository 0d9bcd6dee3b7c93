use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use voicekb::config::Config;
use voicekb::retriever::Retriever;
use voicekb::source::JsonFileSource;
use voicekb::trainer::Trainer;

#[derive(Parser)]
#[command(name = "voicekb")]
#[command(about = "In-memory knowledge retrieval backend for voice assistants", long_about = None)]
struct Cli {
    /// Optional JSON config file overriding tuning defaults
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one query against a records file and print the response as JSON
    Search {
        /// JSON file holding the record array
        #[arg(short, long)]
        records: PathBuf,
        /// Category filter
        #[arg(long)]
        category: Option<String>,
        /// Region filter (e.g. "GA")
        #[arg(long)]
        region: Option<String>,
        /// Maximum number of results
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// The query text
        query: String,
    },
    /// Print aggregate statistics from an exported training log
    Stats {
        /// JSON file holding exported training examples
        #[arg(short, long)]
        log: PathBuf,
    },
    /// Print improvement suggestions from an exported training log
    Suggest {
        /// JSON file holding exported training examples
        #[arg(short, long)]
        log: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load(path).context("loading config")?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Search {
            records,
            category,
            region,
            limit,
            query,
        } => {
            let source = Arc::new(JsonFileSource::new(records));
            let retriever = Retriever::new(source, config);
            retriever.initialize().await.context("initializing index")?;

            let response = retriever.search(
                &query,
                category.as_deref(),
                region.as_deref(),
                limit,
                false,
            );
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::Stats { log } => {
            let trainer = load_trainer(&log, config).await?;
            println!("{}", serde_json::to_string_pretty(&trainer.stats())?);
        }
        Commands::Suggest { log } => {
            let trainer = load_trainer(&log, config).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&trainer.suggest_improvements())?
            );
        }
    }

    Ok(())
}

/// Build a trainer preloaded from an exported training log. The retriever
/// behind it never loads records — stats and suggestions only read the log.
async fn load_trainer(log: &PathBuf, config: Config) -> anyhow::Result<Trainer> {
    let json = tokio::fs::read_to_string(log)
        .await
        .with_context(|| format!("reading training log {}", log.display()))?;

    let source = Arc::new(voicekb::source::StaticSource::new(Vec::new()));
    let retriever = Arc::new(Retriever::new(source, config.clone()));
    let mut trainer = Trainer::new(retriever, config.trainer, config.weights);
    trainer.import_examples(&json).context("parsing training log")?;
    Ok(trainer)
}
