use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use pubsearch_core::dispatch::build_and_save;
use pubsearch_core::persist::{load_judgments, IndexPaths};
use pubsearch_core::{evaluate, load_corpus, Evaluation, SearchEngine, SearchHit, SearchMode};
use serde::Serialize;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build the positional index over a publication corpus and query it", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Store {
    /// Corpus path (JSON, JSONL, or a directory of them)
    #[arg(long, default_value = "./data/publications.json")]
    corpus: String,
    /// Index directory
    #[arg(long, default_value = "./data/index")]
    index: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the positional index from the corpus, overwriting any existing one
    Build {
        #[command(flatten)]
        store: Store,
    },
    /// Run a query and print the mode and results as JSON
    Search {
        #[command(flatten)]
        store: Store,
        /// Query text; wrap in double quotes to force phrase matching
        #[arg(short, long)]
        query: String,
        /// Maximum number of results
        #[arg(short, long, default_value_t = 10)]
        k: usize,
    },
    /// Run a query and score the results against relevance judgments
    Evaluate {
        #[command(flatten)]
        store: Store,
        /// Relevance-judgment mapping (lowercase query -> relevant doc ids)
        #[arg(long, default_value = "./data/docs_relevance_mapping.json")]
        judgments: String,
        #[arg(short, long)]
        query: String,
        #[arg(short, long, default_value_t = 10)]
        k: usize,
    },
}

#[derive(Serialize)]
struct EvaluateReport {
    query: String,
    mode: SearchMode,
    results: Vec<SearchHit>,
    evaluation: Evaluation,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { store } => build(&store),
        Commands::Search { store, query, k } => {
            let engine = open(&store)?;
            let outcome = engine.search(&query, k);
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
        Commands::Evaluate { store, judgments, query, k } => {
            let engine = open(&store)?;
            let judgments = load_judgments(&judgments)?;
            let outcome = engine.search(&query, k);
            let evaluation = evaluate(&query, &outcome.results, engine.docs(), &judgments);
            let report = EvaluateReport { query, mode: outcome.mode, results: outcome.results, evaluation };
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

fn build(store: &Store) -> Result<()> {
    let docs = load_corpus(&store.corpus)?;
    let (_, meta) = build_and_save(&IndexPaths::new(&store.index), &docs)?;
    tracing::info!(output = %store.index, num_docs = meta.num_docs, num_terms = meta.num_terms, "index build complete");
    Ok(())
}

fn open(store: &Store) -> Result<SearchEngine> {
    let docs = load_corpus(&store.corpus)?;
    SearchEngine::open(IndexPaths::new(&store.index), docs)
}
