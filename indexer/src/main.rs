use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use search_core::{Document, Indexer, StoreConfig};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

/// A crawled page as emitted by the crawler.
#[derive(Debug, Deserialize)]
struct InputDoc {
    url: String,
    #[serde(default)]
    title: String,
    body: String,
}

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build and manage the persistent page index", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest crawled pages from JSON/JSONL files or a directory of them
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
        /// Index database directory
        #[arg(long, default_value = "./index.db")]
        db: String,
        /// Drop every table before ingesting
        #[arg(long, default_value_t = false)]
        reset: bool,
        /// Leave pages whose URL is already indexed untouched
        #[arg(long, default_value_t = false)]
        skip_existing: bool,
    },
    /// Drop every table of the index
    Reset {
        #[arg(long, default_value = "./index.db")]
        db: String,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, db, reset, skip_existing } => {
            build_index(&input, &db, reset, skip_existing)
        }
        Commands::Reset { db } => {
            let indexer = Indexer::open(&StoreConfig::new(&db))?;
            indexer.drop_all()?;
            indexer.store().flush()?;
            Ok(())
        }
    }
}

fn build_index(input: &str, db: &str, reset: bool, skip_existing: bool) -> Result<()> {
    let indexer = Indexer::open(&StoreConfig::new(db))
        .with_context(|| format!("opening index at {db}"))?;
    if reset {
        indexer.drop_all()?;
    }

    let mut ingested = 0usize;
    let mut skipped = 0usize;
    for file in input_files(Path::new(input)) {
        let docs = read_docs(&file).with_context(|| format!("reading {}", file.display()))?;
        let mut pending = Vec::with_capacity(docs.len());
        for doc in docs {
            if skip_existing && indexer.contains_url(&doc.url)? {
                skipped += 1;
                continue;
            }
            pending.push(doc);
        }
        pending.par_iter().try_for_each(|doc| -> search_core::Result<()> {
            indexer.update_or_add_page(&Document::from_text(&doc.url, &doc.title, &doc.body))?;
            Ok(())
        })?;
        ingested += pending.len();
        tracing::info!(file = %file.display(), docs = pending.len(), "ingested file");
    }

    let words = indexer.flush_inverted()?;
    indexer.store().flush()?;
    tracing::info!(ingested, skipped, words, db, "index build complete");
    Ok(())
}

fn input_files(input_path: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input_path.is_dir() {
        for entry in WalkDir::new(input_path).into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            let ext = p.extension().and_then(|s| s.to_str());
            if p.is_file() && matches!(ext, Some("json" | "jsonl")) {
                files.push(p.to_path_buf());
            }
        }
        files.sort();
    } else if input_path.is_file() {
        files.push(input_path.to_path_buf());
    }
    files
}

fn read_docs(file: &Path) -> Result<Vec<InputDoc>> {
    let reader = BufReader::new(File::open(file)?);
    if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
        let mut docs = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            docs.push(serde_json::from_str(&line)?);
        }
        return Ok(docs);
    }
    let json: serde_json::Value = serde_json::from_reader(reader)?;
    match json {
        serde_json::Value::Array(arr) => {
            Ok(arr.into_iter().map(serde_json::from_value).collect::<Result<_, _>>()?)
        }
        value @ serde_json::Value::Object(_) => Ok(vec![serde_json::from_value(value)?]),
        _ => Ok(Vec::new()),
    }
}
