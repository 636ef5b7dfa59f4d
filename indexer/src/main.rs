use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use sitesearch_core::{DocId, EngineConfig, Mutation, SearchEngine};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, EnvFilter};

mod loader;

use loader::{collect_files, read_records, InputDoc};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build and maintain the site search index", long_about = None)]
struct Cli {
    /// Engine configuration (JSON); defaults apply when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from input JSON/JSONL files or a directory
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
        /// Output index directory
        #[arg(long)]
        output: String,
        /// Add to the existing index instead of rebuilding it
        #[arg(long, default_value_t = false)]
        append: bool,
        /// Documents applied per snapshot swap
        #[arg(long, default_value_t = 500)]
        batch_size: usize,
        /// Where rejected input records are written (default: <output>/failed_docs.json)
        #[arg(long)]
        failed_docs: Option<PathBuf>,
    },
    /// Remove one document by loader id (or numeric doc id)
    Delete {
        #[arg(long)]
        index: String,
        #[arg(long)]
        id: String,
    },
    /// Print index statistics
    Stats {
        #[arg(long)]
        index: String,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path).with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Build { input, output, append, batch_size, failed_docs } => {
            let failed_path = failed_docs.unwrap_or_else(|| Path::new(&output).join("failed_docs.json"));
            build_index(&input, &output, append, batch_size.max(1), &failed_path, config)
        }
        Commands::Delete { index, id } => delete_doc(&index, &id, config),
        Commands::Stats { index } => {
            let engine = SearchEngine::open(&index, config)?;
            let stats = engine.stats();
            let out = serde_json::json!({
                "documents": stats.documents,
                "terms": stats.terms,
                "average_doc_length": stats.average_doc_length,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
            Ok(())
        }
    }
}

/// Pending mutations with the raw records they came from.
struct Ingest<'a> {
    engine: &'a SearchEngine,
    batch: Vec<Mutation>,
    raws: Vec<serde_json::Value>,
    failed: Vec<serde_json::Value>,
    indexed: usize,
}

impl Ingest<'_> {
    fn push(&mut self, mutation: Mutation, raw: serde_json::Value) {
        self.batch.push(mutation);
        self.raws.push(raw);
    }

    /// Apply the pending batch. Index corruption halts the whole ingestion.
    fn commit(&mut self) -> Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let results = self
            .engine
            .apply(std::mem::take(&mut self.batch))
            .context("ingestion halted; index left at last committed batch")?;
        for (res, raw) in results.into_iter().zip(self.raws.drain(..)) {
            match res {
                Ok(_) => self.indexed += 1,
                Err(e) => {
                    tracing::warn!(error = %e, "document rejected");
                    self.failed.push(raw);
                }
            }
        }
        Ok(())
    }
}

fn build_index(input: &str, output: &str, append: bool, batch_size: usize, failed_path: &Path, config: EngineConfig) -> Result<()> {
    let engine = if append { SearchEngine::open(output, config)? } else { SearchEngine::create(output, config) };
    let files = collect_files(Path::new(input));
    if files.is_empty() {
        return Err(anyhow!("no .json or .jsonl input found at {input}"));
    }

    let mut next_doc_id: DocId = engine.snapshot().store.next_id();
    let mut assigned: HashMap<String, DocId> = HashMap::new();
    let mut ingest = Ingest { engine: &engine, batch: Vec::new(), raws: Vec::new(), failed: Vec::new(), indexed: 0 };

    for file in files {
        tracing::info!(file = %file.display(), "reading input");
        for raw in read_records(&file)? {
            let doc = match InputDoc::from_value(&raw) {
                Ok(doc) => doc,
                Err(e) => {
                    tracing::warn!(file = %file.display(), error = %e, "unreadable record");
                    ingest.failed.push(raw);
                    continue;
                }
            };
            let Some(key) = doc.external_id().map(str::to_string) else {
                tracing::warn!(file = %file.display(), "record has neither id nor url");
                ingest.failed.push(raw);
                continue;
            };
            // re-crawled pages keep their doc id and replace the old version
            let (doc_id, overwrite) = match assigned.get(&key).copied().or_else(|| engine.lookup_external(&key)) {
                Some(id) => (id, true),
                None => {
                    let id = next_doc_id;
                    next_doc_id += 1;
                    (id, false)
                }
            };
            assigned.insert(key, doc_id);
            ingest.push(Mutation::Put { doc: doc.into_document(doc_id), overwrite }, raw);
            if ingest.batch.len() >= batch_size {
                ingest.commit()?;
            }
        }
    }
    ingest.commit()?;

    let stats = engine.stats();
    tracing::info!(indexed = ingest.indexed, num_docs = stats.documents, num_terms = stats.terms, "ingested documents");
    engine.flush()?;

    if !ingest.failed.is_empty() {
        fs::write(failed_path, serde_json::to_string_pretty(&ingest.failed)?)?;
        tracing::error!(failed = ingest.failed.len(), path = %failed_path.display(), "some documents failed");
    }
    tracing::info!(output, "index build complete");
    Ok(())
}

fn delete_doc(index: &str, id: &str, config: EngineConfig) -> Result<()> {
    let engine = SearchEngine::open(index, config)?;
    let doc_id = match engine.lookup_external(id) {
        Some(doc_id) => doc_id,
        None => id.parse::<DocId>().map_err(|_| anyhow!("unknown document id {id}"))?,
    };
    engine.delete(doc_id)?;
    engine.close()?;
    tracing::info!(doc_id, "document deleted");
    Ok(())
}
