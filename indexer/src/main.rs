use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use spimi_core::{BlockIndexer, CollectionStatistics, IndexConfig};
use tracing_subscriber::{fmt, EnvFilter};

use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "spimi-indexer")]
#[command(about = "Build document-term matrices from a zipped corpus under a fixed memory budget", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index every `<category>/<name>` entry of a zip archive
    Build {
        /// Input archive
        archive: PathBuf,
        /// Base name of the produced files
        index_name: String,
        /// JSON file with an IndexConfig; flags below override it
        #[arg(long)]
        config: Option<PathBuf>,
        /// Reduce terms to their English stem
        #[arg(long, default_value_t = false)]
        stemming: bool,
        /// Drop postings with tf <= LOW
        #[arg(long)]
        low: Option<u32>,
        /// Drop postings with tf >= HIGH
        #[arg(long)]
        high: Option<u32>,
        /// Output root directory
        #[arg(long)]
        output: Option<PathBuf>,
        /// Memory budget per block
        #[arg(long, value_name = "BYTES")]
        block_budget: Option<u64>,
        /// Postings buffered during the merge before writing
        #[arg(long)]
        flush_postings: Option<usize>,
        /// Skip each document's header up to the "Lines:" field
        #[arg(long, default_value_t = false)]
        skip_metadata: bool,
        /// File listing archive entries to index, one per line
        #[arg(long)]
        include: Option<PathBuf>,
        /// Leave block files in <output>/tmp
        #[arg(long, default_value_t = false)]
        keep_blocks: bool,
    },
    /// Print a collection statistics file
    Stats {
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            archive,
            index_name,
            config,
            stemming,
            low,
            high,
            output,
            block_budget,
            flush_postings,
            skip_metadata,
            include,
            keep_blocks,
        } => {
            let mut cfg = match config {
                Some(path) => IndexConfig::from_json_file(&path)
                    .with_context(|| format!("reading config {}", path.display()))?,
                None => IndexConfig::default(),
            };
            cfg.use_stemming |= stemming;
            cfg.skip_metadata |= skip_metadata;
            cfg.keep_block_files |= keep_blocks;
            if let Some(low) = low {
                cfg.low_tf_threshold = low;
            }
            if let Some(high) = high {
                cfg.high_tf_threshold = high;
            }
            if let Some(output) = output {
                cfg.output_root = output;
            }
            if let Some(budget) = block_budget {
                cfg.block_budget_bytes = budget;
            }
            if let Some(flush) = flush_postings {
                cfg.merge_flush_postings = flush;
            }
            if let Some(include) = include {
                cfg.include_entries = Some(read_include_list(&include)?);
            }
            build_index(&archive, &index_name, cfg)
        }
        Commands::Stats { file } => {
            let stats = CollectionStatistics::load(&file)
                .with_context(|| format!("reading statistics {}", file.display()))?;
            let mut out = io::stdout().lock();
            stats.write_to(&mut out, None)?;
            out.flush()?;
            Ok(())
        }
    }
}

fn build_index(archive: &Path, index_name: &str, config: IndexConfig) -> Result<()> {
    let indexer = BlockIndexer::new(config)?;
    tracing::debug!(config = ?indexer.config(), "effective configuration");
    let summary = indexer
        .index_archive(archive, index_name)
        .with_context(|| format!("indexing {}", archive.display()))?;
    tracing::info!(
        tf = %summary.paths.tf_matrix().display(),
        tfidf = %summary.paths.tfidf_matrix().display(),
        blocks = summary.blocks,
        terms = summary.vocabulary_size,
        postings = summary.postings_written,
        "index written"
    );
    Ok(())
}

fn read_include_list(path: &Path) -> Result<HashSet<String>> {
    let text = fs::read_to_string(path).with_context(|| format!("reading include list {}", path.display()))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}
