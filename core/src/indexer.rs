//! Three-phase out-of-core build: vocabulary pass, bounded-memory block
//! pass, then a k-way merge of the blocks into the final matrices.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, info, warn};

use crate::arff::{ArffMatrixWriter, CompressedSink};
use crate::block::{BlockMatrixReader, BlockMatrixWriter};
use crate::config::{BlockBudget, CostModel, IndexConfig, TfThresholds, UnitCost};
use crate::error::{IndexError, Result};
use crate::matrix::{DocumentTermMatrix, Frequencies};
use crate::merge::MatrixMerger;
use crate::persist::{self, IndexPaths, MetaFile, FORMAT_VERSION};
use crate::stats::CollectionStatistics;
use crate::tokenizer::{DocIdSequence, TokenStream, TokenStreamOptions};
use crate::vocabulary::{Vocabulary, VocabularyBuilder};
use crate::DocumentTable;

/// Initial slot count of the phase-1 vocabulary.
const VOCABULARY_CAPACITY: usize = 65536;

/// What a successful build produced.
#[derive(Debug, Clone)]
pub struct BuildSummary {
    pub paths: IndexPaths,
    pub statistics: CollectionStatistics,
    pub vocabulary_size: usize,
    pub blocks: usize,
    /// Postings in the raw-tf matrix after thresholds.
    pub postings_written: u64,
    pub thresholded_postings: u64,
}

struct MergeOutcome {
    postings_written: u64,
    thresholded: u64,
}

/// Both final matrices, written in lockstep.
struct MatrixOutputs {
    tf: ArffMatrixWriter<CompressedSink>,
    tfidf: ArffMatrixWriter<CompressedSink>,
}

pub struct BlockIndexer {
    config: IndexConfig,
    cost: Box<dyn CostModel>,
}

impl BlockIndexer {
    /// Fails on configurations `IndexConfig::validate` rejects.
    pub fn new(config: IndexConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cost: Box::new(UnitCost::default()),
        })
    }

    /// Replaces the per-posting memory estimate used to cut blocks.
    pub fn with_cost_model(mut self, cost: impl CostModel + 'static) -> Self {
        self.cost = Box::new(cost);
        self
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    fn stream(&self, archive: &Path) -> Result<TokenStream> {
        TokenStream::open(archive, TokenStreamOptions::from(&self.config), DocIdSequence::new())
    }

    /// Builds `<name>` from `archive`. Block files are removed afterwards unless
    /// `keep_block_files` is set, whether or not the build succeeds.
    pub fn index_archive<P: AsRef<Path>>(&self, archive: P, name: &str) -> Result<BuildSummary> {
        let archive = archive.as_ref();
        let paths = IndexPaths::new(&self.config.output_root, name, self.config.use_stemming);
        paths.create_dirs()?;
        info!(archive = %archive.display(), index = name, stemming = self.config.use_stemming, "starting index build");

        let (vocabulary, mut statistics) = self.build_vocabulary(archive)?;

        let mut blocks = Vec::new();
        let merged = self
            .build_blocks(archive, &vocabulary, &paths, &mut blocks)
            .and_then(|documents| self.merge_blocks(&vocabulary, &documents, &paths, &blocks));
        if !self.config.keep_block_files {
            remove_blocks(&blocks);
        }
        let merged = merged?;

        statistics.discount_tokens(merged.thresholded);
        statistics.save(&paths.stat(), Some(format!("collection statistics for {name}").as_str()))?;
        persist::save_vocabulary(&paths, &vocabulary)?;
        let thresholds = self.config.thresholds();
        persist::save_meta(
            &paths,
            &MetaFile {
                index_name: name.to_string(),
                created_at: persist::timestamp(),
                version: FORMAT_VERSION,
                use_stemming: self.config.use_stemming,
                low_tf_threshold: thresholds.low,
                high_tf_threshold: thresholds.high,
                blocks: blocks.len(),
                statistics: statistics.clone(),
            },
        )?;
        info!(
            index = name,
            documents = statistics.number_of_documents,
            tokens = statistics.number_of_tokens,
            terms = statistics.number_of_unique_terms,
            "index build complete"
        );

        Ok(BuildSummary {
            paths,
            statistics,
            vocabulary_size: vocabulary.len(),
            blocks: blocks.len(),
            postings_written: merged.postings_written,
            thresholded_postings: merged.thresholded,
        })
    }

    /// Phase 1: one full pass registering every token.
    pub fn build_vocabulary(&self, archive: &Path) -> Result<(Vocabulary, CollectionStatistics)> {
        let mut stream = self.stream(archive)?;
        let mut builder = VocabularyBuilder::with_capacity(VOCABULARY_CAPACITY);
        let mut tokens: u64 = 0;
        while let Some(token) = stream.next()? {
            builder.add(&token.term, token.doc_id());
            tokens += 1;
        }
        if tokens == 0 {
            return Err(IndexError::EmptyCorpus);
        }
        let documents = stream.doc_ids().last();
        let vocabulary = builder.finalize(documents);
        let statistics = CollectionStatistics::new(documents as u64, tokens, vocabulary.len() as u64);
        info!(
            documents,
            tokens,
            terms = vocabulary.len(),
            avg_doc_len = statistics.average_document_length,
            "vocabulary built"
        );
        Ok((vocabulary, statistics))
    }

    /// Phase 2: cuts the token stream into sorted block files under the memory budget.
    ///
    /// Every block path is pushed to `blocks` before the file is created.
    fn build_blocks(
        &self,
        archive: &Path,
        vocabulary: &Vocabulary,
        paths: &IndexPaths,
        blocks: &mut Vec<PathBuf>,
    ) -> Result<DocumentTable> {
        let mut stream = self.stream(archive)?;
        let mut budget = BlockBudget::new(self.config.block_budget_bytes, &*self.cost);
        let mut matrix = DocumentTermMatrix::<Frequencies>::new();
        let mut documents = DocumentTable::new();

        while let Some(token) = stream.next()? {
            let entry = vocabulary
                .get(&token.term)
                .ok_or_else(|| IndexError::UnknownTerm(token.term.clone()))?;
            matrix.add_doc(token.doc_id()).add(entry.term_id);
            documents.insert(Rc::clone(&token.doc));
            if budget.charge(&token) {
                write_block(&mut matrix, paths, blocks, budget.used())?;
                budget.reset();
            }
        }
        if !matrix.is_empty() {
            write_block(&mut matrix, paths, blocks, budget.used())?;
        }
        info!(blocks = blocks.len(), documents = documents.len(), "blocks written");
        Ok(documents)
    }

    /// Phase 3: merges the blocks and writes both matrices.
    fn merge_blocks(
        &self,
        vocabulary: &Vocabulary,
        documents: &DocumentTable,
        paths: &IndexPaths,
        blocks: &[PathBuf],
    ) -> Result<MergeOutcome> {
        let readers = blocks
            .iter()
            .map(BlockMatrixReader::<File>::open)
            .collect::<Result<Vec<_>>>()?;
        let mut merger = MatrixMerger::new(readers);
        info!(blocks = blocks.len(), "merging blocks");

        let thresholds = self.config.thresholds();
        let mut outputs = MatrixOutputs {
            tf: ArffMatrixWriter::create(paths.tf_matrix())?,
            tfidf: ArffMatrixWriter::create(paths.tfidf_matrix())?,
        };
        outputs.tf.write_header(vocabulary, &self.header_comments(&paths.name, "raw term frequency"))?;
        outputs.tfidf.write_header(
            vocabulary,
            &self.header_comments(&paths.name, "log10(1 + tf) * log10(N / df)"),
        )?;

        let mut buffer = DocumentTermMatrix::<Frequencies>::new();
        let mut pending = 0usize;
        let mut outcome = MergeOutcome {
            postings_written: 0,
            thresholded: 0,
        };
        while let Some((doc_id, row)) = merger.next_row()? {
            pending += row.len();
            *buffer.add_doc(doc_id) = row;
            if pending >= self.config.merge_flush_postings {
                flush(&mut buffer, vocabulary, documents, &mut outputs, thresholds, &mut outcome)?;
                pending = 0;
            }
        }
        flush(&mut buffer, vocabulary, documents, &mut outputs, thresholds, &mut outcome)?;
        outputs.tf.close()?;
        outputs.tfidf.close()?;

        info!(
            entries = merger.entries_read(),
            postings = outcome.postings_written,
            thresholded = outcome.thresholded,
            "merge complete"
        );
        Ok(outcome)
    }

    fn header_comments(&self, name: &str, weighting: &str) -> Vec<String> {
        let thresholds = self.config.thresholds();
        vec![
            format!("index {name}"),
            format!("weights: {weighting}"),
            format!("stemming: {}", self.config.use_stemming),
            format!("tf thresholds: low={} high={}", thresholds.low, thresholds.high),
        ]
    }

    /// Registers the terms of the selected entries without counting them, e.g. to
    /// make query documents resolvable against an existing index.
    ///
    /// Only entries named in `entries` are read. Ids of existing terms do not change.
    pub fn inject_terms<P: AsRef<Path>>(
        &self,
        archive: P,
        entries: impl IntoIterator<Item = String>,
        vocabulary: Vocabulary,
    ) -> Result<Vocabulary> {
        let options = TokenStreamOptions {
            include_entries: Some(entries.into_iter().collect()),
            ..TokenStreamOptions::from(&self.config)
        };
        let total_documents = vocabulary.total_documents();
        let before = vocabulary.len();
        let mut builder = VocabularyBuilder::from(vocabulary);
        let mut stream = TokenStream::open(archive, options, DocIdSequence::new())?;
        while let Some(token) = stream.next()? {
            builder.add_silent(&token.term);
        }
        let vocabulary = builder.finalize(total_documents);
        info!(added = vocabulary.len() - before, "injected terms");
        Ok(vocabulary)
    }
}

fn write_block(
    matrix: &mut DocumentTermMatrix<Frequencies>,
    paths: &IndexPaths,
    blocks: &mut Vec<PathBuf>,
    used: u64,
) -> Result<()> {
    matrix.sort_term_listings_by_id();
    let path = paths.block(blocks.len());
    blocks.push(path.clone());
    let mut writer = BlockMatrixWriter::create(&path)?;
    writer.write_matrix(matrix)?;
    let postings = writer.postings_written();
    writer.finish()?;
    info!(
        block = blocks.len() - 1,
        documents = matrix.number_of_docs(),
        postings,
        budget_used = used,
        "block written"
    );
    matrix.clear();
    Ok(())
}

/// Thresholds, writes the raw matrix, weights it, writes the weighted matrix, and empties `buffer`.
fn flush(
    buffer: &mut DocumentTermMatrix<Frequencies>,
    vocabulary: &Vocabulary,
    documents: &DocumentTable,
    outputs: &mut MatrixOutputs,
    thresholds: TfThresholds,
    outcome: &mut MergeOutcome,
) -> Result<()> {
    if buffer.is_empty() {
        return Ok(());
    }
    if thresholds.is_active() {
        outcome.thresholded += buffer.apply_tf_thresholds(thresholds) as u64;
    }
    outcome.postings_written += buffer.posting_count() as u64;
    outputs.tf.write_matrix(buffer, documents)?;
    let weights = std::mem::take(buffer).calculate_idfs(vocabulary);
    outputs.tfidf.write_matrix(&weights, documents)?;
    debug!(documents = weights.number_of_docs(), "flushed merge buffer");
    Ok(())
}

fn remove_blocks(blocks: &[PathBuf]) {
    for block in blocks {
        if let Err(e) = fs::remove_file(block) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %block.display(), error = %e, "could not remove block file");
            }
        }
    }
}
