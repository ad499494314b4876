//! Collection statistics and their `key=value` text form.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{debug, warn};

use crate::error::Result;

/// Value of a field that was never set or could not be parsed.
pub const UNSET: i64 = -1;

const DOCUMENTS: &str = "numberOfDocuments";
const TOKENS: &str = "numberOfTokens";
const UNIQUE_TERMS: &str = "numberOfUniqueTerms";
const AVERAGE_LENGTH: &str = "averageDocumentLength";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionStatistics {
    pub number_of_documents: i64,
    pub number_of_tokens: i64,
    pub number_of_unique_terms: i64,
    pub average_document_length: f64,
}

impl Default for CollectionStatistics {
    fn default() -> Self {
        Self {
            number_of_documents: UNSET,
            number_of_tokens: UNSET,
            number_of_unique_terms: UNSET,
            average_document_length: UNSET as f64,
        }
    }
}

impl CollectionStatistics {
    pub fn new(documents: u64, tokens: u64, unique_terms: u64) -> Self {
        let mut stats = Self {
            number_of_documents: documents as i64,
            number_of_tokens: tokens as i64,
            number_of_unique_terms: unique_terms as i64,
            average_document_length: 0.0,
        };
        stats.recompute_average();
        stats
    }

    /// Tokens per document; 0 for an empty collection.
    pub fn recompute_average(&mut self) {
        self.average_document_length = if self.number_of_documents > 0 {
            self.number_of_tokens as f64 / self.number_of_documents as f64
        } else {
            0.0
        };
    }

    /// Removes postings dropped by frequency thresholds from the token count.
    pub fn discount_tokens(&mut self, removed: u64) {
        self.number_of_tokens = (self.number_of_tokens - removed as i64).max(0);
        self.recompute_average();
    }

    pub fn write_to<W: Write>(&self, out: &mut W, comment: Option<&str>) -> Result<()> {
        if let Some(comment) = comment {
            for line in comment.lines() {
                writeln!(out, "% {line}")?;
            }
        }
        writeln!(out, "{DOCUMENTS}={}", self.number_of_documents)?;
        writeln!(out, "{TOKENS}={}", self.number_of_tokens)?;
        writeln!(out, "{UNIQUE_TERMS}={}", self.number_of_unique_terms)?;
        writeln!(out, "{AVERAGE_LENGTH}={}", self.average_document_length)?;
        Ok(())
    }

    pub fn save<P: AsRef<Path>>(&self, path: P, comment: Option<&str>) -> Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        self.write_to(&mut out, comment)?;
        out.flush()?;
        Ok(())
    }

    /// Parses the text form. Bad values are logged and left at [`UNSET`]; unknown keys are skipped.
    pub fn read_from<R: BufRead>(input: R) -> Result<Self> {
        let mut stats = Self::default();
        for line in input.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('%') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                warn!(line, "statistics line without '='");
                continue;
            };
            let (key, value) = (key.trim(), value.trim());
            match key {
                DOCUMENTS => stats.number_of_documents = parse_count(key, value),
                TOKENS => stats.number_of_tokens = parse_count(key, value),
                UNIQUE_TERMS => stats.number_of_unique_terms = parse_count(key, value),
                AVERAGE_LENGTH => {
                    stats.average_document_length = value.parse().unwrap_or_else(|e| {
                        warn!(key, value, error = %e, "unparsable statistics value");
                        UNSET as f64
                    })
                }
                _ => debug!(key, "ignoring unknown statistics key"),
            }
        }
        Ok(stats)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::read_from(BufReader::new(File::open(path)?))
    }
}

fn parse_count(key: &str, value: &str) -> i64 {
    value.parse().unwrap_or_else(|e| {
        warn!(key, value, error = %e, "unparsable statistics value");
        UNSET
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_fields() {
        let stats = CollectionStatistics::new(3, 7, 3);
        let mut buf = Vec::new();
        stats.write_to(&mut buf, Some("test collection")).unwrap();
        let back = CollectionStatistics::read_from(buf.as_slice()).unwrap();
        assert_eq!(back, stats);
        assert!((back.average_document_length - 7.0 / 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn text_form_is_key_value() {
        let mut buf = Vec::new();
        CollectionStatistics::new(2, 5, 4).write_to(&mut buf, None).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "numberOfDocuments=2\nnumberOfTokens=5\nnumberOfUniqueTerms=4\naverageDocumentLength=2.5\n"
        );
    }

    #[test]
    fn bad_values_fall_back_to_sentinel() {
        let text = "% header\nnumberOfDocuments=abc\nnumberOfTokens=12\nsomethingElse=1\naverageDocumentLength=x\n";
        let stats = CollectionStatistics::read_from(text.as_bytes()).unwrap();
        assert_eq!(stats.number_of_documents, UNSET);
        assert_eq!(stats.number_of_tokens, 12);
        assert_eq!(stats.number_of_unique_terms, UNSET);
        assert_eq!(stats.average_document_length, -1.0);
    }

    #[test]
    fn discounting_tokens_updates_average() {
        let mut stats = CollectionStatistics::new(4, 20, 9);
        stats.discount_tokens(8);
        assert_eq!(stats.number_of_tokens, 12);
        assert_eq!(stats.average_document_length, 3.0);
    }

    #[test]
    fn save_and_load_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("idx.stat");
        let stats = CollectionStatistics::new(10, 100, 50);
        stats.save(&path, None).unwrap();
        assert_eq!(CollectionStatistics::load(&path).unwrap(), stats);
    }
}
