use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{IndexError, Result};
use crate::Token;

/// Memory set aside for one block, in cost-model units (10 MiB by default).
pub const DEFAULT_BLOCK_BUDGET: u64 = 10 * 1024 * 1024;
/// Postings buffered during the merge before the final matrices are written.
pub const DEFAULT_MERGE_FLUSH_POSTINGS: usize = 10 * 1024;
/// Estimated cost of a single posting held in a block matrix.
pub const DEFAULT_POSTING_COST: u64 = 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub use_stemming: bool,
    /// Postings with tf <= low are dropped from the final matrices.
    pub low_tf_threshold: u32,
    /// Postings with tf >= high are dropped from the final matrices.
    pub high_tf_threshold: u32,
    pub block_budget_bytes: u64,
    pub merge_flush_postings: usize,
    pub output_root: PathBuf,
    /// Skip everything up to the first term containing "line" in every document.
    pub skip_metadata: bool,
    pub keep_block_files: bool,
    /// Only index archive entries with these exact names.
    pub include_entries: Option<HashSet<String>>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            use_stemming: false,
            low_tf_threshold: 0,
            high_tf_threshold: u32::MAX,
            block_budget_bytes: DEFAULT_BLOCK_BUDGET,
            merge_flush_postings: DEFAULT_MERGE_FLUSH_POSTINGS,
            output_root: PathBuf::from("output"),
            skip_metadata: false,
            keep_block_files: false,
            include_entries: None,
        }
    }
}

impl IndexConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: IndexConfig = serde_json::from_str(&text)?;
        Ok(config)
    }

    /// Rejects configurations that cannot produce a meaningful index.
    pub fn validate(&self) -> Result<()> {
        if self.high_tf_threshold < self.low_tf_threshold {
            return Err(IndexError::invalid_config(format!(
                "high tf threshold ({}) must not be below low tf threshold ({})",
                self.high_tf_threshold, self.low_tf_threshold
            )));
        }
        if self.block_budget_bytes == 0 {
            return Err(IndexError::invalid_config("block budget must be positive"));
        }
        if self.merge_flush_postings == 0 {
            return Err(IndexError::invalid_config(
                "merge flush size must be at least one posting",
            ));
        }
        Ok(())
    }

    pub fn thresholds(&self) -> TfThresholds {
        TfThresholds {
            low: self.low_tf_threshold,
            high: self.high_tf_threshold,
        }
    }
}

/// Bounds on raw term frequency, both exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TfThresholds {
    pub low: u32,
    pub high: u32,
}

impl TfThresholds {
    /// False for the default bounds, which can never remove a posting.
    pub fn is_active(&self) -> bool {
        self.low > 0 || self.high < u32::MAX
    }
}

/// Estimates the memory a posting occupies while its block is in memory.
pub trait CostModel {
    fn posting_cost(&self, token: &Token) -> u64;
}

/// Every posting costs the same.
#[derive(Debug, Clone, Copy)]
pub struct UnitCost(pub u64);

impl Default for UnitCost {
    fn default() -> Self {
        UnitCost(DEFAULT_POSTING_COST)
    }
}

impl CostModel for UnitCost {
    fn posting_cost(&self, _token: &Token) -> u64 {
        self.0
    }
}

impl<F> CostModel for F
where
    F: Fn(&Token) -> u64,
{
    fn posting_cost(&self, token: &Token) -> u64 {
        self(token)
    }
}

/// Running memory counter for the block under construction.
pub struct BlockBudget<'a> {
    limit: u64,
    used: u64,
    cost: &'a dyn CostModel,
}

impl<'a> BlockBudget<'a> {
    pub fn new(limit: u64, cost: &'a dyn CostModel) -> Self {
        Self {
            limit,
            used: 0,
            cost,
        }
    }

    /// Charges one posting and reports whether the block is now full.
    pub fn charge(&mut self, token: &Token) -> bool {
        self.used = self.used.saturating_add(self.cost.posting_cost(token));
        self.is_exhausted()
    }

    pub fn is_exhausted(&self) -> bool {
        self.used >= self.limit
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    pub fn reset(&mut self) {
        self.used = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Document;
    use std::rc::Rc;

    fn token(term: &str) -> Token {
        Token {
            term: term.to_string(),
            doc: Rc::new(Document {
                id: 1,
                category: "a".into(),
                name: "1".into(),
            }),
        }
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let config = IndexConfig {
            low_tf_threshold: 5,
            high_tf_threshold: 2,
            ..IndexConfig::default()
        };
        assert!(matches!(config.validate(), Err(IndexError::InvalidConfig(_))));
        assert!(IndexConfig::default().validate().is_ok());
    }

    #[test]
    fn equal_thresholds_are_allowed() {
        let config = IndexConfig {
            low_tf_threshold: 3,
            high_tf_threshold: 3,
            ..IndexConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn default_thresholds_are_inactive() {
        assert!(!IndexConfig::default().thresholds().is_active());
        assert!(TfThresholds { low: 1, high: u32::MAX }.is_active());
    }

    #[test]
    fn budget_counts_unit_cost() {
        let cost = UnitCost(16);
        let mut budget = BlockBudget::new(48, &cost);
        assert!(!budget.charge(&token("apple")));
        assert!(!budget.charge(&token("apple")));
        assert!(budget.charge(&token("apple")));
        budget.reset();
        assert_eq!(budget.used(), 0);
    }

    #[test]
    fn budget_accepts_closure_cost() {
        let by_length = |t: &Token| t.term.len() as u64;
        let mut budget = BlockBudget::new(10, &by_length);
        assert!(!budget.charge(&token("apple")));
        assert!(budget.charge(&token("berry")));
    }

    #[test]
    fn config_reads_partial_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"use_stemming": true, "low_tf_threshold": 1}"#).unwrap();
        let config = IndexConfig::from_json_file(&path).unwrap();
        assert!(config.use_stemming);
        assert_eq!(config.low_tf_threshold, 1);
        assert_eq!(config.high_tf_threshold, u32::MAX);
    }
}
