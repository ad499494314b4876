//! Sparse document-term rows and matrices.
//!
//! Rows start out holding raw term frequencies ([`Frequencies`]). The idf
//! transform consumes such a row and returns a [`Weights`] row, so it cannot
//! be applied twice and thresholds cannot be applied to weights.

use std::collections::HashMap;
use std::marker::PhantomData;

use crate::config::TfThresholds;
use crate::vocabulary::Vocabulary;
use crate::{DocId, TermId, Weight};

/// Row values are raw term frequencies.
#[derive(Debug, Clone, Copy)]
pub struct Frequencies;

/// Row values are tf-idf weights.
#[derive(Debug, Clone, Copy)]
pub struct Weights;

/// Insertion-ordered termID → value map for one document.
#[derive(Debug, Clone)]
pub struct DocumentTermList<K> {
    entries: Vec<(TermId, Weight)>,
    positions: HashMap<TermId, usize>,
    _kind: PhantomData<K>,
}

impl<K> Default for DocumentTermList<K> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            positions: HashMap::new(),
            _kind: PhantomData,
        }
    }
}

impl<K> DocumentTermList<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, term_id: TermId) -> Option<Weight> {
        self.positions.get(&term_id).map(|&p| self.entries[p].1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TermId, Weight)> + '_ {
        self.entries.iter().copied()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.positions.clear();
    }

    /// Stable reorder by ascending term id.
    pub fn sort_by_id(&mut self) {
        self.entries.sort_by_key(|&(term_id, _)| term_id);
        self.reindex();
    }

    fn reindex(&mut self) {
        self.positions.clear();
        for (p, &(term_id, _)) in self.entries.iter().enumerate() {
            self.positions.insert(term_id, p);
        }
    }
}

impl DocumentTermList<Frequencies> {
    /// One more occurrence of `term_id`.
    pub fn add(&mut self, term_id: TermId) {
        self.add_value(term_id, 1.0);
    }

    /// Adds `value` to the entry for `term_id`, creating it if needed.
    pub fn add_value(&mut self, term_id: TermId, value: Weight) {
        match self.positions.get(&term_id) {
            Some(&p) => self.entries[p].1 += value,
            None => {
                self.positions.insert(term_id, self.entries.len());
                self.entries.push((term_id, value));
            }
        }
    }

    /// Drops entries with tf <= low or tf >= high and returns how many were dropped.
    pub fn apply_tf_thresholds(&mut self, thresholds: TfThresholds) -> usize {
        let (low, high) = (thresholds.low as Weight, thresholds.high as Weight);
        let before = self.entries.len();
        self.entries.retain(|&(_, tf)| tf > low && tf < high);
        let removed = before - self.entries.len();
        if removed > 0 {
            self.reindex();
        }
        removed
    }

    /// Replaces every tf by `log10(1 + floor(tf)) * log10(N / df)`.
    ///
    /// Terms unknown to `vocabulary` or with a document frequency of zero get weight 0.
    pub fn calculate_idfs(self, vocabulary: &Vocabulary) -> DocumentTermList<Weights> {
        let doc_count = vocabulary.total_documents() as f64;
        let entries = self
            .entries
            .into_iter()
            .map(|(term_id, tf)| {
                let weight = match vocabulary.entry(term_id) {
                    Some(entry) if entry.doc_frequency > 0 => {
                        let tf = (tf as f64).floor();
                        (1.0 + tf).log10() * (doc_count / entry.doc_frequency as f64).log10()
                    }
                    _ => 0.0,
                };
                (term_id, weight as Weight)
            })
            .collect();
        DocumentTermList {
            entries,
            positions: self.positions,
            _kind: PhantomData,
        }
    }
}

/// Rows keyed by document id, in insertion order.
#[derive(Debug, Clone)]
pub struct DocumentTermMatrix<K> {
    rows: Vec<(DocId, DocumentTermList<K>)>,
    positions: HashMap<DocId, usize>,
}

impl<K> Default for DocumentTermMatrix<K> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            positions: HashMap::new(),
        }
    }
}

impl<K> DocumentTermMatrix<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Row for `doc_id`, created empty on first use.
    pub fn add_doc(&mut self, doc_id: DocId) -> &mut DocumentTermList<K> {
        let p = match self.positions.get(&doc_id) {
            Some(&p) => p,
            None => {
                self.positions.insert(doc_id, self.rows.len());
                self.rows.push((doc_id, DocumentTermList::new()));
                self.rows.len() - 1
            }
        };
        &mut self.rows[p].1
    }

    pub fn row(&self, doc_id: DocId) -> Option<&DocumentTermList<K>> {
        self.positions.get(&doc_id).map(|&p| &self.rows[p].1)
    }

    pub fn clear(&mut self) {
        self.rows.clear();
        self.positions.clear();
    }

    pub fn sort_term_listings_by_id(&mut self) {
        for (_, row) in self.rows.iter_mut() {
            row.sort_by_id();
        }
    }

    pub fn number_of_docs(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Total number of (document, term) entries.
    pub fn posting_count(&self) -> usize {
        self.rows.iter().map(|(_, row)| row.len()).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DocId, &DocumentTermList<K>)> + '_ {
        self.rows.iter().map(|(doc_id, row)| (*doc_id, row))
    }
}

impl DocumentTermMatrix<Frequencies> {
    pub fn apply_tf_thresholds(&mut self, thresholds: TfThresholds) -> usize {
        self.rows
            .iter_mut()
            .map(|(_, row)| row.apply_tf_thresholds(thresholds))
            .sum()
    }

    pub fn calculate_idfs(self, vocabulary: &Vocabulary) -> DocumentTermMatrix<Weights> {
        DocumentTermMatrix {
            rows: self
                .rows
                .into_iter()
                .map(|(doc_id, row)| (doc_id, row.calculate_idfs(vocabulary)))
                .collect(),
            positions: self.positions,
        }
    }
}
