//! Global term dictionary.
//!
//! [`VocabularyBuilder`] only grows; [`VocabularyBuilder::finalize`] freezes it
//! into a [`Vocabulary`], the only type that answers id lookups.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{DocId, TermId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyEntry {
    pub term_id: TermId,
    /// Number of distinct documents containing the term.
    pub doc_frequency: u32,
    /// Number of occurrences over the whole collection.
    pub collection_frequency: u64,
    /// Guards `doc_frequency` against counting a document twice.
    last_doc_id: Option<DocId>,
}

impl VocabularyEntry {
    fn first_seen(term_id: TermId, doc_id: DocId) -> Self {
        Self {
            term_id,
            doc_frequency: 1,
            collection_frequency: 1,
            last_doc_id: Some(doc_id),
        }
    }

    fn silent(term_id: TermId) -> Self {
        Self {
            term_id,
            doc_frequency: 0,
            collection_frequency: 0,
            last_doc_id: None,
        }
    }

    fn record(&mut self, doc_id: DocId) {
        self.collection_frequency += 1;
        if self.last_doc_id != Some(doc_id) {
            self.doc_frequency += 1;
            self.last_doc_id = Some(doc_id);
        }
    }
}

/// Insert-only term dictionary. Term ids are dense and follow first occurrence.
#[derive(Debug, Default)]
pub struct VocabularyBuilder {
    ids: HashMap<String, TermId>,
    terms: Vec<String>,
    entries: Vec<VocabularyEntry>,
}

impl VocabularyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ids: HashMap::with_capacity(capacity),
            terms: Vec::with_capacity(capacity),
            entries: Vec::with_capacity(capacity),
        }
    }

    fn insert(&mut self, term: &str, entry: impl FnOnce(TermId) -> VocabularyEntry) -> TermId {
        let term_id = self.terms.len() as TermId;
        self.ids.insert(term.to_string(), term_id);
        self.terms.push(term.to_string());
        self.entries.push(entry(term_id));
        term_id
    }

    /// Counts one occurrence of `term` in document `doc_id`.
    pub fn add(&mut self, term: &str, doc_id: DocId) -> &VocabularyEntry {
        let term_id = match self.ids.get(term) {
            Some(&id) => {
                self.entries[id as usize].record(doc_id);
                id
            }
            None => self.insert(term, |id| VocabularyEntry::first_seen(id, doc_id)),
        };
        &self.entries[term_id as usize]
    }

    /// Registers `term` without touching any frequency counter.
    pub fn add_silent(&mut self, term: &str) -> &VocabularyEntry {
        let term_id = match self.ids.get(term) {
            Some(&id) => id,
            None => self.insert(term, VocabularyEntry::silent),
        };
        &self.entries[term_id as usize]
    }

    pub fn get(&self, term: &str) -> Option<&VocabularyEntry> {
        self.ids.get(term).map(|&id| &self.entries[id as usize])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Freezes the current term order.
    pub fn finalize(self, total_documents: u32) -> Vocabulary {
        Vocabulary {
            ids: self.ids,
            terms: self.terms,
            entries: self.entries,
            total_documents,
        }
    }
}

impl From<Vocabulary> for VocabularyBuilder {
    /// Reopens a frozen vocabulary, e.g. to inject query terms with `add_silent`.
    fn from(vocabulary: Vocabulary) -> Self {
        Self {
            ids: vocabulary.ids,
            terms: vocabulary.terms,
            entries: vocabulary.entries,
        }
    }
}

/// Frozen vocabulary with lookups in both directions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vocabulary {
    ids: HashMap<String, TermId>,
    terms: Vec<String>,
    entries: Vec<VocabularyEntry>,
    total_documents: u32,
}

impl Vocabulary {
    pub fn get(&self, term: &str) -> Option<&VocabularyEntry> {
        self.ids.get(term).map(|&id| &self.entries[id as usize])
    }

    pub fn entry(&self, term_id: TermId) -> Option<&VocabularyEntry> {
        self.entries.get(term_id as usize)
    }

    pub fn term(&self, term_id: TermId) -> Option<&str> {
        self.terms.get(term_id as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Document count recorded at finalize time.
    pub fn total_documents(&self) -> u32 {
        self.total_documents
    }

    /// Terms with their entries, in term id order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &VocabularyEntry)> {
        self.terms.iter().map(String::as_str).zip(self.entries.iter())
    }
}
