//! K-way merge of sorted block files into whole document rows.
//!
//! Sources are ordered by their current `(docID, termID)` with the source's
//! sequence number as tie-break. All sources positioned on the smallest
//! document form the active batch; postings are drained from the batch in
//! `(termID, seq)` order until every active source has moved past the
//! document, at which point they re-enter the heap under their original
//! sequence number.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::io::Read;

use crate::block::{BlockEntry, BlockMatrixReader};
use crate::error::Result;
use crate::matrix::{DocumentTermList, Frequencies};
use crate::{DocId, TermId};

/// Forward-only stream of block entries sorted by `(doc_id, term_id)`.
pub trait MergeSource {
    /// Current entry without advancing. `None` once exhausted.
    fn peek(&self) -> Option<&BlockEntry>;

    /// Consumes the current entry.
    fn advance(&mut self) -> Result<Option<BlockEntry>>;
}

impl<R: Read> MergeSource for BlockMatrixReader<R> {
    #[inline]
    fn peek(&self) -> Option<&BlockEntry> {
        self.current()
    }

    fn advance(&mut self) -> Result<Option<BlockEntry>> {
        self.next()
    }
}

/// In-memory source, handy for feeding the merger without files.
#[derive(Debug, Default, Clone)]
pub struct VecSource {
    entries: VecDeque<BlockEntry>,
}

impl VecSource {
    pub fn new(entries: impl IntoIterator<Item = BlockEntry>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }
}

impl MergeSource for VecSource {
    fn peek(&self) -> Option<&BlockEntry> {
        self.entries.front()
    }

    fn advance(&mut self) -> Result<Option<BlockEntry>> {
        Ok(self.entries.pop_front())
    }
}

type HeapKey = Reverse<(DocId, TermId, usize)>;

/// Merges any number of sorted sources into complete per-document rows.
pub struct MatrixMerger<S: MergeSource> {
    /// Indexed by sequence number; `None` once a source is exhausted.
    sources: Vec<Option<S>>,
    heap: BinaryHeap<HeapKey>,
    active: Vec<usize>,
    entries_read: u64,
}

impl<S: MergeSource> MatrixMerger<S> {
    pub fn new(sources: Vec<S>) -> Self {
        let mut heap = BinaryHeap::with_capacity(sources.len());
        let sources: Vec<Option<S>> = sources
            .into_iter()
            .enumerate()
            .map(|(seq, source)| {
                let head = source.peek().map(|e| (e.doc_id, e.term_id));
                match head {
                    Some((doc_id, term_id)) => {
                        heap.push(Reverse((doc_id, term_id, seq)));
                        Some(source)
                    }
                    None => None,
                }
            })
            .collect();
        Self {
            sources,
            heap,
            active: Vec::new(),
            entries_read: 0,
        }
    }

    /// Number of sources that still have entries.
    pub fn live_sources(&self) -> usize {
        self.sources.iter().filter(|s| s.is_some()).count()
    }

    /// Block entries consumed so far.
    pub fn entries_read(&self) -> u64 {
        self.entries_read
    }

    fn head(&self, seq: usize) -> Option<&BlockEntry> {
        self.sources[seq].as_ref().and_then(|s| s.peek())
    }

    /// Next document with all of its postings combined, in ascending docID order.
    ///
    /// Postings for the same term coming from different sources are summed.
    pub fn next_row(&mut self) -> Result<Option<(DocId, DocumentTermList<Frequencies>)>> {
        let Some(Reverse((doc_id, _, _))) = self.heap.peek().copied() else {
            return Ok(None);
        };

        self.active.clear();
        while let Some(&Reverse((d, _, seq))) = self.heap.peek() {
            if d != doc_id {
                break;
            }
            self.heap.pop();
            self.active.push(seq);
        }

        let mut row = DocumentTermList::new();
        while !self.active.is_empty() {
            let (slot, seq) = self.smallest_active();
            let source = match self.sources[seq].as_mut() {
                Some(source) => source,
                None => {
                    self.active.swap_remove(slot);
                    continue;
                }
            };
            if let Some(entry) = source.advance()? {
                debug_assert_eq!(entry.doc_id, doc_id);
                row.add_value(entry.term_id, entry.value);
                self.entries_read += 1;
            }

            match source.peek().map(|e| (e.doc_id, e.term_id)) {
                Some((next_doc, _)) if next_doc == doc_id => {}
                Some((next_doc, next_term)) => {
                    debug_assert!(next_doc > doc_id, "source {seq} is not sorted by document");
                    self.heap.push(Reverse((next_doc, next_term, seq)));
                    self.active.swap_remove(slot);
                }
                None => {
                    self.sources[seq] = None;
                    self.active.swap_remove(slot);
                }
            }
        }
        Ok(Some((doc_id, row)))
    }

    /// Position in `active` and sequence number of the source with the smallest `(termID, seq)`.
    fn smallest_active(&self) -> (usize, usize) {
        let mut best = (0, self.active[0]);
        let mut best_key = self.key_of(best.1);
        for (slot, &seq) in self.active.iter().enumerate().skip(1) {
            let key = self.key_of(seq);
            if key < best_key {
                best = (slot, seq);
                best_key = key;
            }
        }
        best
    }

    fn key_of(&self, seq: usize) -> (TermId, usize) {
        (self.head(seq).map_or(TermId::MAX, |e| e.term_id), seq)
    }
}
