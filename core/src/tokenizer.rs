use lazy_static::lazy_static;
use ouroboros::self_referencing;
use regex::bytes::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::rc::Rc;
use tracing::{debug, warn};
use zip::read::ZipFile;
use zip::ZipArchive;

use crate::config::IndexConfig;
use crate::error::Result;
use crate::lookahead::{Lookahead, Source};
use crate::{DocId, Document, Token};

/// Bytes pulled from an archive entry per read.
pub const CHUNK_SIZE: usize = 1024;
/// Shorter runs are not terms.
pub const MIN_TERM_CHARS: usize = 4;
/// Bytes that must follow a match before its end is trusted: a `.`/`-` plus one UTF-8 letter.
const LOOKAHEAD_BYTES: usize = 5;
const MIN_CHUNK_SIZE: usize = 8;

lazy_static! {
    // A letter, then letters, digits, '@', or '.'/'-' directly followed by a letter.
    static ref TERM: Regex = Regex::new(r"\p{L}(?:[\p{L}\p{Nd}@]|[.\-]\p{L})*").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
}

/// Lowercased term, stemmed on request.
pub fn normalize_term(lowercase: String, use_stemming: bool) -> String {
    if use_stemming {
        STEMMER.stem(&lowercase).into_owned()
    } else {
        lowercase
    }
}

/// Tokenizes an in-memory text with the same rules as the archive stream.
pub fn tokenize(text: &str, use_stemming: bool) -> Vec<String> {
    let mut scanner = TermScanner::new(CHUNK_SIZE);
    let mut reader = text.as_bytes();
    let mut terms = Vec::new();
    // Reading from a byte slice cannot fail.
    while let Ok(Some(term)) = scanner.next_term(&mut reader) {
        terms.push(normalize_term(term, use_stemming));
    }
    terms
}

/// Sliding byte window over a reader that yields lowercased terms.
///
/// When a term may continue past the end of the window, the unconsumed tail is
/// moved to the front and the next chunk is appended, so long terms are never cut.
pub struct TermScanner {
    buf: Vec<u8>,
    pos: usize,
    chunk_size: usize,
    eof: bool,
}

impl TermScanner {
    pub fn new(chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(MIN_CHUNK_SIZE);
        Self {
            buf: Vec::with_capacity(chunk_size * 2),
            pos: 0,
            chunk_size,
            eof: false,
        }
    }

    /// Forgets the current input; the next call starts on a fresh reader.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.pos = 0;
        self.eof = false;
    }

    pub fn next_term<R: Read + ?Sized>(&mut self, reader: &mut R) -> io::Result<Option<String>> {
        loop {
            let found = TERM.find_at(&self.buf, self.pos).map(|m| (m.start(), m.end()));
            match found {
                Some((start, end)) => {
                    if !self.eof && self.buf.len() - end < LOOKAHEAD_BYTES {
                        self.slide(start);
                        self.fill(reader)?;
                        continue;
                    }
                    self.pos = end;
                    let raw = String::from_utf8_lossy(&self.buf[start..end]);
                    if raw.chars().count() < MIN_TERM_CHARS {
                        continue;
                    }
                    return Ok(Some(raw.to_lowercase()));
                }
                None => {
                    // End of input without a delimiter is fine: the last term ends at the buffer end.
                    if self.eof {
                        return Ok(None);
                    }
                    // The tail may hold the first bytes of a split multi-byte letter.
                    let keep = self.buf.len().saturating_sub(LOOKAHEAD_BYTES).max(self.pos);
                    self.slide(keep);
                    self.fill(reader)?;
                }
            }
        }
    }

    fn slide(&mut self, from: usize) {
        self.buf.drain(..from);
        self.pos = 0;
    }

    fn fill<R: Read + ?Sized>(&mut self, reader: &mut R) -> io::Result<()> {
        let filled = self.buf.len();
        self.buf.resize(filled + self.chunk_size, 0);
        let read = loop {
            match reader.read(&mut self.buf[filled..]) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.buf.truncate(filled);
                    return Err(e);
                }
            }
        };
        self.buf.truncate(filled + read);
        if read == 0 {
            self.eof = true;
        }
        Ok(())
    }
}

/// Hands out document ids. Owned by whoever drives a pass over the corpus.
#[derive(Debug, Clone, Default)]
pub struct DocIdSequence {
    last: DocId,
}

impl DocIdSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> DocId {
        self.last += 1;
        self.last
    }

    /// Id of the most recently opened document, 0 if none.
    pub fn last(&self) -> DocId {
        self.last
    }
}

#[derive(Debug, Clone)]
pub struct TokenStreamOptions {
    pub use_stemming: bool,
    pub skip_metadata: bool,
    pub include_entries: Option<HashSet<String>>,
    pub chunk_size: usize,
}

impl Default for TokenStreamOptions {
    fn default() -> Self {
        Self {
            use_stemming: false,
            skip_metadata: false,
            include_entries: None,
            chunk_size: CHUNK_SIZE,
        }
    }
}

impl From<&IndexConfig> for TokenStreamOptions {
    fn from(config: &IndexConfig) -> Self {
        Self {
            use_stemming: config.use_stemming,
            skip_metadata: config.skip_metadata,
            include_entries: config.include_entries.clone(),
            chunk_size: CHUNK_SIZE,
        }
    }
}

#[self_referencing]
struct OpenEntry {
    archive: ZipArchive<File>,
    #[borrows(mut archive)]
    #[not_covariant]
    reader: ZipFile<'this>,
}

enum ArchiveCursor {
    Idle(ZipArchive<File>),
    Reading(OpenEntry),
    Closed,
}

struct EligibleEntry {
    index: usize,
    name: String,
}

/// Produces tokens entry by entry; one document per non-directory entry.
pub struct ArchiveTokens {
    cursor: ArchiveCursor,
    entries: std::vec::IntoIter<EligibleEntry>,
    scanner: TermScanner,
    current_doc: Option<Rc<Document>>,
    ids: DocIdSequence,
    use_stemming: bool,
    skip_metadata: bool,
}

impl ArchiveTokens {
    pub fn open<P: AsRef<Path>>(path: P, options: TokenStreamOptions, ids: DocIdSequence) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let mut archive = ZipArchive::new(file)?;

        let mut entries = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let entry = archive.by_index_raw(index)?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            if let Some(include) = &options.include_entries {
                if !include.contains(&name) {
                    continue;
                }
            }
            entries.push(EligibleEntry { index, name });
        }
        debug!(path = %path.as_ref().display(), entries = entries.len(), "opened archive");

        Ok(Self {
            cursor: ArchiveCursor::Idle(archive),
            entries: entries.into_iter(),
            scanner: TermScanner::new(options.chunk_size),
            current_doc: None,
            ids,
            use_stemming: options.use_stemming,
            skip_metadata: options.skip_metadata,
        })
    }

    pub fn doc_ids(&self) -> &DocIdSequence {
        &self.ids
    }

    /// Positions the cursor at the start of entry `index`, closing whatever was open.
    fn open_entry(&mut self, index: usize) -> Result<()> {
        let archive = match std::mem::replace(&mut self.cursor, ArchiveCursor::Closed) {
            ArchiveCursor::Idle(archive) => archive,
            ArchiveCursor::Reading(entry) => entry.into_heads().archive,
            ArchiveCursor::Closed => return Ok(()),
        };
        match OpenEntry::try_new_or_recover(archive, |archive| archive.by_index(index)) {
            Ok(entry) => {
                self.cursor = ArchiveCursor::Reading(entry);
                self.scanner.reset();
                Ok(())
            }
            Err((e, heads)) => {
                self.cursor = ArchiveCursor::Idle(heads.archive);
                Err(e.into())
            }
        }
    }

    fn read_term(&mut self) -> Result<Option<String>> {
        let Self { cursor, scanner, .. } = self;
        match cursor {
            ArchiveCursor::Reading(entry) => Ok(entry.with_reader_mut(|reader| scanner.next_term(reader))?),
            _ => Ok(None),
        }
    }

    /// Opens the next eligible entry. False once every entry has been consumed.
    fn advance_entry(&mut self) -> Result<bool> {
        let Some(entry) = self.entries.next() else {
            self.cursor = ArchiveCursor::Closed;
            self.current_doc = None;
            return Ok(false);
        };
        // Entries without terms still consume an id.
        let doc = Document::from_entry_path(self.ids.allocate(), &entry.name)?;
        self.open_entry(entry.index)?;
        debug!(doc_id = doc.id, entry = %entry.name, "opened document");
        self.current_doc = Some(Rc::new(doc));
        if self.skip_metadata {
            self.skip_metadata_header(&entry)?;
        }
        Ok(true)
    }

    /// Best effort: drops everything up to and including the first term containing "line".
    /// Without such a term the entry is rewound and indexed from the start.
    fn skip_metadata_header(&mut self, entry: &EligibleEntry) -> Result<()> {
        while let Some(term) = self.read_term()? {
            if term.contains("line") {
                return Ok(());
            }
        }
        warn!(entry = %entry.name, "no metadata delimiter found, indexing entry from the start");
        self.open_entry(entry.index)
    }
}

impl Source for ArchiveTokens {
    type Item = Token;

    fn produce(&mut self) -> Result<Option<Token>> {
        loop {
            let doc = match &self.current_doc {
                Some(doc) => Rc::clone(doc),
                None => {
                    if !self.advance_entry()? {
                        return Ok(None);
                    }
                    continue;
                }
            };
            match self.read_term()? {
                Some(term) => {
                    return Ok(Some(Token {
                        term: normalize_term(term, self.use_stemming),
                        doc,
                    }))
                }
                None => self.current_doc = None,
            }
        }
    }
}

/// Lazy, forward-only token sequence over a zip archive.
///
/// Not restartable: a second pass opens a new stream.
pub struct TokenStream {
    tokens: Lookahead<ArchiveTokens>,
}

impl TokenStream {
    /// Fails if the archive cannot be opened or its directory cannot be read.
    pub fn open<P: AsRef<Path>>(path: P, options: TokenStreamOptions, ids: DocIdSequence) -> Result<Self> {
        let source = ArchiveTokens::open(path, options, ids)?;
        Ok(Self {
            tokens: Lookahead::new(source)?,
        })
    }

    pub fn current(&self) -> Option<&Token> {
        self.tokens.current()
    }

    pub fn has_next(&self) -> bool {
        self.tokens.has_next()
    }

    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<Option<Token>> {
        self.tokens.next()
    }

    /// True if `current` is the final token of its document.
    pub fn is_last_of_document(&self) -> bool {
        match (self.tokens.current(), self.tokens.peek_second()) {
            (Some(current), Some(second)) => current.doc_id() != second.doc_id(),
            (Some(_), None) => true,
            _ => false,
        }
    }

    /// Id sequence state; the next pass should start from a fresh sequence.
    pub fn doc_ids(&self) -> &DocIdSequence {
        self.tokens.source().doc_ids()
    }

    pub fn into_doc_ids(self) -> DocIdSequence {
        self.tokens.into_source().ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_all(text: &str, chunk: usize) -> Vec<String> {
        let mut scanner = TermScanner::new(chunk);
        let mut reader = text.as_bytes();
        let mut out = Vec::new();
        while let Some(t) = scanner.next_term(&mut reader).unwrap() {
            out.push(t);
        }
        out
    }

    #[test]
    fn basic_tokenize() {
        let t = tokenize("Running, runner's run!", true);
        assert!(t.iter().any(|w| w == "run"));
    }

    #[test]
    fn short_runs_are_dropped() {
        assert_eq!(scan_all("the cat sat on four mats", 64), vec!["four", "mats"]);
    }

    #[test]
    fn terms_start_with_a_letter() {
        assert_eq!(scan_all("1234abcd 99 x1y2z3", 64), vec!["abcd", "x1y2z3"]);
    }

    #[test]
    fn dots_and_dashes_need_a_following_letter() {
        assert_eq!(
            scan_all("john.doe@mail.com well-known ends.", 64),
            vec!["john.doe@mail.com", "well-known", "ends"]
        );
        assert_eq!(scan_all("abc-1 test.9", 64), vec!["test"]);
    }

    #[test]
    fn terms_are_lowercased() {
        assert_eq!(scan_all("HeLLo WORLD", 64), vec!["hello", "world"]);
    }

    #[test]
    fn long_terms_survive_chunk_boundaries() {
        let long = "a".repeat(100) + "b";
        let text = format!("start {long} end.x finish");
        assert_eq!(scan_all(&text, 8), vec!["start".to_string(), long, "end.x".to_string(), "finish".to_string()]);
    }

    #[test]
    fn term_at_end_of_input_is_complete() {
        assert_eq!(scan_all("alpha omega", 8), vec!["alpha", "omega"]);
    }

    #[test]
    fn split_multibyte_letters_are_rejoined() {
        // 'é' is two bytes; tiny chunks force it across a boundary.
        assert_eq!(scan_all("xx café crème", 8), vec!["café", "crème"]);
    }

    #[test]
    fn stemming_is_optional() {
        assert_eq!(tokenize("connections", false), vec!["connections"]);
        assert_eq!(tokenize("connections", true), vec!["connect"]);
    }

    #[test]
    fn doc_ids_are_sequential() {
        let mut ids = DocIdSequence::new();
        assert_eq!(ids.last(), 0);
        assert_eq!(ids.allocate(), 1);
        assert_eq!(ids.allocate(), 2);
        assert_eq!(ids.last(), 2);
    }
}
