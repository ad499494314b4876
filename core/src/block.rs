//! On-disk block format.
//!
//! Two line-oriented layouts share one scanner:
//!
//! ```text
//! matrix:      docID<TAB><termID:weight><termID:weight>...\n
//! dictionary:  term<TAB><docID:tf><docID:tf>...\n
//! ```
//!
//! Writers stage text in a fixed-size buffer and flush before it could
//! overflow. Readers parse incrementally over a sliding window and hand out
//! one flat posting per call, so a block is never materialized in memory.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{IndexError, Result};
use crate::lookahead::{Lookahead, Source};
use crate::matrix::DocumentTermMatrix;
use crate::{DocId, TermId, Weight};

/// Size of the staging buffer used by writers and of each chunk read by readers.
pub const BUFFER_SIZE: usize = 8 * 1024;
/// Upper bound on the text of one `<id:value>` item or one numeric key.
const MAX_ENTRY_WIDTH: usize = 64;

const KEY_END: u8 = b'\t';
const ITEM_START: u8 = b'<';
const ITEM_SEP: u8 = b':';
const ITEM_END: u8 = b'>';
const RECORD_END: u8 = b'\n';

/// One posting of a matrix block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockEntry {
    pub doc_id: DocId,
    pub term_id: TermId,
    pub value: Weight,
}

/// One posting of a dictionary block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostingEntry {
    pub term: String,
    pub doc_id: DocId,
    pub tf: u32,
}

struct StagingBuffer<W: Write> {
    out: W,
    buf: String,
    capacity: usize,
}

impl<W: Write> StagingBuffer<W> {
    fn new(out: W, capacity: usize) -> Self {
        let capacity = capacity.max(MAX_ENTRY_WIDTH * 2);
        Self {
            out,
            buf: String::with_capacity(capacity),
            capacity,
        }
    }

    /// Flushes if fewer than `width` bytes of headroom remain.
    fn reserve(&mut self, width: usize) -> io::Result<()> {
        if self.buf.len() + width > self.capacity {
            self.flush_buf()?;
        }
        Ok(())
    }

    fn flush_buf(&mut self) -> io::Result<()> {
        if !self.buf.is_empty() {
            self.out.write_all(self.buf.as_bytes())?;
            self.buf.clear();
        }
        Ok(())
    }

    /// Text of unbounded length; bypasses the buffer when it would not fit.
    fn push_str(&mut self, text: &str) -> io::Result<()> {
        self.reserve(text.len())?;
        if text.len() > self.capacity {
            self.out.write_all(text.as_bytes())
        } else {
            self.buf.push_str(text);
            Ok(())
        }
    }

    fn push_item(&mut self, key: impl std::fmt::Display, value: impl std::fmt::Display) -> io::Result<()> {
        self.reserve(MAX_ENTRY_WIDTH)?;
        // Writing into a String cannot fail.
        let _ = write!(self.buf, "<{key}:{value}>");
        Ok(())
    }

    fn push_key(&mut self, key: impl std::fmt::Display) -> io::Result<()> {
        self.reserve(MAX_ENTRY_WIDTH)?;
        let _ = write!(self.buf, "{key}\t");
        Ok(())
    }

    fn end_record(&mut self) -> io::Result<()> {
        self.reserve(1)?;
        self.buf.push('\n');
        Ok(())
    }

    fn finish(mut self) -> io::Result<W> {
        self.flush_buf()?;
        self.out.flush()?;
        Ok(self.out)
    }
}

/// Streams document rows as matrix lines.
pub struct BlockMatrixWriter<W: Write> {
    staging: StagingBuffer<W>,
    postings: usize,
}

impl BlockMatrixWriter<File> {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(File::create(path)?))
    }
}

impl<W: Write> BlockMatrixWriter<W> {
    pub fn new(out: W) -> Self {
        Self::with_buffer_size(out, BUFFER_SIZE)
    }

    pub fn with_buffer_size(out: W, size: usize) -> Self {
        Self {
            staging: StagingBuffer::new(out, size),
            postings: 0,
        }
    }

    /// Writes one line. Empty rows are skipped.
    pub fn write_row(&mut self, doc_id: DocId, row: impl IntoIterator<Item = (TermId, Weight)>) -> Result<()> {
        let mut row = row.into_iter().peekable();
        if row.peek().is_none() {
            return Ok(());
        }
        self.staging.push_key(doc_id)?;
        for (term_id, value) in row {
            self.staging.push_item(term_id, value)?;
            self.postings += 1;
        }
        self.staging.end_record()?;
        Ok(())
    }

    /// Writes every row in the matrix's row order.
    pub fn write_matrix<K>(&mut self, matrix: &DocumentTermMatrix<K>) -> Result<()> {
        for (doc_id, row) in matrix.iter() {
            self.write_row(doc_id, row.iter())?;
        }
        Ok(())
    }

    pub fn postings_written(&self) -> usize {
        self.postings
    }

    /// Flushes the staging buffer and hands back the sink.
    pub fn finish(self) -> Result<W> {
        Ok(self.staging.finish()?)
    }
}

/// Streams per-term posting lists as dictionary lines.
pub struct BlockDictionaryWriter<W: Write> {
    staging: StagingBuffer<W>,
}

impl BlockDictionaryWriter<File> {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(File::create(path)?))
    }
}

impl<W: Write> BlockDictionaryWriter<W> {
    pub fn new(out: W) -> Self {
        Self::with_buffer_size(out, BUFFER_SIZE)
    }

    pub fn with_buffer_size(out: W, size: usize) -> Self {
        Self {
            staging: StagingBuffer::new(out, size),
        }
    }

    pub fn write_postings(&mut self, term: &str, postings: impl IntoIterator<Item = (DocId, u32)>) -> Result<()> {
        let mut postings = postings.into_iter().peekable();
        if postings.peek().is_none() {
            return Ok(());
        }
        if term.bytes().any(|b| matches!(b, KEY_END | RECORD_END)) {
            return Err(IndexError::Serialization(format!(
                "term {term:?} contains a block delimiter"
            )));
        }
        self.staging.push_str(term)?;
        self.staging.push_str("\t")?;
        for (doc_id, tf) in postings {
            self.staging.push_item(doc_id, tf)?;
        }
        self.staging.end_record()?;
        Ok(())
    }

    pub fn finish(self) -> Result<W> {
        Ok(self.staging.finish()?)
    }
}

/// Sliding byte window with delimiter search over a block file.
struct BlockScanner<R> {
    reader: R,
    buf: Vec<u8>,
    pos: usize,
    chunk_size: usize,
    eof: bool,
    path: PathBuf,
}

impl<R: Read> BlockScanner<R> {
    fn new(reader: R, path: PathBuf, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            reader,
            buf: Vec::with_capacity(chunk_size * 2),
            pos: 0,
            chunk_size,
            eof: false,
            path,
        }
    }

    fn corrupt(&self, reason: impl Into<String>) -> IndexError {
        IndexError::corrupt_block(&self.path, reason)
    }

    /// Drops consumed bytes and appends one chunk.
    fn refill(&mut self) -> Result<()> {
        self.buf.drain(..self.pos);
        self.pos = 0;
        let filled = self.buf.len();
        self.buf.resize(filled + self.chunk_size, 0);
        let read = loop {
            match self.reader.read(&mut self.buf[filled..]) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.buf.truncate(filled);
                    return Err(e.into());
                }
            }
        };
        self.buf.truncate(filled + read);
        if read == 0 {
            self.eof = true;
        }
        Ok(())
    }

    /// Index of the next `delim` at or after the cursor, reading more input as needed.
    fn find(&mut self, delim: u8) -> Result<Option<usize>> {
        let mut searched = 0;
        loop {
            let from = self.pos + searched;
            if let Some(offset) = self.buf[from..].iter().position(|&b| b == delim) {
                return Ok(Some(from + offset));
            }
            if self.eof {
                return Ok(None);
            }
            searched = self.buf.len() - self.pos;
            self.refill()?;
        }
    }

    fn peek_byte(&mut self) -> Result<Option<u8>> {
        while self.pos >= self.buf.len() {
            if self.eof {
                return Ok(None);
            }
            self.refill()?;
        }
        Ok(Some(self.buf[self.pos]))
    }

    /// Consumes up to and including `delim`, returning the text before it.
    fn take_until(&mut self, delim: u8, what: &str) -> Result<&str> {
        let end = match self.find(delim)? {
            Some(end) => end,
            None => return Err(self.corrupt(format!("missing '{}' after {what}", delim as char))),
        };
        let start = self.pos;
        self.pos = end + 1;
        std::str::from_utf8(&self.buf[start..end])
            .map_err(|_| IndexError::corrupt_block(&self.path, format!("{what} is not valid UTF-8")))
    }

    fn parse_until<T: FromStr>(&mut self, delim: u8, what: &str) -> Result<T> {
        let text = self.take_until(delim, what)?;
        match text.parse() {
            Ok(v) => Ok(v),
            Err(_) => {
                let reason = format!("unparsable {what} {text:?}");
                Err(self.corrupt(reason))
            }
        }
    }
}

/// Flat posting parser shared by both block layouts.
///
/// `K` is the line key, `A`/`B` the two halves of each `<a:b>` item.
struct PostingParser<R, K, A, B> {
    scanner: BlockScanner<R>,
    key: Option<K>,
    _items: std::marker::PhantomData<(A, B)>,
}

impl<R, K, A, B> PostingParser<R, K, A, B>
where
    R: Read,
    K: FromStr + Clone,
    A: FromStr,
    B: FromStr,
{
    /// Fails if the input holds no line key at all.
    fn new(reader: R, path: PathBuf, chunk_size: usize) -> Result<Self> {
        let mut scanner = BlockScanner::new(reader, path, chunk_size);
        if scanner.find(KEY_END)?.is_none() {
            return Err(scanner.corrupt("empty or corrupt block: no record key found"));
        }
        Ok(Self {
            scanner,
            key: None,
            _items: std::marker::PhantomData,
        })
    }

    fn next_posting(&mut self) -> Result<Option<(K, A, B)>> {
        loop {
            let Some(byte) = self.scanner.peek_byte()? else {
                // A missing final newline is tolerated.
                return Ok(None);
            };
            let Some(key) = &self.key else {
                self.key = Some(self.scanner.parse_until(KEY_END, "record key")?);
                continue;
            };
            match byte {
                ITEM_START => {
                    let key = key.clone();
                    self.scanner.pos += 1;
                    let a = self.scanner.parse_until(ITEM_SEP, "posting id")?;
                    let b = self.scanner.parse_until(ITEM_END, "posting value")?;
                    return Ok(Some((key, a, b)));
                }
                RECORD_END => {
                    self.scanner.pos += 1;
                    self.key = None;
                }
                other => {
                    return Err(self
                        .scanner
                        .corrupt(format!("unexpected byte {:?} between postings", other as char)))
                }
            }
        }
    }
}

/// Yields matrix block entries in file order.
pub struct MatrixEntries<R> {
    parser: PostingParser<R, DocId, TermId, Weight>,
}

impl<R: Read> Source for MatrixEntries<R> {
    type Item = BlockEntry;

    fn produce(&mut self) -> Result<Option<BlockEntry>> {
        Ok(self
            .parser
            .next_posting()?
            .map(|(doc_id, term_id, value)| BlockEntry { doc_id, term_id, value }))
    }
}

/// Yields dictionary block postings in file order.
pub struct DictionaryEntries<R> {
    parser: PostingParser<R, String, DocId, u32>,
}

impl<R: Read> Source for DictionaryEntries<R> {
    type Item = PostingEntry;

    fn produce(&mut self) -> Result<Option<PostingEntry>> {
        Ok(self
            .parser
            .next_posting()?
            .map(|(term, doc_id, tf)| PostingEntry { term, doc_id, tf }))
    }
}

/// Lazy ordered sequence over a matrix block.
pub struct BlockMatrixReader<R: Read> {
    entries: Lookahead<MatrixEntries<R>>,
}

impl BlockMatrixReader<File> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        Self::from_reader(File::open(path)?, path)
    }
}

impl<R: Read> BlockMatrixReader<R> {
    /// `label` names the source in corruption errors.
    pub fn from_reader(reader: R, label: impl Into<PathBuf>) -> Result<Self> {
        Self::with_chunk_size(reader, label, BUFFER_SIZE)
    }

    pub fn with_chunk_size(reader: R, label: impl Into<PathBuf>, chunk_size: usize) -> Result<Self> {
        let parser = PostingParser::new(reader, label.into(), chunk_size)?;
        Ok(Self {
            entries: Lookahead::new(MatrixEntries { parser })?,
        })
    }

    pub fn current(&self) -> Option<&BlockEntry> {
        self.entries.current()
    }

    pub fn has_next(&self) -> bool {
        self.entries.has_next()
    }

    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<Option<BlockEntry>> {
        self.entries.next()
    }
}

/// Lazy ordered sequence over a dictionary block.
pub struct BlockDictionaryReader<R: Read> {
    entries: Lookahead<DictionaryEntries<R>>,
}

impl BlockDictionaryReader<File> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        Self::from_reader(File::open(path)?, path)
    }
}

impl<R: Read> BlockDictionaryReader<R> {
    pub fn from_reader(reader: R, label: impl Into<PathBuf>) -> Result<Self> {
        Self::with_chunk_size(reader, label, BUFFER_SIZE)
    }

    pub fn with_chunk_size(reader: R, label: impl Into<PathBuf>, chunk_size: usize) -> Result<Self> {
        let parser = PostingParser::new(reader, label.into(), chunk_size)?;
        Ok(Self {
            entries: Lookahead::new(DictionaryEntries { parser })?,
        })
    }

    pub fn current(&self) -> Option<&PostingEntry> {
        self.entries.current()
    }

    /// True if `current` is the last posting of its term.
    pub fn is_last_of_term(&self) -> bool {
        match (self.entries.current(), self.entries.peek_second()) {
            (Some(current), Some(second)) => current.term != second.term,
            (Some(_), None) => true,
            _ => false,
        }
    }

    pub fn has_next(&self) -> bool {
        self.entries.has_next()
    }

    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<Option<PostingEntry>> {
        self.entries.next()
    }
}
