//! Sparse ARFF output for the final matrices.
//!
//! Columns 0..3 are reserved for the document id, its category and its name;
//! term `t` lives in column `t + 3`.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{IndexError, Result};
use crate::matrix::DocumentTermMatrix;
use crate::vocabulary::Vocabulary;
use crate::{DocId, DocumentTable, TermId, Weight};

pub const RELATION: &str = "documentterm";
/// Number of reserved columns ahead of the term columns.
pub const PREAMBLE_WIDTH: TermId = 3;
const ZSTD_LEVEL: i32 = 3;

pub type CompressedSink = zstd::stream::write::Encoder<'static, BufWriter<File>>;

/// Quotes `value` if ARFF would otherwise split or misread it.
pub fn quote(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, ',' | '\'' | '"' | '{' | '}' | '%' | '\\'));
    if !needs_quotes {
        return value.to_string();
    }
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        if matches!(c, '\'' | '\\') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('\'');
    quoted
}

/// Streams a header and sparse records.
///
/// Rows of one document may arrive over several [`ArffMatrixWriter::write_matrix`]
/// calls; they are appended to the still open record.
pub struct ArffMatrixWriter<W: Write> {
    out: W,
    open_doc: Option<DocId>,
    records: usize,
}

impl ArffMatrixWriter<CompressedSink> {
    /// zstd-compressed file writer.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = BufWriter::new(File::create(path)?);
        Ok(Self::new(zstd::stream::write::Encoder::new(file, ZSTD_LEVEL)?))
    }

    /// Closes the last record and finishes the compressed frame.
    pub fn close(self) -> Result<()> {
        let encoder = self.finish()?;
        let mut file = encoder.finish()?;
        file.flush()?;
        Ok(())
    }
}

impl<W: Write> ArffMatrixWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            open_doc: None,
            records: 0,
        }
    }

    /// Relation, comments, reserved attributes, then one numeric attribute per term in id order.
    pub fn write_header(&mut self, vocabulary: &Vocabulary, comments: &[String]) -> Result<()> {
        writeln!(self.out, "@RELATION {RELATION}")?;
        writeln!(self.out)?;
        for comment in comments {
            for line in comment.lines() {
                writeln!(self.out, "% {line}")?;
            }
        }
        writeln!(self.out, "@ATTRIBUTE !docID NUMERIC")?;
        writeln!(self.out, "@ATTRIBUTE !class string")?;
        writeln!(self.out, "@ATTRIBUTE !name string")?;
        for (term, _) in vocabulary.iter() {
            writeln!(self.out, "@ATTRIBUTE {} NUMERIC", quote(term))?;
        }
        writeln!(self.out)?;
        writeln!(self.out, "@DATA")?;
        Ok(())
    }

    /// Appends every row of `matrix`. Category and name come from `documents`.
    pub fn write_matrix<K>(&mut self, matrix: &DocumentTermMatrix<K>, documents: &DocumentTable) -> Result<()> {
        for (doc_id, row) in matrix.iter() {
            self.write_row(doc_id, row.iter(), documents)?;
        }
        Ok(())
    }

    pub fn write_row(
        &mut self,
        doc_id: DocId,
        row: impl IntoIterator<Item = (TermId, Weight)>,
        documents: &DocumentTable,
    ) -> Result<()> {
        if self.open_doc != Some(doc_id) {
            let doc = documents.get(doc_id).ok_or(IndexError::UnknownDocument(doc_id))?;
            if self.open_doc.is_some() {
                writeln!(self.out, "}}")?;
            }
            write!(self.out, "{{0 {},1 {},2 {}", doc.id, quote(&doc.category), quote(&doc.name))?;
            self.open_doc = Some(doc_id);
            self.records += 1;
        }
        for (term_id, weight) in row {
            write!(self.out, ",{} {}", term_id + PREAMBLE_WIDTH, weight)?;
        }
        Ok(())
    }

    /// Distinct documents written so far.
    pub fn records(&self) -> usize {
        self.records
    }

    /// Closes the open record, flushes, and returns the sink.
    pub fn finish(mut self) -> Result<W> {
        if self.open_doc.take().is_some() {
            writeln!(self.out, "}}")?;
        }
        self.out.flush()?;
        Ok(self.out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::Frequencies;
    use crate::vocabulary::VocabularyBuilder;
    use crate::Document;
    use std::rc::Rc;

    fn documents() -> DocumentTable {
        let mut table = DocumentTable::new();
        for (id, category, name) in [(1, "a", "1"), (2, "a", "2"), (3, "b b", "3")] {
            table.insert(Rc::new(Document {
                id,
                category: category.into(),
                name: name.into(),
            }));
        }
        table
    }

    fn vocabulary() -> Vocabulary {
        let mut vocab = VocabularyBuilder::new();
        vocab.add("apple", 1);
        vocab.add("berry", 2);
        vocab.finalize(2)
    }

    fn render<F: FnOnce(&mut ArffMatrixWriter<Vec<u8>>)>(f: F) -> String {
        let mut writer = ArffMatrixWriter::new(Vec::new());
        f(&mut writer);
        String::from_utf8(writer.finish().unwrap()).unwrap()
    }

    #[test]
    fn header_lists_reserved_columns_then_terms() {
        let text = render(|w| w.write_header(&vocabulary(), &["built for tests".to_string()]).unwrap());
        let expected = "@RELATION documentterm\n\n% built for tests\n\
                        @ATTRIBUTE !docID NUMERIC\n@ATTRIBUTE !class string\n@ATTRIBUTE !name string\n\
                        @ATTRIBUTE apple NUMERIC\n@ATTRIBUTE berry NUMERIC\n\n@DATA\n";
        assert_eq!(text, expected);
    }

    #[test]
    fn records_offset_term_columns() {
        let mut matrix = DocumentTermMatrix::<Frequencies>::new();
        matrix.add_doc(1).add_value(0, 2.0);
        matrix.add_doc(3).add_value(1, 1.0);
        let docs = documents();
        let text = render(|w| w.write_matrix(&matrix, &docs).unwrap());
        assert_eq!(text, "{0 1,1 a,2 1,3 2}\n{0 3,1 'b b',2 3,4 1}\n");
    }

    #[test]
    fn split_rows_are_stitched() {
        let docs = documents();
        let mut first = DocumentTermMatrix::<Frequencies>::new();
        first.add_doc(2).add_value(0, 1.0);
        let mut second = DocumentTermMatrix::<Frequencies>::new();
        second.add_doc(2).add_value(1, 1.0);
        second.add_doc(3).add_value(1, 0.5);
        let mut records = 0;
        let text = render(|w| {
            w.write_matrix(&first, &docs).unwrap();
            w.write_matrix(&second, &docs).unwrap();
            records = w.records();
        });
        assert_eq!(text, "{0 2,1 a,2 2,3 1,4 1}\n{0 3,1 'b b',2 3,4 0.5}\n");
        assert_eq!(records, 2);
    }

    #[test]
    fn unknown_document_is_an_error() {
        let mut writer = ArffMatrixWriter::new(Vec::new());
        let err = writer.write_row(42, vec![(0, 1.0)], &documents()).unwrap_err();
        assert!(matches!(err, IndexError::UnknownDocument(42)));
    }

    #[test]
    fn quoting_escapes_specials() {
        assert_eq!(quote("plain"), "plain");
        assert_eq!(quote("two words"), "'two words'");
        assert_eq!(quote("it's"), r"'it\'s'");
        assert_eq!(quote(""), "''");
    }

    #[test]
    fn compressed_output_decodes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.arff.zst");
        let mut writer = ArffMatrixWriter::create(&path).unwrap();
        writer.write_header(&vocabulary(), &[]).unwrap();
        let mut matrix = DocumentTermMatrix::<Frequencies>::new();
        matrix.add_doc(1).add_value(1, 3.0);
        writer.write_matrix(&matrix, &documents()).unwrap();
        writer.close().unwrap();

        let raw = std::fs::read(&path).unwrap();
        let text = String::from_utf8(zstd::decode_all(raw.as_slice()).unwrap()).unwrap();
        assert!(text.ends_with("@DATA\n{0 1,1 a,2 1,4 3}\n"));
    }
}
