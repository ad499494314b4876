use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{IndexError, Result};

pub type TermId = u32;
pub type DocId = u32;
pub type Weight = f32;

/// One archive entry. Ids start at 1 and follow archive order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub category: String,
    pub name: String,
}

impl Document {
    /// Builds a document from an entry path of the form `.../<category>/<name>`.
    pub fn from_entry_path(id: DocId, path: &str) -> Result<Self> {
        let mut parts = path.rsplit('/').filter(|p| !p.is_empty());
        match (parts.next(), parts.next()) {
            (Some(name), Some(category)) => Ok(Self {
                id,
                category: category.to_string(),
                name: name.to_string(),
            }),
            _ => Err(IndexError::InvalidEntryPath(path.to_string())),
        }
    }
}

/// A term occurrence. Shares its document with every other token of the same entry.
#[derive(Debug, Clone)]
pub struct Token {
    pub term: String,
    pub doc: Rc<Document>,
}

impl Token {
    #[inline]
    pub fn doc_id(&self) -> DocId {
        self.doc.id
    }
}

/// Documents seen while building blocks, looked up again when writing the final matrices.
#[derive(Debug, Default)]
pub struct DocumentTable {
    docs: HashMap<DocId, Rc<Document>>,
}

impl DocumentTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, doc: Rc<Document>) {
        self.docs.entry(doc.id).or_insert(doc);
    }

    pub fn get(&self, doc_id: DocId) -> Option<&Document> {
        self.docs.get(&doc_id).map(|d| d.as_ref())
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_path_uses_last_two_components() {
        let doc = Document::from_entry_path(7, "20news/alt.atheism/51060").unwrap();
        assert_eq!(doc.category, "alt.atheism");
        assert_eq!(doc.name, "51060");
        assert_eq!(doc.id, 7);

        let short = Document::from_entry_path(1, "b/3").unwrap();
        assert_eq!((short.category.as_str(), short.name.as_str()), ("b", "3"));
    }

    #[test]
    fn entry_path_needs_a_category() {
        assert!(matches!(
            Document::from_entry_path(1, "readme.txt"),
            Err(IndexError::InvalidEntryPath(_))
        ));
    }
}
