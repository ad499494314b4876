use crate::error::Result;
use crate::stats::CollectionStatistics;
use crate::vocabulary::Vocabulary;
use serde::{Deserialize, Serialize};
use std::fs::{create_dir_all, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

pub const FORMAT_VERSION: u32 = 1;

/// Build manifest written next to the matrices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaFile {
    pub index_name: String,
    pub created_at: String,
    pub version: u32,
    pub use_stemming: bool,
    pub low_tf_threshold: u32,
    pub high_tf_threshold: u32,
    pub blocks: usize,
    pub statistics: CollectionStatistics,
}

/// File layout of one index under an output root.
///
/// ```text
/// <root>/stemming|no_stemming/<name>.stat
/// <root>/stemming|no_stemming/<name>_tf.arff.zst
/// <root>/stemming|no_stemming/<name>_tfidf.arff.zst
/// <root>/stemming|no_stemming/<name>.voc
/// <root>/stemming|no_stemming/<name>.meta.json
/// <root>/tmp/<n>.mat
/// ```
#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub root: PathBuf,
    pub name: String,
    pub use_stemming: bool,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P, name: &str, use_stemming: bool) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            name: name.to_string(),
            use_stemming,
        }
    }

    pub fn index_dir(&self) -> PathBuf {
        self.root
            .join(if self.use_stemming { "stemming" } else { "no_stemming" })
    }
    pub fn block_dir(&self) -> PathBuf { self.root.join("tmp") }
    pub fn block(&self, number: usize) -> PathBuf { self.block_dir().join(format!("{number}.mat")) }
    pub fn stat(&self) -> PathBuf { self.file("", "stat") }
    pub fn tf_matrix(&self) -> PathBuf { self.file("_tf", "arff.zst") }
    pub fn tfidf_matrix(&self) -> PathBuf { self.file("_tfidf", "arff.zst") }
    pub fn vocabulary(&self) -> PathBuf { self.file("", "voc") }
    pub fn meta(&self) -> PathBuf { self.file("", "meta.json") }

    fn file(&self, suffix: &str, ext: &str) -> PathBuf {
        self.index_dir().join(format!("{}{suffix}.{ext}", self.name))
    }

    pub fn create_dirs(&self) -> Result<()> {
        create_dir_all(self.index_dir())?;
        create_dir_all(self.block_dir())?;
        Ok(())
    }
}

pub fn save_vocabulary(paths: &IndexPaths, vocabulary: &Vocabulary) -> Result<()> {
    create_dir_all(paths.index_dir())?;
    let mut f = BufWriter::new(File::create(paths.vocabulary())?);
    bincode::serialize_into(&mut f, vocabulary)?;
    f.flush()?;
    Ok(())
}

pub fn load_vocabulary(paths: &IndexPaths) -> Result<Vocabulary> {
    let f = BufReader::new(File::open(paths.vocabulary())?);
    Ok(bincode::deserialize_from(f)?)
}

pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    create_dir_all(paths.index_dir())?;
    let mut f = File::create(paths.meta())?;
    let json = serde_json::to_string_pretty(meta)?;
    f.write_all(json.as_bytes())?;
    Ok(())
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let mut f = File::open(paths.meta())?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let meta: MetaFile = serde_json::from_str(&buf)?;
    Ok(meta)
}

/// Current UTC time as RFC 3339, empty if formatting fails.
pub fn timestamp() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocabulary::VocabularyBuilder;

    #[test]
    fn layout_follows_stemming_flag() {
        let plain = IndexPaths::new("out", "news", false);
        assert_eq!(plain.stat(), Path::new("out/no_stemming/news.stat"));
        assert_eq!(plain.tf_matrix(), Path::new("out/no_stemming/news_tf.arff.zst"));
        assert_eq!(plain.block(3), Path::new("out/tmp/3.mat"));
        let stemmed = IndexPaths::new("out", "news", true);
        assert_eq!(stemmed.tfidf_matrix(), Path::new("out/stemming/news_tfidf.arff.zst"));
    }

    #[test]
    fn vocabulary_survives_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::new(dir.path(), "idx", false);
        let mut builder = VocabularyBuilder::new();
        builder.add("apple", 1);
        builder.add("berry", 2);
        builder.add("apple", 2);
        let vocab = builder.finalize(2);
        save_vocabulary(&paths, &vocab).unwrap();

        let loaded = load_vocabulary(&paths).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.get("apple"), vocab.get("apple"));
        assert_eq!(loaded.term(1), Some("berry"));
        assert_eq!(loaded.total_documents(), 2);
    }

    #[test]
    fn meta_round_trips_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::new(dir.path(), "idx", true);
        let meta = MetaFile {
            index_name: "idx".into(),
            created_at: timestamp(),
            version: FORMAT_VERSION,
            use_stemming: true,
            low_tf_threshold: 0,
            high_tf_threshold: u32::MAX,
            blocks: 2,
            statistics: CollectionStatistics::new(4, 10, 3),
        };
        save_meta(&paths, &meta).unwrap();
        assert_eq!(load_meta(&paths).unwrap(), meta);
        assert!(!meta.created_at.is_empty());
    }
}
