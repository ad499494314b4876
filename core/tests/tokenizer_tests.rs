use spimi_core::tokenizer::{tokenize, DocIdSequence, TokenStream, TokenStreamOptions};
use spimi_core::IndexError;
use std::collections::HashSet;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use zip::write::FileOptions;
use zip::ZipWriter;

fn write_archive(dir: &Path, entries: &[(&str, &str)]) -> PathBuf {
    let path = dir.join("corpus.zip");
    let mut zip = ZipWriter::new(File::create(&path).unwrap());
    for (name, body) in entries {
        if name.ends_with('/') {
            zip.add_directory(*name, FileOptions::default()).unwrap();
        } else {
            zip.start_file(*name, FileOptions::default()).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
    }
    zip.finish().unwrap();
    path
}

fn collect(stream: &mut TokenStream) -> Vec<(String, u32, String, String)> {
    let mut out = Vec::new();
    while let Some(token) = stream.next().unwrap() {
        out.push((token.term.clone(), token.doc_id(), token.doc.category.clone(), token.doc.name.clone()));
    }
    out
}

#[test]
fn it_stems_on_request() {
    let words = tokenize("Running Runners RUN! The café's menu.", true);
    assert!(words.contains(&"run".to_string()));
    assert!(words.contains(&"menu".to_string()));
    assert!(!words.contains(&"the".to_string()));
}

#[test]
fn it_keeps_short_words_out() {
    let words = tokenize("The quick brown fox and the lazy dog", false);
    assert_eq!(words, vec!["quick", "brown", "lazy"]);
}

#[test]
fn documents_follow_archive_order() {
    let dir = tempfile::tempdir().unwrap();
    let archive = write_archive(
        dir.path(),
        &[
            ("news/", ""),
            ("news/a/", ""),
            ("news/a/1", "Apple apple"),
            ("news/a/2", "apple BERRY"),
            ("news/b/3", "berry berry cherry"),
        ],
    );
    let mut stream = TokenStream::open(&archive, TokenStreamOptions::default(), DocIdSequence::new()).unwrap();
    let tokens = collect(&mut stream);
    let summary: Vec<(&str, u32)> = tokens.iter().map(|(t, d, _, _)| (t.as_str(), *d)).collect();
    assert_eq!(
        summary,
        vec![
            ("apple", 1),
            ("apple", 1),
            ("apple", 2),
            ("berry", 2),
            ("berry", 3),
            ("berry", 3),
            ("cherry", 3),
        ]
    );
    assert_eq!((tokens[6].2.as_str(), tokens[6].3.as_str()), ("b", "3"));
    assert_eq!(stream.doc_ids().last(), 3);
    assert!(!stream.has_next());
}

#[test]
fn empty_entries_still_take_an_id() {
    let dir = tempfile::tempdir().unwrap();
    let archive = write_archive(dir.path(), &[("a/1", "alpha"), ("a/2", "an it"), ("a/3", "omega")]);
    let mut stream = TokenStream::open(&archive, TokenStreamOptions::default(), DocIdSequence::new()).unwrap();
    let ids: Vec<u32> = collect(&mut stream).into_iter().map(|t| t.1).collect();
    assert_eq!(ids, vec![1, 3]);
    assert_eq!(stream.into_doc_ids().last(), 3);
}

#[test]
fn include_list_restricts_entries() {
    let dir = tempfile::tempdir().unwrap();
    let archive = write_archive(dir.path(), &[("a/1", "alpha"), ("a/2", "bravo"), ("b/3", "charlie")]);
    let options = TokenStreamOptions {
        include_entries: Some(HashSet::from(["a/2".to_string(), "b/3".to_string()])),
        ..TokenStreamOptions::default()
    };
    let mut stream = TokenStream::open(&archive, options, DocIdSequence::new()).unwrap();
    let terms: Vec<String> = collect(&mut stream).into_iter().map(|t| t.0).collect();
    assert_eq!(terms, vec!["bravo", "charlie"]);
}

#[test]
fn last_token_of_each_document_is_flagged() {
    let dir = tempfile::tempdir().unwrap();
    let archive = write_archive(dir.path(), &[("a/1", "alpha bravo"), ("a/2", "charlie")]);
    let mut stream = TokenStream::open(&archive, TokenStreamOptions::default(), DocIdSequence::new()).unwrap();
    let mut flags = Vec::new();
    while stream.has_next() {
        flags.push(stream.is_last_of_document());
        stream.next().unwrap();
    }
    assert_eq!(flags, vec![false, true, true]);
    assert!(!stream.is_last_of_document());
}

#[test]
fn metadata_header_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let archive = write_archive(
        dir.path(),
        &[
            ("a/1", "From: someone\nSubject: header\nLines: 2\nreal body text"),
            ("a/2", "no header here at all"),
        ],
    );
    let options = TokenStreamOptions {
        skip_metadata: true,
        ..TokenStreamOptions::default()
    };
    let mut stream = TokenStream::open(&archive, options, DocIdSequence::new()).unwrap();
    let tokens = collect(&mut stream);
    let first: Vec<&str> = tokens.iter().filter(|t| t.1 == 1).map(|t| t.0.as_str()).collect();
    let second: Vec<&str> = tokens.iter().filter(|t| t.1 == 2).map(|t| t.0.as_str()).collect();
    assert_eq!(first, vec!["real", "body", "text"]);
    // Without a "line" term the entry is rewound and read in full.
    assert_eq!(second, vec!["header", "here"]);
}

#[test]
fn stream_ids_continue_from_given_sequence() {
    let dir = tempfile::tempdir().unwrap();
    let archive = write_archive(dir.path(), &[("a/1", "alpha")]);
    let mut ids = DocIdSequence::new();
    ids.allocate();
    ids.allocate();
    let mut stream = TokenStream::open(&archive, TokenStreamOptions::default(), ids).unwrap();
    assert_eq!(stream.next().unwrap().unwrap().doc_id(), 3);
}

#[test]
fn unreadable_archive_fails_at_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.zip");
    std::fs::write(&path, b"this is not a zip file").unwrap();
    let result = TokenStream::open(&path, TokenStreamOptions::default(), DocIdSequence::new());
    assert!(matches!(result, Err(IndexError::Archive(_))));
}

#[test]
fn flat_entry_path_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let archive = write_archive(dir.path(), &[("loose", "alpha")]);
    let result = TokenStream::open(&archive, TokenStreamOptions::default(), DocIdSequence::new());
    assert!(matches!(result, Err(IndexError::InvalidEntryPath(_))));
}
