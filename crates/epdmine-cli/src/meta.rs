//! Sidecar test metadata and corpus-level file filters.
//!
//! Every archive `<test>-<index>.pgn(.gz|.zst)` belongs to a test whose
//! metadata lives next to it in `<test>.json`, shaped
//! `{"args": {"book": …, "sprt": …, "book_depth": "<int>"}}`. Metadata is
//! loaded once per test and drives the SPRT/book filters and the
//! `--fixFEN` move-counter patch.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::Deserialize;

/// Metadata of one test, as far as the miner cares.
#[derive(Debug, Clone, Default)]
pub struct TestMeta {
    pub book: Option<String>,
    pub sprt: bool,
    pub book_depth: Option<i32>,
}

/// test filename (path minus the trailing `-<index>`) → metadata
pub type MetaMap = HashMap<String, TestMeta>;

#[derive(Deserialize)]
struct Sidecar {
    #[serde(default)]
    args: SidecarArgs,
}

#[derive(Deserialize, Default)]
struct SidecarArgs {
    book: Option<String>,
    /// presence means SPRT; the value itself carries no information
    sprt: Option<serde_json::Value>,
    book_depth: Option<serde_json::Value>,
}

impl From<Sidecar> for TestMeta {
    fn from(sidecar: Sidecar) -> Self {
        let args = sidecar.args;
        // book_depth is written as a decimal string; tolerate a bare integer
        let book_depth = match &args.book_depth {
            Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
            Some(serde_json::Value::Number(n)) => n.as_i64().and_then(|v| i32::try_from(v).ok()),
            _ => None,
        };
        TestMeta {
            book: args.book,
            sprt: args.sprt.is_some(),
            book_depth,
        }
    }
}

/// Path minus the trailing `-<index>` part; the whole path when there is
/// no dash (then the file is its own test).
pub fn test_filename(path: &str) -> &str {
    match path.rfind('-') {
        Some(idx) => &path[..idx],
        None => path,
    }
}

fn test_id(path: &str) -> &str {
    let base = Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path);
    match base.rfind('-') {
        Some(idx) => &base[..idx],
        None => base,
    }
}

/// Load the sidecar metadata for every test in the file list, once per
/// test. The same test id appearing under two different directories means
/// the corpus holds the same pgns twice; that is fatal unless explicitly
/// allowed.
pub fn get_metadata(files: &[String], allow_duplicates: bool) -> Result<MetaMap> {
    let mut meta_map = MetaMap::new();
    let mut id_to_test: HashMap<String, String> = HashMap::new();
    let mut warned: HashSet<String> = HashSet::new();

    for pathname in files {
        let test_filename = test_filename(pathname);
        let test_id = test_id(pathname);

        match id_to_test.entry(test_id.to_string()) {
            Entry::Vacant(entry) => {
                entry.insert(test_filename.to_string());
            }
            Entry::Occupied(entry) => {
                let first = entry.get();
                if first != test_filename && warned.insert(test_filename.to_string()) {
                    if !allow_duplicates {
                        bail!(
                            "detected a duplicate of test {test_id} ({first} vs {test_filename}); \
                             use --allowDuplicates to continue nonetheless"
                        );
                    }
                    log::warn!(
                        "detected a duplicate of test {test_id} ({first} vs {test_filename})"
                    );
                }
            }
        }

        if meta_map.contains_key(test_filename) {
            continue;
        }
        let json_path = format!("{test_filename}.json");
        let file = match File::open(&json_path) {
            Ok(f) => f,
            // tests without sidecars simply have no metadata
            Err(_) => continue,
        };
        let sidecar: Sidecar = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("failed to parse {json_path}"))?;
        meta_map.insert(test_filename.to_string(), sidecar.into());
    }

    Ok(meta_map)
}

/// Keep only files whose test's book name matches the regex (or does not,
/// when inverted). Files without metadata or without a book entry never
/// match and are always dropped.
pub fn filter_files_book(files: &mut Vec<String>, meta: &MetaMap, regex: &Regex, invert: bool) {
    files.retain(|pathname| {
        let book = meta
            .get(test_filename(pathname))
            .and_then(|m| m.book.as_deref());
        match book {
            Some(book) => {
                let matched = regex.is_match(book);
                if invert {
                    !matched
                } else {
                    matched
                }
            }
            None => false,
        }
    });
}

/// Keep only files coming from SPRT tests.
pub fn filter_files_sprt(files: &mut Vec<String>, meta: &MetaMap) {
    files.retain(|pathname| {
        meta.get(test_filename(pathname)).map(|m| m.sprt).unwrap_or(false)
    });
}

/// Derive the replacement fullmove counter for `--fixFEN`: the book exit
/// ply plus one. A test without metadata cannot be patched; neither can an
/// `.epd` book whose depth was not recorded.
pub fn fixfen_move_counter(pathname: &str, meta: &MetaMap) -> Result<Option<String>> {
    let test = test_filename(pathname);
    let Some(meta) = meta.get(test) else {
        bail!("no metadata for test {test}");
    };
    if let Some(depth) = meta.book_depth {
        return Ok(Some((depth + 1).to_string()));
    }
    let Some(book) = &meta.book else {
        bail!("missing \"book\" key in metadata for test {test}");
    };
    if book.contains(".epd") {
        bail!("missing \"book_depth\" key in metadata for .epd book for test {test}");
    }
    // pgn books keep their move counters; nothing to patch
    Ok(None)
}
