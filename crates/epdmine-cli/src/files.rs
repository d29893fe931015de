//! Corpus discovery.

use std::path::Path;

use anyhow::{bail, Context, Result};

/// Collect `.pgn`, `.pgn.gz` and `.pgn.zst` files under `dir`.
pub fn collect_files(dir: &Path, recursive: bool) -> Result<Vec<String>> {
    let mut files = Vec::new();
    walk(dir, recursive, &mut files)?;
    Ok(files)
}

fn walk(dir: &Path, recursive: bool, out: &mut Vec<String>) -> Result<()> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory {}", dir.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read directory {}", dir.display()))?;
        let path = entry.path();
        if path.is_dir() {
            if recursive {
                walk(&path, true, out)?;
            }
            continue;
        }
        if is_pgn_like(&path) {
            out.push(path.to_string_lossy().into_owned());
        }
    }
    Ok(())
}

fn is_pgn_like(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.ends_with(".pgn") || name.ends_with(".pgn.gz") || name.ends_with(".pgn.zst")
}

/// Sort lexicographically and reject a file list where one entry is a
/// prefix of the next (`foo.pgn` next to `foo.pgn.gz` means the same games
/// would be counted twice).
pub fn sort_and_check(files: &mut Vec<String>) -> Result<()> {
    files.sort();
    for pair in files.windows(2) {
        if pair[1].starts_with(&pair[0]) {
            bail!("\"duplicate\" files: {} and {}", pair[0], pair[1]);
        }
    }
    Ok(())
}
