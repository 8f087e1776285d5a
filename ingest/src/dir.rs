use std::{fs, path::Path, path::PathBuf};

use anyhow::{Context, Result};
use unchained_format::BlockRange;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPath {
    pub path: PathBuf,
    /// File name without the `.bin` extension
    pub name: String,
    pub range: BlockRange,
}

/// Lists the chunk files of a directory, newest range first.
///
/// Only `*.bin` files are considered. Chunks entirely before `from_block` or
/// entirely after `to_block` are left out.
pub fn list_chunks(
    dir: &Path,
    from_block: Option<u64>,
    to_block: Option<u64>,
) -> Result<Vec<ChunkPath>> {
    let mut chunks = Vec::new();

    for entry in fs::read_dir(dir).context("read chunk directory")? {
        let entry = entry.context("read directory entry")?;
        let file_type = entry.file_type().context("get file type")?;
        if !file_type.is_file() {
            continue;
        }

        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("bin") {
            continue;
        }

        let name = match path.file_stem().and_then(|s| s.to_str()) {
            Some(name) => name.to_owned(),
            None => continue,
        };

        let range: BlockRange = match name.parse() {
            Ok(range) => range,
            Err(e) => {
                log::warn!("skipping foreign file {}: {}", path.display(), e);
                continue;
            }
        };

        if from_block.map_or(false, |from| range.earlier_than(from)) {
            continue;
        }
        if to_block.map_or(false, |to| range.later_than(to)) {
            continue;
        }

        chunks.push(ChunkPath { path, name, range });
    }

    chunks.sort_by(|a, b| b.range.cmp(&a.range));

    Ok(chunks)
}
