use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{Read, Seek},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

/// Where the bloom and chunk files of a chain come from.
pub trait RangeSource: Send + Sync + 'static {
    type Locator: Send + 'static;
    type Reader: Read + Seek + Send + 'static;

    /// Maps range names (file names without extension) to bloom file locators.
    fn list_bloom_ranges(&self, chain: &str) -> Result<BTreeMap<String, Self::Locator>>;

    fn open_bloom(&self, locator: &Self::Locator) -> Result<Self::Reader>;

    fn open_chunk(&self, chain: &str, range_name: &str) -> Result<Self::Reader>;
}

/// Reads `{index_path}/{chain}/blooms/*.bloom` and `{index_path}/{chain}/finalized/*.bin`.
pub struct FsRangeSource {
    index_path: PathBuf,
}

impl FsRangeSource {
    pub fn new(index_path: &Path) -> Self {
        Self {
            index_path: index_path.to_owned(),
        }
    }

    pub fn bloom_dir(&self, chain: &str) -> PathBuf {
        let mut path = self.index_path.clone();
        path.push(chain);
        path.push("blooms");
        path
    }

    pub fn chunk_dir(&self, chain: &str) -> PathBuf {
        let mut path = self.index_path.clone();
        path.push(chain);
        path.push("finalized");
        path
    }
}

impl RangeSource for FsRangeSource {
    type Locator = PathBuf;
    type Reader = File;

    fn list_bloom_ranges(&self, chain: &str) -> Result<BTreeMap<String, PathBuf>> {
        let dir = self.bloom_dir(chain);
        let mut ranges = BTreeMap::new();

        for entry in fs::read_dir(&dir)
            .with_context(|| format!("read bloom directory {}", dir.display()))?
        {
            let entry = entry.context("read directory entry")?;
            if !entry.file_type().context("get file type")?.is_file() {
                continue;
            }

            let path = entry.path();
            // there can be other files in this folder, compressed blooms for example
            if path.extension().and_then(|e| e.to_str()) != Some("bloom") {
                continue;
            }

            if let Some(name) = path.file_stem().and_then(|s| s.to_str()) {
                ranges.insert(name.to_owned(), path.clone());
            }
        }

        Ok(ranges)
    }

    fn open_bloom(&self, locator: &PathBuf) -> Result<File> {
        File::open(locator).with_context(|| format!("open bloom file {}", locator.display()))
    }

    fn open_chunk(&self, chain: &str, range_name: &str) -> Result<File> {
        let mut path = self.chunk_dir(chain);
        path.push(format!("{range_name}.bin"));

        File::open(&path).with_context(|| format!("open chunk file {}", path.display()))
    }
}
