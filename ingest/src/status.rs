use std::{
    fmt,
    fs::{File, OpenOptions},
    io::Write,
    path::Path,
    sync::{Arc, Mutex},
};

use anyhow::{anyhow, Context, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStatus {
    Done,
    /// The chunk could not be decoded
    Error,
    /// The chunk was decoded but the sink rejected its appearances
    AppearanceError,
}

impl fmt::Display for ChunkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Done => f.write_str("done"),
            Self::Error => f.write_str("error"),
            Self::AppearanceError => f.write_str("appearance-error"),
        }
    }
}

/// Append-only log of `{status}\t{chunk}` lines, one per finished chunk.
#[derive(Clone)]
pub struct StatusLog {
    file: Arc<Mutex<File>>,
}

impl StatusLog {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .context("open status file")?;

        Ok(Self {
            file: Arc::new(Mutex::new(file)),
        })
    }

    pub fn record(&self, status: ChunkStatus, chunk_name: &str) -> Result<()> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| anyhow!("status file lock poisoned"))?;
        writeln!(file, "{status}\t{chunk_name}").context("write status line")?;
        file.flush().context("flush status file")
    }
}
