use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::{
    fs::{File, OpenOptions},
    io::{AsyncWriteExt, BufWriter},
};
use unchained_format::Address;
use unchained_ingest::AppearanceBatch;

/// Destination of decoded appearances.
#[async_trait::async_trait]
pub trait AppearanceSink: Send {
    async fn insert_batch(&mut self, batch: &AppearanceBatch) -> Result<()>;

    /// Called once all batches of a chunk were inserted.
    async fn flush(&mut self) -> Result<()>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Row {
    address: Address,
    block_number: u32,
    transaction_index: u32,
    block_range_start: u64,
    block_range_end: u64,
}

/// Appends one JSON object per appearance to a file.
pub struct JsonLinesSink {
    writer: BufWriter<File>,
}

impl JsonLinesSink {
    pub async fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .with_context(|| format!("open sink file {}", path.display()))?;

        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

#[async_trait::async_trait]
impl AppearanceSink for JsonLinesSink {
    async fn insert_batch(&mut self, batch: &AppearanceBatch) -> Result<()> {
        let mut buf = Vec::with_capacity(batch.appearances.len() * 96);
        for app in batch.appearances.iter() {
            let row = Row {
                address: app.address,
                block_number: app.block_number,
                transaction_index: app.transaction_index,
                block_range_start: batch.range.0,
                block_range_end: batch.range.1,
            };
            serde_json::to_writer(&mut buf, &row).context("serialize appearance")?;
            buf.push(b'\n');
        }

        self.writer
            .write_all(&buf)
            .await
            .context("write appearances")
    }

    async fn flush(&mut self) -> Result<()> {
        self.writer.flush().await.context("flush sink file")
    }
}
