use std::{fs::File, mem, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use memmap2::Mmap;
use tokio::sync::mpsc;

use crate::{
    list_chunks, validate_decoded_count, AppearanceBatch, ChunkDecoder, ChunkPath, ChunkStatus,
    IngestConfig, Progress, StatusLog,
};

/// Decodes every chunk of a directory and hands out appearance batches.
///
/// Chunks are decoded one after another, each by its own set of shard workers.
/// A failing chunk is reported as the last item and nothing after it is decoded.
pub struct Ingest {
    batch_rx: mpsc::Receiver<Result<AppearanceBatch>>,
}

impl Ingest {
    pub fn spawn(config: IngestConfig, chunk_dir: PathBuf, status: Option<StatusLog>) -> Self {
        let (batch_tx, batch_rx) = mpsc::channel(4);

        tokio::spawn(async move {
            let res = Ingester {
                decoder: ChunkDecoder::from_config(&config),
                batch_tx: batch_tx.clone(),
                config,
                chunk_dir,
                status,
            }
            .ingest()
            .await;

            if let Err(e) = res {
                log::error!("failed to run ingester: {:?}", e);
                batch_tx.send(Err(e)).await.ok();
            }
        });

        Self { batch_rx }
    }

    /// Returns `None` once every chunk was decoded or after an error was returned.
    pub async fn recv(&mut self) -> Option<Result<AppearanceBatch>> {
        self.batch_rx.recv().await
    }
}

struct Ingester {
    decoder: ChunkDecoder,
    batch_tx: mpsc::Sender<Result<AppearanceBatch>>,
    config: IngestConfig,
    chunk_dir: PathBuf,
    status: Option<StatusLog>,
}

enum Flow {
    Continue,
    Stop,
}

impl Ingester {
    async fn ingest(self) -> Result<()> {
        let chunks = list_chunks(&self.chunk_dir, self.config.from_block, self.config.to_block)
            .with_context(|| format!("list chunks in {}", self.chunk_dir.display()))?;

        log::info!(
            "will decode {} chunks from {}",
            chunks.len(),
            self.chunk_dir.display()
        );

        let progress = Progress::spawn();

        for chunk in chunks.iter() {
            let flow = match self.ingest_chunk(chunk, &progress).await {
                Ok(flow) => flow,
                Err(e) => {
                    if let Some(status) = self.status.as_ref() {
                        status
                            .record(ChunkStatus::Error, &chunk.name)
                            .context("record chunk status")?;
                    }
                    return Err(e.context(format!("decode chunk {}", chunk.path.display())));
                }
            };

            if let Flow::Stop = flow {
                log::warn!("no one is listening so quitting ingest loop.");
                return Ok(());
            }

            log::debug!("decoded chunk {}", chunk.name);
        }

        log::info!(
            "decoded {} appearances from {} chunks",
            progress.done(),
            chunks.len()
        );

        Ok(())
    }

    async fn ingest_chunk(&self, chunk: &ChunkPath, progress: &Progress) -> Result<Flow> {
        let file = File::open(&chunk.path).context("open chunk file")?;
        // SAFETY: chunk files are immutable once written by the indexer
        let mmap = unsafe { Mmap::map(&file) }.context("memory map chunk file")?;

        let mut stream = self
            .decoder
            .decode(Arc::new(mmap), &chunk.name)
            .context("start decoding chunk")?;
        let expected = stream.header().appearance_count;

        let batch_size = self.config.batch_size.get();
        let mut appearances = Vec::with_capacity(batch_size);
        let mut decoded = 0u64;

        while let Some(app) = stream.recv().await {
            appearances.push(app?);
            decoded += 1;

            if appearances.len() >= batch_size {
                progress.add(appearances.len() as u64);

                let batch = AppearanceBatch {
                    range: chunk.range,
                    chunk_name: chunk.name.clone(),
                    appearances: mem::replace(&mut appearances, Vec::with_capacity(batch_size)),
                    last_in_chunk: false,
                };
                if self.batch_tx.send(Ok(batch)).await.is_err() {
                    return Ok(Flow::Stop);
                }
            }
        }

        validate_decoded_count(chunk.range, expected, decoded)?;

        progress.add(appearances.len() as u64);

        let batch = AppearanceBatch {
            range: chunk.range,
            chunk_name: chunk.name.clone(),
            appearances,
            last_in_chunk: true,
        };
        if self.batch_tx.send(Ok(batch)).await.is_err() {
            return Ok(Flow::Stop);
        }

        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use std::{env::temp_dir, fs, num::NonZeroUsize};

    use super::*;
    use unchained_format::{
        test_utils::{address_from_index, write_range, ChunkBuilder},
        BlockRange,
    };

    fn temp_index() -> PathBuf {
        let mut tmp = temp_dir();
        tmp.push(format!("{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&tmp).unwrap();
        tmp
    }

    fn chunk(first_address: u32, address_count: u32) -> ChunkBuilder {
        let mut builder = ChunkBuilder::new();
        for i in first_address..first_address + address_count {
            for tx in 0..3 {
                builder.add(address_from_index(i), i, tx);
            }
        }
        builder
    }

    fn config(batch_size: usize) -> IngestConfig {
        IngestConfig {
            batch_size: NonZeroUsize::new(batch_size).unwrap(),
            channel_capacity: NonZeroUsize::new(64).unwrap(),
            ..Default::default()
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_ingest_directory() {
        let index = temp_index();
        let first = chunk(0, 40);
        let second = chunk(1000, 7);
        write_range(&index, "mainnet", BlockRange(0, 99), &first).unwrap();
        write_range(&index, "mainnet", BlockRange(100, 199), &second).unwrap();

        let mut status_path = index.clone();
        status_path.push("status.txt");
        let status = StatusLog::open(&status_path).unwrap();

        let mut finalized = index.clone();
        finalized.push("mainnet/finalized");

        let mut ingest = Ingest::spawn(config(50), finalized, Some(status));

        let mut batches = Vec::new();
        while let Some(batch) = ingest.recv().await {
            batches.push(batch.unwrap());
        }

        // newest chunk first, batches never span chunks
        assert_eq!(batches[0].range, BlockRange(100, 199));
        assert!(batches.iter().all(|b| b.appearances.len() <= 50));
        let last_flags = batches
            .iter()
            .filter(|b| b.last_in_chunk)
            .map(|b| b.range)
            .collect::<Vec<_>>();
        assert_eq!(last_flags, vec![BlockRange(100, 199), BlockRange(0, 99)]);

        let count_in = |range: BlockRange| -> u64 {
            batches
                .iter()
                .filter(|b| b.range == range)
                .map(|b| b.appearances.len() as u64)
                .sum()
        };
        assert_eq!(count_in(BlockRange(0, 99)), first.appearance_count());
        assert_eq!(count_in(BlockRange(100, 199)), second.appearance_count());

        fs::remove_dir_all(&index).unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_ingest_stops_on_bad_chunk() {
        let index = temp_index();
        let good = chunk(0, 10);
        write_range(&index, "mainnet", BlockRange(0, 99), &good).unwrap();
        let bad_path = write_range(&index, "mainnet", BlockRange(100, 199), &chunk(0, 10)).unwrap();

        // truncate the newest chunk so its appearance table is short
        let data = fs::read(&bad_path).unwrap();
        fs::write(&bad_path, &data[..data.len() - 4]).unwrap();

        let mut status_path = index.clone();
        status_path.push("status.txt");
        let status = StatusLog::open(&status_path).unwrap();

        let mut finalized = index.clone();
        finalized.push("mainnet/finalized");
        let mut ingest = Ingest::spawn(config(5000), finalized, Some(status));

        let mut last = None;
        while let Some(item) = ingest.recv().await {
            last = Some(item);
        }
        let err = last.unwrap().err().unwrap();
        assert!(format!("{err:?}").contains("000000100-000000199"));

        let status = fs::read_to_string(&status_path).unwrap();
        assert_eq!(status, "error\t000000100-000000199\n");

        fs::remove_dir_all(&index).unwrap();
    }
}
