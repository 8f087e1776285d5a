use std::{cmp, io, num::NonZeroUsize, sync::Arc};

use anyhow::{anyhow, Context, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use unchained_format::{
    validate_header, AddressRecord, AppearanceRecord, BlockRange, Error, FileKind, IndexHeader,
    ReadAt, ADDRESS_RECORD_WIDTH, APPEARANCE_RECORD_WIDTH, INDEX_HEADER_WIDTH,
};

use crate::{DecodedAppearance, IngestConfig};

/// A contiguous slice of a chunk's address table, in records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shard {
    pub start: u32,
    pub len: u32,
}

/// Splits the address table into `min(max_workers, address_count)` near-equal shards.
///
/// The remainder of the division goes to the last shard.
pub fn plan_shards(address_count: u32, max_workers: NonZeroUsize) -> Vec<Shard> {
    let max_workers = u32::try_from(max_workers.get()).unwrap_or(u32::MAX);
    let worker_count = cmp::min(max_workers, address_count);
    if worker_count == 0 {
        return Vec::new();
    }

    let per_worker = address_count / worker_count;
    let extra = address_count % worker_count;

    (0..worker_count)
        .map(|i| Shard {
            start: i * per_worker,
            len: if i == worker_count - 1 {
                per_worker + extra
            } else {
                per_worker
            },
        })
        .collect()
}

#[derive(Clone, Copy, Debug)]
pub struct ChunkDecoder {
    max_workers: NonZeroUsize,
    channel_capacity: NonZeroUsize,
}

impl ChunkDecoder {
    pub fn new(max_workers: NonZeroUsize, channel_capacity: NonZeroUsize) -> Self {
        Self {
            max_workers,
            channel_capacity,
        }
    }

    pub fn from_config(config: &IngestConfig) -> Self {
        Self::new(config.max_workers, config.channel_capacity)
    }

    /// Starts decoding every appearance of the chunk.
    ///
    /// The header is read and checked before returning, the tables are decoded by
    /// shard workers on the blocking thread pool. Must be called from within a tokio runtime.
    pub fn decode<R>(&self, reader: Arc<R>, range_name: &str) -> Result<DecodeStream>
    where
        R: ReadAt + Send + Sync + ?Sized + 'static,
    {
        let range: BlockRange = range_name.parse()?;

        let mut buf = [0u8; INDEX_HEADER_WIDTH];
        reader.read_exact_at(&mut buf, 0).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                Error::format(FileKind::Chunk, range, "truncated header")
            } else {
                Error::Io {
                    op: "read chunk header",
                    source: e,
                }
            }
        })?;
        let header = IndexHeader::from_bytes(&buf);

        let size = reader.len().map_err(Error::io("get chunk size"))?;
        // shard buffers are sized from the header, so it must fit the source
        validate_header(&header, range, size)?;

        let shards = plan_shards(header.address_count, self.max_workers);

        log::debug!(
            "decoding chunk {} with {} addresses and {} appearances using {} shards",
            range,
            header.address_count,
            header.appearance_count,
            shards.len()
        );

        let (tx, rx) = mpsc::channel(self.channel_capacity.get());
        let (err_tx, err_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let handles = shards
            .into_iter()
            .map(|shard| {
                let worker = ShardWorker {
                    reader: reader.clone(),
                    range,
                    header,
                    shard,
                    tx: tx.clone(),
                    cancel: cancel.clone(),
                };
                let err_tx = err_tx.clone();
                let cancel = cancel.clone();

                tokio::task::spawn_blocking(move || {
                    if let Err(e) = worker.run() {
                        err_tx.send(e).ok();
                        cancel.cancel();
                    }
                })
            })
            .collect::<Vec<_>>();

        // The output channel stays open until every worker has been joined,
        // so an error is always queued before the consumer sees the end of the stream.
        let supervisor_cancel = cancel.clone();
        tokio::spawn(async move {
            for handle in handles {
                if let Err(e) = handle.await {
                    err_tx
                        .send(anyhow!("shard worker of chunk {} failed: {}", range, e))
                        .ok();
                    supervisor_cancel.cancel();
                }
            }
            drop(tx);
        });

        Ok(DecodeStream {
            range,
            header,
            appearances: rx,
            errors: err_rx,
            cancel,
            done: false,
        })
    }
}

struct ShardWorker<R: ?Sized> {
    reader: Arc<R>,
    range: BlockRange,
    header: IndexHeader,
    shard: Shard,
    tx: mpsc::Sender<DecodedAppearance>,
    cancel: CancellationToken,
}

impl<R: ReadAt + ?Sized> ShardWorker<R> {
    fn run(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Ok(());
        }

        let start = self.header.addr_table_start()
            + u64::from(self.shard.start) * ADDRESS_RECORD_WIDTH as u64;
        let mut buf = vec![0u8; self.shard.len as usize * ADDRESS_RECORD_WIDTH];
        self.reader
            .read_exact_at(&mut buf, start)
            .map_err(Error::io("read address records"))
            .with_context(|| self.context())?;
        let records = AddressRecord::decode_all(&buf);

        let app_table_start = self.header.app_table_start();

        for record in records {
            if self.cancel.is_cancelled() {
                return Ok(());
            }

            if record.end() > u64::from(self.header.appearance_count) {
                return Err(Error::format(
                    FileKind::Chunk,
                    self.range,
                    format!(
                        "span {}+{} of {} exceeds appearance table of {}",
                        record.offset, record.count, record.address, self.header.appearance_count
                    ),
                ))
                .with_context(|| self.context());
            }

            let mut buf = vec![0u8; record.count as usize * APPEARANCE_RECORD_WIDTH];
            self.reader
                .read_exact_at(
                    &mut buf,
                    app_table_start + u64::from(record.offset) * APPEARANCE_RECORD_WIDTH as u64,
                )
                .map_err(Error::io("read appearance records"))
                .with_context(|| format!("{} address {}", self.context(), record.address))?;

            for app in AppearanceRecord::decode_all(&buf) {
                let decoded = DecodedAppearance {
                    address: record.address,
                    block_number: app.block_number,
                    transaction_index: app.transaction_index,
                };

                if self.tx.blocking_send(decoded).is_err() {
                    // consumer is gone
                    return Ok(());
                }
            }
        }

        Ok(())
    }

    fn context(&self) -> String {
        format!(
            "decode shard {}..{} of chunk {}",
            self.shard.start,
            self.shard.start + self.shard.len,
            self.range
        )
    }
}

/// Decoded appearances of one chunk, in no particular order across shards.
///
/// Dropping the stream cancels the shard workers.
pub struct DecodeStream {
    range: BlockRange,
    header: IndexHeader,
    appearances: mpsc::Receiver<DecodedAppearance>,
    errors: mpsc::UnboundedReceiver<anyhow::Error>,
    cancel: CancellationToken,
    done: bool,
}

impl DecodeStream {
    pub fn range(&self) -> BlockRange {
        self.range
    }

    pub fn header(&self) -> &IndexHeader {
        &self.header
    }

    /// Token shared with the shard workers. Cancelling it stops them before their next address.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Receives the next appearance.
    ///
    /// The first shard error cancels every shard and is returned as the last item.
    /// A stream that was cancelled from outside ends with [`Error::Cancelled`]
    /// instead of silently stopping early.
    pub async fn recv(&mut self) -> Option<Result<DecodedAppearance>> {
        if self.done {
            return None;
        }

        tokio::select! {
            biased;

            Some(e) = self.errors.recv() => {
                self.finish();
                Some(Err(e))
            }
            app = self.appearances.recv() => match app {
                Some(app) => Some(Ok(app)),
                None => {
                    self.done = true;
                    if let Ok(e) = self.errors.try_recv() {
                        self.cancel.cancel();
                        Some(Err(e))
                    } else if self.cancel.is_cancelled() {
                        Some(Err(Error::Cancelled.into()))
                    } else {
                        None
                    }
                }
            },
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancels the workers and waits until all of them have stopped.
    pub async fn drain(mut self) {
        self.finish();
        while self.appearances.recv().await.is_some() {}
    }

    fn finish(&mut self) {
        self.done = true;
        self.cancel.cancel();
    }
}

impl Drop for DecodeStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
