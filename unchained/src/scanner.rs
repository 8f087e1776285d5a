use std::{sync::Arc, time::Instant};

use anyhow::{anyhow, Context, Result};
use futures::{stream::FuturesUnordered, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use unchained_format::{Address, AppearanceRecord, BlockRange, BloomFile, ChunkFile};

use crate::{config::ScanConfig, range_source::RangeSource};

/// Finds every appearance of an address in a chain.
///
/// Each bloom filter is tested on its own blocking task. Ranges whose filter reports a
/// possible match are handed to a single extractor task which searches the chunk and
/// forwards the appearances it finds. Appearances come out grouped by range, in the order
/// filters reported their matches, so the caller sorts if it needs ordering.
pub struct Scanner<S> {
    source: Arc<S>,
    cfg: ScanConfig,
}

impl<S: RangeSource> Scanner<S> {
    pub fn new(source: Arc<S>, cfg: ScanConfig) -> Self {
        Self { source, cfg }
    }

    /// Starts a scan. The receiver ends after the last appearance.
    ///
    /// A failure is sent as the final item, nothing follows it.
    pub fn find(&self, chain: &str, address: Address) -> mpsc::Receiver<Result<AppearanceRecord>> {
        let (tx, rx) = mpsc::channel(self.cfg.output_channel_capacity.get());
        let (hit_tx, hit_rx) = mpsc::channel(self.cfg.hit_channel_capacity.get());

        let extractor = Extractor {
            source: self.source.clone(),
            chain: chain.to_owned(),
            address,
            hit_rx,
            tx,
        };
        tokio::task::spawn_blocking(move || extractor.run());

        tokio::spawn(test_blooms(
            self.source.clone(),
            chain.to_owned(),
            address,
            hit_tx,
        ));

        rx
    }

    /// Runs a scan to completion and collects its appearances.
    pub async fn find_all(&self, chain: &str, address: Address) -> Result<Vec<AppearanceRecord>> {
        let mut rx = self.find(chain, address);

        let mut out = Vec::new();
        while let Some(app) = rx.recv().await {
            out.push(app?);
        }

        Ok(out)
    }
}

async fn test_blooms<S: RangeSource>(
    source: Arc<S>,
    chain: String,
    address: Address,
    hit_tx: mpsc::Sender<Result<String>>,
) {
    if let Err(e) = test_blooms_impl(source, chain, address, hit_tx.clone()).await {
        hit_tx.send(Err(e)).await.ok();
    }
}

async fn test_blooms_impl<S: RangeSource>(
    source: Arc<S>,
    chain: String,
    address: Address,
    hit_tx: mpsc::Sender<Result<String>>,
) -> Result<()> {
    let start_time = Instant::now();

    let blooms = {
        let source = source.clone();
        let list_chain = chain.clone();
        tokio::task::spawn_blocking(move || source.list_bloom_ranges(&list_chain))
            .await
            .context("join bloom listing task")?
            .with_context(|| format!("list bloom filters of {chain}"))?
    };

    let mut tasks: FuturesUnordered<JoinHandle<Result<()>>> = FuturesUnordered::new();

    for (name, locator) in blooms {
        if let Err(e) = name.parse::<BlockRange>() {
            log::warn!("skipping {} in bloom directory: {}", name, e);
            continue;
        }

        let source = source.clone();
        let hit_tx = hit_tx.clone();
        tasks.push(tokio::task::spawn_blocking(move || {
            let reader = source
                .open_bloom(&locator)
                .with_context(|| format!("open bloom {name}"))?;
            let mut bloom =
                BloomFile::open(reader, &name).with_context(|| format!("read bloom {name}"))?;

            if bloom
                .is_member(&address)
                .with_context(|| format!("test bloom {name}"))?
            {
                log::debug!("bloom {} might contain {}", name, address);
                // the extractor is gone if this fails, nobody is waiting for hits anymore
                hit_tx.blocking_send(Ok(name)).ok();
            }

            Ok(())
        }));
    }

    let total = tasks.len();

    while let Some(res) = tasks.next().await {
        res.map_err(|e| anyhow!("join bloom task: {}", e))??;
    }

    log::info!(
        "tested {} bloom filters of {} in {}ms",
        total,
        chain,
        start_time.elapsed().as_millis()
    );

    Ok(())
}

struct Extractor<S> {
    source: Arc<S>,
    chain: String,
    address: Address,
    hit_rx: mpsc::Receiver<Result<String>>,
    tx: mpsc::Sender<Result<AppearanceRecord>>,
}

impl<S: RangeSource> Extractor<S> {
    fn run(mut self) {
        let mut hits = 0;
        let mut found = 0;

        while let Some(hit) = self.hit_rx.blocking_recv() {
            let res = hit.and_then(|name| {
                hits += 1;
                self.extract(&name)
            });

            let appearances = match res {
                Ok(appearances) => appearances,
                Err(e) => {
                    self.tx.blocking_send(Err(e)).ok();
                    return;
                }
            };

            for app in appearances {
                if self.tx.blocking_send(Ok(app)).is_err() {
                    return;
                }
                found += 1;
            }
        }

        log::info!(
            "found {} appearances of {} in {} candidate ranges",
            found,
            self.address,
            hits
        );
    }

    fn extract(&self, name: &str) -> Result<Vec<AppearanceRecord>> {
        let reader = self
            .source
            .open_chunk(&self.chain, name)
            .with_context(|| format!("open chunk {name}"))?;
        let mut chunk =
            ChunkFile::open(reader, name).with_context(|| format!("read chunk {name}"))?;

        let appearances = chunk
            .get_appearances(&self.address)
            .with_context(|| format!("search chunk {name}"))?;

        if appearances.is_empty() {
            log::trace!("false positive in bloom {}", name);
        }

        Ok(appearances)
    }
}
