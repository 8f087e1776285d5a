use std::{io::Write as _, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use unchained_format::{Address, AppearanceRecord};
use unchained_ingest::{AppearanceBatch, ChunkStatus, Ingest, IngestConfig, StatusLog};

use crate::{
    config::{Config, ScanConfig},
    range_source::FsRangeSource,
    scanner::Scanner,
    sink::{AppearanceSink, JsonLinesSink},
    Args, Command,
};

pub struct UnchainedRunner;

impl UnchainedRunner {
    pub async fn run(args: Args) -> Result<()> {
        let cfg = tokio::fs::read_to_string(&args.config_path)
            .await
            .context("read config file")?;
        let cfg: Config = toml::de::from_str(&cfg).context("parse config")?;

        match args.command {
            Command::Find {
                address,
                chain,
                sort,
            } => find(cfg.index.path, cfg.scan, &chain, address, sort).await,
            Command::Ingest {
                chain,
                from_block,
                to_block,
            } => {
                let sink_cfg = cfg
                    .sink
                    .context("ingest needs a [sink] section in config")?;
                let sink = JsonLinesSink::open(&sink_cfg.path)
                    .await
                    .context("open sink")?;

                let mut ingest_cfg = cfg.ingest;
                if from_block.is_some() {
                    ingest_cfg.from_block = from_block;
                }
                if to_block.is_some() {
                    ingest_cfg.to_block = to_block;
                }

                let source = FsRangeSource::new(&cfg.index.path);
                ingest(ingest_cfg, source.chunk_dir(&chain), sink).await
            }
        }
    }
}

async fn find(
    index_path: PathBuf,
    scan_cfg: ScanConfig,
    chain: &str,
    address: Address,
    sort: bool,
) -> Result<()> {
    let scanner = Scanner::new(Arc::new(FsRangeSource::new(&index_path)), scan_cfg);

    if sort {
        let mut apps = scanner
            .find_all(chain, address)
            .await
            .context("find appearances")?;
        apps.sort();
        return print_appearances(&apps);
    }

    let mut rx = scanner.find(chain, address);
    while let Some(app) = rx.recv().await {
        let app = app.context("find appearances")?;
        print_appearances(&[app])?;
    }

    Ok(())
}

fn print_appearances(apps: &[AppearanceRecord]) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for app in apps {
        writeln!(out, "{}\t{}", app.block_number, app.transaction_index)
            .context("write to stdout")?;
    }
    Ok(())
}

/// Drives an ingest run into `sink`, recording each finished chunk in the status log.
pub(crate) async fn ingest<S: AppearanceSink>(
    cfg: IngestConfig,
    chunk_dir: PathBuf,
    sink: S,
) -> Result<()> {
    let status = cfg
        .status_path
        .as_deref()
        .map(StatusLog::open)
        .transpose()
        .context("open status log")?;

    let ingest = Ingest::spawn(cfg, chunk_dir, status.clone());

    Write {
        ingest,
        sink,
        status,
    }
    .ingest()
    .await
}

struct Write<S> {
    ingest: Ingest,
    sink: S,
    status: Option<StatusLog>,
}

impl<S: AppearanceSink> Write<S> {
    async fn ingest(mut self) -> Result<()> {
        while let Some(batch) = self.ingest.recv().await {
            let batch = batch.context("decode chunks")?;

            let res = self.write_batch(&batch).await;
            if let Err(e) = res {
                self.record(ChunkStatus::AppearanceError, &batch.chunk_name)?;
                return Err(e.context(format!("write appearances of {}", batch.chunk_name)));
            }

            if batch.last_in_chunk {
                self.record(ChunkStatus::Done, &batch.chunk_name)?;
                log::debug!("wrote chunk {}", batch.chunk_name);
            }
        }

        Ok(())
    }

    async fn write_batch(&mut self, batch: &AppearanceBatch) -> Result<()> {
        self.sink.insert_batch(batch).await?;
        if batch.last_in_chunk {
            self.sink.flush().await?;
        }
        Ok(())
    }

    fn record(&self, status: ChunkStatus, chunk_name: &str) -> Result<()> {
        match self.status.as_ref() {
            Some(log) => log
                .record(status, chunk_name)
                .context("record chunk status"),
            None => Ok(()),
        }
    }
}
