use std::{env::temp_dir, fs, num::NonZeroUsize, path::PathBuf, sync::Arc};

use anyhow::{anyhow, Result};
use hex_literal::hex;
use unchained_format::{
    test_utils::{address_from_index, write_range, ChunkBuilder},
    Address, AppearanceRecord, BlockRange, BloomFile, ChunkFile,
};
use unchained_ingest::{AppearanceBatch, DecodedAppearance, IngestConfig};

use crate::{
    unchained_runner::ingest, AppearanceSink, Args, Command, FsRangeSource, RangeSource,
    ScanConfig, Scanner, UnchainedRunner,
};

const AA: Address = Address::new(hex!("aa00000000000000000000000000000000000001"));
const BB: Address = Address::new(hex!("bb00000000000000000000000000000000000002"));
const CC: Address = Address::new(hex!("cc00000000000000000000000000000000000003"));

fn temp_index() -> PathBuf {
    let mut tmp = temp_dir();
    tmp.push(format!("{}", uuid::Uuid::new_v4()));
    fs::create_dir_all(&tmp).unwrap();
    tmp
}

fn scenario_chunk() -> ChunkBuilder {
    let mut chunk = ChunkBuilder::new();
    chunk.add(AA, 100, 0).add(AA, 100, 1).add(BB, 105, 2);
    chunk
}

#[tokio::test(flavor = "multi_thread")]
async fn test_single_range_scan() {
    let index = temp_index();
    write_range(&index, "mainnet", BlockRange(100, 199), &scenario_chunk()).unwrap();

    let source = FsRangeSource::new(&index);
    let blooms = source.list_bloom_ranges("mainnet").unwrap();
    let locator = &blooms["000000100-000000199"];

    let mut bloom = BloomFile::open(source.open_bloom(locator).unwrap(), "000000100-000000199")
        .unwrap();
    assert!(bloom.is_member(&AA).unwrap());
    assert!(bloom.is_member(&BB).unwrap());
    assert!(!bloom.is_member(&CC).unwrap());

    let mut chunk = ChunkFile::open(
        source.open_chunk("mainnet", "000000100-000000199").unwrap(),
        "000000100-000000199",
    )
    .unwrap();
    assert!(chunk.find_address(&CC).unwrap().is_none());
    assert_eq!(
        chunk.get_appearances(&BB).unwrap(),
        vec![AppearanceRecord::new(105, 2)]
    );

    let scanner = Scanner::new(Arc::new(source), ScanConfig::default());
    assert_eq!(
        scanner.find_all("mainnet", AA).await.unwrap(),
        vec![AppearanceRecord::new(100, 0), AppearanceRecord::new(100, 1)]
    );
    assert!(scanner.find_all("mainnet", CC).await.unwrap().is_empty());

    fs::remove_dir_all(&index).unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_scan_many_ranges() {
    let index = temp_index();
    let target = address_from_index(5);

    let mut expected = Vec::new();
    for r in 0..20u32 {
        let mut chunk = ChunkBuilder::new();
        for i in 0..50 {
            chunk.add(address_from_index(i + 100), r * 100 + i, 0);
        }
        if r % 3 == 0 {
            chunk.add(target, r * 100 + 7, r);
            expected.push(AppearanceRecord::new(r * 100 + 7, r));
        }
        let range = BlockRange(u64::from(r) * 100, u64::from(r) * 100 + 99);
        write_range(&index, "mainnet", range, &chunk).unwrap();
    }

    // stray files next to the blooms are not ranges
    let mut stray = index.clone();
    stray.push("mainnet/blooms/checksums.bloom");
    fs::write(&stray, b"").unwrap();

    let cfg = ScanConfig {
        hit_channel_capacity: NonZeroUsize::new(1).unwrap(),
        output_channel_capacity: NonZeroUsize::new(2).unwrap(),
    };
    let scanner = Scanner::new(Arc::new(FsRangeSource::new(&index)), cfg);

    let mut found = scanner.find_all("mainnet", target).await.unwrap();
    found.sort();
    assert_eq!(found, expected);

    fs::remove_dir_all(&index).unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_scan_truncated_chunk_fails() {
    let index = temp_index();
    write_range(&index, "mainnet", BlockRange(0, 99), &scenario_chunk()).unwrap();
    let chunk_path =
        write_range(&index, "mainnet", BlockRange(100, 199), &scenario_chunk()).unwrap();

    let data = fs::read(&chunk_path).unwrap();
    fs::write(&chunk_path, &data[..data.len() - 4]).unwrap();

    let scanner = Scanner::new(Arc::new(FsRangeSource::new(&index)), ScanConfig::default());
    let err = scanner.find_all("mainnet", AA).await.unwrap_err();
    assert!(format!("{:?}", err).contains("000000100-000000199"));

    fs::remove_dir_all(&index).unwrap();
}

#[derive(Default)]
struct VecSink {
    appearances: Vec<DecodedAppearance>,
    flushed_chunks: Vec<String>,
    fail_on: Option<String>,
}

#[async_trait::async_trait]
impl AppearanceSink for &mut VecSink {
    async fn insert_batch(&mut self, batch: &AppearanceBatch) -> Result<()> {
        if self.fail_on.as_deref() == Some(batch.chunk_name.as_str()) {
            return Err(anyhow!("sink rejected {}", batch.chunk_name));
        }
        self.appearances.extend_from_slice(&batch.appearances);
        if batch.last_in_chunk {
            self.flushed_chunks.push(batch.chunk_name.clone());
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

fn ingest_config(index: &std::path::Path) -> IngestConfig {
    let mut status_path = index.to_owned();
    status_path.push("status.txt");

    IngestConfig {
        batch_size: NonZeroUsize::new(2).unwrap(),
        status_path: Some(status_path),
        ..Default::default()
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ingest_into_sink() {
    let index = temp_index();
    write_range(&index, "mainnet", BlockRange(0, 99), &scenario_chunk()).unwrap();
    let mut second = ChunkBuilder::new();
    second.add(CC, 150, 0);
    write_range(&index, "mainnet", BlockRange(100, 199), &second).unwrap();

    let source = FsRangeSource::new(&index);
    let cfg = ingest_config(&index);
    let status_path = cfg.status_path.clone().unwrap();

    let mut sink = VecSink::default();
    ingest(cfg, source.chunk_dir("mainnet"), &mut sink)
        .await
        .unwrap();

    sink.appearances.sort();
    assert_eq!(
        sink.appearances,
        vec![
            DecodedAppearance {
                address: AA,
                block_number: 100,
                transaction_index: 0
            },
            DecodedAppearance {
                address: AA,
                block_number: 100,
                transaction_index: 1
            },
            DecodedAppearance {
                address: BB,
                block_number: 105,
                transaction_index: 2
            },
            DecodedAppearance {
                address: CC,
                block_number: 150,
                transaction_index: 0
            },
        ]
    );
    assert_eq!(
        sink.flushed_chunks,
        vec!["000000100-000000199", "000000000-000000099"]
    );
    assert_eq!(
        fs::read_to_string(&status_path).unwrap(),
        "done\t000000100-000000199\ndone\t000000000-000000099\n"
    );

    fs::remove_dir_all(&index).unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ingest_sink_failure_is_recorded() {
    let index = temp_index();
    write_range(&index, "mainnet", BlockRange(0, 99), &scenario_chunk()).unwrap();
    write_range(&index, "mainnet", BlockRange(100, 199), &scenario_chunk()).unwrap();
    write_range(&index, "mainnet", BlockRange(200, 299), &scenario_chunk()).unwrap();

    let source = FsRangeSource::new(&index);
    let cfg = ingest_config(&index);
    let status_path = cfg.status_path.clone().unwrap();

    let mut sink = VecSink {
        fail_on: Some("000000100-000000199".to_owned()),
        ..Default::default()
    };
    let err = ingest(cfg, source.chunk_dir("mainnet"), &mut sink)
        .await
        .unwrap_err();
    assert!(format!("{:?}", err).contains("sink rejected"));

    // newest chunks are ingested first
    assert_eq!(sink.flushed_chunks, vec!["000000200-000000299"]);
    assert_eq!(
        fs::read_to_string(&status_path).unwrap(),
        "done\t000000200-000000299\nappearance-error\t000000100-000000199\n"
    );

    fs::remove_dir_all(&index).unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_run_ingest_command() {
    let index = temp_index();
    write_range(&index, "sepolia", BlockRange(0, 99), &scenario_chunk()).unwrap();
    write_range(&index, "sepolia", BlockRange(100, 199), &scenario_chunk()).unwrap();

    let mut sink_path = index.clone();
    sink_path.push("out.jsonl");
    let mut config_path = index.clone();
    config_path.push("unchained.toml");
    fs::write(
        &config_path,
        format!(
            "[index]\npath = {:?}\n\n[sink]\npath = {:?}\n",
            index.display().to_string(),
            sink_path.display().to_string()
        ),
    )
    .unwrap();

    let args = Args {
        config_path,
        command: Command::Ingest {
            chain: "sepolia".to_owned(),
            from_block: Some(100),
            to_block: None,
        },
    };
    UnchainedRunner::run(args).await.unwrap();

    let content = fs::read_to_string(&sink_path).unwrap();
    let mut decoded = content
        .lines()
        .map(|l| serde_json::from_str::<DecodedAppearance>(l).unwrap())
        .collect::<Vec<_>>();
    decoded.sort();
    assert_eq!(decoded.len(), 3);
    assert_eq!(decoded[0].address, AA);
    assert_eq!(decoded[2].block_number, 105);

    fs::remove_dir_all(&index).unwrap();
}
