use std::{num::NonZeroUsize, path::PathBuf};

use serde::{Deserialize, Serialize};
use unchained_ingest::IngestConfig;

#[derive(Serialize, Deserialize)]
pub struct Config {
    /// Location of the Unchained Index
    pub index: IndexConfig,
    /// Config for address scans
    #[serde(default)]
    pub scan: ScanConfig,
    /// Config for bulk chunk decoding
    #[serde(default)]
    pub ingest: IngestConfig,
    /// Destination of decoded appearances, required by the ingest command
    pub sink: Option<SinkConfig>,
}

#[derive(Serialize, Deserialize)]
pub struct IndexConfig {
    /// Root directory of the index.
    ///
    /// Each chain lives in `{path}/{chain}` with `blooms/` and `finalized/` subdirectories.
    pub path: PathBuf,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug)]
pub struct ScanConfig {
    /// Capacity of the channel bloom tests write matching range names into
    #[serde(default = "default_channel_capacity")]
    pub hit_channel_capacity: NonZeroUsize,
    /// Capacity of the channel appearances are handed to the caller through
    #[serde(default = "default_channel_capacity")]
    pub output_channel_capacity: NonZeroUsize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            hit_channel_capacity: default_channel_capacity(),
            output_channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_channel_capacity() -> NonZeroUsize {
    NonZeroUsize::new(100).unwrap_or(NonZeroUsize::MIN)
}

#[derive(Serialize, Deserialize)]
pub struct SinkConfig {
    /// File decoded appearances are appended to, one JSON object per line
    pub path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let cfg: Config = toml::from_str(
            r#"
            [index]
            path = "/data/unchained"

            [scan]
            hit_channel_capacity = 10

            [ingest]
            batch_size = 100

            [sink]
            path = "appearances.jsonl"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.index.path, PathBuf::from("/data/unchained"));
        assert_eq!(cfg.scan.hit_channel_capacity.get(), 10);
        assert_eq!(cfg.scan.output_channel_capacity.get(), 100);
        assert_eq!(cfg.ingest.batch_size.get(), 100);
        assert_eq!(cfg.ingest.max_workers.get(), 100);
        assert_eq!(
            cfg.sink.map(|s| s.path),
            Some(PathBuf::from("appearances.jsonl"))
        );

        let cfg: Config = toml::from_str("[index]\npath = \"idx\"").unwrap();
        assert!(cfg.sink.is_none());
        assert_eq!(cfg.scan.hit_channel_capacity.get(), 100);
    }
}
