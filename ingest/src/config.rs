use std::{num::NonZeroUsize, path::PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct IngestConfig {
    /// Upper limit of concurrent shard workers decoding a single chunk.
    ///
    /// A chunk with fewer addresses than this uses one worker per address.
    #[serde(default = "default_max_workers")]
    pub max_workers: NonZeroUsize,
    /// Number of appearances handed to the sink at once
    #[serde(default = "default_batch_size")]
    pub batch_size: NonZeroUsize,
    /// Capacity of the channel shard workers write decoded appearances into
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: NonZeroUsize,
    /// Skip chunks that end before this block
    pub from_block: Option<u64>,
    /// Skip chunks that start after this block
    pub to_block: Option<u64>,
    /// File to append per chunk status lines to
    pub status_path: Option<PathBuf>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            batch_size: default_batch_size(),
            channel_capacity: default_channel_capacity(),
            from_block: None,
            to_block: None,
            status_path: None,
        }
    }
}

fn non_zero(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap_or(NonZeroUsize::MIN)
}

fn default_max_workers() -> NonZeroUsize {
    non_zero(100)
}

fn default_batch_size() -> NonZeroUsize {
    non_zero(5000)
}

fn default_channel_capacity() -> NonZeroUsize {
    non_zero(10_000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg: IngestConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.max_workers.get(), 100);
        assert_eq!(cfg.batch_size.get(), 5000);
        assert_eq!(cfg.channel_capacity.get(), 10_000);
        assert!(cfg.from_block.is_none());

        let cfg: IngestConfig = toml::from_str(
            r#"
            max_workers = 8
            batch_size = 10
            from_block = 100
            status_path = "/tmp/status.txt"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.max_workers.get(), 8);
        assert_eq!(cfg.batch_size.get(), 10);
        assert_eq!(cfg.from_block, Some(100));
        assert_eq!(cfg.status_path, Some(PathBuf::from("/tmp/status.txt")));

        assert!(toml::from_str::<IngestConfig>("max_workers = 0").is_err());
    }
}
