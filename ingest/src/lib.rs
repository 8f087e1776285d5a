mod config;
mod decode;
mod dir;
mod ingest;
mod progress;
mod status;
mod types;
mod validate;

pub use config::IngestConfig;
pub use decode::{plan_shards, ChunkDecoder, DecodeStream, Shard};
pub use dir::{list_chunks, ChunkPath};
pub use ingest::Ingest;
pub use progress::Progress;
pub use status::{ChunkStatus, StatusLog};
pub use types::{AppearanceBatch, DecodedAppearance};
pub use validate::validate_decoded_count;
