mod bloom;
mod chunk;
mod error;
mod read_at;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
mod types;

pub use bloom::{bit_position, which_bits, BloomFile};
pub use chunk::{validate_header, ChunkFile};
pub use error::{Error, FileKind, Result};
pub use read_at::ReadAt;
pub use types::{
    Address, AddressRecord, AppearanceRecord, BlockRange, BloomHeader, IndexHeader,
    ADDRESS_RECORD_WIDTH, APPEARANCE_RECORD_WIDTH, BLOOM_BLOCKS_START, BLOOM_BLOCK_WIDTH,
    BLOOM_HEADER_WIDTH, BLOOM_MAGIC, BLOOM_WIDTH_IN_BITS, BLOOM_WIDTH_IN_BYTES, CHUNK_MAGIC,
    INDEX_HEADER_WIDTH, MAX_ADDRS_IN_BLOOM,
};
