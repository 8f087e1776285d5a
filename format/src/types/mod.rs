use serde::{Deserialize, Serialize};

mod address;
mod block_range;

pub use address::Address;
pub use block_range::BlockRange;

/// Magic number at the start of every chunk file.
pub const CHUNK_MAGIC: u32 = 0xdead_beef;
/// Magic number at the start of every bloom file.
pub const BLOOM_MAGIC: u16 = 0xdead;

pub const INDEX_HEADER_WIDTH: usize = 44;
pub const ADDRESS_RECORD_WIDTH: usize = 28;
pub const APPEARANCE_RECORD_WIDTH: usize = 8;

/// Number of bits in the bitset of a single bloom block.
pub const BLOOM_WIDTH_IN_BITS: u32 = 1_048_576;
/// Number of bytes in the bitset of a single bloom block.
pub const BLOOM_WIDTH_IN_BYTES: usize = (BLOOM_WIDTH_IN_BITS / 8) as usize;
/// Maximum number of addresses inserted into one bloom block before the
/// indexer starts a new one.
pub const MAX_ADDRS_IN_BLOOM: u32 = 50_000;

/// Magic (2 bytes) followed by the hash (32 bytes).
pub const BLOOM_HEADER_WIDTH: usize = 34;
/// Offset of the first bloom block, right after the header and the block count.
pub const BLOOM_BLOCKS_START: u64 = BLOOM_HEADER_WIDTH as u64 + 4;
/// `n_inserted` followed by the bitset.
pub const BLOOM_BLOCK_WIDTH: u64 = 4 + BLOOM_WIDTH_IN_BYTES as u64;

fn le_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn hash_at(buf: &[u8], at: usize) -> [u8; 32] {
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&buf[at..at + 32]);
    hash
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexHeader {
    pub magic: u32,
    /// Content digest written by the indexer. Never verified on the read path.
    pub hash: [u8; 32],
    pub address_count: u32,
    pub appearance_count: u32,
}

impl IndexHeader {
    pub fn from_bytes(buf: &[u8; INDEX_HEADER_WIDTH]) -> Self {
        Self {
            magic: le_u32(buf, 0),
            hash: hash_at(buf, 4),
            address_count: le_u32(buf, 36),
            appearance_count: le_u32(buf, 40),
        }
    }

    pub fn to_bytes(&self) -> [u8; INDEX_HEADER_WIDTH] {
        let mut buf = [0u8; INDEX_HEADER_WIDTH];
        buf[..4].copy_from_slice(&self.magic.to_le_bytes());
        buf[4..36].copy_from_slice(&self.hash);
        buf[36..40].copy_from_slice(&self.address_count.to_le_bytes());
        buf[40..].copy_from_slice(&self.appearance_count.to_le_bytes());
        buf
    }

    /// Byte offset of the address table.
    pub fn addr_table_start(&self) -> u64 {
        INDEX_HEADER_WIDTH as u64
    }

    /// Byte offset of the appearance table.
    pub fn app_table_start(&self) -> u64 {
        self.addr_table_start() + u64::from(self.address_count) * ADDRESS_RECORD_WIDTH as u64
    }

    /// Minimum size of a chunk file holding this header's tables.
    pub fn file_size(&self) -> u64 {
        self.app_table_start() + u64::from(self.appearance_count) * APPEARANCE_RECORD_WIDTH as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressRecord {
    pub address: Address,
    /// Index into the appearance table, in records.
    pub offset: u32,
    pub count: u32,
}

impl AddressRecord {
    pub fn from_bytes(buf: &[u8; ADDRESS_RECORD_WIDTH]) -> Self {
        let mut address = [0u8; 20];
        address.copy_from_slice(&buf[..20]);

        Self {
            address: address.into(),
            offset: le_u32(buf, 20),
            count: le_u32(buf, 24),
        }
    }

    pub fn to_bytes(&self) -> [u8; ADDRESS_RECORD_WIDTH] {
        let mut buf = [0u8; ADDRESS_RECORD_WIDTH];
        buf[..20].copy_from_slice(self.address.as_slice());
        buf[20..24].copy_from_slice(&self.offset.to_le_bytes());
        buf[24..].copy_from_slice(&self.count.to_le_bytes());
        buf
    }

    /// Decodes consecutive records. Trailing bytes that don't form a whole record are ignored.
    pub fn decode_all(buf: &[u8]) -> Vec<Self> {
        buf.chunks_exact(ADDRESS_RECORD_WIDTH)
            .map(|rec| {
                let mut address = [0u8; 20];
                address.copy_from_slice(&rec[..20]);
                Self {
                    address: address.into(),
                    offset: le_u32(rec, 20),
                    count: le_u32(rec, 24),
                }
            })
            .collect()
    }

    /// Exclusive end of this record's span in the appearance table.
    pub fn end(&self) -> u64 {
        u64::from(self.offset) + u64::from(self.count)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppearanceRecord {
    pub block_number: u32,
    pub transaction_index: u32,
}

impl AppearanceRecord {
    pub fn new(block_number: u32, transaction_index: u32) -> Self {
        Self {
            block_number,
            transaction_index,
        }
    }

    pub fn to_bytes(&self) -> [u8; APPEARANCE_RECORD_WIDTH] {
        let mut buf = [0u8; APPEARANCE_RECORD_WIDTH];
        buf[..4].copy_from_slice(&self.block_number.to_le_bytes());
        buf[4..].copy_from_slice(&self.transaction_index.to_le_bytes());
        buf
    }

    pub fn decode_all(buf: &[u8]) -> Vec<Self> {
        buf.chunks_exact(APPEARANCE_RECORD_WIDTH)
            .map(|rec| Self::new(le_u32(rec, 0), le_u32(rec, 4)))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BloomHeader {
    pub magic: u16,
    pub hash: [u8; 32],
}

impl BloomHeader {
    pub fn from_bytes(buf: &[u8; BLOOM_HEADER_WIDTH]) -> Self {
        Self {
            magic: u16::from_le_bytes([buf[0], buf[1]]),
            hash: hash_at(buf, 2),
        }
    }

    pub fn to_bytes(&self) -> [u8; BLOOM_HEADER_WIDTH] {
        let mut buf = [0u8; BLOOM_HEADER_WIDTH];
        buf[..2].copy_from_slice(&self.magic.to_le_bytes());
        buf[2..].copy_from_slice(&self.hash);
        buf
    }
}
