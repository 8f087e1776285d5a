//! Builders for synthetic chunk and bloom files.
//!
//! Production files are written by the indexer; these exist so readers can be
//! exercised against files with known contents.

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use crate::{
    bit_position, which_bits, Address, AddressRecord, AppearanceRecord, BlockRange, BloomHeader,
    IndexHeader, BLOOM_MAGIC, BLOOM_WIDTH_IN_BYTES, CHUNK_MAGIC, MAX_ADDRS_IN_BLOOM,
};

/// Deterministic, well spread address for the given index. Distinct indices give distinct addresses.
pub fn address_from_index(i: u32) -> Address {
    let mut bytes = [0u8; 20];
    bytes[..4].copy_from_slice(&i.wrapping_mul(2_654_435_761).to_be_bytes());
    bytes[4..8].copy_from_slice(&i.rotate_left(13).to_be_bytes());
    bytes[8..12].copy_from_slice(&(!i).to_be_bytes());
    bytes[16..].copy_from_slice(&i.to_be_bytes());
    Address::from(bytes)
}

#[derive(Default)]
pub struct ChunkBuilder {
    appearances: BTreeMap<Address, Vec<AppearanceRecord>>,
}

impl ChunkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, address: Address, block_number: u32, transaction_index: u32) -> &mut Self {
        self.appearances
            .entry(address)
            .or_default()
            .push(AppearanceRecord::new(block_number, transaction_index));
        self
    }

    pub fn addresses(&self) -> impl Iterator<Item = &Address> {
        self.appearances.keys()
    }

    pub fn appearances_of(&self, address: &Address) -> &[AppearanceRecord] {
        self.appearances
            .get(address)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn address_count(&self) -> u32 {
        self.appearances.len() as u32
    }

    pub fn appearance_count(&self) -> u64 {
        self.appearances.values().map(|a| a.len() as u64).sum()
    }

    /// Serializes the chunk. Addresses are written in ascending byte order.
    pub fn build(&self) -> Vec<u8> {
        let header = IndexHeader {
            magic: CHUNK_MAGIC,
            hash: [0; 32],
            address_count: self.address_count(),
            appearance_count: self.appearance_count() as u32,
        };

        let mut out = header.to_bytes().to_vec();
        let mut offset = 0u32;
        for (address, apps) in self.appearances.iter() {
            let record = AddressRecord {
                address: *address,
                offset,
                count: apps.len() as u32,
            };
            out.extend_from_slice(&record.to_bytes());
            offset += record.count;
        }
        for app in self.appearances.values().flatten() {
            out.extend_from_slice(&app.to_bytes());
        }

        out
    }

    /// A bloom file over exactly this chunk's addresses.
    pub fn bloom(&self) -> BloomBuilder {
        let mut bloom = BloomBuilder::new();
        for address in self.addresses() {
            bloom.insert(address);
        }
        bloom
    }
}

pub struct BloomBuilder {
    block_capacity: u32,
    blocks: Vec<(u32, Vec<u8>)>,
}

impl Default for BloomBuilder {
    fn default() -> Self {
        Self::with_block_capacity(MAX_ADDRS_IN_BLOOM)
    }
}

impl BloomBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new bloom block after every `block_capacity` insertions.
    pub fn with_block_capacity(block_capacity: u32) -> Self {
        Self {
            block_capacity,
            blocks: Vec::new(),
        }
    }

    pub fn insert(&mut self, address: &Address) -> &mut Self {
        let needs_block = match self.blocks.last() {
            Some((n_inserted, _)) => *n_inserted >= self.block_capacity,
            None => true,
        };
        if needs_block {
            self.blocks.push((0, vec![0u8; BLOOM_WIDTH_IN_BYTES]));
        }

        if let Some((n_inserted, bitset)) = self.blocks.last_mut() {
            for bit in which_bits(address) {
                let (index, mask) = bit_position(bit);
                bitset[index] |= mask;
            }
            *n_inserted += 1;
        }

        self
    }

    pub fn build(&self) -> Vec<u8> {
        let header = BloomHeader {
            magic: BLOOM_MAGIC,
            hash: [0; 32],
        };

        let mut out = header.to_bytes().to_vec();
        out.extend_from_slice(&(self.blocks.len() as i32).to_le_bytes());
        for (n_inserted, bitset) in self.blocks.iter() {
            out.extend_from_slice(&n_inserted.to_le_bytes());
            out.extend_from_slice(bitset);
        }

        out
    }
}

/// Writes `{chain}/blooms/{range}.bloom` and `{chain}/finalized/{range}.bin` under `index_path`.
///
/// Returns the path of the chunk file.
pub fn write_range(
    index_path: &Path,
    chain: &str,
    range: BlockRange,
    chunk: &ChunkBuilder,
) -> io::Result<PathBuf> {
    let mut chain_path = index_path.to_owned();
    chain_path.push(chain);

    let mut bloom_path = chain_path.clone();
    bloom_path.push("blooms");
    fs::create_dir_all(&bloom_path)?;
    bloom_path.push(format!("{}.bloom", range.file_stem()));
    fs::write(&bloom_path, chunk.bloom().build())?;

    let mut chunk_path = chain_path;
    chunk_path.push("finalized");
    fs::create_dir_all(&chunk_path)?;
    chunk_path.push(format!("{}.bin", range.file_stem()));
    fs::write(&chunk_path, chunk.build())?;

    Ok(chunk_path)
}
