use std::io::{self, Read, Seek, SeekFrom};

use crate::{
    error::FileKind, Address, BlockRange, BloomHeader, Error, Result, BLOOM_BLOCKS_START,
    BLOOM_BLOCK_WIDTH, BLOOM_HEADER_WIDTH, BLOOM_MAGIC, BLOOM_WIDTH_IN_BITS, BLOOM_WIDTH_IN_BYTES,
};

/// A bloom file opened for membership tests.
///
/// Only the header is read on open. Membership tests seek to the five bytes
/// they need in each bloom block instead of loading the 128KiB bitsets.
pub struct BloomFile<R> {
    reader: R,
    range: BlockRange,
    header: BloomHeader,
    block_count: u32,
}

impl<R: Read + Seek> BloomFile<R> {
    pub fn open(mut reader: R, range_name: &str) -> Result<Self> {
        let range: BlockRange = range_name.parse()?;

        reader
            .seek(SeekFrom::Start(0))
            .map_err(Error::io("seek to bloom header"))?;

        let mut buf = [0u8; BLOOM_HEADER_WIDTH + 4];
        reader.read_exact(&mut buf).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                Error::format(FileKind::Bloom, range, "truncated header")
            } else {
                Error::Io {
                    op: "read bloom header",
                    source: e,
                }
            }
        })?;

        let mut header_buf = [0u8; BLOOM_HEADER_WIDTH];
        header_buf.copy_from_slice(&buf[..BLOOM_HEADER_WIDTH]);
        let header = BloomHeader::from_bytes(&header_buf);

        if header.magic != BLOOM_MAGIC {
            return Err(Error::format(
                FileKind::Bloom,
                range,
                format!("bad magic {:#06x}", header.magic),
            ));
        }

        let count = i32::from_le_bytes([
            buf[BLOOM_HEADER_WIDTH],
            buf[BLOOM_HEADER_WIDTH + 1],
            buf[BLOOM_HEADER_WIDTH + 2],
            buf[BLOOM_HEADER_WIDTH + 3],
        ]);
        let block_count = u32::try_from(count).map_err(|_| {
            Error::format(FileKind::Bloom, range, format!("negative block count {count}"))
        })?;

        let size = reader
            .seek(SeekFrom::End(0))
            .map_err(Error::io("get bloom file size"))?;
        let expected = BLOOM_BLOCKS_START + u64::from(block_count) * BLOOM_BLOCK_WIDTH;
        if size < expected {
            return Err(Error::format(
                FileKind::Bloom,
                range,
                format!("{block_count} blocks need {expected} bytes but file has {size}"),
            ));
        }

        Ok(Self {
            reader,
            range,
            header,
            block_count,
        })
    }

    pub fn range(&self) -> BlockRange {
        self.range
    }

    pub fn header(&self) -> &BloomHeader {
        &self.header
    }

    pub fn block_count(&self) -> u32 {
        self.block_count
    }

    /// Returns true if any bloom block has all bits of the address set.
    ///
    /// Never returns false for an address that was inserted by the indexer,
    /// but can return true for one that wasn't.
    pub fn is_member(&mut self, address: &Address) -> Result<bool> {
        let bits = which_bits(address);

        for block in 0..self.block_count {
            // skip n_inserted
            let bitset_start = BLOOM_BLOCKS_START + u64::from(block) * BLOOM_BLOCK_WIDTH + 4;
            if self.block_has_bits(bitset_start, &bits)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn block_has_bits(&mut self, bitset_start: u64, bits: &[u32; 5]) -> Result<bool> {
        for &bit in bits.iter() {
            let (index, mask) = bit_position(bit);

            self.reader
                .seek(SeekFrom::Start(bitset_start + index as u64))
                .map_err(Error::io("seek to bloom byte"))?;
            let mut byte = [0u8; 1];
            self.reader
                .read_exact(&mut byte)
                .map_err(Error::io("read bloom byte"))?;

            if byte[0] & mask == 0 {
                return Ok(false);
            }
        }

        Ok(true)
    }
}

/// Splits the address into five big endian words and maps each one to a bit of a bloom block.
pub fn which_bits(address: &Address) -> [u32; 5] {
    let bytes = address.as_slice();
    let mut bits = [0u32; 5];

    for (bit, word) in bits.iter_mut().zip(bytes.chunks_exact(4)) {
        let word = u32::from_be_bytes([word[0], word[1], word[2], word[3]]);
        *bit = word % BLOOM_WIDTH_IN_BITS;
    }

    bits
}

/// Byte index inside the bitset and the mask for the given bit.
///
/// Bytes are stored in reverse order relative to bit numbering.
pub fn bit_position(bit: u32) -> (usize, u8) {
    let index = BLOOM_WIDTH_IN_BYTES - 1 - (bit / 8) as usize;
    let mask = 1u8 << (bit % 8);
    (index, mask)
}
