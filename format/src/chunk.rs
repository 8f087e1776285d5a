use std::io::{self, Read, Seek, SeekFrom};

use crate::{
    error::FileKind, Address, AddressRecord, AppearanceRecord, BlockRange, Error, IndexHeader,
    Result, ADDRESS_RECORD_WIDTH, APPEARANCE_RECORD_WIDTH, CHUNK_MAGIC, INDEX_HEADER_WIDTH,
};

/// A chunk file opened for point lookups.
///
/// The address and appearance tables stay on disk, every lookup is a
/// handful of seeked reads.
pub struct ChunkFile<R> {
    reader: R,
    range: BlockRange,
    header: IndexHeader,
}

impl<R: Read + Seek> ChunkFile<R> {
    pub fn open(mut reader: R, range_name: &str) -> Result<Self> {
        let range: BlockRange = range_name.parse()?;

        reader
            .seek(SeekFrom::Start(0))
            .map_err(Error::io("seek to chunk header"))?;

        let mut buf = [0u8; INDEX_HEADER_WIDTH];
        reader.read_exact(&mut buf).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                Error::format(FileKind::Chunk, range, "truncated header")
            } else {
                Error::Io {
                    op: "read chunk header",
                    source: e,
                }
            }
        })?;
        let header = IndexHeader::from_bytes(&buf);

        let size = reader
            .seek(SeekFrom::End(0))
            .map_err(Error::io("get chunk file size"))?;
        validate_header(&header, range, size)?;

        Ok(Self {
            reader,
            range,
            header,
        })
    }

    pub fn range(&self) -> BlockRange {
        self.range
    }

    pub fn header(&self) -> &IndexHeader {
        &self.header
    }

    /// Reads the address record stored at the given position of the address table.
    pub fn address_record_at(&mut self, position: u32) -> Result<AddressRecord> {
        if position >= self.header.address_count {
            return Err(Error::format(
                FileKind::Chunk,
                self.range,
                format!(
                    "address position {position} out of {}",
                    self.header.address_count
                ),
            ));
        }

        let location =
            self.header.addr_table_start() + u64::from(position) * ADDRESS_RECORD_WIDTH as u64;
        self.reader
            .seek(SeekFrom::Start(location))
            .map_err(Error::io("seek to address record"))?;

        let mut buf = [0u8; ADDRESS_RECORD_WIDTH];
        self.reader
            .read_exact(&mut buf)
            .map_err(Error::io("read address record"))?;

        Ok(AddressRecord::from_bytes(&buf))
    }

    /// Binary searches the on-disk address table.
    ///
    /// Returns `None` if the address is not in this chunk.
    pub fn find_address(&mut self, address: &Address) -> Result<Option<AddressRecord>> {
        let mut low = 0u32;
        let mut high = self.header.address_count;

        // find the first position whose address is >= target
        while low < high {
            let mid = low + (high - low) / 2;
            let record = self.address_record_at(mid)?;
            if record.address >= *address {
                high = mid;
            } else {
                low = mid + 1;
            }
        }

        if low == self.header.address_count {
            return Ok(None);
        }

        let record = self.address_record_at(low)?;
        Ok((record.address == *address).then_some(record))
    }

    /// Reads the appearance span of the given record, in on-disk order.
    pub fn read_appearances(&mut self, record: &AddressRecord) -> Result<Vec<AppearanceRecord>> {
        if record.end() > u64::from(self.header.appearance_count) {
            return Err(Error::format(
                FileKind::Chunk,
                self.range,
                format!(
                    "span {}+{} of {} exceeds appearance table of {}",
                    record.offset, record.count, record.address, self.header.appearance_count
                ),
            ));
        }

        let location = self.header.app_table_start()
            + u64::from(record.offset) * APPEARANCE_RECORD_WIDTH as u64;
        self.reader
            .seek(SeekFrom::Start(location))
            .map_err(Error::io("seek to appearance records"))?;

        let mut buf = vec![0u8; record.count as usize * APPEARANCE_RECORD_WIDTH];
        self.reader
            .read_exact(&mut buf)
            .map_err(Error::io("read appearance records"))?;

        Ok(AppearanceRecord::decode_all(&buf))
    }

    /// Finds the address and reads its appearances. Empty if the address is absent.
    pub fn get_appearances(&mut self, address: &Address) -> Result<Vec<AppearanceRecord>> {
        match self.find_address(address)? {
            Some(record) => self.read_appearances(&record),
            None => Ok(Vec::new()),
        }
    }
}

/// Checks the magic and that a source of `size` bytes holds every table the header declares.
///
/// The hash is not verified.
pub fn validate_header(header: &IndexHeader, range: BlockRange, size: u64) -> Result<()> {
    if header.magic != CHUNK_MAGIC {
        return Err(Error::format(
            FileKind::Chunk,
            range,
            format!("bad magic {:#010x}", header.magic),
        ));
    }

    if size < header.file_size() {
        return Err(Error::format(
            FileKind::Chunk,
            range,
            format!(
                "tables need {} bytes but file has {size}",
                header.file_size()
            ),
        ));
    }

    Ok(())
}
