// Positioned record I/O against the backing image file
// Every record lives at an offset derived from the header; each mutation is a
// single positioned write of one fixed-size record, flushed before returning.

use crate::layout::{ImageHeader, MetadataEntry, UserRecord, BLOCK_POINTER_SIZE};
use log::{debug, trace};
use omnifs_core::{OmniError, ENTRY_SIZE, HEADER_SIZE, USER_RECORD_SIZE};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub struct ImageFile {
    file: File,
    path: PathBuf,
    header: ImageHeader,
}

impl ImageFile {
    /// Open an existing image read/write and validate its header against the
    /// actual file length.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, OmniError> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;

        let file_len = file.metadata()?.len();
        let mut header_bytes = vec![0u8; HEADER_SIZE as usize];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut header_bytes)?;

        let header = ImageHeader::from_bytes(&header_bytes)?;
        header.validate(file_len)?;
        debug!(
            "opened image {}: {} bytes, {} blocks of {}",
            path.display(),
            header.total_size,
            header.total_blocks,
            header.block_size
        );

        Ok(Self { file, path, header })
    }

    pub fn header(&self) -> &ImageHeader {
        &self.header
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), OmniError> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<(), OmniError> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buf)?;
        self.file.flush()?;
        Ok(())
    }

    pub fn write_header(&mut self, header: &ImageHeader) -> Result<(), OmniError> {
        let bytes = header.to_bytes();
        self.write_at(0, &bytes)?;
        self.header = header.clone();
        Ok(())
    }

    pub fn read_user(&mut self, slot: u32) -> Result<UserRecord, OmniError> {
        let offset = self.user_offset(slot)?;
        let mut buf = vec![0u8; USER_RECORD_SIZE as usize];
        self.read_at(offset, &mut buf)?;
        UserRecord::from_bytes(&buf)
    }

    pub fn write_user(&mut self, slot: u32, record: &UserRecord) -> Result<(), OmniError> {
        let offset = self.user_offset(slot)?;
        trace!("writing user slot {} at offset {}", slot, offset);
        self.write_at(offset, &record.to_bytes())
    }

    /// Rewrite the whole user-table region in slot order.
    pub fn write_user_table(&mut self, records: &[UserRecord]) -> Result<(), OmniError> {
        let mut buf = Vec::with_capacity(records.len() * USER_RECORD_SIZE as usize);
        for record in records {
            buf.extend_from_slice(&record.to_bytes());
        }
        trace!("rewriting user table ({} slots)", records.len());
        self.write_at(self.header.user_table_offset, &buf)
    }

    pub fn read_user_table(&mut self) -> Result<Vec<UserRecord>, OmniError> {
        let max_users = self.header.max_users;
        let mut buf = vec![0u8; (max_users * USER_RECORD_SIZE) as usize];
        self.read_at(self.header.user_table_offset, &mut buf)?;
        let mut records = Vec::with_capacity(max_users as usize);
        for slot in 0..max_users as usize {
            let start = slot * USER_RECORD_SIZE as usize;
            records.push(UserRecord::from_bytes(&buf[start..start + USER_RECORD_SIZE as usize])?);
        }
        Ok(records)
    }

    pub fn read_entry(&mut self, id: u32) -> Result<MetadataEntry, OmniError> {
        let offset = self.entry_offset(id)?;
        let mut buf = vec![0u8; ENTRY_SIZE as usize];
        self.read_at(offset, &mut buf)?;
        MetadataEntry::from_bytes(&buf)
    }

    pub fn write_entry(&mut self, id: u32, entry: &MetadataEntry) -> Result<(), OmniError> {
        let offset = self.entry_offset(id)?;
        trace!("writing metadata entry {} at offset {}", id, offset);
        self.write_at(offset, &entry.to_bytes())
    }

    pub fn read_entry_table(&mut self) -> Result<Vec<MetadataEntry>, OmniError> {
        let max_entries = self.header.max_entries;
        let mut buf = vec![0u8; (max_entries * ENTRY_SIZE) as usize];
        self.read_at(self.header.metadata_offset, &mut buf)?;
        let mut entries = Vec::with_capacity(max_entries as usize);
        for id in 0..max_entries as usize {
            let start = id * ENTRY_SIZE as usize;
            entries.push(MetadataEntry::from_bytes(&buf[start..start + ENTRY_SIZE as usize])?);
        }
        Ok(entries)
    }

    pub fn read_bitmap(&mut self) -> Result<Vec<u8>, OmniError> {
        let bytes = (self.header.total_blocks as u64 + 7) / 8;
        let mut buf = vec![0u8; bytes as usize];
        self.read_at(self.header.bitmap_offset, &mut buf)?;
        Ok(buf)
    }

    pub fn write_bitmap(&mut self, bitmap: &[u8]) -> Result<(), OmniError> {
        self.write_at(self.header.bitmap_offset, bitmap)
    }

    /// Persist a single bitmap byte after a bit flip.
    pub fn write_bitmap_byte(&mut self, byte_index: u64, value: u8) -> Result<(), OmniError> {
        self.write_at(self.header.bitmap_offset + byte_index, &[value])
    }

    /// Read `buf.len()` payload bytes of a data block starting at `offset`
    /// within the payload (past the leading next-block pointer).
    pub fn read_block_payload(
        &mut self,
        block: u32,
        offset: u64,
        buf: &mut [u8],
    ) -> Result<(), OmniError> {
        let start = self.block_payload_offset(block, offset, buf.len() as u64)?;
        self.read_at(start, buf)
    }

    /// Write payload bytes into a data block starting at `offset` within the
    /// payload. The next-block pointer is written as 0 when `offset` is 0.
    pub fn write_block_payload(
        &mut self,
        block: u32,
        offset: u64,
        buf: &[u8],
    ) -> Result<(), OmniError> {
        if offset == 0 {
            let block_start =
                self.header.content_offset + block as u64 * self.header.block_size as u64;
            self.write_at(block_start, &0u32.to_le_bytes())?;
        }
        let start = self.block_payload_offset(block, offset, buf.len() as u64)?;
        self.write_at(start, buf)
    }

    /// Flush everything down to the device. Used at shutdown.
    pub fn sync(&mut self) -> Result<(), OmniError> {
        self.file.sync_all()?;
        Ok(())
    }

    fn user_offset(&self, slot: u32) -> Result<u64, OmniError> {
        if slot >= self.header.max_users {
            return Err(OmniError::InvalidArgument(format!("user slot {} out of range", slot)));
        }
        Ok(self.header.user_table_offset + slot as u64 * USER_RECORD_SIZE as u64)
    }

    fn entry_offset(&self, id: u32) -> Result<u64, OmniError> {
        if id >= self.header.max_entries {
            return Err(OmniError::InvalidArgument(format!("entry id {} out of range", id)));
        }
        Ok(self.header.metadata_offset + id as u64 * ENTRY_SIZE as u64)
    }

    fn block_payload_offset(&self, block: u32, offset: u64, len: u64) -> Result<u64, OmniError> {
        if block == 0 || block >= self.header.total_blocks {
            return Err(OmniError::InvalidArgument(format!("block {} out of range", block)));
        }
        if offset + len > self.header.max_file_size() {
            return Err(OmniError::InvalidArgument(format!(
                "block access [{}, {}) exceeds payload capacity {}",
                offset,
                offset + len,
                self.header.max_file_size()
            )));
        }
        Ok(self.header.content_offset
            + block as u64 * self.header.block_size as u64
            + BLOCK_POINTER_SIZE as u64
            + offset)
    }
}
