// On-image record structures and their little-endian codecs
// Everything in the image is little-endian, packed at the field widths below.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use omnifs_core::{OmniError, ENTRY_SIZE, HEADER_SIZE, MAGIC, USER_RECORD_SIZE, VERSION};
use std::io::{Cursor, Write};

/// Length of the username field in a user record.
pub const USERNAME_FIELD: usize = 32;
/// Length of the password digest field in a user record.
pub const DIGEST_FIELD: usize = 64;
/// Length of the short-name field in a metadata entry (11 chars + NUL).
pub const NAME_FIELD: usize = 12;
/// Leading bytes of every data block reserved for the next-block pointer.
pub const BLOCK_POINTER_SIZE: u32 = 4;

/// Fixed 512-byte header at offset 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageHeader {
    pub version: u32,
    pub total_size: u64,
    pub header_size: u32,
    pub block_size: u32,
    pub max_users: u32,
    pub max_entries: u32,
    pub user_table_offset: u64,
    pub metadata_offset: u64,
    pub bitmap_offset: u64,
    pub content_offset: u64,
    pub total_blocks: u32,
    pub created_at: u64,
}

impl ImageHeader {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE as usize);
        buf.extend_from_slice(MAGIC);
        buf.write_u32::<LittleEndian>(self.version).unwrap();
        buf.write_u64::<LittleEndian>(self.total_size).unwrap();
        buf.write_u32::<LittleEndian>(self.header_size).unwrap();
        buf.write_u32::<LittleEndian>(self.block_size).unwrap();
        buf.write_u32::<LittleEndian>(self.max_users).unwrap();
        buf.write_u32::<LittleEndian>(self.max_entries).unwrap();
        buf.write_u64::<LittleEndian>(self.user_table_offset).unwrap();
        buf.write_u64::<LittleEndian>(self.metadata_offset).unwrap();
        buf.write_u64::<LittleEndian>(self.bitmap_offset).unwrap();
        buf.write_u64::<LittleEndian>(self.content_offset).unwrap();
        buf.write_u32::<LittleEndian>(self.total_blocks).unwrap();
        buf.write_u64::<LittleEndian>(self.created_at).unwrap();
        buf.resize(HEADER_SIZE as usize, 0);
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, OmniError> {
        if bytes.len() < HEADER_SIZE as usize {
            return Err(OmniError::CorruptImage(format!(
                "header truncated to {} bytes",
                bytes.len()
            )));
        }
        if &bytes[..8] != MAGIC {
            return Err(OmniError::CorruptImage("bad magic tag".to_string()));
        }
        let mut cursor = Cursor::new(&bytes[8..]);
        let version = cursor.read_u32::<LittleEndian>()?;
        if version != VERSION {
            return Err(OmniError::CorruptImage(format!(
                "unsupported format version {}",
                version
            )));
        }
        Ok(Self {
            version,
            total_size: cursor.read_u64::<LittleEndian>()?,
            header_size: cursor.read_u32::<LittleEndian>()?,
            block_size: cursor.read_u32::<LittleEndian>()?,
            max_users: cursor.read_u32::<LittleEndian>()?,
            max_entries: cursor.read_u32::<LittleEndian>()?,
            user_table_offset: cursor.read_u64::<LittleEndian>()?,
            metadata_offset: cursor.read_u64::<LittleEndian>()?,
            bitmap_offset: cursor.read_u64::<LittleEndian>()?,
            content_offset: cursor.read_u64::<LittleEndian>()?,
            total_blocks: cursor.read_u32::<LittleEndian>()?,
            created_at: cursor.read_u64::<LittleEndian>()?,
        })
    }

    /// Structural validation against the actual image length.
    pub fn validate(&self, file_len: u64) -> Result<(), OmniError> {
        if self.total_size != file_len {
            return Err(OmniError::CorruptImage(format!(
                "header claims {} bytes but image is {}",
                self.total_size, file_len
            )));
        }
        if self.header_size != HEADER_SIZE {
            return Err(OmniError::CorruptImage(format!(
                "unexpected header size {}",
                self.header_size
            )));
        }
        if self.block_size <= BLOCK_POINTER_SIZE {
            return Err(OmniError::CorruptImage(format!(
                "block size {} too small",
                self.block_size
            )));
        }
        let expected_metadata =
            self.user_table_offset + self.max_users as u64 * USER_RECORD_SIZE as u64;
        let expected_bitmap = expected_metadata + self.max_entries as u64 * ENTRY_SIZE as u64;
        let bitmap_bytes = (self.total_blocks as u64 + 7) / 8;
        let expected_content = expected_bitmap + bitmap_bytes;
        if self.user_table_offset != self.header_size as u64
            || self.metadata_offset != expected_metadata
            || self.bitmap_offset != expected_bitmap
            || self.content_offset != expected_content
        {
            return Err(OmniError::CorruptImage("region offsets inconsistent".to_string()));
        }
        let data_end = self.content_offset + self.total_blocks as u64 * self.block_size as u64;
        if data_end > self.total_size {
            return Err(OmniError::CorruptImage(format!(
                "data region ends at {} beyond image size {}",
                data_end, self.total_size
            )));
        }
        Ok(())
    }

    /// Largest file payload a single data block can hold.
    pub fn max_file_size(&self) -> u64 {
        (self.block_size - BLOCK_POINTER_SIZE) as u64
    }
}

/// Region geometry derived from configured limits, used at format time.
#[derive(Debug, Clone, Copy)]
pub struct ImageLayout {
    pub user_table_offset: u64,
    pub metadata_offset: u64,
    pub bitmap_offset: u64,
    pub content_offset: u64,
    pub total_blocks: u32,
}

impl ImageLayout {
    pub fn compute(
        total_size: u64,
        block_size: u32,
        max_users: u32,
        max_entries: u32,
    ) -> Result<Self, OmniError> {
        let user_table_offset = HEADER_SIZE as u64;
        let metadata_offset = user_table_offset + max_users as u64 * USER_RECORD_SIZE as u64;
        let bitmap_offset = metadata_offset + max_entries as u64 * ENTRY_SIZE as u64;
        if bitmap_offset >= total_size {
            return Err(OmniError::NoSpace(
                "image too small for the configured tables".to_string(),
            ));
        }

        // Start with the bitmap-less estimate, then shrink until the bitmap
        // and the blocks it tracks both fit.
        let mut total_blocks = ((total_size - bitmap_offset) / block_size as u64) as u32;
        loop {
            if total_blocks < 2 {
                return Err(OmniError::NoSpace(
                    "image too small for a usable data region".to_string(),
                ));
            }
            let bitmap_bytes = (total_blocks as u64 + 7) / 8;
            let content_offset = bitmap_offset + bitmap_bytes;
            if content_offset + total_blocks as u64 * block_size as u64 <= total_size {
                return Ok(Self {
                    user_table_offset,
                    metadata_offset,
                    bitmap_offset,
                    content_offset,
                    total_blocks,
                });
            }
            total_blocks -= 1;
        }
    }
}

/// One slot in the persisted user table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub username: String,
    pub password_digest: String,
    pub role: u8,
    pub active: bool,
    pub created_at: u64,
    pub last_login: u64,
}

impl UserRecord {
    pub fn empty() -> Self {
        Self {
            username: String::new(),
            password_digest: String::new(),
            role: 1,
            active: false,
            created_at: 0,
            last_login: 0,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(USER_RECORD_SIZE as usize);
        write_fixed_str(&mut buf, &self.username, USERNAME_FIELD);
        write_fixed_str(&mut buf, &self.password_digest, DIGEST_FIELD);
        buf.push(self.role);
        buf.push(self.active as u8);
        buf.write_u64::<LittleEndian>(self.created_at).unwrap();
        buf.write_u64::<LittleEndian>(self.last_login).unwrap();
        buf.resize(USER_RECORD_SIZE as usize, 0);
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, OmniError> {
        if bytes.len() < USER_RECORD_SIZE as usize {
            return Err(OmniError::CorruptImage("user record truncated".to_string()));
        }
        let username = read_fixed_str(&bytes[..USERNAME_FIELD]);
        let password_digest =
            read_fixed_str(&bytes[USERNAME_FIELD..USERNAME_FIELD + DIGEST_FIELD]);
        let mut cursor = Cursor::new(&bytes[USERNAME_FIELD + DIGEST_FIELD..]);
        let role = cursor.read_u8()?;
        let active = cursor.read_u8()? != 0;
        let created_at = cursor.read_u64::<LittleEndian>()?;
        let last_login = cursor.read_u64::<LittleEndian>()?;
        Ok(Self {
            username,
            password_digest,
            role,
            active,
            created_at,
            last_login,
        })
    }
}

/// One slot in the persisted metadata table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataEntry {
    pub in_use: bool,
    pub is_dir: bool,
    pub name: String,
    pub parent: u32,
    pub start_block: u32,
    pub size: u64,
    pub owner: u32,
    pub permissions: u32,
    pub created: u64,
    pub modified: u64,
}

impl MetadataEntry {
    pub fn free() -> Self {
        Self {
            in_use: false,
            is_dir: false,
            name: String::new(),
            parent: 0,
            start_block: 0,
            size: 0,
            owner: 0,
            permissions: 0,
            created: 0,
            modified: 0,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(ENTRY_SIZE as usize);
        buf.push(self.in_use as u8);
        buf.push(self.is_dir as u8);
        write_fixed_str(&mut buf, &self.name, NAME_FIELD);
        buf.write_u32::<LittleEndian>(self.parent).unwrap();
        buf.write_u32::<LittleEndian>(self.start_block).unwrap();
        buf.write_u64::<LittleEndian>(self.size).unwrap();
        buf.write_u32::<LittleEndian>(self.owner).unwrap();
        buf.write_u32::<LittleEndian>(self.permissions).unwrap();
        buf.write_u64::<LittleEndian>(self.created).unwrap();
        buf.write_u64::<LittleEndian>(self.modified).unwrap();
        buf.resize(ENTRY_SIZE as usize, 0);
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, OmniError> {
        if bytes.len() < ENTRY_SIZE as usize {
            return Err(OmniError::CorruptImage("metadata entry truncated".to_string()));
        }
        let in_use = bytes[0] != 0;
        let is_dir = bytes[1] != 0;
        let name = read_fixed_str(&bytes[2..2 + NAME_FIELD]);
        let mut cursor = Cursor::new(&bytes[2 + NAME_FIELD..]);
        Ok(Self {
            in_use,
            is_dir,
            name,
            parent: cursor.read_u32::<LittleEndian>()?,
            start_block: cursor.read_u32::<LittleEndian>()?,
            size: cursor.read_u64::<LittleEndian>()?,
            owner: cursor.read_u32::<LittleEndian>()?,
            permissions: cursor.read_u32::<LittleEndian>()?,
            created: cursor.read_u64::<LittleEndian>()?,
            modified: cursor.read_u64::<LittleEndian>()?,
        })
    }
}

/// Write a string into a fixed-width NUL-padded field. Over-long input is
/// truncated; callers validate lengths before this point.
fn write_fixed_str(buf: &mut Vec<u8>, value: &str, width: usize) {
    let bytes = value.as_bytes();
    let take = bytes.len().min(width.saturating_sub(1));
    buf.write_all(&bytes[..take]).unwrap();
    buf.resize(buf.len() + (width - take), 0);
}

/// Read a NUL-padded fixed-width field back into a string.
fn read_fixed_str(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> ImageHeader {
        let layout = ImageLayout::compute(100 * 1024 * 1024, 4096, 50, 1000).unwrap();
        ImageHeader {
            version: VERSION,
            total_size: 100 * 1024 * 1024,
            header_size: HEADER_SIZE,
            block_size: 4096,
            max_users: 50,
            max_entries: 1000,
            user_table_offset: layout.user_table_offset,
            metadata_offset: layout.metadata_offset,
            bitmap_offset: layout.bitmap_offset,
            content_offset: layout.content_offset,
            total_blocks: layout.total_blocks,
            created_at: 1_700_000_000,
        }
    }

    #[test]
    fn test_header_codec_and_validation() {
        let header = sample_header();
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), HEADER_SIZE as usize);
        let decoded = ImageHeader::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, header);
        decoded.validate(header.total_size).unwrap();
    }

    #[test]
    fn test_header_rejects_bad_magic() {
        let mut bytes = sample_header().to_bytes();
        bytes[0] = b'X';
        assert!(matches!(
            ImageHeader::from_bytes(&bytes),
            Err(OmniError::CorruptImage(_))
        ));
    }

    #[test]
    fn test_header_rejects_wrong_file_length() {
        let header = sample_header();
        assert!(header.validate(header.total_size - 1).is_err());
    }

    #[test]
    fn test_layout_fits_inside_image() {
        let total = 10 * 1024 * 1024;
        let layout = ImageLayout::compute(total, 1024, 10, 100).unwrap();
        let bitmap_bytes = (layout.total_blocks as u64 + 7) / 8;
        assert_eq!(layout.content_offset, layout.bitmap_offset + bitmap_bytes);
        assert!(layout.content_offset + layout.total_blocks as u64 * 1024 <= total);
        // The next block up must not fit, otherwise we under-counted.
        assert!(
            layout.content_offset + (layout.total_blocks as u64 + 1) * 1024 > total
                || (layout.total_blocks as u64 + 1 + 7) / 8 > bitmap_bytes
        );
    }

    #[test]
    fn test_layout_rejects_tiny_image() {
        assert!(ImageLayout::compute(4096, 4096, 50, 1000).is_err());
    }

    #[test]
    fn test_user_record_codec() {
        let record = UserRecord {
            username: "bob".to_string(),
            password_digest: "00000001914cf929".to_string(),
            role: 1,
            active: true,
            created_at: 1000,
            last_login: 2000,
        };
        let decoded = UserRecord::from_bytes(&record.to_bytes()).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_metadata_entry_codec() {
        let entry = MetadataEntry {
            in_use: true,
            is_dir: false,
            name: "hello.txt".to_string(),
            parent: 3,
            start_block: 17,
            size: 42,
            owner: 0,
            permissions: 0o644,
            created: 111,
            modified: 222,
        };
        let bytes = entry.to_bytes();
        assert_eq!(bytes.len(), ENTRY_SIZE as usize);
        assert_eq!(MetadataEntry::from_bytes(&bytes).unwrap(), entry);
    }

    #[test]
    fn test_fixed_str_truncates_and_terminates() {
        let mut buf = Vec::new();
        write_fixed_str(&mut buf, "a-very-long-name", NAME_FIELD);
        assert_eq!(buf.len(), NAME_FIELD);
        assert_eq!(buf[NAME_FIELD - 1], 0);
        assert_eq!(read_fixed_str(&buf), "a-very-long");
    }
}
