// Image formatter
// Builds a fresh image from configuration: header, seeded user table, root
// directory entry, all-free bitmap, zeroed data region.

use crate::bitmap::FreeBitmap;
use crate::layout::{ImageHeader, ImageLayout, MetadataEntry, UserRecord};
use crate::users::hash_password;
use chrono::Utc;
use log::info;
use omnifs_core::{Config, OmniError, Role, HEADER_SIZE, VERSION};
use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

pub struct ImageFormatter;

impl ImageFormatter {
    /// Create (or overwrite) an image at `path` per the configuration.
    pub fn format<P: AsRef<Path>>(path: P, config: &Config) -> Result<(), OmniError> {
        let fs = &config.filesystem;
        let security = &config.security;
        let layout = ImageLayout::compute(
            fs.total_size,
            fs.block_size,
            security.max_users,
            fs.max_entries,
        )?;
        let now = Utc::now().timestamp() as u64;

        let header = ImageHeader {
            version: VERSION,
            total_size: fs.total_size,
            header_size: HEADER_SIZE,
            block_size: fs.block_size,
            max_users: security.max_users,
            max_entries: fs.max_entries,
            user_table_offset: layout.user_table_offset,
            metadata_offset: layout.metadata_offset,
            bitmap_offset: layout.bitmap_offset,
            content_offset: layout.content_offset,
            total_blocks: layout.total_blocks,
            created_at: now,
        };

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())?;
        file.set_len(fs.total_size)?;

        // Header
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&header.to_bytes())?;

        // User table: slot 0 is the configured admin, the rest inactive
        file.seek(SeekFrom::Start(layout.user_table_offset))?;
        let admin = UserRecord {
            username: security.admin_username.clone(),
            password_digest: hash_password(&security.admin_password),
            role: Role::Admin.as_u8(),
            active: true,
            created_at: now,
            last_login: 0,
        };
        file.write_all(&admin.to_bytes())?;
        let empty_user = UserRecord::empty().to_bytes();
        for _ in 1..security.max_users {
            file.write_all(&empty_user)?;
        }

        // Metadata table: entry 0 is the root directory, the rest free
        file.seek(SeekFrom::Start(layout.metadata_offset))?;
        let root = MetadataEntry {
            in_use: true,
            is_dir: true,
            name: "/".to_string(),
            parent: 0,
            start_block: 0,
            size: 0,
            owner: 0,
            permissions: 0o755,
            created: now,
            modified: now,
        };
        file.write_all(&root.to_bytes())?;
        let empty_entry = MetadataEntry::free().to_bytes();
        for _ in 1..fs.max_entries {
            file.write_all(&empty_entry)?;
        }

        // Bitmap: everything free except the reserved sentinel block
        let bitmap = FreeBitmap::new_all_free(layout.total_blocks);
        file.seek(SeekFrom::Start(layout.bitmap_offset))?;
        file.write_all(bitmap.as_bytes())?;

        file.sync_all()?;
        info!(
            "formatted {}: {} bytes, {} entries, {} users, {} data blocks of {}",
            path.as_ref().display(),
            fs.total_size,
            fs.max_entries,
            security.max_users,
            layout.total_blocks,
            fs.block_size
        );
        Ok(())
    }
}
