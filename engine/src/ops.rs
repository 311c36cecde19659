// Operation engine
// Authenticated operations against the image: file and directory CRUD, user
// administration, metadata and statistics. Every mutation updates the on-image
// record, the in-memory tables and the path index before returning; partial
// allocations are released on any failure path.

use crate::bitmap::FreeBitmap;
use crate::image::ImageFile;
use crate::layout::MetadataEntry;
use crate::obfuscate;
use crate::path_resolver::{
    normalize_path, split_parent, validate_name, MetadataTable, ROOT_ID,
};
use crate::sessions::SessionManager;
use crate::users::UserTable;
use chrono::Utc;
use log::{debug, info, warn};
use omnifs_core::{OmniError, Role};
use std::path::Path;

/// One row of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
    pub name: String,
    pub is_directory: bool,
    pub size: u64,
}

/// Metadata for a single file or directory.
#[derive(Debug, Clone)]
pub struct EntryMetadata {
    pub name: String,
    pub is_directory: bool,
    pub size: u64,
    pub owner_id: u32,
    pub permissions: u32,
    pub created: u64,
    pub modified: u64,
}

/// File-system wide statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsStats {
    pub total_size: u64,
    pub used_space: u64,
    pub free_space: u64,
    pub file_count: u32,
    pub directory_count: u32,
}

/// Identity carried by a live session.
#[derive(Debug, Clone)]
pub struct SessionDetails {
    pub username: String,
    pub role: Role,
    pub user_id: u32,
    pub login_time: u64,
}

pub struct OmniFs {
    image: ImageFile,
    users: UserTable,
    entries: MetadataTable,
    bitmap: FreeBitmap,
    sessions: SessionManager,
}

fn now() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

impl OmniFs {
    /// Open an existing image and rebuild every in-memory structure from it.
    pub fn init<P: AsRef<Path>>(path: P) -> Result<Self, OmniError> {
        let mut image = ImageFile::open(path.as_ref())?;

        let users = UserTable::load(image.read_user_table()?)?;
        let entries = MetadataTable::load(image.read_entry_table()?)?;
        let total_blocks = image.header().total_blocks;
        let bitmap = FreeBitmap::from_bytes(image.read_bitmap()?, total_blocks)?;

        // Every in-use file block must be marked allocated.
        for (id, entry) in entries.entries().iter().enumerate() {
            if !entry.in_use || entry.is_dir || entry.start_block == 0 {
                continue;
            }
            if entry.start_block >= total_blocks {
                return Err(OmniError::CorruptImage(format!(
                    "entry {} points at block {} beyond the data region",
                    id, entry.start_block
                )));
            }
            if bitmap.is_free(entry.start_block) {
                return Err(OmniError::CorruptImage(format!(
                    "entry {} points at free block {}",
                    id, entry.start_block
                )));
            }
        }

        info!(
            "engine initialized from {}: {} users, {} free blocks",
            image.path().display(),
            users.active_names().len(),
            bitmap.count_free()
        );
        Ok(Self {
            image,
            users,
            entries,
            bitmap,
            sessions: SessionManager::new(),
        })
    }

    pub fn header(&self) -> &crate::layout::ImageHeader {
        self.image.header()
    }

    /// Flush the image and drop all sessions.
    pub fn shutdown(mut self) -> Result<(), OmniError> {
        self.image.sync()?;
        info!("engine shut down cleanly");
        Ok(())
    }

    // ----- sessions & users -------------------------------------------------

    pub fn user_login(&mut self, username: &str, password: &str) -> Result<String, OmniError> {
        let timestamp = now();
        let (user_id, role) = self.users.verify_login(username, password, timestamp)?;
        // last_login changed; the whole region is rewritten on user mutations
        self.image.write_user_table(self.users.records())?;
        let token = self.sessions.login(user_id, username, role, timestamp);
        info!("user '{}' logged in", username);
        Ok(token)
    }

    pub fn user_logout(&mut self, token: &str) -> Result<(), OmniError> {
        self.sessions.require_session(token)?;
        self.sessions.invalidate(token);
        Ok(())
    }

    pub fn get_session_info(&self, token: &str) -> Result<SessionDetails, OmniError> {
        let session = self.sessions.require_session(token)?;
        Ok(SessionDetails {
            username: session.username.clone(),
            role: session.role,
            user_id: session.user_id,
            login_time: session.login_time,
        })
    }

    pub fn user_create(
        &mut self,
        token: &str,
        username: &str,
        password: &str,
        role: Role,
    ) -> Result<(), OmniError> {
        self.sessions.require_admin(token)?;
        let backup = self.users.records().to_vec();
        self.users.create(username, password, role, now())?;
        if let Err(e) = self.image.write_user_table(self.users.records()) {
            warn!("user table write failed, restoring in-memory state: {}", e);
            self.users = UserTable::load(backup)?;
            return Err(e);
        }
        info!("user '{}' created", username);
        Ok(())
    }

    pub fn user_delete(&mut self, token: &str, username: &str) -> Result<(), OmniError> {
        let caller = self.sessions.require_admin(token)?;
        if caller.username == username {
            return Err(OmniError::PermissionDenied(
                "cannot delete the account of the current session".to_string(),
            ));
        }
        let backup = self.users.records().to_vec();
        let slot = self.users.deactivate(username)?;
        if let Err(e) = self.image.write_user_table(self.users.records()) {
            warn!("user table write failed, restoring in-memory state: {}", e);
            self.users = UserTable::load(backup)?;
            return Err(e);
        }
        self.sessions.invalidate_for_user(slot);
        info!("user '{}' deleted", username);
        Ok(())
    }

    pub fn user_list(&self, token: &str) -> Result<Vec<String>, OmniError> {
        self.sessions.require_admin(token)?;
        Ok(self.users.active_names())
    }

    // ----- directories ------------------------------------------------------

    pub fn dir_create(&mut self, token: &str, path: &str) -> Result<(), OmniError> {
        let owner = self.sessions.require_admin(token)?.user_id;
        let path = normalize_path(path)?;
        if path == "/" {
            return Err(OmniError::AlreadyExists("/".to_string()));
        }
        if self.entries.resolve(&path).is_some() {
            return Err(OmniError::AlreadyExists(path));
        }
        let (parent_path, name) = split_parent(&path)?;
        validate_name(&name)?;
        let parent_id = self
            .entries
            .resolve(&parent_path)
            .ok_or_else(|| OmniError::NotFound(parent_path.clone()))?;
        if !self.entries.get(parent_id).map_or(false, |e| e.is_dir) {
            return Err(OmniError::NotADirectory(parent_path));
        }
        let id = self
            .entries
            .allocate_slot()
            .ok_or_else(|| OmniError::NoSpace("metadata table is full".to_string()))?;

        let timestamp = now();
        let entry = MetadataEntry {
            in_use: true,
            is_dir: true,
            name,
            parent: parent_id,
            start_block: 0,
            size: 0,
            owner,
            permissions: 0o755,
            created: timestamp,
            modified: timestamp,
        };
        self.image.write_entry(id, &entry)?;
        self.entries.insert(id, entry, path.clone());
        debug!("directory '{}' created as entry {}", path, id);
        Ok(())
    }

    pub fn dir_list(&self, token: &str, path: &str) -> Result<Vec<DirEntryInfo>, OmniError> {
        self.sessions.require_session(token)?;
        let path = normalize_path(path)?;
        let id = self
            .entries
            .resolve(&path)
            .ok_or_else(|| OmniError::NotFound(path.clone()))?;
        if !self.entries.get(id).map_or(false, |e| e.is_dir) {
            return Err(OmniError::NotADirectory(path));
        }
        Ok(self
            .entries
            .children_of(id)
            .into_iter()
            .map(|(_, e)| DirEntryInfo {
                name: e.name.clone(),
                is_directory: e.is_dir,
                size: e.size,
            })
            .collect())
    }

    pub fn dir_delete(&mut self, token: &str, path: &str) -> Result<(), OmniError> {
        self.sessions.require_admin(token)?;
        let path = normalize_path(path)?;
        if path == "/" {
            return Err(OmniError::InvalidArgument(
                "the root directory cannot be deleted".to_string(),
            ));
        }
        let id = self
            .entries
            .resolve(&path)
            .ok_or_else(|| OmniError::NotFound(path.clone()))?;
        if !self.entries.get(id).map_or(false, |e| e.is_dir) {
            return Err(OmniError::NotADirectory(path));
        }
        if self.entries.has_children(id) {
            return Err(OmniError::DirectoryNotEmpty(path));
        }
        self.image.write_entry(id, &MetadataEntry::free())?;
        self.entries.remove(id, &path);
        debug!("directory '{}' deleted (entry {})", path, id);
        Ok(())
    }

    pub fn dir_exists(&self, token: &str, path: &str) -> Result<bool, OmniError> {
        self.sessions.require_session(token)?;
        let path = normalize_path(path)?;
        Ok(self
            .entries
            .resolve(&path)
            .and_then(|id| self.entries.get(id))
            .map_or(false, |e| e.is_dir))
    }

    // ----- files ------------------------------------------------------------

    pub fn file_create(&mut self, token: &str, path: &str, data: &[u8]) -> Result<(), OmniError> {
        let owner = self.sessions.require_admin(token)?.user_id;
        let path = normalize_path(path)?;
        if self.entries.resolve(&path).is_some() {
            return Err(OmniError::AlreadyExists(path));
        }
        let (parent_path, name) = split_parent(&path)?;
        validate_name(&name)?;
        let parent_id = self
            .entries
            .resolve(&parent_path)
            .ok_or_else(|| OmniError::NotFound(parent_path.clone()))?;
        if !self.entries.get(parent_id).map_or(false, |e| e.is_dir) {
            return Err(OmniError::NotADirectory(parent_path));
        }
        if data.len() as u64 > self.image.header().max_file_size() {
            return Err(OmniError::FileTooLarge(format!(
                "{} bytes exceeds the {}-byte block payload",
                data.len(),
                self.image.header().max_file_size()
            )));
        }
        let id = self
            .entries
            .allocate_slot()
            .ok_or_else(|| OmniError::NoSpace("metadata table is full".to_string()))?;

        // Empty files carry no block; start_block 0 means "no content".
        let mut block = 0u32;
        let mut bitmap_byte = 0u64;
        if !data.is_empty() {
            let (allocated, byte_index) = self
                .bitmap
                .allocate()
                .ok_or_else(|| OmniError::NoSpace("no free data blocks".to_string()))?;
            block = allocated;
            bitmap_byte = byte_index;

            if let Err(e) = self.image.write_block_payload(block, 0, &obfuscate::encode(data)) {
                self.bitmap.free(block);
                return Err(e);
            }
            if let Err(e) = self.image.write_bitmap_byte(bitmap_byte, self.bitmap.byte_at(bitmap_byte)) {
                self.bitmap.free(block);
                return Err(e);
            }
        }

        let timestamp = now();
        let entry = MetadataEntry {
            in_use: true,
            is_dir: false,
            name,
            parent: parent_id,
            start_block: block,
            size: data.len() as u64,
            owner,
            permissions: 0o644,
            created: timestamp,
            modified: timestamp,
        };
        if let Err(e) = self.image.write_entry(id, &entry) {
            // Release the block both in memory and on disk before reporting.
            if block != 0 {
                self.bitmap.free(block);
                let _ = self
                    .image
                    .write_bitmap_byte(bitmap_byte, self.bitmap.byte_at(bitmap_byte));
            }
            return Err(e);
        }
        self.entries.insert(id, entry, path.clone());
        debug!("file '{}' created as entry {} in block {}", path, id, block);
        Ok(())
    }

    pub fn file_read(&mut self, token: &str, path: &str) -> Result<Vec<u8>, OmniError> {
        self.sessions.require_session(token)?;
        let path = normalize_path(path)?;
        let id = self
            .entries
            .resolve(&path)
            .ok_or_else(|| OmniError::NotFound(path.clone()))?;
        let entry = self.entries.get(id).ok_or_else(|| OmniError::NotFound(path.clone()))?;
        if entry.is_dir {
            return Err(OmniError::NotAFile(path));
        }
        if entry.size == 0 {
            return Ok(Vec::new());
        }
        let (block, size) = (entry.start_block, entry.size);
        let mut buf = vec![0u8; size as usize];
        self.image.read_block_payload(block, 0, &mut buf)?;
        Ok(obfuscate::decode(&buf))
    }

    pub fn file_edit(
        &mut self,
        token: &str,
        path: &str,
        data: &[u8],
        index: u64,
    ) -> Result<(), OmniError> {
        self.sessions.require_admin(token)?;
        let path = normalize_path(path)?;
        let id = self
            .entries
            .resolve(&path)
            .ok_or_else(|| OmniError::NotFound(path.clone()))?;
        let entry = self.entries.get(id).ok_or_else(|| OmniError::NotFound(path.clone()))?;
        if entry.is_dir {
            return Err(OmniError::NotAFile(path));
        }
        // No automatic extension: the patch must land inside the file.
        if index + data.len() as u64 > entry.size {
            return Err(OmniError::InvalidArgument(format!(
                "edit range [{}, {}) exceeds file size {}",
                index,
                index + data.len() as u64,
                entry.size
            )));
        }
        if !data.is_empty() {
            self.image
                .write_block_payload(entry.start_block, index, &obfuscate::encode(data))?;
        }

        let timestamp = now();
        let mut updated = entry.clone();
        updated.modified = timestamp;
        self.image.write_entry(id, &updated)?;
        self.entries.update(id, |e| e.modified = timestamp);
        debug!("file '{}' edited: {} bytes at offset {}", path, data.len(), index);
        Ok(())
    }

    pub fn file_delete(&mut self, token: &str, path: &str) -> Result<(), OmniError> {
        self.sessions.require_admin(token)?;
        let path = normalize_path(path)?;
        let id = self
            .entries
            .resolve(&path)
            .ok_or_else(|| OmniError::NotFound(path.clone()))?;
        let entry = self.entries.get(id).ok_or_else(|| OmniError::NotFound(path.clone()))?;
        if entry.is_dir {
            return Err(OmniError::IsDirectory(path));
        }
        let block = entry.start_block;
        self.image.write_entry(id, &MetadataEntry::free())?;
        if block != 0 {
            let byte_index = self.bitmap.free(block);
            self.image.write_bitmap_byte(byte_index, self.bitmap.byte_at(byte_index))?;
        }
        self.entries.remove(id, &path);
        debug!("file '{}' deleted (entry {}, block {})", path, id, block);
        Ok(())
    }

    pub fn file_truncate(&mut self, token: &str, path: &str) -> Result<(), OmniError> {
        self.sessions.require_admin(token)?;
        let path = normalize_path(path)?;
        let id = self
            .entries
            .resolve(&path)
            .ok_or_else(|| OmniError::NotFound(path.clone()))?;
        let entry = self.entries.get(id).ok_or_else(|| OmniError::NotFound(path.clone()))?;
        if entry.is_dir {
            return Err(OmniError::IsDirectory(path));
        }
        let block = entry.start_block;

        let timestamp = now();
        let mut updated = entry.clone();
        updated.size = 0;
        updated.start_block = 0;
        updated.modified = timestamp;
        self.image.write_entry(id, &updated)?;
        // The block is released immediately rather than on next write.
        if block != 0 {
            let byte_index = self.bitmap.free(block);
            self.image.write_bitmap_byte(byte_index, self.bitmap.byte_at(byte_index))?;
        }
        self.entries.update(id, |e| {
            e.size = 0;
            e.start_block = 0;
            e.modified = timestamp;
        });
        debug!("file '{}' truncated", path);
        Ok(())
    }

    pub fn file_exists(&self, token: &str, path: &str) -> Result<bool, OmniError> {
        self.sessions.require_session(token)?;
        let path = normalize_path(path)?;
        Ok(self
            .entries
            .resolve(&path)
            .and_then(|id| self.entries.get(id))
            .map_or(false, |e| !e.is_dir))
    }

    pub fn file_rename(&mut self, token: &str, old_path: &str, new_path: &str) -> Result<(), OmniError> {
        self.sessions.require_admin(token)?;
        let old_path = normalize_path(old_path)?;
        let new_path = normalize_path(new_path)?;
        if old_path == "/" {
            return Err(OmniError::InvalidArgument(
                "the root directory cannot be renamed".to_string(),
            ));
        }
        let id = self
            .entries
            .resolve(&old_path)
            .ok_or_else(|| OmniError::NotFound(old_path.clone()))?;
        let entry = self
            .entries
            .get(id)
            .ok_or_else(|| OmniError::NotFound(old_path.clone()))?;
        if entry.is_dir {
            return Err(OmniError::IsDirectory(old_path));
        }
        if old_path == new_path {
            return Ok(());
        }
        if self.entries.resolve(&new_path).is_some() {
            return Err(OmniError::AlreadyExists(new_path));
        }
        let (new_parent_path, new_name) = split_parent(&new_path)?;
        validate_name(&new_name)?;
        let new_parent = self
            .entries
            .resolve(&new_parent_path)
            .ok_or_else(|| OmniError::NotFound(new_parent_path.clone()))?;
        if !self.entries.get(new_parent).map_or(false, |e| e.is_dir) {
            return Err(OmniError::NotADirectory(new_parent_path));
        }

        let timestamp = now();
        let mut updated = entry.clone();
        updated.parent = new_parent;
        updated.name = new_name.clone();
        updated.modified = timestamp;
        self.image.write_entry(id, &updated)?;
        self.entries
            .relocate(id, &old_path, new_path.clone(), new_parent, new_name, timestamp);
        debug!("file '{}' renamed to '{}'", old_path, new_path);
        Ok(())
    }

    // ----- metadata & stats -------------------------------------------------

    pub fn get_metadata(&self, token: &str, path: &str) -> Result<EntryMetadata, OmniError> {
        self.sessions.require_session(token)?;
        let path = normalize_path(path)?;
        let id = self
            .entries
            .resolve(&path)
            .ok_or_else(|| OmniError::NotFound(path.clone()))?;
        let entry = self.entries.get(id).ok_or_else(|| OmniError::NotFound(path))?;
        Ok(EntryMetadata {
            name: entry.name.clone(),
            is_directory: entry.is_dir,
            size: entry.size,
            owner_id: entry.owner,
            permissions: entry.permissions,
            created: entry.created,
            modified: entry.modified,
        })
    }

    pub fn set_permissions(&mut self, token: &str, path: &str, permissions: u32) -> Result<(), OmniError> {
        self.sessions.require_admin(token)?;
        if permissions > 0o777 {
            return Err(OmniError::InvalidArgument(format!(
                "permissions {:o} outside the rwxrwxrwx range",
                permissions
            )));
        }
        let path = normalize_path(path)?;
        let id = self
            .entries
            .resolve(&path)
            .ok_or_else(|| OmniError::NotFound(path.clone()))?;
        let entry = self.entries.get(id).ok_or_else(|| OmniError::NotFound(path.clone()))?;

        let timestamp = now();
        let mut updated = entry.clone();
        updated.permissions = permissions;
        updated.modified = timestamp;
        self.image.write_entry(id, &updated)?;
        self.entries.update(id, |e| {
            e.permissions = permissions;
            e.modified = timestamp;
        });
        debug!("permissions on '{}' set to {:o}", path, permissions);
        Ok(())
    }

    pub fn get_stats(&self, token: &str) -> Result<FsStats, OmniError> {
        self.sessions.require_session(token)?;
        let header = self.image.header();

        let mut file_count = 0u32;
        let mut directory_count = 0u32;
        let mut blocks_in_use = 0u64;
        for entry in self.entries.entries() {
            if !entry.in_use {
                continue;
            }
            if entry.is_dir {
                directory_count += 1;
            } else {
                file_count += 1;
                if entry.start_block != 0 {
                    blocks_in_use += 1;
                }
            }
        }

        let used_space = blocks_in_use * header.block_size as u64;
        let free_space = header
            .total_size
            .saturating_sub(used_space)
            .saturating_sub(header.content_offset);
        Ok(FsStats {
            total_size: header.total_size,
            used_space,
            free_space,
            file_count,
            directory_count,
        })
    }

    // ----- test support -----------------------------------------------------

    /// Free data blocks remaining; exposed for invariant checks.
    pub fn free_block_count(&self) -> u32 {
        self.bitmap.count_free()
    }

    /// Free metadata slots remaining; exposed for invariant checks.
    pub fn free_entry_count(&self) -> u32 {
        self.entries.count_free_slots()
    }

    /// Root must always be an in-use directory parented to itself.
    pub fn root_is_sound(&self) -> bool {
        self.entries
            .get(ROOT_ID)
            .map_or(false, |e| e.is_dir && e.parent == ROOT_ID)
    }

    /// The bitmap accounting identity: free blocks plus in-use file blocks
    /// plus the reserved sentinel covers every data block.
    pub fn block_accounting_balances(&self) -> bool {
        let files_with_blocks = self
            .entries
            .entries()
            .iter()
            .filter(|e| e.in_use && !e.is_dir && e.start_block != 0)
            .count() as u32;
        self.bitmap.count_free() + files_with_blocks + 1 == self.bitmap.total_blocks()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatter::ImageFormatter;
    use omnifs_core::Config;
    use tempfile::NamedTempFile;

    fn fresh_fs() -> (NamedTempFile, OmniFs) {
        let temp = NamedTempFile::new().unwrap();
        let mut config = Config::default();
        config.filesystem.total_size = 2 * 1024 * 1024;
        config.filesystem.block_size = 1024;
        config.filesystem.max_entries = 32;
        config.security.max_users = 4;
        ImageFormatter::format(temp.path(), &config).unwrap();
        let fs = OmniFs::init(temp.path()).unwrap();
        (temp, fs)
    }

    #[test]
    fn test_login_and_session_info() {
        let (_temp, mut fs) = fresh_fs();
        let token = fs.user_login("admin", "admin123").unwrap();
        let info = fs.get_session_info(&token).unwrap();
        assert_eq!(info.username, "admin");
        assert_eq!(info.role, Role::Admin);
        assert_eq!(info.user_id, 0);
    }

    #[test]
    fn test_login_rejects_bad_credentials() {
        let (_temp, mut fs) = fresh_fs();
        assert!(matches!(fs.user_login("admin", "wrong"), Err(OmniError::AuthFailed)));
        assert!(matches!(fs.user_login("nobody", "x"), Err(OmniError::AuthFailed)));
    }

    #[test]
    fn test_logout_invalidates_token() {
        let (_temp, mut fs) = fresh_fs();
        let token = fs.user_login("admin", "admin123").unwrap();
        fs.user_logout(&token).unwrap();
        assert!(matches!(fs.get_session_info(&token), Err(OmniError::InvalidSession)));
    }

    #[test]
    fn test_operations_require_a_session() {
        let (_temp, fs) = fresh_fs();
        assert!(matches!(fs.dir_list("bogus", "/"), Err(OmniError::InvalidSession)));
        assert!(matches!(fs.get_stats(""), Err(OmniError::InvalidSession)));
    }

    #[test]
    fn test_normal_users_cannot_mutate() {
        let (_temp, mut fs) = fresh_fs();
        let admin = fs.user_login("admin", "admin123").unwrap();
        fs.user_create(&admin, "bob", "bobpw", Role::Normal).unwrap();
        let bob = fs.user_login("bob", "bobpw").unwrap();
        assert!(matches!(
            fs.dir_create(&bob, "/x"),
            Err(OmniError::PermissionDenied(_))
        ));
        assert!(matches!(
            fs.file_create(&bob, "/y", b"data"),
            Err(OmniError::PermissionDenied(_))
        ));
        assert!(matches!(fs.user_list(&bob), Err(OmniError::PermissionDenied(_))));
        // Reads are open to any session
        assert!(fs.dir_list(&bob, "/").is_ok());
    }

    #[test]
    fn test_deleting_user_drops_their_sessions() {
        let (_temp, mut fs) = fresh_fs();
        let admin = fs.user_login("admin", "admin123").unwrap();
        fs.user_create(&admin, "bob", "bobpw", Role::Normal).unwrap();
        let bob = fs.user_login("bob", "bobpw").unwrap();
        fs.user_delete(&admin, "bob").unwrap();
        assert!(matches!(fs.get_session_info(&bob), Err(OmniError::InvalidSession)));
        assert!(matches!(fs.user_login("bob", "bobpw"), Err(OmniError::AuthFailed)));
    }

    #[test]
    fn test_admin_cannot_delete_self_or_primary() {
        let (_temp, mut fs) = fresh_fs();
        let admin = fs.user_login("admin", "admin123").unwrap();
        assert!(matches!(
            fs.user_delete(&admin, "admin"),
            Err(OmniError::PermissionDenied(_))
        ));
        // A second admin cannot remove the slot-0 admin either
        fs.user_create(&admin, "root2", "pw", Role::Admin).unwrap();
        let root2 = fs.user_login("root2", "pw").unwrap();
        assert!(matches!(
            fs.user_delete(&root2, "admin"),
            Err(OmniError::PermissionDenied(_))
        ));
    }

    #[test]
    fn test_file_round_trip() {
        let (_temp, mut fs) = fresh_fs();
        let token = fs.user_login("admin", "admin123").unwrap();
        fs.file_create(&token, "/hello.txt", b"Hi").unwrap();
        assert_eq!(fs.file_read(&token, "/hello.txt").unwrap(), b"Hi");
        assert!(fs.file_exists(&token, "/hello.txt").unwrap());
        assert!(fs.block_accounting_balances());
    }

    #[test]
    fn test_empty_file_takes_no_block() {
        let (_temp, mut fs) = fresh_fs();
        let token = fs.user_login("admin", "admin123").unwrap();
        let free_before = fs.free_block_count();
        fs.file_create(&token, "/empty", b"").unwrap();
        assert_eq!(fs.free_block_count(), free_before);
        assert_eq!(fs.file_read(&token, "/empty").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_file_delete_restores_free_count() {
        let (_temp, mut fs) = fresh_fs();
        let token = fs.user_login("admin", "admin123").unwrap();
        let free_before = fs.free_block_count();
        fs.file_create(&token, "/b", b"x").unwrap();
        assert_eq!(fs.free_block_count(), free_before - 1);
        fs.file_delete(&token, "/b").unwrap();
        assert_eq!(fs.free_block_count(), free_before);
        assert!(!fs.file_exists(&token, "/b").unwrap());
    }

    #[test]
    fn test_file_edit_within_bounds() {
        let (_temp, mut fs) = fresh_fs();
        let token = fs.user_login("admin", "admin123").unwrap();
        fs.file_create(&token, "/a", b"123").unwrap();
        fs.file_edit(&token, "/a", b"X", 1).unwrap();
        assert_eq!(fs.file_read(&token, "/a").unwrap(), b"1X3");
        assert!(matches!(
            fs.file_edit(&token, "/a", b"YY", 4),
            Err(OmniError::InvalidArgument(_))
        ));
        assert_eq!(fs.file_read(&token, "/a").unwrap(), b"1X3");
    }

    #[test]
    fn test_file_truncate_releases_block() {
        let (_temp, mut fs) = fresh_fs();
        let token = fs.user_login("admin", "admin123").unwrap();
        let free_before = fs.free_block_count();
        fs.file_create(&token, "/t", b"payload").unwrap();
        fs.file_truncate(&token, "/t").unwrap();
        assert_eq!(fs.free_block_count(), free_before);
        assert_eq!(fs.file_read(&token, "/t").unwrap(), Vec::<u8>::new());
        let meta = fs.get_metadata(&token, "/t").unwrap();
        assert_eq!(meta.size, 0);
    }

    #[test]
    fn test_file_too_large_rejected() {
        let (_temp, mut fs) = fresh_fs();
        let token = fs.user_login("admin", "admin123").unwrap();
        let max = fs.header().max_file_size() as usize;
        let exact = vec![b'a'; max];
        fs.file_create(&token, "/fits", &exact).unwrap();
        assert_eq!(fs.file_read(&token, "/fits").unwrap().len(), max);

        let too_big = vec![b'a'; max + 1];
        assert!(matches!(
            fs.file_create(&token, "/big", &too_big),
            Err(OmniError::FileTooLarge(_))
        ));
        assert!(fs.block_accounting_balances());
    }

    #[test]
    fn test_rename_moves_path_and_content() {
        let (_temp, mut fs) = fresh_fs();
        let token = fs.user_login("admin", "admin123").unwrap();
        fs.file_create(&token, "/c", b"abc").unwrap();
        fs.file_rename(&token, "/c", "/d").unwrap();
        assert!(!fs.file_exists(&token, "/c").unwrap());
        assert!(fs.file_exists(&token, "/d").unwrap());
        assert_eq!(fs.file_read(&token, "/d").unwrap(), b"abc");
    }

    #[test]
    fn test_rename_refuses_collision_and_dirs() {
        let (_temp, mut fs) = fresh_fs();
        let token = fs.user_login("admin", "admin123").unwrap();
        fs.file_create(&token, "/one", b"1").unwrap();
        fs.file_create(&token, "/two", b"2").unwrap();
        fs.dir_create(&token, "/d").unwrap();
        assert!(matches!(
            fs.file_rename(&token, "/one", "/two"),
            Err(OmniError::AlreadyExists(_))
        ));
        assert!(matches!(
            fs.file_rename(&token, "/d", "/e"),
            Err(OmniError::IsDirectory(_))
        ));
        assert!(matches!(
            fs.file_rename(&token, "/", "/r"),
            Err(OmniError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_dir_delete_refuses_root_and_nonempty() {
        let (_temp, mut fs) = fresh_fs();
        let token = fs.user_login("admin", "admin123").unwrap();
        fs.dir_create(&token, "/e").unwrap();
        fs.file_create(&token, "/e/f", b"z").unwrap();
        assert!(matches!(
            fs.dir_delete(&token, "/e"),
            Err(OmniError::DirectoryNotEmpty(_))
        ));
        assert!(matches!(
            fs.dir_delete(&token, "/"),
            Err(OmniError::InvalidArgument(_))
        ));
        fs.file_delete(&token, "/e/f").unwrap();
        fs.dir_delete(&token, "/e").unwrap();
        assert!(!fs.dir_exists(&token, "/e").unwrap());
    }

    #[test]
    fn test_dir_create_and_delete_restore_free_entries() {
        let (_temp, mut fs) = fresh_fs();
        let token = fs.user_login("admin", "admin123").unwrap();
        let free_before = fs.free_entry_count();
        fs.dir_create(&token, "/p").unwrap();
        assert_eq!(fs.free_entry_count(), free_before - 1);
        fs.dir_delete(&token, "/p").unwrap();
        assert_eq!(fs.free_entry_count(), free_before);
    }

    #[test]
    fn test_set_permissions_round_trip() {
        let (_temp, mut fs) = fresh_fs();
        let token = fs.user_login("admin", "admin123").unwrap();
        fs.file_create(&token, "/perm", b"x").unwrap();
        fs.set_permissions(&token, "/perm", 0o600).unwrap();
        assert_eq!(fs.get_metadata(&token, "/perm").unwrap().permissions, 0o600);
        assert!(matches!(
            fs.set_permissions(&token, "/perm", 0o1777),
            Err(OmniError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_stats_track_block_usage() {
        let (_temp, mut fs) = fresh_fs();
        let token = fs.user_login("admin", "admin123").unwrap();
        let before = fs.get_stats(&token).unwrap();
        assert_eq!(before.file_count, 0);
        assert_eq!(before.directory_count, 1); // root

        fs.file_create(&token, "/s", b"x").unwrap();
        let after = fs.get_stats(&token).unwrap();
        assert_eq!(after.file_count, 1);
        assert_eq!(after.used_space, before.used_space + fs.header().block_size as u64);
        assert_eq!(after.free_space, before.free_space - fs.header().block_size as u64);

        fs.file_delete(&token, "/s").unwrap();
        assert_eq!(fs.get_stats(&token).unwrap().free_space, before.free_space);
    }

    #[test]
    fn test_name_length_enforced() {
        let (_temp, mut fs) = fresh_fs();
        let token = fs.user_login("admin", "admin123").unwrap();
        assert!(fs.dir_create(&token, "/elevenchars").is_ok());
        assert!(matches!(
            fs.dir_create(&token, "/twelve-chars"),
            Err(OmniError::InvalidArgument(_))
        ));
    }
}
