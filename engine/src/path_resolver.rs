// Metadata table and path index
// The namespace is a flat array of parent-linked entries; paths are resolved
// through an in-memory map from normalized absolute path to entry id, rebuilt
// from the array at startup and kept consistent through every mutation.

use crate::layout::MetadataEntry;
use log::debug;
use omnifs_core::{OmniError, MAX_NAME_LEN};
use std::collections::HashMap;

/// Entry id of the root directory.
pub const ROOT_ID: u32 = 0;

pub struct MetadataTable {
    entries: Vec<MetadataEntry>,
    path_index: HashMap<String, u32>,
}

impl MetadataTable {
    /// Validate the persisted array and rebuild the path index by walking
    /// parent links outward from root.
    pub fn load(entries: Vec<MetadataEntry>) -> Result<Self, OmniError> {
        let root = entries
            .first()
            .ok_or_else(|| OmniError::CorruptImage("metadata table is empty".to_string()))?;
        if !root.in_use || !root.is_dir || root.parent != ROOT_ID {
            return Err(OmniError::CorruptImage(
                "root entry is missing or malformed".to_string(),
            ));
        }

        for (id, entry) in entries.iter().enumerate().skip(1) {
            if !entry.in_use {
                continue;
            }
            let parent = entries.get(entry.parent as usize).ok_or_else(|| {
                OmniError::CorruptImage(format!("entry {} has out-of-range parent", id))
            })?;
            if !parent.in_use || !parent.is_dir {
                return Err(OmniError::CorruptImage(format!(
                    "entry {} parents a free or non-directory slot {}",
                    id, entry.parent
                )));
            }
            if entry.name.is_empty() {
                return Err(OmniError::CorruptImage(format!("entry {} has no name", id)));
            }
        }

        let mut table = Self {
            entries,
            path_index: HashMap::new(),
        };
        table.rebuild_index()?;
        Ok(table)
    }

    fn rebuild_index(&mut self) -> Result<(), OmniError> {
        self.path_index.clear();
        self.path_index.insert("/".to_string(), ROOT_ID);

        // Breadth-first from root; the tree is shallow and the array small.
        let mut frontier = vec![(ROOT_ID, "/".to_string())];
        while let Some((dir_id, dir_path)) = frontier.pop() {
            let children: Vec<(u32, String, bool)> = self
                .children_of(dir_id)
                .into_iter()
                .map(|(id, e)| (id, e.name.clone(), e.is_dir))
                .collect();
            for (child_id, name, is_dir) in children {
                let child_path = join_path(&dir_path, &name);
                if self.path_index.insert(child_path.clone(), child_id).is_some() {
                    return Err(OmniError::CorruptImage(format!(
                        "duplicate name '{}' under '{}'",
                        name, dir_path
                    )));
                }
                if is_dir {
                    frontier.push((child_id, child_path));
                }
            }
        }
        debug!("path index rebuilt: {} paths", self.path_index.len());
        Ok(())
    }

    pub fn entries(&self) -> &[MetadataEntry] {
        &self.entries
    }

    pub fn get(&self, id: u32) -> Option<&MetadataEntry> {
        self.entries.get(id as usize).filter(|e| e.in_use)
    }

    /// Resolve a normalized absolute path to an entry id.
    pub fn resolve(&self, path: &str) -> Option<u32> {
        self.path_index.get(path).copied()
    }

    /// In-use children of a directory, in metadata-table order.
    pub fn children_of(&self, dir_id: u32) -> Vec<(u32, &MetadataEntry)> {
        self.entries
            .iter()
            .enumerate()
            .skip(1) // root never parents itself
            .filter(|(_, e)| e.in_use && e.parent == dir_id)
            .map(|(id, e)| (id as u32, e))
            .collect()
    }

    pub fn has_children(&self, dir_id: u32) -> bool {
        self.entries
            .iter()
            .enumerate()
            .skip(1)
            .any(|(_, e)| e.in_use && e.parent == dir_id)
    }

    /// Lowest-indexed free slot, skipping the root.
    pub fn allocate_slot(&self) -> Option<u32> {
        self.entries
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, e)| !e.in_use)
            .map(|(id, _)| id as u32)
    }

    pub fn count_free_slots(&self) -> u32 {
        self.entries.iter().skip(1).filter(|e| !e.in_use).count() as u32
    }

    /// Install an entry and its path. The caller has already persisted the
    /// record; this keeps array and index in step.
    pub fn insert(&mut self, id: u32, entry: MetadataEntry, path: String) {
        self.entries[id as usize] = entry;
        self.path_index.insert(path, id);
    }

    /// Drop an entry and its path.
    pub fn remove(&mut self, id: u32, path: &str) {
        self.entries[id as usize] = MetadataEntry::free();
        self.path_index.remove(path);
    }

    /// Re-home an entry under a new parent and name.
    pub fn relocate(
        &mut self,
        id: u32,
        old_path: &str,
        new_path: String,
        new_parent: u32,
        new_name: String,
        modified: u64,
    ) {
        let entry = &mut self.entries[id as usize];
        entry.parent = new_parent;
        entry.name = new_name;
        entry.modified = modified;
        self.path_index.remove(old_path);
        self.path_index.insert(new_path, id);
    }

    pub fn update<F: FnOnce(&mut MetadataEntry)>(&mut self, id: u32, mutate: F) {
        mutate(&mut self.entries[id as usize]);
    }
}

/// Normalize a client path: absolute, empty segments dropped, no trailing
/// slash except on root itself.
pub fn normalize_path(path: &str) -> Result<String, OmniError> {
    if !path.is_empty() && !path.starts_with('/') {
        return Err(OmniError::InvalidArgument(format!(
            "path '{}' is not absolute",
            path
        )));
    }
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return Ok("/".to_string());
    }
    Ok(format!("/{}", segments.join("/")))
}

/// Split a normalized path into its parent path and leaf name.
pub fn split_parent(path: &str) -> Result<(String, String), OmniError> {
    if path == "/" {
        return Err(OmniError::InvalidArgument(
            "the root directory has no parent".to_string(),
        ));
    }
    let cut = path.rfind('/').expect("normalized paths contain '/'");
    let parent = if cut == 0 { "/" } else { &path[..cut] };
    let name = &path[cut + 1..];
    Ok((parent.to_string(), name.to_string()))
}

/// Validate a single path component against the on-image name field.
pub fn validate_name(name: &str) -> Result<(), OmniError> {
    if name.is_empty() {
        return Err(OmniError::InvalidArgument("name is empty".to_string()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(OmniError::InvalidArgument(format!(
            "name '{}' exceeds {} bytes",
            name, MAX_NAME_LEN
        )));
    }
    Ok(())
}

pub fn join_path(dir: &str, name: &str) -> String {
    if dir == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", dir, name)
    }
}
