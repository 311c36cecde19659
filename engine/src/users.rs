// User table and credential index
// A fixed array of persisted records plus an in-memory map from username to
// slot. Only active records are indexed; inactive slots are reusable.

use crate::layout::{UserRecord, USERNAME_FIELD};
use log::debug;
use omnifs_core::{OmniError, Role};
use std::collections::HashMap;

/// Deterministic password digest: 64-bit multiplicative hash rendered as a
/// 16-char lower-hex string. The same transform runs at format time,
/// user_create and user_login, so equal passwords always collide.
pub fn hash_password(password: &str) -> String {
    let mut h: u64 = 5381;
    for &byte in password.as_bytes() {
        h = h.wrapping_mul(33).wrapping_add(byte as u64);
    }
    format!("{:016x}", h)
}

pub struct UserTable {
    records: Vec<UserRecord>,
    index: HashMap<String, u32>,
}

impl UserTable {
    pub fn load(records: Vec<UserRecord>) -> Result<Self, OmniError> {
        let mut index = HashMap::new();
        for (slot, record) in records.iter().enumerate() {
            if !record.active {
                continue;
            }
            if record.username.is_empty() {
                return Err(OmniError::CorruptImage(format!(
                    "active user slot {} has no username",
                    slot
                )));
            }
            if index.insert(record.username.clone(), slot as u32).is_some() {
                return Err(OmniError::CorruptImage(format!(
                    "duplicate active username '{}'",
                    record.username
                )));
            }
        }
        debug!("loaded {} active users", index.len());
        Ok(Self { records, index })
    }

    pub fn records(&self) -> &[UserRecord] {
        &self.records
    }

    pub fn find(&self, username: &str) -> Option<(u32, &UserRecord)> {
        let slot = *self.index.get(username)?;
        Some((slot, &self.records[slot as usize]))
    }

    pub fn get(&self, slot: u32) -> Option<&UserRecord> {
        self.records.get(slot as usize)
    }

    /// Active usernames in table (slot) order.
    pub fn active_names(&self) -> Vec<String> {
        self.records
            .iter()
            .filter(|r| r.active)
            .map(|r| r.username.clone())
            .collect()
    }

    /// Verify credentials and stamp the login time. Unknown names and wrong
    /// passwords fail identically.
    pub fn verify_login(
        &mut self,
        username: &str,
        password: &str,
        now: u64,
    ) -> Result<(u32, Role), OmniError> {
        let digest = hash_password(password);
        let slot = match self.index.get(username) {
            Some(&slot) => slot,
            None => return Err(OmniError::AuthFailed),
        };
        let record = &mut self.records[slot as usize];
        if !record.active || record.password_digest != digest {
            return Err(OmniError::AuthFailed);
        }
        let role = Role::from_u8(record.role)
            .ok_or_else(|| OmniError::CorruptImage(format!("user slot {} has bad role", slot)))?;
        record.last_login = now;
        Ok((slot, role))
    }

    /// Claim the first inactive slot for a new active user.
    pub fn create(
        &mut self,
        username: &str,
        password: &str,
        role: Role,
        now: u64,
    ) -> Result<u32, OmniError> {
        if username.is_empty() || username.len() >= USERNAME_FIELD {
            return Err(OmniError::InvalidArgument(format!(
                "username must be 1-{} bytes",
                USERNAME_FIELD - 1
            )));
        }
        if self.index.contains_key(username) {
            return Err(OmniError::AlreadyExists(username.to_string()));
        }
        let slot = self
            .records
            .iter()
            .position(|r| !r.active)
            .ok_or_else(|| OmniError::NoSpace("user table is full".to_string()))?
            as u32;

        self.records[slot as usize] = UserRecord {
            username: username.to_string(),
            password_digest: hash_password(password),
            role: role.as_u8(),
            active: true,
            created_at: now,
            last_login: 0,
        };
        self.index.insert(username.to_string(), slot);
        debug!("created user '{}' in slot {}", username, slot);
        Ok(slot)
    }

    /// Deactivate a user. Slot 0 (the format-time admin) is refused, as is
    /// deleting yourself; both are checked by the caller against the session
    /// before getting here, but the primary-admin rule is structural.
    pub fn deactivate(&mut self, username: &str) -> Result<u32, OmniError> {
        let slot = *self
            .index
            .get(username)
            .ok_or_else(|| OmniError::NotFound(username.to_string()))?;
        if slot == 0 {
            return Err(OmniError::PermissionDenied(
                "the primary admin cannot be deleted".to_string(),
            ));
        }
        let record = &mut self.records[slot as usize];
        record.active = false;
        self.index.remove(username);
        debug!("deactivated user '{}' (slot {})", username, slot);
        Ok(slot)
    }
}
