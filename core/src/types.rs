// Shared constants and wire-visible types for the OMNIFS image format

use serde::{Deserialize, Serialize};

/// Magic tag at offset 0 of every image.
pub const MAGIC: &[u8; 8] = b"OMNIFS01";

/// On-image format version.
pub const VERSION: u32 = 1;

/// Fixed header region size in bytes.
pub const HEADER_SIZE: u32 = 512;

/// Size of one persisted user record.
pub const USER_RECORD_SIZE: u32 = 128;

/// Size of one persisted metadata entry.
pub const ENTRY_SIZE: u32 = 64;

/// Longest short name of a single path component, in bytes.
/// The on-image name field is 12 bytes, NUL terminated.
pub const MAX_NAME_LEN: usize = 11;

/// User role, persisted as a fixed-width integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Normal,
}

impl Role {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Role::Admin),
            1 => Some(Role::Normal),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Role::Admin => 0,
            Role::Normal => 1,
        }
    }

    /// Parse the role name used on the wire ("admin"/"normal").
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "normal" | "user" => Some(Role::Normal),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Normal => "normal",
        }
    }
}
