// OMNIFS storage engine
// Single-image hierarchical file system: fixed-layout records for users and
// metadata, a free-block bitmap, and a block-per-file data region, all behind
// an authenticated operation engine.

pub mod bitmap;
pub mod formatter;
pub mod image;
pub mod layout;
pub mod obfuscate;
pub mod ops;
pub mod path_resolver;
pub mod sessions;
pub mod users;

pub use formatter::ImageFormatter;
pub use layout::{ImageHeader, ImageLayout, MetadataEntry, UserRecord};
pub use ops::{DirEntryInfo, EntryMetadata, FsStats, OmniFs, SessionDetails};
pub use sessions::{Session, SessionManager};
