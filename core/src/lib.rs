pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, FilesystemSection, SecuritySection, ServerSection};
pub use error::{error_message, OmniError};
pub use types::{Role, ENTRY_SIZE, HEADER_SIZE, MAGIC, MAX_NAME_LEN, USER_RECORD_SIZE, VERSION};
