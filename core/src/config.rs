// Configuration file loading
// INI-style sections with key=value pairs, '#' comments and optional quotes:
//
//   [filesystem]
//   total_size = 104857600
//   block_size = 4096
//
// Unknown keys are ignored so configs can carry settings for other tools.

use crate::error::OmniError;
use crate::types::MAX_NAME_LEN;
use log::debug;
use std::fs;
use std::path::Path;

/// `[filesystem]` section: image geometry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilesystemSection {
    pub total_size: u64,
    pub header_size: u32,
    pub block_size: u32,
    pub max_entries: u32,
    pub max_filename_length: u32,
}

impl Default for FilesystemSection {
    fn default() -> Self {
        Self {
            total_size: 100 * 1024 * 1024,
            header_size: 512,
            block_size: 4096,
            max_entries: 1000,
            max_filename_length: MAX_NAME_LEN as u32,
        }
    }
}

/// `[security]` section: user limits and the format-time admin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecuritySection {
    pub max_users: u32,
    pub admin_username: String,
    pub admin_password: String,
    pub require_auth: bool,
}

impl Default for SecuritySection {
    fn default() -> Self {
        Self {
            max_users: 50,
            admin_username: "admin".to_string(),
            admin_password: "admin123".to_string(),
            require_auth: true,
        }
    }
}

/// `[server]` section: transport settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSection {
    pub port: u16,
    pub max_connections: u32,
    pub queue_timeout: u32,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: 8080,
            max_connections: 32,
            queue_timeout: 30,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub filesystem: FilesystemSection,
    pub security: SecuritySection,
    pub server: ServerSection,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, OmniError> {
        let text = fs::read_to_string(path.as_ref()).map_err(|e| {
            OmniError::Configuration(format!(
                "cannot read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, OmniError> {
        let mut config = Config::default();
        let mut section = String::new();

        for (line_no, raw_line) in text.lines().enumerate() {
            // Strip inline comments, then surrounding whitespace
            let line = match raw_line.find('#') {
                Some(pos) => &raw_line[..pos],
                None => raw_line,
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                section = line[1..line.len() - 1].trim().to_string();
                continue;
            }

            let (key, value) = line.split_once('=').ok_or_else(|| {
                OmniError::Configuration(format!("line {}: expected key=value", line_no + 1))
            })?;
            let key = key.trim();
            let value = unquote(value.trim());

            match section.as_str() {
                "filesystem" => config.filesystem.apply(key, value, line_no + 1)?,
                "security" => config.security.apply(key, value, line_no + 1)?,
                "server" => config.server.apply(key, value, line_no + 1)?,
                _ => {} // settings for other tools
            }
        }

        config.validate()?;
        debug!(
            "config loaded: {} byte image, {}-byte blocks, {} entries, {} users, port {}",
            config.filesystem.total_size,
            config.filesystem.block_size,
            config.filesystem.max_entries,
            config.security.max_users,
            config.server.port
        );
        Ok(config)
    }

    fn validate(&self) -> Result<(), OmniError> {
        let fs = &self.filesystem;
        if fs.block_size == 0 {
            return Err(OmniError::Configuration("block_size must be non-zero".into()));
        }
        if fs.header_size != 512 {
            return Err(OmniError::Configuration(format!(
                "header_size must be 512, got {}",
                fs.header_size
            )));
        }
        if fs.max_entries == 0 {
            return Err(OmniError::Configuration("max_entries must be non-zero".into()));
        }
        if fs.max_filename_length as usize > MAX_NAME_LEN {
            return Err(OmniError::Configuration(format!(
                "max_filename_length cannot exceed {}",
                MAX_NAME_LEN
            )));
        }
        if self.security.max_users == 0 {
            return Err(OmniError::Configuration("max_users must be non-zero".into()));
        }
        if self.security.admin_username.is_empty() {
            return Err(OmniError::Configuration("admin_username must be set".into()));
        }

        // The image must have room for every fixed region plus at least the
        // reserved data block and one usable one.
        let fixed = fs.header_size as u64
            + self.security.max_users as u64 * crate::types::USER_RECORD_SIZE as u64
            + fs.max_entries as u64 * crate::types::ENTRY_SIZE as u64;
        if fs.total_size < fixed + 2 * fs.block_size as u64 {
            return Err(OmniError::Configuration(format!(
                "total_size {} is too small for the configured tables",
                fs.total_size
            )));
        }
        Ok(())
    }
}

impl FilesystemSection {
    fn apply(&mut self, key: &str, value: &str, line: usize) -> Result<(), OmniError> {
        match key {
            "total_size" => self.total_size = parse_number(key, value, line)?,
            "header_size" => self.header_size = parse_number(key, value, line)?,
            "block_size" => self.block_size = parse_number(key, value, line)?,
            "max_entries" | "max_files" => self.max_entries = parse_number(key, value, line)?,
            "max_filename_length" => {
                self.max_filename_length = parse_number(key, value, line)?
            }
            _ => {}
        }
        Ok(())
    }
}

impl SecuritySection {
    fn apply(&mut self, key: &str, value: &str, line: usize) -> Result<(), OmniError> {
        match key {
            "max_users" => self.max_users = parse_number(key, value, line)?,
            "admin_username" => self.admin_username = value.to_string(),
            "admin_password" => self.admin_password = value.to_string(),
            "require_auth" => self.require_auth = parse_bool(key, value, line)?,
            _ => {}
        }
        Ok(())
    }
}

impl ServerSection {
    fn apply(&mut self, key: &str, value: &str, line: usize) -> Result<(), OmniError> {
        match key {
            "port" => self.port = parse_number(key, value, line)?,
            "max_connections" => self.max_connections = parse_number(key, value, line)?,
            "queue_timeout" => self.queue_timeout = parse_number(key, value, line)?,
            _ => {}
        }
        Ok(())
    }
}

fn unquote(value: &str) -> &str {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str, line: usize) -> Result<T, OmniError> {
    value.parse().map_err(|_| {
        OmniError::Configuration(format!("line {}: invalid value '{}' for {}", line, value, key))
    })
}

fn parse_bool(key: &str, value: &str, line: usize) -> Result<bool, OmniError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(OmniError::Configuration(format!(
            "line {}: invalid value '{}' for {}",
            line, value, key
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.filesystem.total_size, 100 * 1024 * 1024);
        assert_eq!(config.filesystem.block_size, 4096);
        assert_eq!(config.security.max_users, 50);
        assert_eq!(config.security.admin_username, "admin");
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_full_config() {
        let text = r#"
# OMNIFS server configuration
[filesystem]
total_size = 52428800
header_size = 512
block_size = 1024
max_entries = 200       # plenty
max_filename_length = 11

[security]
max_users = 10
admin_username = "root"
admin_password = "secret"
require_auth = true

[server]
port = 9000
max_connections = 8
queue_timeout = 15
"#;
        let config = Config::parse(text).unwrap();
        assert_eq!(config.filesystem.total_size, 52428800);
        assert_eq!(config.filesystem.block_size, 1024);
        assert_eq!(config.filesystem.max_entries, 200);
        assert_eq!(config.security.admin_username, "root");
        assert_eq!(config.security.admin_password, "secret");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.max_connections, 8);
    }

    #[test]
    fn test_unknown_keys_and_sections_ignored() {
        let text = "[filesystem]\nfancy_feature = on\n[logging]\nlevel = debug\n";
        assert!(Config::parse(text).is_ok());
    }

    #[test]
    fn test_bad_number_rejected() {
        let text = "[filesystem]\nblock_size = banana\n";
        let err = Config::parse(text).unwrap_err();
        assert!(matches!(err, OmniError::Configuration(_)));
    }

    #[test]
    fn test_missing_equals_rejected() {
        let err = Config::parse("[server]\nport 8080\n").unwrap_err();
        assert!(matches!(err, OmniError::Configuration(_)));
    }

    #[test]
    fn test_too_small_image_rejected() {
        let text = "[filesystem]\ntotal_size = 4096\n";
        let err = Config::parse(text).unwrap_err();
        assert!(matches!(err, OmniError::Configuration(_)));
    }

    #[test]
    fn test_name_limit_enforced() {
        let text = "[filesystem]\nmax_filename_length = 64\n";
        assert!(Config::parse(text).is_err());
    }
}
