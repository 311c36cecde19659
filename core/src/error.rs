use thiserror::Error;

#[derive(Debug, Error)]
pub enum OmniError {
    #[error("Invalid parameter provided: {0}")]
    InvalidArgument(String),

    #[error("File or resource not found: {0}")]
    NotFound(String),

    #[error("File or resource already exists: {0}")]
    AlreadyExists(String),

    #[error("The specified path is not a directory: {0}")]
    NotADirectory(String),

    #[error("The specified path is not a file: {0}")]
    NotAFile(String),

    #[error("The specified path is a directory: {0}")]
    IsDirectory(String),

    #[error("Directory is not empty: {0}")]
    DirectoryNotEmpty(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Session is invalid or has expired")]
    InvalidSession,

    #[error("Authentication failed")]
    AuthFailed,

    #[error("Not enough space: {0}")]
    NoSpace(String),

    #[error("File is too large: {0}")]
    FileTooLarge(String),

    #[error("Input/output error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("File system image is corrupted: {0}")]
    CorruptImage(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl OmniError {
    /// Stable integer code carried alongside error replies on the wire.
    pub fn code(&self) -> i32 {
        match self {
            OmniError::InvalidArgument(_) => -1,
            OmniError::PermissionDenied(_) => -2,
            OmniError::NotFound(_) => -3,
            OmniError::AlreadyExists(_) => -4,
            OmniError::DirectoryNotEmpty(_) => -5,
            OmniError::NoSpace(_) => -6,
            OmniError::IoError(_) => -7,
            OmniError::CorruptImage(_) => -8,
            OmniError::AuthFailed => -9,
            OmniError::InvalidSession => -10,
            OmniError::NotADirectory(_) => -11,
            OmniError::IsDirectory(_) => -12,
            OmniError::Configuration(_) => -13,
            OmniError::NotAFile(_) => -14,
            OmniError::FileTooLarge(_) => -15,
        }
    }
}

/// Canonical one-line message for an error code, as served by
/// `get_error_message`.
pub fn error_message(code: i32) -> &'static str {
    match code {
        0 => "Operation successful.",
        -1 => "Invalid parameter provided.",
        -2 => "Permission denied.",
        -3 => "File or resource not found.",
        -4 => "File or resource already exists.",
        -5 => "Directory is not empty.",
        -6 => "Not enough space.",
        -7 => "Input/output error.",
        -8 => "File system is corrupted.",
        -9 => "Authentication failed.",
        -10 => "Session is invalid or has expired.",
        -11 => "The specified path is not a directory.",
        -12 => "The specified path is a directory.",
        -13 => "An unexpected system error occurred.",
        -14 => "The specified path is not a file.",
        -15 => "File is too large.",
        _ => "An unknown error occurred.",
    }
}
