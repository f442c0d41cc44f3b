use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Process not found: {0}")]
    ProcessNotFound(String),

    #[error("Module not loaded: {0}")]
    ModuleNotFound(String),

    #[error("Failed to open process: {0}")]
    ProcessOpenFailed(String),

    #[error("Process lost: {0}")]
    ProcessLost(String),

    #[error("Failed to read process memory at address {address:#x}: {message}")]
    MemoryReadFailed { address: u64, message: String },

    #[error("Failed to write process memory at address {address:#x}: {message}")]
    MemoryWriteFailed { address: u64, message: String },

    #[error("Null or invalid pointer {0:#x}")]
    InvalidPointer(u64),

    #[error("Decoded length {len} exceeds safety maximum {max}")]
    LengthOutOfRange { len: i64, max: usize },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Back-reference mismatch at {address:#x}: found {found:#x}")]
    BackReferenceMismatch { address: u64, found: u64 },

    #[error("Invalid {type_name} value: {value}")]
    InvalidEnumValue { type_name: &'static str, value: i64 },

    #[error("Memory writes are not safe in the current session state")]
    UnsafeToWrite,

    #[error("Invalid offset table: {0}")]
    InvalidOffsets(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Expected while the target starts up or recycles objects; never worth more than a debug line.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::ProcessNotFound(_)
                | Error::ModuleNotFound(_)
                | Error::BackReferenceMismatch { .. }
                | Error::InvalidPointer(_)
        )
    }

    pub fn is_process_lost(&self) -> bool {
        matches!(self, Error::ProcessLost(_))
    }

    /// Check if this error is a "file not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}
