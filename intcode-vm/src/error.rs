//! Intcode VM error types
//!
//! Re-exports intcode-error and provides VM-specific conveniences.

// Re-export the core error types
pub use intcode_error::{Error, ErrorKind, ErrorStatus, Result};

// =============================================================================
// VM-specific error constructors
// =============================================================================

/// Create an IoFailed error
pub fn io_error(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::IoFailed, message)
}

/// Create a SerializationFailed error
pub fn serialization_error(message: impl Into<String>) -> Error {
    Error::serialization_failed(message)
}

/// Create a StorageFailed error
pub fn storage_failed(reason: impl Into<String>) -> Error {
    Error::new(ErrorKind::StorageFailed, reason)
}

/// Create a ConnectionClosed error
pub fn connection_closed(connection_id: impl Into<String>) -> Error {
    let connection_id = connection_id.into();
    Error::new(
        ErrorKind::ConnectionClosed,
        format!("connection '{}' is closed", connection_id),
    )
    .with_context("connection_id", connection_id)
}
