//! The main Error type for the Intcode workspace

use crate::{ErrorKind, ErrorStatus};
use std::fmt;

/// An error raised anywhere in the workspace, from instruction decoding up
/// to the TCP transport.
///
/// Besides its [`ErrorKind`] and message, an error remembers the operation
/// that raised it, a list of `key=value` context pairs, whether retrying
/// could help, and optionally the lower-level error behind it.
///
/// # Example
///
/// ```rust
/// use intcode_error::{Error, ErrorKind, ErrorStatus};
///
/// let err = Error::new(ErrorKind::StorageFailed, "state file locked")
///     .with_operation("storage::put")
///     .with_context("connection_id", "conn_7");
///
/// assert_eq!(err.kind(), ErrorKind::StorageFailed);
/// assert_eq!(err.status(), ErrorStatus::Temporary);
/// assert_eq!(
///     err.to_string(),
///     "StorageFailed at storage::put: state file locked (connection_id=conn_7) [temporary]"
/// );
/// ```
pub struct Error {
    kind: ErrorKind,
    message: String,
    status: ErrorStatus,
    operation: &'static str,
    context: Vec<(&'static str, String)>,
    source: Option<anyhow::Error>,
}

impl Error {
    /// Create an error; the status follows from whether `kind` is retryable
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: if kind.is_retryable() {
                ErrorStatus::Temporary
            } else {
                ErrorStatus::Permanent
            },
            operation: "",
            context: Vec::new(),
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> ErrorStatus {
        self.status
    }

    /// Innermost-last operation name, e.g. `session::resume`
    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn context(&self) -> &[(&'static str, String)] {
        &self.context
    }

    pub fn source_ref(&self) -> Option<&anyhow::Error> {
        self.source.as_ref()
    }

    pub fn with_status(mut self, status: ErrorStatus) -> Self {
        self.status = status;
        self
    }

    pub fn temporary(self) -> Self {
        self.with_status(ErrorStatus::Temporary)
    }

    pub fn permanent(self) -> Self {
        self.with_status(ErrorStatus::Permanent)
    }

    /// Record the operation that is propagating this error.
    ///
    /// Calling it again as the error travels outward keeps the earlier name
    /// under the `called` context key.
    pub fn with_operation(mut self, operation: &'static str) -> Self {
        if !self.operation.is_empty() {
            self.context.push(("called", self.operation.to_string()));
        }
        self.operation = operation;
        self
    }

    pub fn with_context(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.context.push((key, value.into()));
        self
    }

    /// Attach the underlying error. Only one source may be set.
    pub fn set_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        debug_assert!(self.source.is_none(), "source error already set");
        self.source = Some(source.into());
        self
    }

    /// Give up on retrying: a temporary error becomes persistent
    pub fn persist(mut self) -> Self {
        self.status = self.status.persist();
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.status.is_retryable()
    }
}

/// One line: `Kind at operation: message (k=v, ...) [status]`
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if !self.operation.is_empty() {
            write!(f, " at {}", self.operation)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if !self.context.is_empty() {
            let pairs = self
                .context
                .iter()
                .map(|(key, value)| format!("{}={}", key, value))
                .collect::<Vec<_>>()
                .join(", ");
            write!(f, " ({})", pairs)?;
        }
        write!(f, " [{}]", self.status)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("Error");
        out.field("kind", &self.kind)
            .field("status", &self.status)
            .field("operation", &self.operation)
            .field("message", &self.message);
        if !self.context.is_empty() {
            out.field("context", &self.context);
        }
        if let Some(source) = &self.source {
            out.field("source", source);
        }
        out.finish()
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind as Io;

        let kind = match err.kind() {
            Io::NotFound => ErrorKind::FileNotFound,
            Io::PermissionDenied => ErrorKind::PermissionDenied,
            Io::BrokenPipe | Io::ConnectionReset | Io::ConnectionAborted => {
                ErrorKind::ConnectionClosed
            }
            _ => ErrorKind::IoFailed,
        };
        Error::new(kind, err.to_string())
            .with_operation("io")
            .set_source(err)
    }
}

// =============================================================================
// Convenience constructors
// =============================================================================

impl Error {
    /// Create an Unexpected error
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unexpected, message)
    }

    /// Create an InvalidInstruction error for an opcode word at `idx`
    pub fn invalid_instruction(idx: i64, opcode: i64) -> Self {
        Self::new(
            ErrorKind::InvalidInstruction,
            format!("unknown instruction {} in opcode {}", opcode.rem_euclid(100), opcode),
        )
        .with_context("idx", idx.to_string())
        .with_context("opcode", opcode.to_string())
    }

    /// Create an InvalidMode error for parameter `param` (1-based)
    pub fn invalid_mode(idx: i64, opcode: i64, param: usize, mode: i64) -> Self {
        Self::new(
            ErrorKind::InvalidMode,
            format!("unknown mode {} for parameter {} in opcode {}", mode, param, opcode),
        )
        .with_context("idx", idx.to_string())
        .with_context("opcode", opcode.to_string())
        .with_context("param", param.to_string())
    }

    /// Create an ImmediateWrite error for parameter `param` (1-based)
    pub fn immediate_write(idx: i64, opcode: i64, param: usize) -> Self {
        Self::new(
            ErrorKind::ImmediateWrite,
            format!("parameter {} of opcode {} writes through immediate mode", param, opcode),
        )
        .with_context("idx", idx.to_string())
        .with_context("opcode", opcode.to_string())
    }

    /// Create an ArithmeticOverflow error
    pub fn arithmetic_overflow(idx: i64, what: impl Into<String>) -> Self {
        Self::new(ErrorKind::ArithmeticOverflow, format!("{} overflows i64", what.into()))
            .with_context("idx", idx.to_string())
    }

    /// Create a SerializationFailed error
    pub fn serialization_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SerializationFailed, message)
    }

    /// Create a SessionNotFound error
    pub fn session_not_found(connection_id: impl Into<String>) -> Self {
        let connection_id = connection_id.into();
        Self::new(
            ErrorKind::SessionNotFound,
            format!("no session stored for connection '{}'", connection_id),
        )
        .with_context("connection_id", connection_id)
    }

    /// Create an InvalidRequest error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message)
    }

    /// Create a ParseFailed error
    pub fn parse_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ParseFailed, message)
    }

    /// Whether this error belongs to the program-error family
    pub fn is_program_error(&self) -> bool {
        self.kind.is_program_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::new(ErrorKind::InvalidMode, "unknown mode 3");
        assert_eq!(err.kind(), ErrorKind::InvalidMode);
        assert_eq!(err.message(), "unknown mode 3");
        assert_eq!(err.status(), ErrorStatus::Permanent);
    }

    #[test]
    fn test_error_with_context() {
        let err = Error::new(ErrorKind::StorageFailed, "disk full")
            .with_operation("storage::put")
            .with_context("connection_id", "conn_1")
            .with_context("bytes", "1500");

        assert_eq!(err.operation(), "storage::put");
        assert_eq!(err.context().len(), 2);
        assert_eq!(err.context()[0], ("connection_id", "conn_1".to_string()));
    }

    #[test]
    fn test_operation_chaining() {
        let err = Error::new(ErrorKind::IoFailed, "write failed")
            .with_operation("storage::put")
            .with_operation("gateway::suspend");

        assert_eq!(err.operation(), "gateway::suspend");
        assert_eq!(err.context().len(), 1);
        assert_eq!(err.context()[0], ("called", "storage::put".to_string()));
    }

    #[test]
    fn test_temporary_status() {
        let err = Error::new(ErrorKind::StorageFailed, "locked");
        assert!(err.is_retryable());

        let err = Error::new(ErrorKind::InvalidInstruction, "unknown instruction");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_persist() {
        let err = Error::new(ErrorKind::ConnectionClosed, "peer reset").temporary();
        assert!(err.is_retryable());

        let err = err.persist();
        assert!(!err.is_retryable());
        assert_eq!(err.status(), ErrorStatus::Persistent);
    }

    #[test]
    fn test_display() {
        let err = Error::invalid_instruction(0, 23).with_operation("machine::decode");

        assert_eq!(
            err.to_string(),
            "InvalidInstruction at machine::decode: unknown instruction 23 in opcode 23 \
             (idx=0, opcode=23) [permanent]"
        );
    }

    #[test]
    fn test_program_error_constructors() {
        let err = Error::invalid_mode(0, 301, 1, 3);
        assert_eq!(err.kind(), ErrorKind::InvalidMode);
        assert!(err.message().contains("mode 3"));
        assert!(err.is_program_error());

        let err = Error::immediate_write(4, 11101, 3);
        assert_eq!(err.kind(), ErrorKind::ImmediateWrite);
        assert!(err.is_program_error());

        let err = Error::session_not_found("conn_9");
        assert!(!err.is_program_error());
        assert!(err.message().contains("conn_9"));
    }

    #[test]
    fn test_from_io_error() {
        let err = Error::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert_eq!(err.kind(), ErrorKind::FileNotFound);
        assert_eq!(err.operation(), "io");

        let err = Error::from(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "eof"));
        assert_eq!(err.kind(), ErrorKind::ConnectionClosed);
    }

    #[test]
    fn test_set_source() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = Error::serialization_failed("bad snapshot").set_source(json_err);

        assert!(err.source_ref().is_some());
        assert!(std::error::Error::source(&err).is_some());
    }
}
