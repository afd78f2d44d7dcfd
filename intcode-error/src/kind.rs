//! Error kinds for Intcode operations

use std::fmt;

/// The kind of error that occurred.
///
/// This enum categorizes errors to help users write clear error handling logic.
/// Users can match on ErrorKind to decide how to handle specific error cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // =========================================================================
    // General errors
    // =========================================================================
    /// An unexpected error occurred - catch-all for unhandled cases
    Unexpected,

    // =========================================================================
    // Program errors (fatal for the run that raised them)
    // =========================================================================
    /// Instruction code not in the opcode table
    InvalidInstruction,

    /// Parameter mode digit outside {0, 1, 2}
    InvalidMode,

    /// Write target given in immediate mode
    ImmediateWrite,

    /// Arithmetic result does not fit the machine word
    ArithmeticOverflow,

    // =========================================================================
    // Machine lifecycle errors
    // =========================================================================
    /// Pull attempted on a machine that already halted
    MachineHalted,

    /// Pull attempted on a machine that already failed
    MachineFailed,

    // =========================================================================
    // Storage errors
    // =========================================================================
    /// Storage operation failed
    StorageFailed,

    /// Serialization/deserialization failed
    SerializationFailed,

    // =========================================================================
    // Gateway errors
    // =========================================================================
    /// Client request is malformed or missing fields
    InvalidRequest,

    /// No session state stored for the connection
    SessionNotFound,

    /// Remote connection is gone
    ConnectionClosed,

    // =========================================================================
    // IO errors
    // =========================================================================
    /// File not found
    FileNotFound,

    /// Permission denied
    PermissionDenied,

    /// IO operation failed
    IoFailed,

    // =========================================================================
    // Parse errors
    // =========================================================================
    /// Failed to parse input
    ParseFailed,
}

impl ErrorKind {
    /// Returns the error kind as a static string
    pub fn as_str(&self) -> &'static str {
        match self {
            // General
            ErrorKind::Unexpected => "Unexpected",

            // Program
            ErrorKind::InvalidInstruction => "InvalidInstruction",
            ErrorKind::InvalidMode => "InvalidMode",
            ErrorKind::ImmediateWrite => "ImmediateWrite",
            ErrorKind::ArithmeticOverflow => "ArithmeticOverflow",

            // Machine
            ErrorKind::MachineHalted => "MachineHalted",
            ErrorKind::MachineFailed => "MachineFailed",

            // Storage
            ErrorKind::StorageFailed => "StorageFailed",
            ErrorKind::SerializationFailed => "SerializationFailed",

            // Gateway
            ErrorKind::InvalidRequest => "InvalidRequest",
            ErrorKind::SessionNotFound => "SessionNotFound",
            ErrorKind::ConnectionClosed => "ConnectionClosed",

            // IO
            ErrorKind::FileNotFound => "FileNotFound",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::IoFailed => "IoFailed",

            // Parse
            ErrorKind::ParseFailed => "ParseFailed",
        }
    }

    /// Check if this error kind is retryable by default
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::StorageFailed | ErrorKind::IoFailed)
    }

    /// Faults raised by the program itself. These end the run and must not
    /// be retried against the same machine.
    pub fn is_program_error(&self) -> bool {
        matches!(
            self,
            ErrorKind::InvalidInstruction
                | ErrorKind::InvalidMode
                | ErrorKind::ImmediateWrite
                | ErrorKind::ArithmeticOverflow
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
