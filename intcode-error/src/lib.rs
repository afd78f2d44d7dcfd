//! # intcode-error
//!
//! Unified error handling for the Intcode workspace.
//!
//! ## Design Philosophy
//!
//! - **ErrorKind**: Know what error occurred (e.g., InvalidInstruction, StorageFailed)
//! - **ErrorStatus**: Decide how to handle it (Permanent, Temporary, Persistent)
//! - **Error Context**: Assist in locating the cause with rich context
//! - **Error Source**: Wrap underlying errors without leaking raw types
//!
//! A machine that runs out of input is *not* an error. That suspension is
//! reported as a regular execution outcome by the VM; only faults that end a
//! run or break a collaborator end up here.
//!
//! ## Usage
//!
//! ```rust
//! use intcode_error::{Error, ErrorKind};
//!
//! fn example() -> Result<(), Error> {
//!     Err(Error::new(ErrorKind::InvalidInstruction, "unknown instruction 23")
//!         .with_operation("machine::decode")
//!         .with_context("idx", "0")
//!         .with_context("opcode", "23"))
//! }
//! ```
//!
//! ## Principles
//!
//! - All functions return `Result<T, intcode_error::Error>`
//! - External errors are wrapped with `set_source(err)`
//! - Same error handled once, subsequent ops only append context
//! - Don't abuse `From<OtherError>` to prevent raw error leakage

mod error;
mod kind;
mod status;

pub use error::Error;
pub use kind::ErrorKind;
pub use status::ErrorStatus;

/// Result type alias using the Intcode Error
pub type Result<T> = std::result::Result<T, Error>;
