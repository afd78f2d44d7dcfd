//! # Intcode VM
//!
//! A virtual machine for the Intcode instruction set, built to be paused.
//!
//! ## Core Concepts
//! - **Memory**: sparse tape of `i64` cells; unwritten cells read as 0
//! - **Opcodes**: instruction word = two-digit instruction + per-parameter modes
//! - **Machine**: pull-based executor that suspends on every output and on
//!   every input it can't satisfy
//! - **Snapshot**: the full machine state as JSON, so a suspended run can be
//!   resumed by a different process
//! - **Sessions**: per-connection request handling on top of a pluggable
//!   state store and message sink
//!
//! ```rust
//! use intcode_vm::{ExecutionResult, Machine};
//!
//! let mut machine = Machine::new(vec![3, 0, 3, 0, 4, 0, 99], vec![42]);
//! assert!(matches!(machine.resume(), ExecutionResult::NeedsInput));
//!
//! let blob = machine.serialize().unwrap();
//! let mut machine = Machine::deserialize(&blob).unwrap();
//! machine.append_input([43]);
//! assert!(matches!(machine.resume(), ExecutionResult::Output(43)));
//! assert!(matches!(machine.resume(), ExecutionResult::Halted));
//! ```

pub mod error;
pub mod machine;
pub mod memory;
pub mod opcode;
pub mod request;
pub mod session;
pub mod snapshot;
pub mod storage;

pub use error::{Error, ErrorKind, ErrorStatus, Result};
pub use machine::{ExecutionResult, ExecutionState, Machine, Outputs, RunSummary};
pub use memory::Memory;
pub use opcode::{Instruction, Mode, Opcode, Program};
pub use request::Request;
pub use session::{ConnectionSink, SessionManager, SessionRecord, SessionStatus};
pub use snapshot::Snapshot;
pub use storage::{FileStore, MemoryStore, StateStore};
