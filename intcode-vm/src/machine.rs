//! # Intcode Machine
//!
//! Fetch-decode-execute loop with explicit suspension.
//!
//! The machine never runs ahead of its caller. Each call to
//! [`Machine::resume`] executes instructions from the current pointer until
//! exactly one of these happens:
//!
//! - an OUTPUT instruction fires: [`ExecutionResult::Output`]
//! - the program halts: [`ExecutionResult::Halted`]
//! - an INPUT instruction finds the queue empty: [`ExecutionResult::NeedsInput`]
//! - the program faults: [`ExecutionResult::Failed`]
//!
//! `NeedsInput` is a suspension, not a failure. The pointer still names the
//! INPUT instruction, so the machine can be snapshotted, fed more input with
//! [`Machine::append_input`] and resumed as if nothing happened.
//!
//! Every instruction validates all of its operands before it touches memory
//! or the pointer, so a fault or suspension always leaves the machine
//! "about to execute the instruction at `idx`".

use crate::error::{Error, ErrorKind, Result};
use crate::memory::Memory;
use crate::opcode::{Instruction, Mode, Opcode, Program};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Lifecycle of a machine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// Can be resumed
    #[default]
    Running,
    /// Executed opcode 99
    Halted,
    /// Raised a program error
    Failed,
}

impl ExecutionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionState::Running)
    }
}

/// Outcome of one pull
#[derive(Debug)]
pub enum ExecutionResult {
    /// An OUTPUT instruction produced a value; the next pull continues after it
    Output(i64),
    /// The program executed ABORT (99)
    Halted,
    /// An INPUT instruction found the queue empty; append input and resume.
    ///
    /// Carries no state of its own. The caller still holds the machine,
    /// which is parked on the INPUT instruction, and takes the snapshot from
    /// it with [`Machine::snapshot`] or [`Machine::serialize`].
    NeedsInput,
    /// The program (or the caller) did something illegal
    Failed(Error),
}

impl ExecutionResult {
    /// True for every outcome after which pulling again yields nothing new
    /// without caller action
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionResult::Output(_))
    }

    pub fn output(&self) -> Option<i64> {
        match self {
            ExecutionResult::Output(value) => Some(*value),
            _ => None,
        }
    }
}

/// What a single instruction did
enum Step {
    Continue,
    Output(i64),
    Halt,
    NeedsInput,
}

/// Everything a run produced up to its first non-output outcome
#[derive(Debug)]
pub struct RunSummary {
    pub outputs: Vec<i64>,
    pub end: ExecutionResult,
}

/// The Intcode virtual machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Machine {
    pub(crate) memory: Memory,
    /// Address of the next instruction word
    pub(crate) idx: i64,
    pub(crate) relative_base: i64,
    pub(crate) inputs: VecDeque<i64>,
    pub(crate) state: ExecutionState,
}

impl Machine {
    /// Create a machine with `program` loaded at address 0
    pub fn new(program: impl Into<Program>, inputs: impl IntoIterator<Item = i64>) -> Self {
        let program = program.into();
        Self {
            memory: Memory::from_program(&program.code),
            idx: 0,
            relative_base: 0,
            inputs: inputs.into_iter().collect(),
            state: ExecutionState::Running,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn idx(&self) -> i64 {
        self.idx
    }

    pub fn relative_base(&self) -> i64 {
        self.relative_base
    }

    pub fn state(&self) -> ExecutionState {
        self.state
    }

    /// Inputs queued but not yet consumed, front first
    pub fn pending_inputs(&self) -> impl Iterator<Item = i64> + '_ {
        self.inputs.iter().copied()
    }

    // =========================================================================
    // Caller operations
    // =========================================================================

    /// Queue values behind any inputs not yet consumed
    pub fn append_input(&mut self, values: impl IntoIterator<Item = i64>) {
        let before = self.inputs.len();
        self.inputs.extend(values);
        log::debug!(
            "queued {} input value(s), {} pending",
            self.inputs.len() - before,
            self.inputs.len()
        );
    }

    /// Run until the next output, halt, input shortage or fault
    pub fn resume(&mut self) -> ExecutionResult {
        loop {
            if let Some(result) = self.pull(u64::MAX) {
                return result;
            }
        }
    }

    /// A pull that gives up after `budget` instructions. `None` leaves the
    /// machine at an instruction boundary, resumable as usual.
    pub(crate) fn pull(&mut self, budget: u64) -> Option<ExecutionResult> {
        if self.state.is_terminal() {
            return Some(ExecutionResult::Failed(self.terminal_error()));
        }

        for _ in 0..budget {
            match self.step() {
                Ok(Step::Continue) => continue,
                Ok(Step::Output(value)) => {
                    log::debug!("output {} (next idx {})", value, self.idx);
                    return Some(ExecutionResult::Output(value));
                }
                Ok(Step::Halt) => {
                    log::debug!("halted at idx {}", self.idx);
                    self.state = ExecutionState::Halted;
                    return Some(ExecutionResult::Halted);
                }
                Ok(Step::NeedsInput) => {
                    log::debug!("suspended for input at idx {}", self.idx);
                    return Some(ExecutionResult::NeedsInput);
                }
                Err(err) => {
                    log::debug!("program error at idx {}: {}", self.idx, err);
                    self.state = ExecutionState::Failed;
                    return Some(ExecutionResult::Failed(err.with_operation("machine::resume")));
                }
            }
        }
        None
    }

    fn terminal_error(&self) -> Error {
        let (kind, message) = match self.state {
            ExecutionState::Halted => (ErrorKind::MachineHalted, "machine already halted"),
            _ => (ErrorKind::MachineFailed, "machine already failed"),
        };
        Error::new(kind, message)
            .with_operation("machine::resume")
            .with_context("idx", self.idx.to_string())
    }

    /// Pull-based view of the run: yields every outcome up to and including
    /// the first one that isn't an output
    pub fn outputs(&mut self) -> Outputs<'_> {
        Outputs {
            machine: self,
            done: false,
        }
    }

    /// Pull until the first non-output outcome, collecting outputs
    pub fn run_to_end(&mut self) -> RunSummary {
        let mut outputs = Vec::new();
        loop {
            match self.resume() {
                ExecutionResult::Output(value) => outputs.push(value),
                end => return RunSummary { outputs, end },
            }
        }
    }

    // =========================================================================
    // Execution
    // =========================================================================

    /// Execute the instruction at `idx`
    fn step(&mut self) -> Result<Step> {
        let op = Opcode::decode(self.memory.get(self.idx), self.idx)?;
        log::trace!(
            "idx={} rb={} {} {:?}",
            self.idx,
            self.relative_base,
            op.instruction,
            self.memory.dump(self.idx, op.width() as usize)
        );

        match op.instruction {
            Instruction::Add => {
                let (a, b, dst) = self.binary_operands(&op)?;
                let sum = a
                    .checked_add(b)
                    .ok_or_else(|| Error::arithmetic_overflow(self.idx, format!("{} + {}", a, b)))?;
                self.finish_write(&op, dst, sum)
            }
            Instruction::Multiply => {
                let (a, b, dst) = self.binary_operands(&op)?;
                let product = a
                    .checked_mul(b)
                    .ok_or_else(|| Error::arithmetic_overflow(self.idx, format!("{} * {}", a, b)))?;
                self.finish_write(&op, dst, product)
            }
            Instruction::LessThan => {
                let (a, b, dst) = self.binary_operands(&op)?;
                self.finish_write(&op, dst, i64::from(a < b))
            }
            Instruction::Equals => {
                let (a, b, dst) = self.binary_operands(&op)?;
                self.finish_write(&op, dst, i64::from(a == b))
            }
            Instruction::Input => {
                let dst = self.destination(&op)?;
                let next = self.next_idx(&op)?;
                let Some(value) = self.inputs.pop_front() else {
                    return Ok(Step::NeedsInput);
                };
                self.memory.set(dst, value);
                self.idx = next;
                Ok(Step::Continue)
            }
            Instruction::Output => {
                let value = self.read(&op, 1)?;
                self.idx = self.next_idx(&op)?;
                Ok(Step::Output(value))
            }
            Instruction::JumpIfTrue | Instruction::JumpIfFalse => {
                let cond = self.read(&op, 1)?;
                let target = self.read(&op, 2)?;
                let jump = (cond != 0) == (op.instruction == Instruction::JumpIfTrue);
                self.idx = if jump { target } else { self.next_idx(&op)? };
                Ok(Step::Continue)
            }
            Instruction::AdjustRelativeBase => {
                let delta = self.read(&op, 1)?;
                let base = self.relative_base.checked_add(delta).ok_or_else(|| {
                    Error::arithmetic_overflow(
                        self.idx,
                        format!("relative base {} + {}", self.relative_base, delta),
                    )
                })?;
                let next = self.next_idx(&op)?;
                self.relative_base = base;
                self.idx = next;
                Ok(Step::Continue)
            }
            Instruction::Abort => Ok(Step::Halt),
        }
    }

    /// Operands shared by ADD, MUL, LT and EQ
    fn binary_operands(&self, op: &Opcode) -> Result<(i64, i64, i64)> {
        let dst = self.destination(op)?;
        Ok((self.read(op, 1)?, self.read(op, 2)?, dst))
    }

    fn finish_write(&mut self, op: &Opcode, dst: i64, value: i64) -> Result<Step> {
        let next = self.next_idx(op)?;
        self.memory.set(dst, value);
        self.idx = next;
        Ok(Step::Continue)
    }

    /// Raw value of parameter `param` (1-based)
    fn param(&self, param: usize) -> Result<i64> {
        let addr = self
            .idx
            .checked_add(param as i64)
            .ok_or_else(|| Error::arithmetic_overflow(self.idx, "parameter address"))?;
        Ok(self.memory.get(addr))
    }

    fn relative(&self, offset: i64) -> Result<i64> {
        self.relative_base.checked_add(offset).ok_or_else(|| {
            Error::arithmetic_overflow(
                self.idx,
                format!("relative address {} + {}", self.relative_base, offset),
            )
        })
    }

    /// Operand value of parameter `param` according to its mode
    fn read(&self, op: &Opcode, param: usize) -> Result<i64> {
        let raw = self.param(param)?;
        match op.mode(param) {
            Mode::Position => Ok(self.memory.get(raw)),
            Mode::Immediate => Ok(raw),
            Mode::Relative => Ok(self.memory.get(self.relative(raw)?)),
        }
    }

    /// Target address of the instruction's write parameter
    fn destination(&self, op: &Opcode) -> Result<i64> {
        let param = op.instruction.write_param().ok_or_else(|| {
            Error::unexpected(format!("{} writes no memory", op.instruction))
                .with_operation("machine::destination")
        })?;
        self.write_address(op, param)
    }

    /// Target address of parameter `param`; immediate mode cannot be written
    fn write_address(&self, op: &Opcode, param: usize) -> Result<i64> {
        let raw = self.param(param)?;
        match op.mode(param) {
            Mode::Position => Ok(raw),
            Mode::Immediate => Err(Error::immediate_write(self.idx, op.raw, param)),
            Mode::Relative => self.relative(raw),
        }
    }

    fn next_idx(&self, op: &Opcode) -> Result<i64> {
        self.idx
            .checked_add(op.width())
            .ok_or_else(|| Error::arithmetic_overflow(self.idx, "instruction pointer"))
    }
}

/// Iterator over pulls; see [`Machine::outputs`]
pub struct Outputs<'a> {
    machine: &'a mut Machine,
    done: bool,
}

impl Iterator for Outputs<'_> {
    type Item = ExecutionResult;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let result = self.machine.resume();
        self.done = result.is_terminal();
        Some(result)
    }
}
