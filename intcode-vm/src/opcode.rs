//! # Intcode Opcodes
//!
//! Instruction set and decoder for the Intcode machine.
//!
//! An instruction word packs the instruction code into its two least
//! significant decimal digits and one addressing mode per parameter into the
//! hundreds, thousands and ten-thousands digits:
//!
//! ```text
//!   1002  ->  ABC DE  =  0 1 0 02
//!             |   +-- instruction 2 (MULTIPLY)
//!             +------ modes: p1 = 0 (position), p2 = 1 (immediate), p3 = 0
//! ```

use crate::error::{Error, Result};
use std::fmt;

/// Parameter addressing mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// The parameter is an address
    Position,
    /// The parameter is the operand itself (reads only)
    Immediate,
    /// The parameter is an offset from the relative base
    Relative,
}

impl Mode {
    fn from_digit(digit: i64) -> Option<Self> {
        match digit {
            0 => Some(Mode::Position),
            1 => Some(Mode::Immediate),
            2 => Some(Mode::Relative),
            _ => None,
        }
    }
}

/// The fixed Intcode instruction table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instruction {
    Add,
    Multiply,
    Input,
    Output,
    JumpIfTrue,
    JumpIfFalse,
    LessThan,
    Equals,
    AdjustRelativeBase,
    Abort,
}

impl Instruction {
    /// Look up an instruction by its two-digit code
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Instruction::Add),
            2 => Some(Instruction::Multiply),
            3 => Some(Instruction::Input),
            4 => Some(Instruction::Output),
            5 => Some(Instruction::JumpIfTrue),
            6 => Some(Instruction::JumpIfFalse),
            7 => Some(Instruction::LessThan),
            8 => Some(Instruction::Equals),
            9 => Some(Instruction::AdjustRelativeBase),
            99 => Some(Instruction::Abort),
            _ => None,
        }
    }

    /// Number of parameters following the instruction word
    pub fn arity(&self) -> usize {
        match self {
            Instruction::Add
            | Instruction::Multiply
            | Instruction::LessThan
            | Instruction::Equals => 3,
            Instruction::JumpIfTrue | Instruction::JumpIfFalse => 2,
            Instruction::Input | Instruction::Output | Instruction::AdjustRelativeBase => 1,
            Instruction::Abort => 0,
        }
    }

    /// Index (1-based) of the parameter this instruction writes through, if any
    pub fn write_param(&self) -> Option<usize> {
        match self {
            Instruction::Add
            | Instruction::Multiply
            | Instruction::LessThan
            | Instruction::Equals => Some(3),
            Instruction::Input => Some(1),
            _ => None,
        }
    }

    pub fn mnemonic(&self) -> &'static str {
        match self {
            Instruction::Add => "ADD",
            Instruction::Multiply => "MUL",
            Instruction::Input => "IN",
            Instruction::Output => "OUT",
            Instruction::JumpIfTrue => "JNZ",
            Instruction::JumpIfFalse => "JZ",
            Instruction::LessThan => "LT",
            Instruction::Equals => "EQ",
            Instruction::AdjustRelativeBase => "ARB",
            Instruction::Abort => "HALT",
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.mnemonic())
    }
}

/// A decoded instruction word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opcode {
    /// The raw word as stored in memory
    pub raw: i64,
    pub instruction: Instruction,
    /// Modes for parameters 1, 2 and 3
    pub modes: [Mode; 3],
}

impl Opcode {
    /// Decode the instruction word found at `idx`.
    ///
    /// All three mode digits are validated whether or not the instruction
    /// uses them, so a malformed word is rejected before anything runs.
    pub fn decode(raw: i64, idx: i64) -> Result<Self> {
        if !(0..100_000).contains(&raw) {
            return Err(Error::invalid_instruction(idx, raw).with_operation("opcode::decode"));
        }

        let instruction = Instruction::from_code(raw % 100)
            .ok_or_else(|| Error::invalid_instruction(idx, raw).with_operation("opcode::decode"))?;

        let mut modes = [Mode::Position; 3];
        let mut rest = raw / 100;
        for (i, mode) in modes.iter_mut().enumerate() {
            let digit = rest % 10;
            *mode = Mode::from_digit(digit).ok_or_else(|| {
                Error::invalid_mode(idx, raw, i + 1, digit).with_operation("opcode::decode")
            })?;
            rest /= 10;
        }

        Ok(Self { raw, instruction, modes })
    }

    /// Mode of parameter `param` (1-based)
    pub fn mode(&self, param: usize) -> Mode {
        self.modes[param - 1]
    }

    /// Distance to the next instruction for non-jumping execution
    pub fn width(&self) -> i64 {
        1 + self.instruction.arity() as i64
    }
}

/// An Intcode program: the initial contents of memory
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Program {
    pub code: Vec<i64>,
}

impl Program {
    pub fn new(code: Vec<i64>) -> Self {
        Self { code }
    }

    /// Parse the usual comma-separated text form, e.g. `"1002,4,3,4,33"`.
    /// Whitespace around values and a trailing newline are ignored.
    pub fn parse(text: &str) -> Result<Self> {
        let code = text
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<i64>().map_err(|e| {
                    Error::parse_failed(format!("invalid program value '{}'", s))
                        .with_operation("program::parse")
                        .set_source(e)
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { code })
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Linear disassembly of the program text.
    ///
    /// Intcode freely mixes code and data, so words that don't decode are
    /// listed as `DATA` and the walk continues with the next word.
    pub fn disassemble(&self) -> Vec<String> {
        let mut lines = Vec::new();
        let mut i = 0;

        while i < self.code.len() {
            let raw = self.code[i];
            match Opcode::decode(raw, i as i64) {
                Ok(op) => {
                    let width = op.width() as usize;
                    let params = (1..width)
                        .map(|p| format_param(self.code.get(i + p).copied(), op.mode(p)))
                        .collect::<Vec<_>>()
                        .join(", ");
                    if params.is_empty() {
                        lines.push(format!("{:5} | {}", i, op.instruction));
                    } else {
                        lines.push(format!("{:5} | {:4} {}", i, op.instruction, params));
                    }
                    i += width;
                }
                Err(_) => {
                    lines.push(format!("{:5} | DATA {}", i, raw));
                    i += 1;
                }
            }
        }

        lines
    }
}

impl From<Vec<i64>> for Program {
    fn from(code: Vec<i64>) -> Self {
        Self { code }
    }
}

fn format_param(value: Option<i64>, mode: Mode) -> String {
    let Some(value) = value else {
        return "?".to_string();
    };
    match mode {
        Mode::Position => format!("[{}]", value),
        Mode::Immediate => format!("{}", value),
        Mode::Relative if value < 0 => format!("[rb-{}]", value.unsigned_abs()),
        Mode::Relative => format!("[rb+{}]", value),
    }
}
