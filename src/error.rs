use std::fmt;

use miette::{miette, LabeledSpan, Report, Severity};

// Assembler diagnostics

pub fn asm_no_section(at: usize, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::section",
        help = "every block starts with `section .text:` or `section .data:`",
        labels = vec![LabeledSpan::at_offset(at, "expected a section here")],
        "Expected a section declaration.",
    )
    .with_source_code(src.to_string())
}

pub fn asm_unknown_section(at: usize, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::section",
        help = "the only sections are `.text:` and `.data:`",
        labels = vec![LabeledSpan::at_offset(at, "unknown section name")],
        "Encountered an unknown section.",
    )
    .with_source_code(src.to_string())
}

pub fn asm_section_order(at: usize, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::section_order",
        help = "code starts at address 0x200, so `.text:` must come before any data",
        labels = vec![LabeledSpan::at_offset(at, "text section here")],
        "The text section must be the first section in the file.",
    )
    .with_source_code(src.to_string())
}

pub fn asm_org_collision(at: usize, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::org",
        help = "pick an address past the end of the text section",
        labels = vec![LabeledSpan::at_offset(at, "origin collides with code")],
        "The data origin overlaps already-assembled text.",
    )
    .with_source_code(src.to_string())
}

pub fn asm_section_overflow(at: usize, src: &str, section: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::overflow",
        help = "programs end at address 0xFFF",
        labels = vec![LabeledSpan::at_offset(at, "memory exhausted near here")],
        "The {section} section does not fit in memory.",
    )
    .with_source_code(src.to_string())
}

pub fn asm_bad_hex(at: usize, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::hex",
        help = "hex literals use a fixed digit count, like `0x1F` for a byte",
        labels = vec![LabeledSpan::at_offset(at, "not a hex digit")],
        "Expected a hexadecimal digit.",
    )
    .with_source_code(src.to_string())
}

pub fn asm_bad_number(at: usize, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::hex",
        help = "numeric operands are written in hex with a `0x` prefix",
        labels = vec![LabeledSpan::at_offset(at, "expected `0x` here")],
        "Expected a hexadecimal literal.",
    )
    .with_source_code(src.to_string())
}

pub fn asm_bad_register(at: usize, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::register",
        help = "registers are `V0` through `VF`",
        labels = vec![LabeledSpan::at_offset(at, "not a register")],
        "Expected a register operand.",
    )
    .with_source_code(src.to_string())
}

pub fn asm_bad_label(at: usize, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::label",
        help = "label names may only contain letters",
        labels = vec![LabeledSpan::at_offset(at, "invalid label character")],
        "Encountered an invalid label declaration.",
    )
    .with_source_code(src.to_string())
}

pub fn asm_bad_operand(at: usize, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::operand",
        help = "check the operands this mnemonic accepts",
        labels = vec![LabeledSpan::at_offset(at, "unexpected operand")],
        "Encountered an invalid operand.",
    )
    .with_source_code(src.to_string())
}

pub fn asm_unknown_mnemonic(span: (usize, usize), src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::mnemonic",
        help = "check the instruction listing for available mnemonics",
        labels = vec![LabeledSpan::at(span, "unknown mnemonic")],
        "Encountered an unknown mnemonic.",
    )
    .with_source_code(src.to_string())
}

pub fn asm_unresolved_label(name: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::unresolved_label",
        help = format!("declare it somewhere in the text section as `_{name}:`"),
        "Unable to resolve label `{name}`.",
    )
}

// Runtime errors

/// Faults the interpreter can hit mid-program. Carries the offending
/// opcode where one exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecError {
    UnknownOpcode(u16),
    StackUnderflow,
    StackOverflow,
    InvalidOperand(u16),
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecError::UnknownOpcode(op) => write!(f, "unknown opcode 0x{op:04X}"),
            ExecError::StackUnderflow => write!(f, "return with an empty call stack"),
            ExecError::StackOverflow => write!(f, "call stack exceeded 16 levels"),
            ExecError::InvalidOperand(op) => write!(f, "invalid operand for opcode 0x{op:04X}"),
        }
    }
}

impl std::error::Error for ExecError {}

/// A program image that does not fit between 0x200 and the end of memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OversizeImage {
    pub len: usize,
    pub max: usize,
}

impl fmt::Display for OversizeImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "program image is {} bytes but only {} fit above 0x200",
            self.len, self.max
        )
    }
}

impl std::error::Error for OversizeImage {}

/// Window or input failure from the display layer.
#[derive(Debug)]
pub struct FrontendError(pub String);

impl fmt::Display for FrontendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "display error: {}", self.0)
    }
}

impl std::error::Error for FrontendError {}

impl From<minifb::Error> for FrontendError {
    fn from(err: minifb::Error) -> Self {
        FrontendError(err.to_string())
    }
}

/// Anything that can stop the emulator loop.
#[derive(Debug)]
pub enum EmuError {
    Exec(ExecError),
    Frontend(FrontendError),
}

impl fmt::Display for EmuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmuError::Exec(e) => e.fmt(f),
            EmuError::Frontend(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for EmuError {}

impl From<ExecError> for EmuError {
    fn from(err: ExecError) -> Self {
        EmuError::Exec(err)
    }
}

impl From<FrontendError> for EmuError {
    fn from(err: FrontendError) -> Self {
        EmuError::Frontend(err)
    }
}

/// Process exit codes, following the BSD sysexits convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Usage,
    Assembler,
    Runtime,
    System,
    Io,
}

impl ExitStatus {
    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::Usage => 64,
            ExitStatus::Assembler => 65,
            ExitStatus::Runtime => 70,
            ExitStatus::System => 71,
            ExitStatus::Io => 74,
        }
    }
}
