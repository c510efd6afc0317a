//! # G-code Interpreter
//!
//! Turns RS-274 text into machine-limited motion programs and finally into
//! step-command streams.
//!
//! The pipeline, in the order the host applies it:
//!
//! 1. [`parse::parse_program`] — text to a sequence of [`Block`]s
//! 2. [`program::carry_feedrates`] — make `F` explicit on every move
//! 3. [`offsets::resolve_offsets`] — fold G92 into absolute coordinates
//! 4. [`planner::simplify_path`] — Douglas-Peucker with guards
//! 5. [`program::partition`] — group into same-dispatch-family runs
//! 6. [`planner`] — junction and acceleration limits, rapid expansion
//! 7. [`synth`] — tick-aligned step-command synthesis
//!
//! Supported words: G0, G1, G4, G92, M3, M5, M17, M18 with parameters
//! `X Y Z A F P`; `;` comments; case and whitespace insensitive.

pub mod block;
pub mod offsets;
pub mod parse;
pub mod planner;
pub mod program;
pub mod synth;

pub use block::Block;
pub use program::{PartitionedProgram, Program};
pub use synth::Generator;

/// Errors produced while parsing or planning a program.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// A malformed G-code line.
    #[error("parse error at line {line}: {reason}")]
    Parse { line: usize, reason: String },
    /// A structurally valid program that cannot be executed.
    #[error("program error: {0}")]
    Program(String),
}

impl From<motion::Error> for Error {
    fn from(e: motion::Error) -> Self {
        Error::Program(e.to_string())
    }
}
