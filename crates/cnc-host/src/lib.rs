//! # cnc-host library
//!
//! The host-side wiring of the G-code runner: JSON configuration, adapter
//! assembly and the executive loop. The binary in `main.rs` is a thin CLI
//! over these modules; tests drive them directly against the simulation
//! drivers.

pub mod config;
pub mod executive;
pub mod machine;

use gcode::Block;

/// Host-level failures that belong to no library crate.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// The step synthesizer's end state diverged from the pure merge-algebra
    /// replay of the same run; the stream cannot be trusted.
    #[error(
        "invariant violation: synthesized end state {synthesized} differs from the replayed end state {replayed}"
    )]
    InvariantViolation { synthesized: Block, replayed: Block },
}
