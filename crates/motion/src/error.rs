//! Error types for the motion crate.

/// Errors produced by kinematic configuration and motion physics.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// The actuator configuration is unusable (zero gains, bad layout).
    #[error("invalid configuration: {0}")]
    Config(String),
    /// The requested computation has no physical solution.
    #[error("program error: {0}")]
    Program(String),
}
