//! Error types

use std::fmt;

/// How a continuation handle broke its single-resolution contract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    /// `resume` was called after the handle was already resolved
    ResumedTwice,
    /// The handle was dropped without ever being resolved
    Abandoned,
    /// The awaiting side was polled again after it had produced its value
    PolledAfterCompletion,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::ResumedTwice => "continuation resumed more than once",
            Self::Abandoned => "continuation dropped without being resumed",
            Self::PolledAfterCompletion => "continuation polled after completion",
        };
        f.write_str(text)
    }
}

/// Errors raised while running scenarios
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LabError {
    #[error("arithmetic overflow: sum of [0, {size}) does not fit a {width}-bit accumulator")]
    ArithmeticOverflow { size: u64, width: u32 },

    #[error("protocol violation: {0}")]
    ProtocolViolation(Violation),

    #[error("isolated worker shut down before the job ran")]
    WorkerGone,
}

impl LabError {
    /// Fatal errors end the whole run; everything else stays local to the scenario.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ProtocolViolation(_))
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid work size {value:?}: expected a non-negative integer")]
    InvalidWorkSize { value: String },

    #[error("invalid flag {name}={value:?}: expected true/false or 1/0")]
    InvalidFlag { name: &'static str, value: String },
}

pub type Result<T> = std::result::Result<T, LabError>;
