//! Display Collaborator
//!
//! The only outward boundary: an append-only text log. Implementations are
//! called from the main context only, in order, and must keep every line.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::LabError;

/// Visible, append-only log
pub trait LogDisplay {
    /// Append one line; never fails
    fn append_line(&self, text: &str);
}

/// One entry the driver hands to the display
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogLine {
    /// A scenario finished with a value
    Value { label: &'static str, value: i64 },
    /// A scenario failed without ending the run
    Failed { label: &'static str, error: LabError },
    /// The run was terminated
    Fatal(LabError),
    /// The run finished every scenario
    End,
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value { label, value } => write!(f, "{label}: {value}"),
            Self::Failed { label, error } => write!(f, "{label}: error: {error}"),
            Self::Fatal(error) => write!(f, "fatal: {error}"),
            Self::End => f.write_str("end"),
        }
    }
}

/// In-memory display, unbounded
#[derive(Debug, Clone, Default)]
pub struct MemoryDisplay {
    lines: Rc<RefCell<Vec<String>>>,
}

impl MemoryDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every line so far
    pub fn lines(&self) -> Vec<String> {
        self.lines.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.lines.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.borrow().is_empty()
    }

    /// The whole log as one newline-joined string
    pub fn text(&self) -> String {
        self.lines.borrow().join("\n")
    }
}

impl LogDisplay for MemoryDisplay {
    fn append_line(&self, text: &str) {
        self.lines.borrow_mut().push(text.to_string());
    }
}
