//! Suspension Classifier
//!
//! Decides, from the shape of a call tree alone, whether awaiting it gives
//! the calling context up. The rule:
//!
//! - An `async` signature suspends nothing by itself. A declared-async
//!   function suspends only if something in its body does.
//! - Synchronous work, the non-isolated escape hatch, and a continuation
//!   resumed inline never suspend.
//! - A scheduler-level yield suspends.
//! - An isolated call suspends when it is made from outside the worker,
//!   because the job has to hop onto the worker's queue.
//! - A continuation resumed later, from elsewhere, suspends until then.
//!
//! Where in the tree the suspension sits matters for what it covers: a
//! yield that comes *before* heavy synchronous work releases the caller
//! briefly, then the heavy work still runs on the caller's context.

use std::fmt;

/// Node of a call tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    /// Synchronous heavy work
    Compute,
    /// `async fn` whose body makes these calls in order
    Declared(Vec<Call>),
    /// Continuation bridge around synchronous work
    Bridge {
        /// Whether the continuation is resumed before the bridged closure returns
        resumed_inline: bool,
    },
    /// Scheduler-level yield
    Yield,
    /// Isolated worker operation
    Isolated {
        /// Whether the caller is on a different context than the worker
        from_other_context: bool,
    },
    /// Worker's non-isolated escape hatch
    NonIsolated,
}

impl Call {
    /// `async fn` whose body only computes
    pub fn declared_sync() -> Self {
        Self::Declared(vec![Self::Compute])
    }
}

/// Which kind of suspension point was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SuspensionPoint {
    /// Explicit yield to the scheduler
    Yield,
    /// Hop onto another context's queue
    ContextHop,
    /// Continuation resumed after the bridged closure returned
    DeferredResume,
}

/// Result of classifying a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    /// Runs to completion on the calling context
    Inline,
    /// Gives the calling context up at the first such point
    Suspends(SuspensionPoint),
}

impl Classification {
    pub fn suspends(&self) -> bool {
        matches!(self, Self::Suspends(_))
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inline => f.write_str("inline"),
            Self::Suspends(SuspensionPoint::Yield) => f.write_str("suspends (yield)"),
            Self::Suspends(SuspensionPoint::ContextHop) => f.write_str("suspends (context hop)"),
            Self::Suspends(SuspensionPoint::DeferredResume) => {
                f.write_str("suspends (deferred resume)")
            }
        }
    }
}

/// Classify awaiting `call`
pub fn classify(call: &Call) -> Classification {
    match call {
        Call::Compute | Call::NonIsolated => Classification::Inline,
        Call::Declared(body) => body
            .iter()
            .map(classify)
            .find(Classification::suspends)
            .unwrap_or(Classification::Inline),
        Call::Bridge { resumed_inline: true } => Classification::Inline,
        Call::Bridge { resumed_inline: false } => {
            Classification::Suspends(SuspensionPoint::DeferredResume)
        }
        Call::Yield => Classification::Suspends(SuspensionPoint::Yield),
        Call::Isolated { from_other_context: true } => {
            Classification::Suspends(SuspensionPoint::ContextHop)
        }
        Call::Isolated { from_other_context: false } => Classification::Inline,
    }
}

/// Whether the heavy work in `call` runs on the calling context
///
/// True when some `Compute` is reachable without first hopping to another
/// context. A yield does not move the work; a context hop or deferred
/// resume does.
pub fn blocks_caller(call: &Call) -> bool {
    match call {
        Call::Compute | Call::NonIsolated => true,
        Call::Declared(body) => body.iter().any(blocks_caller),
        Call::Bridge { resumed_inline } => *resumed_inline,
        Call::Yield => false,
        Call::Isolated { from_other_context } => !from_other_context,
    }
}
