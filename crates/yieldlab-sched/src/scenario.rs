//! Scenarios
//!
//! Each scenario runs the same heavy sum through a different call shape.
//! The shapes look alike at the call site (most of them are `.await`ed) but
//! differ in whether anything underneath actually yields.

use smol::future::yield_now;

use crate::bridge::{Continuation, with_continuation};
use crate::classify::{Call, Classification, blocks_caller, classify};
use crate::error::Result;
use crate::probe::PayloadSite;
use crate::work::{WorkSize, sum_range, sum_range_async, sum_range_in};
use crate::worker::{IsolatedWorker, PlainWorker};

/// How a scenario reaches the heavy computation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    /// Plain synchronous call
    SyncDirect,
    /// `async fn` with a synchronous body, awaited
    DeclaredAsync,
    /// Synchronous work wrapped in a continuation resumed inline
    Continuation,
    /// `async fn` that awaits another synchronous-bodied `async fn`
    NestedDeclaredAsync,
    /// `async fn` that calls the synchronous form directly
    AsyncSyncBody,
    /// Method on a plain, non-isolated object
    PlainObject,
    /// Isolated worker operation, awaited from the main context
    Isolated,
    /// Worker's non-isolated escape hatch
    NonIsolated,
    /// Await of an empty `async fn`, then heavy work
    TrivialAwaitThenSync,
    /// Scheduler yield, then heavy work
    YieldThenSync,
    /// Heavy work accumulated in 32 bits
    NarrowAccumulator,
    /// Continuation resumed twice
    DoubleResume,
    /// Continuation dropped without being resumed
    AbandonedContinuation,
}

impl Shape {
    /// Shapes run by [`Scenario::standard_set`], in order
    pub const STANDARD: [Shape; 10] = [
        Shape::SyncDirect,
        Shape::DeclaredAsync,
        Shape::Continuation,
        Shape::NestedDeclaredAsync,
        Shape::AsyncSyncBody,
        Shape::PlainObject,
        Shape::Isolated,
        Shape::NonIsolated,
        Shape::TrivialAwaitThenSync,
        Shape::YieldThenSync,
    ];

    /// Log label
    pub fn label(&self) -> &'static str {
        match self {
            Self::SyncDirect => "result without await",
            Self::DeclaredAsync => "result with await",
            Self::Continuation => "result with continuation await",
            Self::NestedDeclaredAsync => "result by call async heavy work",
            Self::AsyncSyncBody => "result by call do heavy work",
            Self::PlainObject => "result by normal object",
            Self::Isolated => "result by actor isolation",
            Self::NonIsolated => "result by actor non-isolation",
            Self::TrivialAwaitThenSync => "result after trivial await",
            Self::YieldThenSync => "result after yield",
            Self::NarrowAccumulator => "result with 32-bit accumulator",
            Self::DoubleResume => "result with double resume",
            Self::AbandonedContinuation => "result with abandoned continuation",
        }
    }

    /// Call tree as seen from the main context
    pub fn call(&self) -> Call {
        match self {
            Self::SyncDirect | Self::PlainObject | Self::NarrowAccumulator => Call::Compute,
            Self::DeclaredAsync | Self::AsyncSyncBody => Call::declared_sync(),
            Self::Continuation | Self::DoubleResume | Self::AbandonedContinuation => {
                Call::Bridge { resumed_inline: true }
            }
            Self::NestedDeclaredAsync => Call::Declared(vec![Call::declared_sync()]),
            Self::Isolated => Call::Isolated { from_other_context: true },
            Self::NonIsolated => Call::NonIsolated,
            Self::TrivialAwaitThenSync => {
                Call::Declared(vec![Call::Declared(Vec::new()), Call::Compute])
            }
            Self::YieldThenSync => Call::Declared(vec![Call::Yield, Call::Compute]),
        }
    }

    /// Run the shape, recording where the heavy work executed
    pub async fn execute(&self, env: &ScenarioEnv, site: &PayloadSite) -> Result<i64> {
        let size = env.size;
        match self {
            Self::SyncDirect => heavy(size, site),
            Self::DeclaredAsync => {
                site.record();
                sum_range_async(size).await
            }
            Self::Continuation => {
                with_continuation(|cont| {
                    let _ = cont.resume(heavy(size, site));
                })
                .await?
            }
            Self::NestedDeclaredAsync => call_async_heavy_work(size, site).await,
            Self::AsyncSyncBody => do_async_heavy_work(size, site).await,
            Self::PlainObject => {
                site.record();
                env.plain.make_int()
            }
            Self::Isolated => {
                let site = site.clone();
                env.worker
                    .run_isolated(move |size| heavy(size, &site))
                    .await?
            }
            Self::NonIsolated => env.worker.run_nonisolated(|size| heavy(size, site)),
            Self::TrivialAwaitThenSync => {
                nothing().await;
                heavy(size, site)
            }
            Self::YieldThenSync => {
                yield_now().await;
                heavy(size, site)
            }
            Self::NarrowAccumulator => {
                site.record();
                sum_range_in::<i32>(size).map(i64::from)
            }
            Self::DoubleResume => {
                with_continuation(|cont| {
                    let value = heavy(size, site);
                    let _ = cont.resume(value.clone());
                    let _ = cont.resume(value);
                })
                .await?
            }
            Self::AbandonedContinuation => {
                with_continuation(|cont: Continuation<Result<i64>>| {
                    let _ = heavy(size, site);
                    drop(cont);
                })
                .await?
            }
        }
    }
}

fn heavy(size: WorkSize, site: &PayloadSite) -> Result<i64> {
    site.record();
    sum_range(size)
}

async fn call_async_heavy_work(size: WorkSize, site: &PayloadSite) -> Result<i64> {
    site.record();
    sum_range_async(size).await
}

async fn do_async_heavy_work(size: WorkSize, site: &PayloadSite) -> Result<i64> {
    heavy(size, site)
}

async fn nothing() {}

/// Collaborators the scenarios run against
#[derive(Debug, Clone)]
pub struct ScenarioEnv {
    pub size: WorkSize,
    pub worker: IsolatedWorker,
    pub plain: PlainWorker,
}

impl ScenarioEnv {
    pub fn new(size: WorkSize) -> Self {
        Self {
            size,
            worker: IsolatedWorker::new(size),
            plain: PlainWorker::new(size),
        }
    }
}

/// A labelled shape with its predicted classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    pub label: &'static str,
    pub shape: Shape,
    pub expected: Classification,
    /// Whether the heavy work is predicted to run on the main context
    pub blocks_main: bool,
}

impl Scenario {
    pub fn new(shape: Shape) -> Self {
        let call = shape.call();
        Self {
            label: shape.label(),
            shape,
            expected: classify(&call),
            blocks_main: blocks_caller(&call),
        }
    }

    /// The full ordered demonstration
    pub fn standard_set() -> Vec<Scenario> {
        Shape::STANDARD.into_iter().map(Scenario::new).collect()
    }

    /// Whether the classifier predicts a real suspension
    pub fn expects_suspension(&self) -> bool {
        self.expected.suspends()
    }
}
