//! yieldlab scheduler model
//!
//! Shows which awaited calls actually give a single-threaded main context up
//! and which only look like they do.
//!
//! # Pieces
//! - [`work`]: the heavy sum every scenario computes
//! - [`bridge`]: callback-to-future continuation with single-resolution checks
//! - [`worker`]: serialized worker with an isolated path and a bypass path
//! - [`classify`]: the rule predicting whether a call tree suspends
//! - [`probe`]: runtime evidence of suspension
//! - [`driver`]: the task that runs every scenario in order and logs results
//!
//! # Example
//! ```rust,no_run
//! use std::rc::Rc;
//! use yieldlab_sched::{Config, MainContext, MemoryDisplay, TaskDriver};
//!
//! let main = MainContext::new();
//! let display = MemoryDisplay::new();
//! let driver = TaskDriver::new(main.clone(), Rc::new(display.clone()), Config::default());
//!
//! if let Some(run) = driver.trigger() {
//!     let report = main.block_on(run);
//!     assert!(report.completed());
//! }
//! assert_eq!(display.lines().last().map(String::as_str), Some("end"));
//! ```

pub mod bridge;
pub mod classify;
mod config;
pub mod context;
pub mod display;
pub mod driver;
mod error;
pub mod probe;
pub mod scenario;
pub mod work;
pub mod worker;

pub use bridge::{Continuation, Resumption, with_continuation};
pub use classify::{Call, Classification, SuspensionPoint, blocks_caller, classify};
pub use config::{Config, ENV_CHECK, ENV_WORK_SIZE};
pub use context::{ContextKind, MainContext};
pub use display::{LogDisplay, LogLine, MemoryDisplay};
pub use driver::{DriverState, RunReport, ScenarioOutcome, TaskDriver};
pub use error::{ConfigError, LabError, Result, Violation};
pub use probe::{PayloadSite, PollReport, Probe, Sentinel};
pub use scenario::{Scenario, ScenarioEnv, Shape};
pub use work::{Accumulator, WorkSize, sum_range, sum_range_async, sum_range_in};
pub use worker::{IsolatedWorker, PlainWorker};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
