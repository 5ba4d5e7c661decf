//! Task Driver
//!
//! One top-level task on the main context that walks the scenario list in
//! order. Each scenario is awaited to completion and logged before the next
//! one starts, so the log order always matches the scenario order even when
//! a scenario suspends and resumes off the main thread.
//!
//! State machine:
//!
//! ```text
//! Idle ──trigger──► Running(0) ──► Running(1) ──► … ──► Running(n-1) ──"end"──► Completed
//!                        │ protocol violation                                       │
//!                        └──────────────────────────► Aborted                       │
//! Completed / Aborted ──trigger──► Running(0)  (fresh run)                          │
//! Running(_) ──trigger──► ignored ◄─────────────────────────────────────────────────┘
//! ```

use std::cell::Cell;
use std::rc::Rc;

use smol::Task;

use crate::classify::Classification;
use crate::config::Config;
use crate::context::{ContextKind, MainContext};
use crate::display::{LogDisplay, LogLine};
use crate::error::LabError;
use crate::probe::{PayloadSite, PollReport, Probe, Sentinel};
use crate::scenario::{Scenario, ScenarioEnv};

/// Driver lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverState {
    Idle,
    /// Running the scenario at this index
    Running(usize),
    Completed,
    /// Stopped by a fatal error
    Aborted,
}

impl DriverState {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running(_))
    }
}

/// What happened in one scenario
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioOutcome {
    pub index: usize,
    pub label: &'static str,
    pub result: Result<i64, LabError>,
    /// Classifier prediction
    pub expected: Classification,
    /// Predicted to run the heavy work on the main context
    pub blocks_main: bool,
    /// Poll counts of the awaited scenario future
    pub polls: PollReport,
    /// Whether other main-context work ran while the scenario was in flight
    pub released_main: bool,
    /// Context the heavy work executed on
    pub payload_site: Option<ContextKind>,
}

impl ScenarioOutcome {
    /// Whether the scenario really yielded
    pub fn observed_suspension(&self) -> bool {
        self.polls.suspended()
    }

    /// Whether prediction and observation agree
    pub fn matches_prediction(&self) -> bool {
        let ran_on_main = self.payload_site == Some(ContextKind::Main);
        self.expected.suspends() == self.observed_suspension()
            && self.observed_suspension() == self.released_main
            && (self.result.is_err() || self.blocks_main == ran_on_main)
    }
}

/// Everything one run produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// 1-based run number
    pub run: u64,
    pub outcomes: Vec<ScenarioOutcome>,
    /// The error that terminated the run, if any
    pub fatal: Option<LabError>,
}

impl RunReport {
    fn new(run: u64) -> Self {
        Self {
            run,
            outcomes: Vec::new(),
            fatal: None,
        }
    }

    /// Whether every scenario ran and "end" was logged
    pub fn completed(&self) -> bool {
        self.fatal.is_none()
    }

    /// Scenarios whose observed suspension disagrees with the classifier
    pub fn mismatches(&self) -> Vec<&ScenarioOutcome> {
        self.outcomes
            .iter()
            .filter(|outcome| !outcome.matches_prediction())
            .collect()
    }
}

struct DriverInner {
    main: MainContext,
    display: Rc<dyn LogDisplay>,
    config: Config,
    env: ScenarioEnv,
    scenarios: Vec<Scenario>,
    state: Cell<DriverState>,
    runs: Cell<u64>,
}

/// Runs the scenario list on the main context when triggered
///
/// Bound to the main context's thread; clones share state.
#[derive(Clone)]
pub struct TaskDriver {
    inner: Rc<DriverInner>,
}

impl std::fmt::Debug for TaskDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskDriver")
            .field("state", &self.inner.state.get())
            .field("runs", &self.inner.runs.get())
            .field("scenarios", &self.inner.scenarios.len())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl TaskDriver {
    /// Driver over the standard scenario list
    pub fn new(main: MainContext, display: Rc<dyn LogDisplay>, config: Config) -> Self {
        Self::with_scenarios(main, display, config, Scenario::standard_set())
    }

    /// Driver over a custom scenario list
    pub fn with_scenarios(
        main: MainContext,
        display: Rc<dyn LogDisplay>,
        config: Config,
        scenarios: Vec<Scenario>,
    ) -> Self {
        let env = ScenarioEnv::new(config.work_size);
        Self {
            inner: Rc::new(DriverInner {
                main,
                display,
                config,
                env,
                scenarios,
                state: Cell::new(DriverState::Idle),
                runs: Cell::new(0),
            }),
        }
    }

    pub fn state(&self) -> DriverState {
        self.inner.state.get()
    }

    pub fn scenarios(&self) -> &[Scenario] {
        &self.inner.scenarios
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Runs started so far
    pub fn runs(&self) -> u64 {
        self.inner.runs.get()
    }

    /// Start a run on the main context
    ///
    /// Returns the run's task, or `None` if a run is already in flight. The
    /// run is cancelled if the returned task is dropped (the driver then
    /// counts it as aborted); call [`Task::detach`] to let it finish on its own.
    pub fn trigger(&self) -> Option<Task<RunReport>> {
        let state = self.inner.state.get();
        if state.is_running() {
            tracing::debug!(?state, "trigger ignored while running");
            return None;
        }

        let run = self.inner.runs.get() + 1;
        self.inner.runs.set(run);
        self.inner.state.set(DriverState::Running(0));

        let inner = Rc::clone(&self.inner);
        let guard = RunGuard(Rc::clone(&self.inner));
        Some(self.inner.main.spawn(async move {
            let _guard = guard;
            inner.run(run).await
        }))
    }
}

/// Leaves the driver re-triggerable if a run task is dropped mid-run
struct RunGuard(Rc<DriverInner>);

impl Drop for RunGuard {
    fn drop(&mut self) {
        let state = self.0.state.get();
        if state.is_running() {
            tracing::warn!(?state, "run dropped before finishing");
            self.0.state.set(DriverState::Aborted);
        }
    }
}

impl DriverInner {
    async fn run(self: Rc<Self>, run: u64) -> RunReport {
        tracing::info!(
            run,
            scenarios = self.scenarios.len(),
            size = %self.config.work_size,
            "run started"
        );
        let mut report = RunReport::new(run);

        for (index, scenario) in self.scenarios.iter().enumerate() {
            self.state.set(DriverState::Running(index));
            let outcome = self.run_scenario(index, scenario).await;

            match outcome.result.clone() {
                Ok(value) => {
                    tracing::info!(
                        run,
                        index,
                        label = outcome.label,
                        value,
                        expected = %outcome.expected,
                        suspended = outcome.observed_suspension(),
                        released_main = outcome.released_main,
                        payload = ?outcome.payload_site,
                        "scenario completed"
                    );
                    self.append(LogLine::Value {
                        label: outcome.label,
                        value,
                    });
                }
                Err(error) if error.is_fatal() => {
                    tracing::error!(run, index, label = outcome.label, %error, "run aborted");
                    self.append(LogLine::Fatal(error.clone()));
                    report.fatal = Some(error);
                    report.outcomes.push(outcome);
                    self.state.set(DriverState::Aborted);
                    return report;
                }
                Err(error) => {
                    tracing::error!(run, index, label = outcome.label, %error, "scenario failed");
                    self.append(LogLine::Failed {
                        label: outcome.label,
                        error,
                    });
                }
            }

            if self.config.check_classification && !outcome.matches_prediction() {
                tracing::warn!(
                    run,
                    index,
                    label = outcome.label,
                    expected = %outcome.expected,
                    suspended = outcome.observed_suspension(),
                    released_main = outcome.released_main,
                    "suspension differs from classification"
                );
            }
            report.outcomes.push(outcome);
        }

        self.append(LogLine::End);
        self.state.set(DriverState::Completed);
        tracing::info!(run, mismatches = report.mismatches().len(), "run completed");
        report
    }

    async fn run_scenario(&self, index: usize, scenario: &Scenario) -> ScenarioOutcome {
        let site = PayloadSite::new();
        let sentinel = Sentinel::arm(&self.main);
        let (result, polls) = Probe::new(scenario.shape.execute(&self.env, &site)).await;

        ScenarioOutcome {
            index,
            label: scenario.label,
            result,
            expected: scenario.expected,
            blocks_main: scenario.blocks_main,
            polls,
            released_main: sentinel.fired(),
            payload_site: site.get(),
        }
    }

    fn append(&self, line: LogLine) {
        debug_assert!(self.main.is_current());
        self.display.append_line(&line.to_string());
    }
}
