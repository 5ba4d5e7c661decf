//! Suspension Probes
//!
//! Runtime evidence for whether an awaited call really suspended:
//!
//! - [`Probe`] wraps a future and counts how many times it returned
//!   `Poll::Pending`. Zero means the call ran start to finish in one poll.
//! - [`Sentinel`] queues a no-op task on the main context before a call and
//!   checks afterwards whether it got to run. It can only run if the caller
//!   gave the main context up in between.
//! - [`PayloadSite`] records which context the heavy payload executed on.

use std::cell::Cell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use crate::context::{ContextKind, MainContext};

/// What a [`Probe`] saw while driving its future
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Total polls, including the final `Ready` one
    pub polls: usize,
    /// Polls that returned `Pending`
    pub pending: usize,
}

impl PollReport {
    /// Whether the future yielded to the scheduler at least once
    pub fn suspended(&self) -> bool {
        self.pending > 0
    }
}

/// Future wrapper that counts pending polls
#[must_use = "futures do nothing unless awaited"]
pub struct Probe<F> {
    inner: Pin<Box<F>>,
    report: PollReport,
}

impl<F: Future> Probe<F> {
    pub fn new(inner: F) -> Self {
        Self {
            inner: Box::pin(inner),
            report: PollReport::default(),
        }
    }
}

impl<F: Future> Future for Probe<F> {
    type Output = (F::Output, PollReport);

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.report.polls += 1;
        let polled = self.inner.as_mut().poll(cx);
        match polled {
            Poll::Ready(output) => Poll::Ready((output, self.report)),
            Poll::Pending => {
                self.report.pending += 1;
                Poll::Pending
            }
        }
    }
}

/// No-op task on the main context that notes when it gets to run
#[derive(Debug)]
pub struct Sentinel {
    fired: Rc<Cell<bool>>,
}

impl Sentinel {
    /// Queue the sentinel behind whatever is currently running
    pub fn arm(main: &MainContext) -> Self {
        let fired = Rc::new(Cell::new(false));
        let flag = Rc::clone(&fired);
        main.spawn(async move { flag.set(true) }).detach();
        Self { fired }
    }

    /// Whether the main context ran the sentinel
    pub fn fired(&self) -> bool {
        self.fired.get()
    }
}

/// Shared slot recording where a payload executed
#[derive(Debug, Clone, Default)]
pub struct PayloadSite {
    site: Arc<Mutex<Option<ContextKind>>>,
}

impl PayloadSite {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the calling thread's context
    pub fn record(&self) {
        *self.site.lock().unwrap_or_else(PoisonError::into_inner) = Some(ContextKind::current());
    }

    pub fn get(&self) -> Option<ContextKind> {
        *self.site.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
