//! Execution Contexts
//!
//! The main context is a single-threaded `smol::LocalExecutor` owned by the
//! thread that created it. Everything spawned on it runs on that thread, one
//! task at a time, and a task only gives the thread up when it returns
//! `Poll::Pending`.

use std::cell::Cell;
use std::fmt;
use std::future::Future;
use std::rc::Rc;
use std::thread::{self, ThreadId};

use smol::{LocalExecutor, Task};

/// Which logical context the current thread belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKind {
    /// The thread driving the main executor
    Main,
    /// An isolated worker's serial queue
    Worker,
    /// Anything else (test threads, blocking pool)
    Other,
}

impl ContextKind {
    /// Context of the calling thread
    pub fn current() -> Self {
        CURRENT.with(Cell::get)
    }

    pub(crate) fn enter(kind: Self) {
        CURRENT.with(|current| current.set(kind));
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Worker => "worker",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ContextKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

thread_local! {
    static CURRENT: Cell<ContextKind> = const { Cell::new(ContextKind::Other) };
}

/// The single "main" execution context
///
/// Cheap to clone; clones share one executor. Not `Send`: the context is
/// bound to the thread that created it.
#[derive(Clone)]
pub struct MainContext {
    inner: Rc<Inner>,
}

struct Inner {
    executor: LocalExecutor<'static>,
    thread: ThreadId,
}

impl fmt::Debug for MainContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MainContext")
            .field("thread", &self.inner.thread)
            .field("idle", &self.inner.executor.is_empty())
            .finish()
    }
}

impl MainContext {
    /// Create the main context on the calling thread
    pub fn new() -> Self {
        ContextKind::enter(ContextKind::Main);
        Self {
            inner: Rc::new(Inner {
                executor: LocalExecutor::new(),
                thread: thread::current().id(),
            }),
        }
    }

    /// Queue a task on the main context
    pub fn spawn<T: 'static>(&self, future: impl Future<Output = T> + 'static) -> Task<T> {
        self.inner.executor.spawn(future)
    }

    /// Drive the main context until `future` completes
    pub fn block_on<T>(&self, future: impl Future<Output = T>) -> T {
        smol::block_on(self.inner.executor.run(future))
    }

    /// Run one queued task if any is ready
    pub fn try_tick(&self) -> bool {
        self.inner.executor.try_tick()
    }

    /// Whether the calling thread owns this context
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.inner.thread
    }

    /// Whether no tasks are queued or running
    pub fn is_idle(&self) -> bool {
        self.inner.executor.is_empty()
    }
}

impl Default for MainContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn test_creating_thread_is_main() {
        let main = MainContext::new();
        assert!(main.is_current());
        assert_eq!(ContextKind::current(), ContextKind::Main);

        let other = thread::spawn(ContextKind::current).join().unwrap();
        assert_eq!(other, ContextKind::Other);
    }

    #[test]
    fn test_tasks_run_in_spawn_order() {
        let main = MainContext::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        for i in 0..3 {
            let order = Rc::clone(&order);
            main.spawn(async move { order.borrow_mut().push(i) }).detach();
        }
        while main.try_tick() {}

        assert_eq!(*order.borrow(), vec![0, 1, 2]);
        assert!(main.is_idle());
    }

    #[test]
    fn test_block_on_runs_spawned_tasks() {
        let main = MainContext::new();
        let task = main.spawn(async { ContextKind::current() });
        assert_eq!(main.block_on(task), ContextKind::Main);
    }
}
