//! Isolated Worker
//!
//! A serialized execution domain: one dedicated thread draining one FIFO job
//! queue. Isolated operations are queued there and awaited, so the caller
//! gives its context up until the job is done. The non-isolated escape hatch
//! runs the body right on the caller's thread and never touches the queue.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use smol::future::yield_now;

use crate::bridge::with_continuation;
use crate::context::ContextKind;
use crate::error::{LabError, Result};
use crate::work::{WorkSize, sum_range};

/// Job function type
type Job = Box<dyn FnOnce() + Send + 'static>;

/// Serial job queue
struct JobQueue {
    /// Pending jobs
    jobs: Mutex<VecDeque<Job>>,
    /// Condition variable for waiting
    condvar: Condvar,
    /// Shutdown flag
    shutdown: AtomicBool,
}

impl JobQueue {
    fn new() -> Self {
        Self {
            jobs: Mutex::new(VecDeque::new()),
            condvar: Condvar::new(),
            shutdown: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Job>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a job; `false` once the queue is shut down
    fn push(&self, job: Job) -> bool {
        let mut jobs = self.lock();
        if self.shutdown.load(Ordering::SeqCst) {
            return false;
        }
        jobs.push_back(job);
        self.condvar.notify_one();
        true
    }

    /// Next job, or `None` after shutdown once the queue has drained
    fn wait_for_job(&self) -> Option<Job> {
        let mut jobs = self.lock();

        loop {
            if let Some(job) = jobs.pop_front() {
                return Some(job);
            }

            if self.shutdown.load(Ordering::SeqCst) {
                return None;
            }

            // Wait with timeout to check shutdown
            let (guard, _) = self
                .condvar
                .wait_timeout(jobs, Duration::from_millis(100))
                .unwrap_or_else(PoisonError::into_inner);
            jobs = guard;
        }
    }

    fn shutdown(&self) {
        let _jobs = self.lock();
        self.shutdown.store(true, Ordering::SeqCst);
        self.condvar.notify_all();
    }

    fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}

struct Inner {
    size: WorkSize,
    queue: Arc<JobQueue>,
    completed: Arc<AtomicUsize>,
    thread_id: ThreadId,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.queue.shutdown();

        // The last handle can be released by a job on the worker itself.
        if thread::current().id() == self.thread_id {
            return;
        }
        let handle = self
            .thread
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

/// Serialized-access worker holding the heavy computation
///
/// Clones share the same queue and thread. The thread stops once the last
/// clone is dropped and every queued job has run.
#[derive(Clone)]
pub struct IsolatedWorker {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for IsolatedWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsolatedWorker")
            .field("size", &self.inner.size)
            .field("pending_jobs", &self.pending_jobs())
            .field("completed_jobs", &self.completed_jobs())
            .finish()
    }
}

impl IsolatedWorker {
    /// Start the worker thread
    pub fn new(size: WorkSize) -> Self {
        let queue = Arc::new(JobQueue::new());
        let completed = Arc::new(AtomicUsize::new(0));

        let thread = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                ContextKind::enter(ContextKind::Worker);
                while let Some(job) = queue.wait_for_job() {
                    job();
                }
                tracing::debug!("isolated worker stopped");
            })
        };

        Self {
            inner: Arc::new(Inner {
                size,
                queue,
                completed,
                thread_id: thread.thread().id(),
                thread: Mutex::new(Some(thread)),
            }),
        }
    }

    /// Work size this worker computes over
    pub fn size(&self) -> WorkSize {
        self.inner.size
    }

    /// Whether the calling thread is this worker's thread
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.inner.thread_id
    }

    /// Jobs waiting in the queue
    pub fn pending_jobs(&self) -> usize {
        self.inner.queue.len()
    }

    /// Jobs that have finished running
    pub fn completed_jobs(&self) -> usize {
        self.inner.completed.load(Ordering::SeqCst)
    }

    /// Stop accepting isolated jobs
    ///
    /// Jobs already queued still run. Later isolated calls fail with
    /// [`LabError::WorkerGone`]; the non-isolated path keeps working.
    pub fn shutdown(&self) {
        self.inner.queue.shutdown();
        tracing::debug!(pending = self.pending_jobs(), "isolated worker shutting down");
    }

    /// Whether [`shutdown`](Self::shutdown) has been called
    pub fn is_shut_down(&self) -> bool {
        self.inner.queue.is_shut_down()
    }

    /// Run `body` on the worker's serial queue and wait for it
    ///
    /// From any other thread this always suspends the caller at least once:
    /// leaving the caller's context is a yield even if the job finishes
    /// immediately. Called from the worker's own thread the body runs inline,
    /// since the caller already holds the serialization.
    pub async fn run_isolated<T, F>(&self, body: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(WorkSize) -> T + Send + 'static,
    {
        let size = self.inner.size;

        if self.is_current() {
            return Ok(body(size));
        }
        if self.is_shut_down() {
            return Err(LabError::WorkerGone);
        }

        let completed = Arc::clone(&self.inner.completed);
        let mut accepted = false;
        let resumption = with_continuation(|cont| {
            let job: Job = Box::new(move || {
                let value = body(size);
                completed.fetch_add(1, Ordering::SeqCst);
                let _ = cont.resume(value);
            });
            accepted = self.inner.queue.push(job);
        });
        if !accepted {
            return Err(LabError::WorkerGone);
        }
        tracing::debug!(pending = self.pending_jobs(), "isolated job queued");

        yield_now().await;
        resumption.await
    }

    /// Run `body` on the caller's thread, bypassing the queue
    pub fn run_nonisolated<T>(&self, body: impl FnOnce(WorkSize) -> T) -> T {
        body(self.inner.size)
    }

    /// Heavy sum, isolated
    pub async fn make_int(&self) -> Result<i64> {
        self.run_isolated(sum_range).await?
    }

    /// Heavy sum, on the caller's context
    pub fn make_int_nonisolated(&self) -> Result<i64> {
        self.run_nonisolated(sum_range)
    }
}

/// Plain worker object with no isolation at all
#[derive(Debug, Clone, Copy)]
pub struct PlainWorker {
    size: WorkSize,
}

impl PlainWorker {
    pub fn new(size: WorkSize) -> Self {
        Self { size }
    }

    pub fn make_int(&self) -> Result<i64> {
        sum_range(self.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::MainContext;
    use crate::probe::Probe;
    use smol::future::zip;
    use std::time::Instant;

    #[test]
    fn test_make_int_isolated_and_nonisolated_agree() {
        let worker = IsolatedWorker::new(WorkSize::new(10_000));
        let isolated = smol::block_on(worker.make_int()).unwrap();
        let bypass = worker.make_int_nonisolated().unwrap();
        assert_eq!(isolated, 49_995_000);
        assert_eq!(isolated, bypass);
        assert_eq!(PlainWorker::new(WorkSize::new(10_000)).make_int().unwrap(), isolated);
    }

    #[test]
    fn test_isolated_runs_on_worker_and_returns_to_main() {
        let main = MainContext::new();
        let worker = IsolatedWorker::new(WorkSize::new(10));

        let (ran_on, resumed_on) = main.block_on(async {
            let ran_on = worker.run_isolated(|_| ContextKind::current()).await.unwrap();
            (ran_on, ContextKind::current())
        });
        assert_eq!(ran_on, ContextKind::Worker);
        assert_eq!(resumed_on, ContextKind::Main);
        assert_eq!(worker.completed_jobs(), 1);
    }

    #[test]
    fn test_nonisolated_runs_on_caller() {
        let main = MainContext::new();
        let worker = IsolatedWorker::new(WorkSize::new(10));
        let ran_on = worker.run_nonisolated(|_| ContextKind::current());
        assert!(main.is_current());
        assert_eq!(ran_on, ContextKind::Main);
        assert_eq!(worker.completed_jobs(), 0);
    }

    #[test]
    fn test_isolated_call_suspends_even_for_trivial_work() {
        let worker = IsolatedWorker::new(WorkSize::new(0));
        let (value, report) = smol::block_on(Probe::new(worker.make_int()));
        assert_eq!(value, Ok(0));
        assert!(report.suspended());
    }

    #[test]
    fn test_call_from_worker_thread_runs_inline() {
        let worker = IsolatedWorker::new(WorkSize::new(10));
        let nested = worker.clone();

        let suspended = smol::block_on(worker.run_isolated(move |_| {
            let (ran_on, report) = smol::block_on(Probe::new(
                nested.run_isolated(|_| ContextKind::current()),
            ));
            assert_eq!(ran_on, Ok(ContextKind::Worker));
            report.suspended()
        }))
        .unwrap();

        assert!(!suspended);
    }

    #[test]
    fn test_isolated_bodies_never_overlap() {
        let worker = IsolatedWorker::new(WorkSize::new(10));
        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));

        let job = |id: usize| {
            let active = Arc::clone(&active);
            let max_active = Arc::clone(&max_active);
            move |_| {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                max_active.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(20));
                active.fetch_sub(1, Ordering::SeqCst);
                id
            }
        };

        let start = Instant::now();
        let (a, b) = smol::block_on(zip(
            worker.run_isolated(job(1)),
            worker.run_isolated(job(2)),
        ));
        assert_eq!((a, b), (Ok(1), Ok(2)));
        assert_eq!(max_active.load(Ordering::SeqCst), 1);
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn test_nonisolated_may_overlap_isolated() {
        let worker = IsolatedWorker::new(WorkSize::new(10));
        let (tx, rx) = std::sync::mpsc::channel::<()>();

        // The isolated job blocks until the bypass call has run.
        let isolated = worker.run_isolated(move |_| rx.recv_timeout(Duration::from_secs(5)).is_ok());
        let bypass = async {
            worker.run_nonisolated(|_| tx.send(()).unwrap());
        };
        let (released, ()) = smol::block_on(zip(isolated, bypass));
        assert_eq!(released, Ok(true));
    }

    #[test]
    fn test_shutdown_rejects_isolated_calls() {
        let worker = IsolatedWorker::new(WorkSize::new(100));
        assert_eq!(smol::block_on(worker.make_int()), Ok(4_950));

        let clone = worker.clone();
        worker.shutdown();
        assert!(clone.is_shut_down());
        assert_eq!(smol::block_on(clone.make_int()), Err(LabError::WorkerGone));
        assert_eq!(clone.make_int_nonisolated(), Ok(4_950));
        assert_eq!(clone.completed_jobs(), 1);
    }

    #[test]
    fn test_shutdown_lets_queued_jobs_finish() {
        let worker = IsolatedWorker::new(WorkSize::new(10));
        let (tx, rx) = std::sync::mpsc::channel::<()>();

        // The first job holds the thread so the second one is still queued at shutdown.
        let first = worker.run_isolated(move |_| rx.recv_timeout(Duration::from_secs(5)).is_ok());
        let second = worker.run_isolated(|size| size.get());
        let shut = async {
            smol::future::yield_now().await;
            worker.shutdown();
            tx.send(()).unwrap();
        };

        let ((first, second), ()) = smol::block_on(zip(zip(first, second), shut));
        assert_eq!(first, Ok(true));
        assert_eq!(second, Ok(10));
        assert_eq!(worker.completed_jobs(), 2);
    }

    #[test]
    fn test_clones_share_one_queue() {
        let worker = IsolatedWorker::new(WorkSize::new(100));
        let clone = worker.clone();
        assert_eq!(smol::block_on(worker.make_int()), Ok(4_950));
        drop(worker);
        assert_eq!(smol::block_on(clone.make_int()), Ok(4_950));
        assert_eq!(clone.completed_jobs(), 2);
        assert_eq!(clone.pending_jobs(), 0);
    }
}
