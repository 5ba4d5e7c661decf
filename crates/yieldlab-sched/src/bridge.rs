//! Continuation Bridge
//!
//! Turns a callback-style computation into something that can be awaited.
//! [`with_continuation`] hands a [`Continuation`] to a synchronous closure and
//! returns a [`Resumption`] future that yields whatever the continuation was
//! resumed with.
//!
//! The closure runs to completion before `with_continuation` returns. If it
//! resumes the handle inline, the `Resumption` is already resolved and its
//! first poll returns `Ready`: the caller never actually gives up its
//! context, no matter how long the closure took. Only a continuation that is
//! resumed later, from somewhere else, makes the awaiting task suspend.
//!
//! Every continuation must be resumed exactly once. Resuming twice, or
//! dropping the handle without resuming, is reported to the awaiting side as
//! [`LabError::ProtocolViolation`].

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

use crate::error::{LabError, Violation};

enum State<T> {
    Unresolved,
    Resolved(T),
    Consumed,
    Violated(Violation),
}

impl<T> State<T> {
    fn name(&self) -> &'static str {
        match self {
            Self::Unresolved => "unresolved",
            Self::Resolved(_) => "resolved",
            Self::Consumed => "consumed",
            Self::Violated(_) => "violated",
        }
    }
}

struct Slot<T> {
    state: State<T>,
    waker: Option<Waker>,
}

impl<T> Slot<T> {
    fn wake(&mut self) {
        if let Some(waker) = self.waker.take() {
            waker.wake();
        }
    }
}

type Shared<T> = Arc<Mutex<Slot<T>>>;

fn lock<T>(shared: &Shared<T>) -> MutexGuard<'_, Slot<T>> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Resolution handle passed to the bridged closure
pub struct Continuation<T> {
    shared: Shared<T>,
}

impl<T> std::fmt::Debug for Continuation<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Continuation")
            .field("state", &lock(&self.shared).state.name())
            .finish()
    }
}

impl<T> Continuation<T> {
    /// Resolve the awaiting side with `value`
    ///
    /// Fails with a protocol violation if this continuation was already
    /// resumed. The awaiting side then sees the violation too, and the
    /// earlier value is discarded.
    pub fn resume(&self, value: T) -> Result<(), LabError> {
        let mut slot = lock(&self.shared);
        match slot.state {
            State::Unresolved => {
                slot.state = State::Resolved(value);
                slot.wake();
                tracing::debug!("continuation resumed");
                Ok(())
            }
            _ => {
                slot.state = State::Violated(Violation::ResumedTwice);
                slot.wake();
                tracing::error!("continuation resumed more than once");
                Err(LabError::ProtocolViolation(Violation::ResumedTwice))
            }
        }
    }

    /// Whether `resume` has been called
    pub fn is_resumed(&self) -> bool {
        !matches!(lock(&self.shared).state, State::Unresolved)
    }
}

impl<T> Drop for Continuation<T> {
    fn drop(&mut self) {
        let mut slot = lock(&self.shared);
        if matches!(slot.state, State::Unresolved) {
            slot.state = State::Violated(Violation::Abandoned);
            slot.wake();
            tracing::error!("continuation dropped without being resumed");
        }
    }
}

/// Awaiting side of a bridged computation
#[must_use = "futures do nothing unless awaited"]
pub struct Resumption<T> {
    shared: Shared<T>,
}

impl<T> Resumption<T> {
    /// Whether a value (or a violation) is already waiting
    pub fn is_ready(&self) -> bool {
        matches!(lock(&self.shared).state, State::Resolved(_) | State::Violated(_))
    }
}

impl<T> Future for Resumption<T> {
    type Output = Result<T, LabError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slot = lock(&self.shared);
        match std::mem::replace(&mut slot.state, State::Consumed) {
            State::Resolved(value) => Poll::Ready(Ok(value)),
            State::Unresolved => {
                slot.state = State::Unresolved;
                slot.waker = Some(cx.waker().clone());
                Poll::Pending
            }
            State::Violated(violation) => {
                slot.state = State::Violated(violation);
                Poll::Ready(Err(LabError::ProtocolViolation(violation)))
            }
            State::Consumed => Poll::Ready(Err(LabError::ProtocolViolation(
                Violation::PolledAfterCompletion,
            ))),
        }
    }
}

/// Run `body` synchronously with a fresh continuation and return its awaitable result
pub fn with_continuation<T, F>(body: F) -> Resumption<T>
where
    F: FnOnce(Continuation<T>),
{
    let shared = Arc::new(Mutex::new(Slot {
        state: State::Unresolved,
        waker: None,
    }));
    body(Continuation {
        shared: Arc::clone(&shared),
    });
    Resumption { shared }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smol::future::poll_once;
    use std::thread;

    #[test]
    fn test_inline_resume_is_ready_on_first_poll() {
        let mut resumption = with_continuation(|cont| {
            cont.resume(7).unwrap();
        });
        assert!(resumption.is_ready());
        let polled = smol::block_on(poll_once(&mut resumption));
        assert_eq!(polled, Some(Ok(7)));
    }

    #[test]
    fn test_resume_from_another_thread_suspends() {
        let mut resumption = with_continuation(|cont| {
            thread::spawn(move || {
                thread::sleep(std::time::Duration::from_millis(20));
                cont.resume("late").unwrap();
            });
        });

        assert_eq!(smol::block_on(poll_once(&mut resumption)), None);
        assert_eq!(smol::block_on(resumption), Ok("late"));
    }

    #[test]
    fn test_double_resume_is_violation() {
        let resumption = with_continuation(|cont| {
            cont.resume(1).unwrap();
            let second = cont.resume(2);
            assert_eq!(second, Err(LabError::ProtocolViolation(Violation::ResumedTwice)));
        });
        assert_eq!(
            smol::block_on(resumption),
            Err(LabError::ProtocolViolation(Violation::ResumedTwice))
        );
    }

    #[test]
    fn test_abandoned_continuation_is_violation() {
        let resumption = with_continuation(|cont: Continuation<i64>| {
            assert!(!cont.is_resumed());
        });
        assert_eq!(
            smol::block_on(resumption),
            Err(LabError::ProtocolViolation(Violation::Abandoned))
        );
    }

    #[test]
    fn test_poll_after_completion() {
        let mut resumption = with_continuation(|cont| {
            cont.resume(()).unwrap();
        });
        assert_eq!(smol::block_on(poll_once(&mut resumption)), Some(Ok(())));
        assert_eq!(
            smol::block_on(poll_once(&mut resumption)),
            Some(Err(LabError::ProtocolViolation(Violation::PolledAfterCompletion)))
        );
    }
}
