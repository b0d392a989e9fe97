//! Progress reporting and cooperative cancellation for long operations.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::Error;

/// Snapshot handed to progress callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Items added or extracted, or bytes written, depending on the operation.
    pub completed: u64,
    /// Expected final value of `completed`, if known up front.
    pub total: Option<u64>,
}

/// Rate-limits a progress callback to one invocation per second.
pub(crate) struct ProgressThrottle<'p> {
    callback: Option<&'p mut dyn FnMut(Progress)>,
    last: Option<Instant>,
    total: Option<u64>,
}

const INTERVAL: Duration = Duration::from_secs(1);

impl<'p> ProgressThrottle<'p> {
    pub(crate) fn new(callback: Option<&'p mut dyn FnMut(Progress)>) -> Self {
        ProgressThrottle {
            callback,
            last: None,
            total: None,
        }
    }

    pub(crate) fn set_total(&mut self, total: u64) {
        self.total = Some(total);
    }

    /// Invokes the callback if it never ran or a second has passed since it
    /// last did.
    pub(crate) fn report(&mut self, completed: u64) {
        let Some(cb) = self.callback.as_mut() else {
            return;
        };
        let now = Instant::now();
        if self.last.is_some_and(|last| now.duration_since(last) < INTERVAL) {
            return;
        }
        self.last = Some(now);
        cb(Progress {
            completed,
            total: self.total,
        });
    }

    /// Unthrottled final report.
    pub(crate) fn finish(&mut self, completed: u64) {
        if let Some(cb) = self.callback.as_mut() {
            cb(Progress {
                completed,
                total: self.total,
            });
        }
    }
}

/// Shared cancellation flag of a volume.
///
/// Clones observe the same flag, so a handle can be moved into a progress
/// callback or a signal handler and stop the operation running on the
/// volume.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Clears the flag at the start of an operation.
    pub(crate) fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    pub(crate) fn check(&self) -> Result<(), Error> {
        if self.is_canceled() {
            Err(Error::OperationCanceled)
        } else {
            Ok(())
        }
    }
}
