use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use crate::error::HookError;
use crate::state::VotableState;

/// A vote about to be committed, as seen by validation checks.
///
/// `value` is already coerced (SET_ANY votes carry `enabled as i64`).
#[derive(Debug)]
pub struct VoteRequest<'a> {
    pub state: &'a VotableState,
    pub client: &'a str,
    pub enabled: bool,
    pub value: i64,
    pub step: bool,
}

/// Predicate that may veto a vote before it touches the client table.
pub trait VoteCheck: Send + Sync {
    fn check(&self, req: &VoteRequest<'_>) -> Result<(), HookError>;
}

impl<F> VoteCheck for F
where
    F: Fn(&VoteRequest<'_>) -> Result<(), HookError> + Send + Sync,
{
    fn check(&self, req: &VoteRequest<'_>) -> Result<(), HookError> {
        self(req)
    }
}

/// Ordered check list behind its own lock, so registering a check never waits
/// on a vote that holds the votable's primary lock.
#[derive(Default)]
pub(crate) struct CheckChain {
    checks: Mutex<Vec<Box<dyn VoteCheck>>>,
    running: Mutex<Option<ThreadId>>,
}

/// Clears the running marker, also when a check panics.
struct Running<'a>(&'a CheckChain);

impl Drop for Running<'_> {
    fn drop(&mut self) {
        *self.0.running() = None;
    }
}

impl CheckChain {
    fn running(&self) -> MutexGuard<'_, Option<ThreadId>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the current thread is inside [`Self::run`].
    pub fn running_on_current_thread(&self) -> bool {
        *self.running() == Some(thread::current().id())
    }

    pub fn push(&self, check: Box<dyn VoteCheck>) {
        self.checks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(check);
    }

    /// Run every check in registration order; the first rejection wins.
    pub fn run(&self, req: &VoteRequest<'_>) -> Result<(), HookError> {
        let checks = self.checks.lock().unwrap_or_else(PoisonError::into_inner);
        *self.running() = Some(thread::current().id());
        let _running = Running(self);
        for check in checks.iter() {
            check.check(req)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.checks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
