//! Commit fence: lets a caller that stops waiting veto a pending write.
//!
//! A store write may outlive the future that started it (SQLite work runs on
//! the blocking pool). The fence is shared between the caller and the write:
//! the write commits only through [`CommitFence::commit`], and the caller
//! calls [`CommitFence::abort`] when its deadline or cancellation fires. Only
//! one of them wins, so the caller's view of whether the record exists is
//! always right.

use std::sync::{Arc, Mutex, PoisonError};

use revtrail_core::errors::{ExError, ExErrorKind};

use crate::errors::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FenceState {
    Open,
    Committing,
    Committed,
    Aborted(ExErrorKind),
}

/// Shared veto over one logical write
#[derive(Debug, Clone)]
pub struct CommitFence {
    state: Arc<Mutex<FenceState>>,
}

impl CommitFence {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FenceState::Open)),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut FenceState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    /// Refuse every later commit, reporting `kind` to the writer
    ///
    /// Returns `false` when a commit is already under way or done; the
    /// caller must then wait for the write's own outcome.
    pub fn abort(&self, kind: ExErrorKind) -> bool {
        self.with_state(|state| match *state {
            FenceState::Open => {
                *state = FenceState::Aborted(kind);
                true
            }
            FenceState::Aborted(_) => true,
            FenceState::Committing | FenceState::Committed => false,
        })
    }

    /// True once a commit has landed through this fence
    pub fn is_committed(&self) -> bool {
        self.with_state(|state| *state == FenceState::Committed)
    }

    /// Fail fast when the fence was aborted
    ///
    /// # Errors
    ///
    /// The abort kind (`Timeout` or `Cancelled`).
    pub fn check(&self, op: &'static str) -> Result<()> {
        self.with_state(|state| match *state {
            FenceState::Aborted(kind) => Err(aborted(op, kind)),
            _ => Ok(()),
        })
    }

    /// Run `commit` unless the fence was aborted
    ///
    /// While `commit` runs, `abort` returns `false`. A failed commit reopens
    /// the fence.
    ///
    /// # Errors
    ///
    /// The abort kind when aborted first, otherwise whatever `commit` returns.
    pub fn commit<T>(&self, op: &'static str, commit: impl FnOnce() -> Result<T>) -> Result<T> {
        self.with_state(|state| match *state {
            FenceState::Aborted(kind) => Err(aborted(op, kind)),
            _ => {
                *state = FenceState::Committing;
                Ok(())
            }
        })?;

        let outcome = commit();
        self.with_state(|state| {
            *state = if outcome.is_ok() {
                FenceState::Committed
            } else {
                FenceState::Open
            };
        });
        outcome
    }
}

impl Default for CommitFence {
    fn default() -> Self {
        Self::new()
    }
}

fn aborted(op: &'static str, kind: ExErrorKind) -> ExError {
    ExError::new(kind)
        .with_op(op)
        .with_message("write abandoned by caller before commit")
}
