//! Single-assignment memo cell for expensive async loads.
//!
//! The first caller computes the value while holding the cell's lock, so
//! concurrent callers wait for that computation instead of starting their own.
//! Both outcomes are stored: a failed load is returned to every later caller
//! and never retried. Cancellation is the exception. A load that fails with
//! [`ModError::Cancelled`](crate::errors::ModError::Cancelled), or whose
//! future is dropped before finishing, stores nothing and the next caller
//! starts over.

use std::future::Future;

use anyhow::Result;
use tokio::sync::Mutex;
use tracing::warn;

use crate::errors::{ModError, SharedError};

pub struct Memo<T> {
    cell: Mutex<Option<std::result::Result<T, SharedError>>>,
}

impl<T> Default for Memo<T> {
    fn default() -> Self {
        Self {
            cell: Mutex::new(None),
        }
    }
}

impl<T: Clone> Memo<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the stored outcome, computing it with `init` on first use.
    pub async fn get_or_try_init<F, Fut>(&self, init: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut guard = self.cell.lock().await;
        if let Some(stored) = guard.as_ref() {
            return match stored {
                Ok(value) => Ok(value.clone()),
                Err(err) => {
                    warn!(error = %err, "returning memoized failure");
                    Err(anyhow::Error::new(err.clone()))
                }
            };
        }

        let outcome = match init().await {
            Err(err) if ModError::is_cancelled(&err) => return Err(err),
            outcome => outcome.map_err(SharedError::from),
        };
        *guard = Some(outcome.clone());
        outcome.map_err(anyhow::Error::new)
    }

    /// The stored value, if a load already succeeded. Never waits.
    pub fn get(&self) -> Option<T> {
        let guard = self.cell.try_lock().ok()?;
        match guard.as_ref() {
            Some(Ok(value)) => Some(value.clone()),
            _ => None,
        }
    }

    /// Whether an outcome (success or failure) has been stored.
    pub fn is_initialized(&self) -> bool {
        self.cell
            .try_lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }
}
