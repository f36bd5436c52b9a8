//! Wall-clock execution budgets for pipeline stages.
//!
//! Page ceilings and item caps only approximate the time a stage may take.
//! A [`Deadline`] makes the budget explicit: clients check it before every
//! outbound call and wrap the call in [`Deadline::run`].

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::{Error, Result};

/// Point in time after which a stage must stop issuing work.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Option<Instant>,
    budget: Duration,
}

impl Deadline {
    /// Deadline `budget` from now.
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Some(Instant::now() + budget),
            budget,
        }
    }

    /// Deadline that never expires.
    pub fn unbounded() -> Self {
        Self {
            at: None,
            budget: Duration::MAX,
        }
    }

    /// Time left, `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        matches!(self.remaining(), Some(left) if left.is_zero())
    }

    /// Fail with [`Error::DeadlineExceeded`] if the budget is spent.
    pub fn check(&self, what: &str) -> Result<()> {
        if self.is_expired() {
            return Err(self.exceeded(what));
        }
        Ok(())
    }

    /// Run `fut`, aborting it when the deadline passes.
    pub async fn run<F, T>(&self, what: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.at {
            None => fut.await,
            Some(at) => tokio::time::timeout_at(at, fut)
                .await
                .map_err(|_| self.exceeded(what))?,
        }
    }

    fn exceeded(&self, what: &str) -> Error {
        Error::DeadlineExceeded(format!(
            "{} did not finish within {}s",
            what,
            self.budget.as_secs()
        ))
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::unbounded()
    }
}
