//! Staged timeouts.
//!
//! A [`Timeout`] carries one budget per phase of an exchange plus a `total`
//! budget used as the fallback. Budgets are `Option<Duration>`: `None` waits
//! forever, `Some(Duration::ZERO)` expires at the next scheduling point.
//!
//! ```
//! use std::time::Duration;
//! use micro_http_client::timeout::{Phase, Timeout};
//!
//! let timeout = Timeout::unlimited().with_read(Duration::ZERO).with_total(Duration::from_secs(5));
//!
//! // a zero phase falls back to the total budget
//! assert_eq!(timeout.resolve(Phase::Read), Some(Duration::from_secs(5)));
//! ```

use std::future::Future;
use std::time::Duration;

use tracing::trace;

/// The suspension points a budget applies to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Phase {
    /// TCP connect, DNS resolution, proxy tunnel negotiation and TLS handshake
    Connect,
    /// Every socket read
    Read,
    /// Every socket write, including the flush
    Write,
    /// Waiting for a free slot in the connector
    Pool,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Timeout {
    connect: Option<Duration>,
    read: Option<Duration>,
    write: Option<Duration>,
    pool: Option<Duration>,
    total: Option<Duration>,
}

impl Timeout {
    pub const fn new(
        connect: Option<Duration>,
        read: Option<Duration>,
        write: Option<Duration>,
        pool: Option<Duration>,
        total: Option<Duration>,
    ) -> Self {
        Self { connect, read, write, pool, total }
    }

    /// No budget for any phase.
    pub const fn unlimited() -> Self {
        Self::new(None, None, None, None, None)
    }

    /// The same budget for every phase and for `total`.
    pub const fn uniform(budget: Duration) -> Self {
        Self::new(Some(budget), Some(budget), Some(budget), Some(budget), Some(budget))
    }

    #[must_use]
    pub fn with_connect(mut self, budget: impl Into<Option<Duration>>) -> Self {
        self.connect = budget.into();
        self
    }

    #[must_use]
    pub fn with_read(mut self, budget: impl Into<Option<Duration>>) -> Self {
        self.read = budget.into();
        self
    }

    #[must_use]
    pub fn with_write(mut self, budget: impl Into<Option<Duration>>) -> Self {
        self.write = budget.into();
        self
    }

    #[must_use]
    pub fn with_pool(mut self, budget: impl Into<Option<Duration>>) -> Self {
        self.pool = budget.into();
        self
    }

    #[must_use]
    pub fn with_total(mut self, budget: impl Into<Option<Duration>>) -> Self {
        self.total = budget.into();
        self
    }

    pub fn connect(&self) -> Option<Duration> {
        self.connect
    }

    pub fn read(&self) -> Option<Duration> {
        self.read
    }

    pub fn write(&self) -> Option<Duration> {
        self.write
    }

    pub fn pool(&self) -> Option<Duration> {
        self.pool
    }

    pub fn total(&self) -> Option<Duration> {
        self.total
    }

    /// Returns the budget in effect for `phase`.
    ///
    /// A phase budget that is set and non-zero wins, otherwise `total` applies.
    /// `None` means the phase may wait forever.
    pub fn resolve(&self, phase: Phase) -> Option<Duration> {
        let budget = match phase {
            Phase::Connect => self.connect,
            Phase::Read => self.read,
            Phase::Write => self.write,
            Phase::Pool => self.pool,
        };

        match budget {
            Some(budget) if !budget.is_zero() => Some(budget),
            _ => self.total,
        }
    }

    /// Drives `future` within the budget resolved for `phase`.
    ///
    /// A zero budget yields once and expires without polling `future`.
    pub(crate) async fn run<F: Future>(&self, phase: Phase, future: F) -> Result<F::Output, Elapsed> {
        match self.resolve(phase) {
            None => Ok(future.await),
            Some(budget) if budget.is_zero() => {
                tokio::task::yield_now().await;
                trace!(?phase, "zero budget expired");
                Err(Elapsed(phase))
            }
            Some(budget) => tokio::time::timeout(budget, future).await.map_err(|_elapsed| {
                trace!(?phase, ?budget, "budget expired");
                Elapsed(phase)
            }),
        }
    }
}

/// The budget of a phase ran out.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct Elapsed(pub(crate) Phase);
