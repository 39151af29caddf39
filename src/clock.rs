//! Injectable time source.
//!
//! `MaxRetryDuration` arithmetic and `lastTransitionTime` stamping both go
//! through a single `Clock` so tests can force deterministic timestamps and
//! fast-forward past retry deadlines without sleeping.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};

/// A passive source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real wall clock. Default for `CombinedController`.
#[derive(Clone, Copy, Debug, Default)]
pub struct UtcClock;

impl Clock for UtcClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock tests can set to an arbitrary instant and advance by hand.
///
/// Not `#[cfg(test)]`-gated: signer authors testing their own `Check`/`Sign`
/// implementations against this engine need it too.
#[derive(Clone, Debug)]
pub struct ManualClock(Arc<Mutex<DateTime<Utc>>>);

impl ManualClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(Arc::new(Mutex::new(at)))
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.0.lock().unwrap() = at;
    }

    pub fn advance(&self, duration: chrono::Duration) {
        let mut guard = self.0.lock().unwrap();
        *guard += duration;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}
