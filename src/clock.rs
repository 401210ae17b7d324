//! Injectable clock for deterministic scheduling.
//!
//! Every clock-coupled component receives a [`Clock`] handle instead of
//! reading the system time directly. Tests construct a manual clock and move
//! it by hand; production code uses [`Clock::system`]. All times are naive
//! local datetimes.

use chrono::NaiveDateTime;
use std::sync::{Arc, Mutex, PoisonError};

/// Cloneable clock handle. All clones of a manual clock share the same
/// underlying instant.
#[derive(Debug, Clone)]
pub struct Clock {
    inner: ClockInner,
}

#[derive(Debug, Clone)]
enum ClockInner {
    System,
    Manual(Arc<Mutex<NaiveDateTime>>),
}

impl Clock {
    /// Clock backed by the host's local wall-clock time.
    #[must_use]
    pub fn system() -> Self {
        Self {
            inner: ClockInner::System,
        }
    }

    /// Manual clock fixed at `start` until moved with [`Clock::set`].
    #[must_use]
    pub fn manual(start: NaiveDateTime) -> Self {
        Self {
            inner: ClockInner::Manual(Arc::new(Mutex::new(start))),
        }
    }

    /// Current time according to this clock.
    #[must_use]
    pub fn now(&self) -> NaiveDateTime {
        match &self.inner {
            ClockInner::System => chrono::Local::now().naive_local(),
            ClockInner::Manual(instant) => {
                *instant.lock().unwrap_or_else(PoisonError::into_inner)
            }
        }
    }

    /// Move a manual clock to `to`. Ignored (with a warning) on a system
    /// clock.
    pub fn set(&self, to: NaiveDateTime) {
        match &self.inner {
            ClockInner::System => {
                tracing::warn!("cannot set a system clock; ignoring");
            }
            ClockInner::Manual(instant) => {
                *instant.lock().unwrap_or_else(PoisonError::into_inner) = to;
            }
        }
    }
}
