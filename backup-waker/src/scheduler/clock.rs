//! Wall-clock access, swappable in tests.

use chrono::{DateTime, Utc};

pub trait TimeProvider: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// System time provider (production)
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
