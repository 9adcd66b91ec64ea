//! `now` is injected everywhere in this crate (§4.7: "`now` is injected so
//! tests can control expiry") rather than read from the system clock
//! directly, so TTL behavior is deterministic in tests.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Default)]
pub struct SystemClock;
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock a test can advance by hand, for scenarios like "ttlMs=10,
/// advance 11ms, expect a miss" (§8 scenario 5).
#[derive(Clone)]
pub struct TestClock(Arc<Mutex<DateTime<Utc>>>);

impl TestClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self(Arc::new(Mutex::new(start)))
    }

    pub fn advance_ms(&self, ms: i64) {
        let mut guard = self.0.lock().unwrap();
        *guard += chrono::Duration::milliseconds(ms);
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}
