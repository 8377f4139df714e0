//! Shared fixtures for task unit tests.

use crate::task::{
    adapters::memory::InMemoryTaskStore,
    domain::{PoolLimits, PoolName},
};
use chrono::{DateTime, Local, TimeDelta, Utc};
use mockable::Clock;
use rstest::fixture;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Clock that starts at a fixed instant and moves one millisecond per read.
#[derive(Debug)]
pub(super) struct SteppingClock {
    start: DateTime<Utc>,
    ticks: AtomicI64,
}

impl SteppingClock {
    pub(super) fn new() -> Self {
        Self {
            start: DateTime::<Utc>::UNIX_EPOCH + TimeDelta::days(20_000),
            ticks: AtomicI64::new(0),
        }
    }
}

impl Clock for SteppingClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst);
        self.start + TimeDelta::milliseconds(tick)
    }
}

pub(super) type TestStore = InMemoryTaskStore<SteppingClock>;

pub(super) fn store_with_limits(limits: PoolLimits) -> TestStore {
    InMemoryTaskStore::new(Arc::new(SteppingClock::new()), limits)
}

#[fixture]
pub(super) fn store() -> TestStore {
    store_with_limits(PoolLimits::default())
}

pub(super) fn pool(name: &str) -> PoolName {
    PoolName::new(name).expect("valid pool name")
}
