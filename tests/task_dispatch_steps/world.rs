//! Shared world state for task dispatch BDD scenarios.

use std::collections::HashMap;
use std::sync::Arc;

use mockable::DefaultClock;
use quern::task::{
    adapters::memory::InMemoryTaskStore,
    domain::{PoolLimits, Task},
    services::TaskBrokerService,
};
use rstest::fixture;

/// Service type used by the BDD world.
pub type TestBroker = TaskBrokerService<InMemoryTaskStore<DefaultClock>>;

/// Scenario world for dispatch behaviour tests.
pub struct DispatchWorld {
    pub broker: TestBroker,
    /// Latest acquire answer per worker.
    pub handed_out: HashMap<String, Option<Task>>,
}

impl DispatchWorld {
    /// Creates a world whose broker enforces `limits`.
    #[must_use]
    pub fn with_limits(limits: PoolLimits) -> Self {
        Self {
            broker: TaskBrokerService::new(Arc::new(InMemoryTaskStore::new(
                Arc::new(DefaultClock),
                limits,
            ))),
            handed_out: HashMap::new(),
        }
    }
}

impl Default for DispatchWorld {
    fn default() -> Self {
        Self::with_limits(PoolLimits::default())
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> DispatchWorld {
    DispatchWorld::default()
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}
