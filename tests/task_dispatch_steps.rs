//! Behaviour tests for task dispatch: ordering, pool caps and affinity.

#[path = "task_dispatch_steps/mod.rs"]
mod task_dispatch_steps_defs;

use rstest_bdd_macros::scenario;
use task_dispatch_steps_defs::world::{DispatchWorld, world};

#[scenario(
    path = "tests/features/task_dispatch.feature",
    name = "Pool cap holds back a second worker until the slot frees"
)]
#[tokio::test(flavor = "multi_thread")]
async fn pool_cap_holds_back_second_worker(world: DispatchWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/task_dispatch.feature",
    name = "Lower priority value is served first"
)]
#[tokio::test(flavor = "multi_thread")]
async fn lower_priority_value_served_first(world: DispatchWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/task_dispatch.feature",
    name = "Worker holding a task is handed the same task again"
)]
#[tokio::test(flavor = "multi_thread")]
async fn holder_gets_same_task(world: DispatchWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/task_dispatch.feature",
    name = "Refused task goes back to the queue"
)]
#[tokio::test(flavor = "multi_thread")]
async fn refused_task_requeued(world: DispatchWorld) {
    let _ = world;
}
