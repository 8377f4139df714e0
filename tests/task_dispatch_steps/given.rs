//! Given steps for task dispatch BDD scenarios.

use super::world::{DispatchWorld, run_async};
use eyre::WrapErr;
use quern::task::domain::{PoolLimits, PoolName, TaskDraft};
use rstest_bdd_macros::given;

#[given("a broker with default limits")]
fn broker_with_default_limits(world: &mut DispatchWorld) {
    *world = DispatchWorld::default();
}

#[given(r#"a broker where pool "{pool}" admits {max:usize} held tasks"#)]
fn broker_with_pool_cap(
    world: &mut DispatchWorld,
    pool: String,
    max: usize,
) -> Result<(), eyre::Report> {
    let name = PoolName::new(pool).wrap_err("pool name in scenario")?;
    *world = DispatchWorld::with_limits(PoolLimits::default().with_pool(name, max));
    Ok(())
}

#[given(r#"a task "{id}" with priority {priority:i64} in pool "{pool}" is queued"#)]
fn task_is_queued(
    world: &mut DispatchWorld,
    id: String,
    priority: i64,
    pool: String,
) -> Result<(), eyre::Report> {
    let draft = TaskDraft::new(format!("body of {id}"))
        .with_id(id)
        .with_priority(priority)
        .with_pool(pool);
    run_async(world.broker.insert(draft)).wrap_err("queue task for scenario")?;
    Ok(())
}
