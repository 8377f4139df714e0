//! When steps for task dispatch BDD scenarios.

use super::world::{DispatchWorld, run_async};
use eyre::WrapErr;
use quern::task::{domain::TaskOutcome, services::UpdateTaskRequest};
use rstest_bdd_macros::when;

#[when(r#"worker "{worker}" acquires a task"#)]
fn worker_acquires(world: &mut DispatchWorld, worker: String) -> Result<(), eyre::Report> {
    let handed = run_async(world.broker.acquire(&worker)).wrap_err("acquire in scenario")?;
    world.handed_out.insert(worker, handed);
    Ok(())
}

#[when(r#"worker "{worker}" finishes task "{id}""#)]
fn worker_finishes(
    world: &mut DispatchWorld,
    worker: String,
    id: String,
) -> Result<(), eyre::Report> {
    let request = UpdateTaskRequest::new(id, worker).with_outcome(TaskOutcome::Done);
    run_async(world.broker.update(request)).wrap_err("finish task in scenario")?;
    Ok(())
}

#[when(r#"worker "{worker}" refuses task "{id}""#)]
fn worker_refuses(world: &mut DispatchWorld, worker: String, id: String) -> Result<(), eyre::Report> {
    run_async(world.broker.refuse(&id, &worker)).wrap_err("refuse task in scenario")?;
    Ok(())
}
