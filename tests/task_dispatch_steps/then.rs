//! Then steps for task dispatch BDD scenarios.

use super::world::{DispatchWorld, run_async};
use eyre::WrapErr;
use quern::task::domain::TaskState;
use rstest_bdd_macros::then;

#[then(r#"worker "{worker}" received task "{id}""#)]
fn worker_received_task(world: &DispatchWorld, worker: String, id: String) -> Result<(), eyre::Report> {
    let handed = world
        .handed_out
        .get(&worker)
        .ok_or_else(|| eyre::eyre!("worker {worker} never polled"))?;
    match handed {
        Some(task) if task.id().as_str() == id => Ok(()),
        Some(task) => Err(eyre::eyre!(
            "worker {worker} received {}, expected {id}",
            task.id()
        )),
        None => Err(eyre::eyre!("worker {worker} received nothing, expected {id}")),
    }
}

#[then(r#"worker "{worker}" received nothing"#)]
fn worker_received_nothing(world: &DispatchWorld, worker: String) -> Result<(), eyre::Report> {
    match world.handed_out.get(&worker) {
        Some(None) => Ok(()),
        Some(Some(task)) => Err(eyre::eyre!("worker {worker} received {}", task.id())),
        None => Err(eyre::eyre!("worker {worker} never polled")),
    }
}

#[then(r#"task "{id}" is "{state}""#)]
fn task_is_in_state(world: &DispatchWorld, id: String, state: String) -> Result<(), eyre::Report> {
    let expected = TaskState::try_from(state.as_str())
        .map_err(|err| eyre::eyre!("invalid expected state in scenario: {err}"))?;
    let task = run_async(world.broker.get(&id)).wrap_err("fetch task in scenario")?;
    if task.state() != expected {
        return Err(eyre::eyre!(
            "expected state {}, found {}",
            expected.as_str(),
            task.state().as_str()
        ));
    }
    Ok(())
}

#[then(r#"task "{id}" has no worker"#)]
fn task_has_no_worker(world: &DispatchWorld, id: String) -> Result<(), eyre::Report> {
    let task = run_async(world.broker.get(&id)).wrap_err("fetch task in scenario")?;
    match task.worker() {
        None => Ok(()),
        Some(worker) => Err(eyre::eyre!("task {id} still held by {worker}")),
    }
}
