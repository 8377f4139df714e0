//! Unit tests for task lifecycle rules and the task wire shape.

use super::support::SteppingClock;
use crate::task::domain::{
    PoolLimits, PoolName, Sticker, Task, TaskDomainError, TaskDraft, TaskOutcome, TaskState,
    TaskUpdate, WorkerId,
};
use eyre::{bail, ensure};
use rstest::{fixture, rstest};

#[fixture]
fn clock() -> SteppingClock {
    SteppingClock::new()
}

fn worker(name: &str) -> WorkerId {
    WorkerId::new(name).expect("valid worker id")
}

fn acquired_task(clock: &SteppingClock, holder: &str) -> Task {
    let mut task = Task::from_draft(TaskDraft::new("payload"), clock).expect("valid draft");
    task.acquire(worker(holder), clock).expect("new task can be acquired");
    task
}

#[rstest]
#[case(TaskState::New, TaskState::Acquired, true)]
#[case(TaskState::New, TaskState::Working, false)]
#[case(TaskState::New, TaskState::Done, false)]
#[case(TaskState::Acquired, TaskState::Working, true)]
#[case(TaskState::Acquired, TaskState::Done, true)]
#[case(TaskState::Acquired, TaskState::New, true)]
#[case(TaskState::Acquired, TaskState::Acquired, false)]
#[case(TaskState::Working, TaskState::Working, true)]
#[case(TaskState::Working, TaskState::Error, true)]
#[case(TaskState::Working, TaskState::New, true)]
#[case(TaskState::Done, TaskState::New, false)]
#[case(TaskState::Done, TaskState::Working, false)]
#[case(TaskState::Error, TaskState::Acquired, false)]
fn can_transition_to_returns_expected(
    #[case] from: TaskState,
    #[case] to: TaskState,
    #[case] expected: bool,
) {
    assert_eq!(from.can_transition_to(to), expected);
}

#[rstest]
#[case("0", TaskState::New)]
#[case("4", TaskState::Error)]
#[case("working", TaskState::Working)]
#[case(" Done ", TaskState::Done)]
fn task_state_parses_ordinals_and_names(#[case] raw: &str, #[case] expected: TaskState) {
    assert_eq!(TaskState::try_from(raw), Ok(expected));
}

#[rstest]
fn task_state_rejects_unknown_values() {
    assert!(TaskState::try_from("5").is_err());
    assert!(TaskState::try_from("paused").is_err());
    assert!(TaskState::try_from(9_u8).is_err());
}

#[rstest]
fn from_draft_applies_defaults(clock: SteppingClock) -> eyre::Result<()> {
    let task = Task::from_draft(TaskDraft::new("body").with_id("  "), &clock)?;

    ensure!(!task.id().as_str().is_empty(), "blank id should be generated");
    ensure!(task.sticker() == &Sticker::default_sticker());
    ensure!(task.pool() == &PoolName::default_pool());
    ensure!(task.state() == TaskState::New);
    ensure!(task.added() == task.updated());
    ensure!(task.worker().is_none() && task.status().is_none());
    Ok(())
}

#[rstest]
fn from_draft_keeps_explicit_fields(clock: SteppingClock) -> eyre::Result<()> {
    let draft = TaskDraft::new("body")
        .with_id("job-1")
        .with_sticker("reports")
        .with_pool("gpu")
        .with_priority(-3);
    let task = Task::from_draft(draft, &clock)?;

    ensure!(task.id().as_str() == "job-1");
    ensure!(task.sticker().as_str() == "reports");
    ensure!(task.pool().as_str() == "gpu");
    ensure!(task.priority() == -3);
    ensure!(task.body() == "body");
    Ok(())
}

#[rstest]
fn progress_then_finish_moves_through_lifecycle(clock: SteppingClock) -> eyre::Result<()> {
    let mut task = acquired_task(&clock, "w1");
    let holder = worker("w1");

    task.apply_update(
        &holder,
        TaskUpdate::Progress {
            status: Some("halfway".to_owned()),
        },
        &clock,
    )?;
    ensure!(task.state() == TaskState::Working);
    ensure!(task.status() == Some("halfway"));

    task.apply_update(
        &holder,
        TaskUpdate::Finish {
            outcome: TaskOutcome::Error,
            status: None,
        },
        &clock,
    )?;
    ensure!(task.state() == TaskState::Error);
    ensure!(task.status() == Some("halfway"), "status kept when omitted");
    ensure!(task.updated() > task.added());
    Ok(())
}

#[rstest]
fn refuse_returns_task_to_queue_without_claimant(clock: SteppingClock) -> eyre::Result<()> {
    let mut task = acquired_task(&clock, "w1");

    task.apply_update(&worker("w1"), TaskUpdate::Refuse, &clock)?;

    ensure!(task.state() == TaskState::New);
    ensure!(task.worker().is_none(), "refuse should clear the worker");
    ensure!(task.status().is_none());
    Ok(())
}

#[rstest]
fn update_on_queued_task_is_not_acquired(clock: SteppingClock) -> eyre::Result<()> {
    let mut task = Task::from_draft(TaskDraft::new("body"), &clock)?;
    let before = task.clone();

    match task.apply_update(&worker("w1"), TaskUpdate::Refuse, &clock) {
        Err(TaskDomainError::NotAcquired(_)) => {}
        other => bail!("expected NotAcquired, got {other:?}"),
    }
    ensure!(task == before, "rejected update must not modify the task");
    Ok(())
}

#[rstest]
fn update_on_finished_task_is_already_terminal(clock: SteppingClock) -> eyre::Result<()> {
    let mut task = acquired_task(&clock, "w1");
    let holder = worker("w1");
    task.apply_update(
        &holder,
        TaskUpdate::Finish {
            outcome: TaskOutcome::Done,
            status: None,
        },
        &clock,
    )?;
    let before = task.clone();

    match task.apply_update(&holder, TaskUpdate::Progress { status: None }, &clock) {
        Err(TaskDomainError::AlreadyTerminal { state, .. }) => {
            ensure!(state == TaskState::Done);
        }
        other => bail!("expected AlreadyTerminal, got {other:?}"),
    }
    ensure!(task == before);
    Ok(())
}

#[rstest]
fn update_from_other_worker_is_rejected(clock: SteppingClock) -> eyre::Result<()> {
    let mut task = acquired_task(&clock, "w1");

    match task.apply_update(&worker("w2"), TaskUpdate::Refuse, &clock) {
        Err(TaskDomainError::WorkerMismatch(_)) => {}
        other => bail!("expected WorkerMismatch, got {other:?}"),
    }
    ensure!(task.state() == TaskState::Acquired);
    Ok(())
}

#[rstest]
fn reset_for_restore_only_touches_active_tasks(clock: SteppingClock) -> eyre::Result<()> {
    let mut active = acquired_task(&clock, "w1");
    active.reset_for_restore();
    ensure!(active.state() == TaskState::New);
    ensure!(active.worker().is_none());
    ensure!(active.updated() == active.added());

    let mut finished = acquired_task(&clock, "w2");
    finished.apply_update(
        &worker("w2"),
        TaskUpdate::Finish {
            outcome: TaskOutcome::Done,
            status: Some("ok".to_owned()),
        },
        &clock,
    )?;
    let before = finished.clone();
    finished.reset_for_restore();
    ensure!(finished == before);
    Ok(())
}

#[rstest]
fn task_json_uses_ordinal_state_and_millisecond_timestamps(
    clock: SteppingClock,
) -> eyre::Result<()> {
    let task = acquired_task(&clock, "w1");
    let value = serde_json::to_value(&task)?;

    ensure!(value["state"] == 1);
    ensure!(value["worker"] == "w1");
    ensure!(value.get("status").is_none(), "absent status is omitted");
    ensure!(value["added"] == task.added().timestamp_millis());
    ensure!(value["updated"] == task.updated().timestamp_millis());
    Ok(())
}

#[rstest]
fn task_json_rejects_update_before_add() {
    let raw = r#"{"id":"a","sticker":"default","priority":0,"body":"",
        "pool":"default","state":0,"added":2000,"updated":1000}"#;
    assert!(serde_json::from_str::<Task>(raw).is_err());
}

#[rstest]
fn pool_limits_fall_back_to_default() {
    let limits = PoolLimits::new(3).with_pool(PoolName::new("gpu").expect("valid pool"), 1);

    assert_eq!(limits.max_for(&PoolName::new("gpu").expect("valid pool")), 1);
    assert_eq!(limits.max_for(&PoolName::default_pool()), 3);
    assert_eq!(PoolLimits::default().default_max(), 8);
}

#[rstest]
#[case("")]
#[case("   ")]
fn blank_worker_id_is_rejected(#[case] raw: &str) {
    assert_eq!(WorkerId::new(raw), Err(TaskDomainError::EmptyWorkerId));
}
