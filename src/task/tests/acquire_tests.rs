//! Unit tests for the acquire algorithm: ordering, admission and affinity.

use super::support::{TestStore, pool, store, store_with_limits};
use crate::task::{
    domain::{PoolLimits, TaskDraft, TaskOutcome, TaskState, TaskUpdate, WorkerId},
    ports::TaskStore,
};
use eyre::{OptionExt, ensure};
use rstest::rstest;

fn worker(raw: &str) -> WorkerId {
    WorkerId::new(raw).expect("valid worker id")
}

async fn acquire_body(store: &TestStore, holder: &str) -> eyre::Result<Option<String>> {
    Ok(store
        .acquire(&worker(holder))
        .await?
        .map(|task| task.body().to_owned()))
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn empty_queue_yields_nothing(store: TestStore) -> eyre::Result<()> {
    ensure!(store.acquire(&worker("w1")).await?.is_none());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn lower_priority_value_is_served_first(store: TestStore) -> eyre::Result<()> {
    store
        .insert(TaskDraft::new("second").with_priority(2))
        .await?;
    store
        .insert(TaskDraft::new("first").with_priority(1))
        .await?;

    ensure!(acquire_body(&store, "w1").await?.as_deref() == Some("first"));
    ensure!(acquire_body(&store, "w2").await?.as_deref() == Some("second"));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn equal_priority_is_first_in_first_out(store: TestStore) -> eyre::Result<()> {
    for body in ["a", "b", "c"] {
        store.insert(TaskDraft::new(body).with_priority(7)).await?;
    }

    let mut served = Vec::new();
    for holder in ["w1", "w2", "w3"] {
        served.push(acquire_body(&store, holder).await?.ok_or_eyre("task expected")?);
    }
    ensure!(served == ["a", "b", "c"], "got {served:?}");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn acquire_sets_worker_and_state(store: TestStore) -> eyre::Result<()> {
    let inserted = store.insert(TaskDraft::new("job")).await?;

    let task = store
        .acquire(&worker("w1"))
        .await?
        .ok_or_eyre("task expected")?;
    ensure!(task.id() == inserted.id());
    ensure!(task.state() == TaskState::Acquired);
    ensure!(task.worker() == Some(&worker("w1")));
    ensure!(task.updated() > task.added());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn worker_holding_a_task_gets_the_same_task_back(store: TestStore) -> eyre::Result<()> {
    store.insert(TaskDraft::new("mine")).await?;
    store.insert(TaskDraft::new("other")).await?;

    let first = store
        .acquire(&worker("w1"))
        .await?
        .ok_or_eyre("task expected")?;
    for _ in 0..3 {
        let again = store.acquire(&worker("w1")).await?;
        ensure!(again.as_ref() == Some(&first), "affinity must return the task unchanged");
    }
    ensure!(store.list_by_state(TaskState::New).await?.len() == 1);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn affinity_covers_working_tasks(store: TestStore) -> eyre::Result<()> {
    let task = store.insert(TaskDraft::new("mine")).await?;
    store.insert(TaskDraft::new("other")).await?;
    store.acquire(&worker("w1")).await?;
    let working = store
        .update(task.id(), &worker("w1"), TaskUpdate::Progress { status: None })
        .await?;

    ensure!(store.acquire(&worker("w1")).await? == Some(working));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn saturated_pool_yields_nothing_until_a_slot_frees() -> eyre::Result<()> {
    let store = store_with_limits(PoolLimits::default().with_pool(pool("p"), 1));
    let first = store
        .insert(TaskDraft::new("one").with_pool("p").with_priority(5))
        .await?;
    store
        .insert(TaskDraft::new("two").with_pool("p").with_priority(5))
        .await?;

    let held = store
        .acquire(&worker("a"))
        .await?
        .ok_or_eyre("task expected")?;
    ensure!(held.id() == first.id());
    ensure!(held.state() == TaskState::Acquired);
    ensure!(store.acquire(&worker("b")).await?.is_none());

    store
        .update(
            first.id(),
            &worker("a"),
            TaskUpdate::Finish {
                outcome: TaskOutcome::Done,
                status: None,
            },
        )
        .await?;
    ensure!(acquire_body(&store, "b").await?.as_deref() == Some("two"));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn saturated_pool_does_not_block_other_pools() -> eyre::Result<()> {
    let store = store_with_limits(PoolLimits::new(4).with_pool(pool("narrow"), 1));
    store
        .insert(TaskDraft::new("n1").with_pool("narrow").with_priority(0))
        .await?;
    store
        .insert(TaskDraft::new("n2").with_pool("narrow").with_priority(0))
        .await?;
    store
        .insert(TaskDraft::new("wide").with_pool("wide").with_priority(9))
        .await?;

    ensure!(acquire_body(&store, "w1").await?.as_deref() == Some("n1"));
    ensure!(
        acquire_body(&store, "w2").await?.as_deref() == Some("wide"),
        "scan must continue past the saturated pool"
    );
    ensure!(acquire_body(&store, "w3").await?.is_none());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn zero_cap_pool_is_never_served() -> eyre::Result<()> {
    let store = store_with_limits(PoolLimits::default().with_pool(pool("off"), 0));
    store.insert(TaskDraft::new("idle").with_pool("off")).await?;

    ensure!(store.acquire(&worker("w1")).await?.is_none());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn refused_task_is_served_again(store: TestStore) -> eyre::Result<()> {
    let task = store.insert(TaskDraft::new("retry")).await?;
    store.acquire(&worker("w1")).await?;

    let refused = store
        .update(task.id(), &worker("w1"), TaskUpdate::Refuse)
        .await?;
    ensure!(refused.state() == TaskState::New);
    ensure!(refused.worker().is_none());

    let again = store
        .acquire(&worker("w2"))
        .await?
        .ok_or_eyre("task expected")?;
    ensure!(again.id() == task.id());
    ensure!(again.worker() == Some(&worker("w2")));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn concurrent_acquires_never_exceed_pool_cap() -> eyre::Result<()> {
    let store = store_with_limits(PoolLimits::new(3));
    for index in 0..20 {
        store
            .insert(TaskDraft::new(format!("job-{index}")))
            .await?;
    }

    let mut handles = Vec::new();
    for index in 0..12 {
        let shared = store.clone();
        handles.push(tokio::spawn(async move {
            shared.acquire(&worker(&format!("w{index}"))).await
        }));
    }
    let mut granted = 0;
    for handle in handles {
        if handle.await??.is_some() {
            granted += 1;
        }
    }

    ensure!(granted == 3, "granted {granted}");
    ensure!(store.list_by_state(TaskState::Acquired).await?.len() == 3);
    Ok(())
}
