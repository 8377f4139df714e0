//! Restart behaviour: a broker's state written to a snapshot file and read
//! back by a fresh broker, both directly and behind the HTTP router.

#![expect(
    clippy::expect_used,
    reason = "Test code uses expect for assertion clarity"
)]

use std::sync::Arc;

use axum::{
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use camino::Utf8PathBuf;
use eyre::{OptionExt, ensure};
use mockable::DefaultClock;
use quern::server::{DrainGate, ServerOptions, router};
use quern::task::{
    adapters::{memory::InMemoryTaskStore, snapshot::SnapshotFile},
    domain::{PoolLimits, TaskDraft, TaskOutcome, TaskState},
    services::{TaskBrokerService, UpdateTaskRequest},
};
use rstest::{fixture, rstest};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

type Store = InMemoryTaskStore<DefaultClock>;

struct Workspace {
    _dir: TempDir,
    snapshot: SnapshotFile,
}

#[fixture]
fn workspace() -> Workspace {
    let dir = TempDir::new().expect("temp dir");
    let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("utf-8 temp path");
    Workspace {
        snapshot: SnapshotFile::new(root.join("quern.snapshot")),
        _dir: dir,
    }
}

fn fresh_store() -> Arc<Store> {
    Arc::new(InMemoryTaskStore::new(
        Arc::new(DefaultClock),
        PoolLimits::default(),
    ))
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn restart_keeps_queue_and_reissues_held_work(workspace: Workspace) -> eyre::Result<()> {
    let before = fresh_store();
    let broker = TaskBrokerService::new(Arc::clone(&before));
    broker
        .insert_batch(vec![
            TaskDraft::new("urgent").with_id("urgent").with_priority(0),
            TaskDraft::new("routine").with_id("routine").with_priority(5),
            TaskDraft::new("finished").with_id("finished").with_priority(9),
        ])
        .await?;
    let held = broker.acquire("w1").await?.ok_or_eyre("task expected")?;
    ensure!(held.id().as_str() == "urgent");
    broker
        .update(UpdateTaskRequest::new("urgent", "w1").with_status("halfway"))
        .await?;
    broker.acquire("w2").await?;
    broker.acquire("w3").await?;
    broker
        .update(UpdateTaskRequest::new("finished", "w3").with_outcome(TaskOutcome::Done))
        .await?;

    ensure!(workspace.snapshot.write(before.as_ref()).await? == 3);

    let after = fresh_store();
    ensure!(workspace.snapshot.read_into(after.as_ref()).await? == 3);
    let restarted = TaskBrokerService::new(after);

    let counts = restarted.counts_by_state().await?;
    ensure!(counts.get(&TaskState::New) == Some(&2));
    ensure!(counts.get(&TaskState::Done) == Some(&1));
    ensure!(counts.get(&TaskState::Working) == Some(&0));

    let reissued = restarted.acquire("w9").await?.ok_or_eyre("task expected")?;
    ensure!(reissued.id().as_str() == "urgent", "priority survives restart");
    ensure!(reissued.status().is_none());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn router_serves_restored_tasks_once_gate_opens(workspace: Workspace) -> eyre::Result<()> {
    let before = fresh_store();
    TaskBrokerService::new(Arc::clone(&before))
        .insert(TaskDraft::new("persisted").with_id("kept"))
        .await?;
    workspace.snapshot.write(before.as_ref()).await?;

    let after = fresh_store();
    let gate = Arc::new(DrainGate::new());
    let app = router(
        TaskBrokerService::new(Arc::clone(&after)),
        Arc::clone(&gate),
        ServerOptions::new(),
    );
    let acquire = || {
        Request::builder()
            .method(Method::POST)
            .uri("/v1/task/acquire")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({ "worker": "w1" }).to_string()))
            .expect("request should build")
    };

    let refused = app.clone().oneshot(acquire()).await?;
    ensure!(refused.status() == StatusCode::SERVICE_UNAVAILABLE);

    workspace.snapshot.read_into(after.as_ref()).await?;
    gate.open();

    let served = app.clone().oneshot(acquire()).await?;
    ensure!(served.status() == StatusCode::OK);
    let body: Value =
        serde_json::from_slice(&to_bytes(served.into_body(), usize::MAX).await?)?;
    ensure!(body["task"]["id"] == "kept");
    ensure!(body["task"]["body"] == "persisted");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn first_start_without_snapshot_is_empty(workspace: Workspace) -> eyre::Result<()> {
    let store = fresh_store();
    ensure!(workspace.snapshot.read_into(store.as_ref()).await? == 0);

    workspace.snapshot.write(store.as_ref()).await?;
    ensure!(workspace.snapshot.path().exists());
    ensure!(workspace.snapshot.load()?.is_empty());
    Ok(())
}
