//! Job monitor driven by scripted transports
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use tokio_util::sync::CancellationToken;

use fwa_review_console_lib::application::{AppState, JobMonitor, JobParameters};
use fwa_review_console_lib::commands::{cancel_job_run, get_job_progress, start_job_run};
use fwa_review_console_lib::domain::progress_engine::{FailureKind, ProgressSnapshot, RunState};
use fwa_review_console_lib::domain::{PhaseKey, PhaseStatus};
use fwa_review_console_lib::infrastructure::{AppConfig, ByteStream, StreamOpener, StreamRequest, TransportError};

const JOB_URL: &str = "http://scoring.test/api/jobs/score/stream";

/// What the transport does for one request
enum Script {
    /// Yield the chunks, then end the body
    Chunks(Vec<&'static str>),
    /// Yield the chunks, then never produce anything again
    ChunksThenHang(Vec<&'static str>),
    /// Yield the chunks, then fail the body
    ChunksThenError(Vec<&'static str>, TransportError),
    /// Fail before any body arrives
    OpenError(TransportError),
    /// Never answer the request
    HangOnOpen,
}

#[derive(Default)]
struct ScriptedOpener {
    scripts: Mutex<VecDeque<Script>>,
    requests: Arc<Mutex<Vec<StreamRequest>>>,
}

impl ScriptedOpener {
    fn new(scripts: impl IntoIterator<Item = Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into_iter().collect()),
            requests: Arc::default(),
        }
    }

    /// Handle on the requests seen, usable after the opener moved into a monitor
    fn recorded(&self) -> Arc<Mutex<Vec<StreamRequest>>> {
        Arc::clone(&self.requests)
    }
}

fn chunks(parts: Vec<&'static str>) -> impl futures::Stream<Item = Result<Vec<u8>, TransportError>> {
    stream::iter(parts.into_iter().map(|part| Ok(part.as_bytes().to_vec())))
}

#[async_trait]
impl StreamOpener for ScriptedOpener {
    async fn open(
        &self,
        request: StreamRequest,
        _cancel: CancellationToken,
    ) -> Result<ByteStream, TransportError> {
        self.requests.lock().unwrap().push(request);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .expect("no script left for request");

        use futures::StreamExt;
        match script {
            Script::Chunks(parts) => Ok(Box::pin(chunks(parts))),
            Script::ChunksThenHang(parts) => Ok(Box::pin(chunks(parts).chain(stream::pending()))),
            Script::ChunksThenError(parts, error) => {
                Ok(Box::pin(chunks(parts).chain(stream::iter([Err(error)]))))
            }
            Script::OpenError(error) => Err(error),
            Script::HangOnOpen => std::future::pending().await,
        }
    }
}

async fn finished(monitor: &JobMonitor<ScriptedOpener>) -> ProgressSnapshot {
    tokio::time::timeout(Duration::from_secs(5), monitor.wait_for_terminal())
        .await
        .expect("run did not finish")
}

async fn wait_until(
    monitor: &JobMonitor<ScriptedOpener>,
    predicate: impl Fn(&ProgressSnapshot) -> bool,
) {
    let mut rx = monitor.subscribe();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| predicate(s)))
        .await
        .expect("condition not reached")
        .expect("monitor dropped");
}

#[tokio::test]
async fn chunked_run_completes_with_summary() {
    let script = Script::Chunks(vec![
        "event: phase\ndata: {\"phase\":\"loading\",\"label\":\"Loading 1,200 claims\"}\n",
        "\nevent: progress\ndata: {\"phase\":\"loading\",\"progress\":100,\"current\":1200,\"total\":1200}\n\n",
        "event: phase\ndata: {\"phase\":\"enrichment\"}\n\nevent: prog",
        "ress\ndata: {\"phase\":\"rules\",\"progress\":45,\"detail\":\"Rule 12 of 40\"}\n\n",
        ": keep-alive\n\nevent: progress\ndata: {\"phase\":\"scoring\",\"progress\":",
        "80}\n\nevent: progress\ndata: {\"phase\":\"cases\",\"progress\":50}\n\n",
        "event: complete\ndata: {\"batch_id\":\"b1\",\"total_claims\":1200,\"cases_created\":9}\n\n",
    ]);
    let monitor = JobMonitor::new(ScriptedOpener::new([script]), JOB_URL);

    let run_id = monitor.start(JobParameters::for_workspace("ws-1")).await.unwrap();
    let snapshot = finished(&monitor).await;

    assert_eq!(snapshot.run_id(), Some(run_id));
    assert_eq!(snapshot.run_state(), RunState::Completed);
    assert_eq!(snapshot.summary().unwrap().batch_id, "b1");
    assert!(snapshot.phases().iter().all(|p| p.status == PhaseStatus::Complete));
    assert_eq!(snapshot.phase(PhaseKey::Loading).label, "Loading 1,200 claims");
    assert_eq!(snapshot.events_applied(), 7);
    assert!(snapshot.finished_at().is_some());
}

#[tokio::test]
async fn request_carries_job_parameters() {
    let opener = ScriptedOpener::new([Script::Chunks(vec![
        "event: complete\ndata: {\"batch_id\":\"b2\"}\n\n",
    ])]);
    let requests = opener.recorded();
    let monitor = JobMonitor::new(opener, JOB_URL);

    let mut params = JobParameters::for_workspace("ws-9");
    params.dry_run = true;
    params.claim_types = Some(vec!["pharmacy".into()]);
    monitor.start(params).await.unwrap();
    assert_eq!(finished(&monitor).await.run_state(), RunState::Completed);

    let requests = requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, reqwest::Method::POST);
    assert_eq!(requests[0].url, JOB_URL);
    assert_eq!(
        requests[0].body,
        Some(serde_json::json!({
            "workspace_id": "ws-9",
            "claim_types": ["pharmacy"],
            "dry_run": true,
        }))
    );
}

#[tokio::test]
async fn cancel_freezes_progress() {
    let opener = ScriptedOpener::new([Script::ChunksThenHang(vec![
        "event: progress\ndata: {\"phase\":\"rules\",\"progress\":40}\n\n",
    ])]);
    let monitor = JobMonitor::new(opener, JOB_URL);
    monitor.start(JobParameters::for_workspace("ws-1")).await.unwrap();
    wait_until(&monitor, |s| s.phase(PhaseKey::Rules).progress == 40.0).await;

    assert!(monitor.cancel().await);
    let snapshot = finished(&monitor).await;

    assert_eq!(snapshot.run_state(), RunState::Cancelled);
    assert!(snapshot.failure().is_none());
    assert_eq!(snapshot.phase(PhaseKey::Rules).status, PhaseStatus::Active);
    assert_eq!(snapshot.phase(PhaseKey::Rules).progress, 40.0);
    assert!(!monitor.cancel().await);
}

#[tokio::test]
async fn cancel_while_request_is_unanswered() {
    let monitor = JobMonitor::new(ScriptedOpener::new([Script::HangOnOpen]), JOB_URL);
    monitor.start(JobParameters::for_workspace("ws-1")).await.unwrap();
    tokio::task::yield_now().await;

    assert!(monitor.cancel().await);
    let snapshot = finished(&monitor).await;

    assert_eq!(snapshot.run_state(), RunState::Cancelled);
    assert!(snapshot.failure().is_none());
    assert!(snapshot.phases().iter().all(|p| p.status == PhaseStatus::Pending));
}

#[tokio::test]
async fn body_error_fails_the_run_and_keeps_progress() {
    let opener = ScriptedOpener::new([Script::ChunksThenError(
        vec!["event: progress\ndata: {\"phase\":\"scoring\",\"progress\":70}\n\n"],
        TransportError::Body {
            message: "connection reset by peer".into(),
        },
    )]);
    let monitor = JobMonitor::new(opener, JOB_URL);
    monitor.start(JobParameters::for_workspace("ws-1")).await.unwrap();
    let snapshot = finished(&monitor).await;

    assert_eq!(snapshot.run_state(), RunState::Failed);
    let failure = snapshot.failure().unwrap();
    assert_eq!(failure.kind, FailureKind::Transport);
    assert!(failure.message.contains("connection reset by peer"));
    assert_eq!(snapshot.phase(PhaseKey::Scoring).progress, 70.0);
}

#[tokio::test]
async fn timeout_is_reported_distinctly() {
    let opener = ScriptedOpener::new([Script::OpenError(TransportError::Timeout { seconds: 600 })]);
    let monitor = JobMonitor::new(opener, JOB_URL);
    monitor.start(JobParameters::for_workspace("ws-1")).await.unwrap();
    let snapshot = finished(&monitor).await;

    assert_eq!(snapshot.run_state(), RunState::Failed);
    let failure = snapshot.failure().unwrap();
    assert_eq!(failure.kind, FailureKind::Timeout);
    assert!(failure.message.contains("600s"));
}

#[tokio::test]
async fn rejected_request_keeps_status() {
    let opener = ScriptedOpener::new([Script::OpenError(TransportError::HttpStatus {
        status: 503,
        body: "scoring queue full".into(),
    })]);
    let monitor = JobMonitor::new(opener, JOB_URL);
    monitor.start(JobParameters::for_workspace("ws-1")).await.unwrap();
    let snapshot = finished(&monitor).await;

    let failure = snapshot.failure().unwrap();
    assert_eq!(failure.kind, FailureKind::HttpStatus);
    assert!(failure.message.contains("503"));
}

#[tokio::test]
async fn body_ending_early_is_an_incomplete_stream() {
    let opener = ScriptedOpener::new([Script::Chunks(vec![
        "event: progress\ndata: {\"phase\":\"cases\",\"progress\":90}\n\n",
    ])]);
    let monitor = JobMonitor::new(opener, JOB_URL);
    monitor.start(JobParameters::for_workspace("ws-1")).await.unwrap();
    let snapshot = finished(&monitor).await;

    assert_eq!(snapshot.run_state(), RunState::Failed);
    assert_eq!(snapshot.failure().unwrap().kind, FailureKind::IncompleteStream);
}

#[tokio::test]
async fn unterminated_final_frame_is_flushed() {
    let opener = ScriptedOpener::new([Script::Chunks(vec![
        "event: complete\ndata: {\"batch_id\":\"tail\"}",
    ])]);
    let monitor = JobMonitor::new(opener, JOB_URL);
    monitor.start(JobParameters::for_workspace("ws-1")).await.unwrap();
    let snapshot = finished(&monitor).await;

    assert_eq!(snapshot.run_state(), RunState::Completed);
    assert_eq!(snapshot.summary().unwrap().batch_id, "tail");
}

#[tokio::test]
async fn new_run_supersedes_the_previous_one() {
    let opener = ScriptedOpener::new([
        Script::ChunksThenHang(vec!["event: progress\ndata: {\"phase\":\"scoring\",\"progress\":60}\n\n"]),
        Script::Chunks(vec![
            "event: phase\ndata: {\"phase\":\"loading\"}\n\n",
            "event: complete\ndata: {\"batch_id\":\"second\"}\n\n",
        ]),
    ]);
    let monitor = JobMonitor::new(opener, JOB_URL);

    let first = monitor.start(JobParameters::for_workspace("ws-1")).await.unwrap();
    wait_until(&monitor, |s| s.phase(PhaseKey::Scoring).progress == 60.0).await;

    let second = monitor.start(JobParameters::for_workspace("ws-1")).await.unwrap();
    assert_ne!(first, second);
    let snapshot = finished(&monitor).await;

    assert_eq!(snapshot.run_id(), Some(second));
    assert_eq!(snapshot.run_state(), RunState::Completed);
    assert_eq!(snapshot.summary().unwrap().batch_id, "second");
    assert_eq!(snapshot.events_applied(), 2);
}

#[tokio::test]
async fn commands_validate_and_report() {
    let opener = ScriptedOpener::new([Script::ChunksThenHang(vec![
        "event: progress\ndata: {\"phase\":\"enrichment\",\"progress\":25}\n\n",
    ])]);
    let state = AppState::new(AppConfig::default(), JobMonitor::new(opener, JOB_URL));

    let error = start_job_run(&state, JobParameters::for_workspace("  ")).await.unwrap_err();
    assert!(error.contains("workspace"));

    let mut params = JobParameters::for_workspace("ws-1");
    params.date_from = chrono::NaiveDate::from_ymd_opt(2024, 6, 1);
    params.date_to = chrono::NaiveDate::from_ymd_opt(2024, 1, 1);
    assert!(start_job_run(&state, params).await.is_err());

    let response = start_job_run(&state, JobParameters::for_workspace("ws-1")).await.unwrap();
    wait_until(&state.monitor, |s| s.phase(PhaseKey::Enrichment).progress == 25.0).await;

    let view = get_job_progress(&state);
    assert_eq!(view.run_id.as_deref(), Some(response.run_id.as_str()));
    assert_eq!(view.run_state, RunState::Running);
    assert_eq!(view.phases[PhaseKey::Loading.index()].status, PhaseStatus::Complete);

    assert!(cancel_job_run(&state).await.unwrap());
    finished(&state.monitor).await;
    let view = get_job_progress(&state);
    assert_eq!(view.run_state, RunState::Cancelled);
    assert!(view.error_message.is_none());
}
