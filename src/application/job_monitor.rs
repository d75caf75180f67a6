//! Job run driver
//!
//! Owns the single active run: opens the streamed request, pulls body chunks
//! one at a time, decodes them and feeds every decoded event to the progress
//! engine in arrival order. The snapshot is published through a
//! [`tokio::sync::watch`] channel; each chunk is applied inside one
//! `send_if_modified` call so observers never see half of a chunk applied.
//!
//! How a run ends is decided by [`StreamOutcome`], not by inspecting error
//! text: cancellation comes from the run's [`CancellationToken`], everything
//! else from the transport.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use ts_rs::TS;
use uuid::Uuid;

use crate::domain::events::DecodedEvent;
use crate::domain::progress_engine::{
    EngineInput, FailureKind, ProgressSnapshot, RunFailure, RunState,
};
use crate::infrastructure::frame_decoder::FrameDecoder;
use crate::infrastructure::http_client::{StreamOpener, StreamRequest, TransportError};

/// Parameters sent to the backend to start a scoring job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct JobParameters {
    pub workspace_id: String,
    /// Restrict the run to these claim types; all types when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub claim_types: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub date_from: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub date_to: Option<NaiveDate>,
    /// Score without creating cases
    #[serde(default)]
    pub dry_run: bool,
}

impl JobParameters {
    pub fn for_workspace(workspace_id: impl Into<String>) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            claim_types: None,
            date_from: None,
            date_to: None,
            dry_run: false,
        }
    }
}

#[derive(Error, Debug)]
pub enum JobMonitorError {
    #[error("Job parameters could not be encoded: {0}")]
    InvalidParameters(#[from] serde_json::Error),
}

/// How the read loop of a run ended
#[derive(Debug)]
enum StreamOutcome {
    /// Body ended, or the engine reached a terminal state
    Closed,
    Cancelled,
    Failed(TransportError),
}

struct ActiveRun {
    run_id: Uuid,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Starts, cancels and observes job runs
pub struct JobMonitor<O: StreamOpener + 'static> {
    opener: Arc<O>,
    job_url: String,
    state_tx: Arc<watch::Sender<ProgressSnapshot>>,
    active: Mutex<Option<ActiveRun>>,
}

impl<O: StreamOpener + 'static> JobMonitor<O> {
    pub fn new(opener: O, job_url: impl Into<String>) -> Self {
        let (state_tx, _) = watch::channel(ProgressSnapshot::new());
        Self {
            opener: Arc::new(opener),
            job_url: job_url.into(),
            state_tx: Arc::new(state_tx),
            active: Mutex::new(None),
        }
    }

    /// Begin a new run. A run still streaming is cancelled and awaited first,
    /// then the snapshot is reset before the new request is opened.
    pub async fn start(&self, params: JobParameters) -> Result<Uuid, JobMonitorError> {
        let body = serde_json::to_value(&params)?;
        let mut active = self.active.lock().await;

        if let Some(previous) = active.take() {
            if !previous.handle.is_finished() {
                info!("🛑 Cancelling run {} before starting a new one", previous.run_id);
            }
            previous.cancel.cancel();
            if let Err(e) = previous.handle.await {
                warn!("Previous run {} ended abnormally: {}", previous.run_id, e);
            }
        }

        let run_id = Uuid::new_v4();
        self.state_tx.send_modify(|state| {
            state.apply(&EngineInput::RunStarted {
                run_id,
                started_at: Utc::now(),
            });
        });

        info!(
            "🚀 Starting job run {} for workspace '{}'",
            run_id, params.workspace_id
        );

        let cancel = CancellationToken::new();
        let ctx = RunContext {
            run_id,
            opener: Arc::clone(&self.opener),
            request: StreamRequest::post(self.job_url.clone(), body),
            cancel: cancel.clone(),
            state_tx: Arc::clone(&self.state_tx),
        };
        let handle = tokio::spawn(drive_run(ctx));

        *active = Some(ActiveRun {
            run_id,
            cancel,
            handle,
        });
        Ok(run_id)
    }

    /// Abort the current run. Returns `false` when nothing was streaming.
    pub async fn cancel(&self) -> bool {
        let active = self.active.lock().await;
        match active.as_ref() {
            Some(run) if !run.handle.is_finished() && !run.cancel.is_cancelled() => {
                info!("🛑 Cancellation requested for run {}", run.run_id);
                run.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Current snapshot
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.state_tx.borrow().clone()
    }

    /// Receiver that is notified after every applied chunk
    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.state_tx.subscribe()
    }

    /// Wait until the current run is terminal. Returns immediately when no
    /// run was ever started.
    pub async fn wait_for_terminal(&self) -> ProgressSnapshot {
        let mut rx = self.state_tx.subscribe();
        let result = rx
            .wait_for(|s| s.run_state().is_terminal() || s.run_state() == RunState::NotStarted)
            .await
            .map(|snapshot| (*snapshot).clone());
        result.unwrap_or_else(|_| self.snapshot())
    }
}

impl<O: StreamOpener + 'static> Drop for JobMonitor<O> {
    fn drop(&mut self) {
        if let Some(run) = self.active.get_mut().as_ref() {
            run.cancel.cancel();
        }
    }
}

/// Everything one run's task needs
struct RunContext<O: StreamOpener + 'static> {
    run_id: Uuid,
    opener: Arc<O>,
    request: StreamRequest,
    cancel: CancellationToken,
    state_tx: Arc<watch::Sender<ProgressSnapshot>>,
}

impl<O: StreamOpener + 'static> RunContext<O> {
    /// Apply `inputs` atomically if this run still owns the snapshot.
    /// Returns the run state afterwards, or `None` once superseded.
    fn publish(&self, inputs: &[EngineInput]) -> Option<RunState> {
        let mut run_state = None;
        self.state_tx.send_if_modified(|state| {
            if state.run_id() != Some(self.run_id) {
                return false;
            }
            for input in inputs {
                state.apply(input);
            }
            state.stamp_finished(Utc::now());
            run_state = Some(state.run_state());
            true
        });
        run_state
    }

    fn publish_events(&self, events: Vec<DecodedEvent>) -> Option<RunState> {
        if events.is_empty() {
            let state = self.state_tx.borrow();
            return (state.run_id() == Some(self.run_id)).then(|| state.run_state());
        }
        let inputs: Vec<EngineInput> = events.into_iter().map(EngineInput::Event).collect();
        self.publish(&inputs)
    }
}

async fn drive_run<O: StreamOpener + 'static>(ctx: RunContext<O>) {
    let outcome = read_stream(&ctx).await;
    debug!("Run {} read loop ended: {:?}", ctx.run_id, outcome);

    let input = match outcome {
        StreamOutcome::Closed => EngineInput::StreamClosed,
        StreamOutcome::Cancelled => {
            info!("Run {} cancelled", ctx.run_id);
            EngineInput::Cancelled
        }
        StreamOutcome::Failed(error) => EngineInput::TransportFailed(failure_from(&error)),
    };
    ctx.publish(&[input]);
}

async fn read_stream<O: StreamOpener + 'static>(ctx: &RunContext<O>) -> StreamOutcome {
    let opened = tokio::select! {
        biased;
        () = ctx.cancel.cancelled() => return StreamOutcome::Cancelled,
        result = ctx.opener.open(ctx.request.clone(), ctx.cancel.clone()) => result,
    };

    let mut body = match opened {
        Ok(body) => body,
        Err(TransportError::Cancelled) => return StreamOutcome::Cancelled,
        Err(error) => return StreamOutcome::Failed(error),
    };

    let mut decoder = FrameDecoder::new();
    loop {
        // The only suspension point of the loop.
        let next = tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => return StreamOutcome::Cancelled,
            chunk = body.next() => chunk,
        };

        let events = match next {
            Some(Ok(chunk)) => decoder.push(&chunk),
            Some(Err(TransportError::Cancelled)) => return StreamOutcome::Cancelled,
            Some(Err(error)) => return StreamOutcome::Failed(error),
            None => {
                ctx.publish_events(decoder.finish());
                return StreamOutcome::Closed;
            }
        };

        if events.is_empty() {
            continue;
        }
        debug!(
            "Run {}: {} event(s), {} byte(s) pending",
            ctx.run_id,
            events.len(),
            decoder.pending_len()
        );
        if ctx.publish_events(events) != Some(RunState::Running) {
            return StreamOutcome::Closed;
        }
    }
}

/// Map a transport error to the failure shown to the operator
fn failure_from(error: &TransportError) -> RunFailure {
    match error {
        TransportError::Timeout { seconds } => RunFailure::new(
            FailureKind::Timeout,
            format!(
                "The scoring job did not finish within {seconds}s. The backend is likely \
                 overloaded; the job may still be running server-side."
            ),
        ),
        TransportError::HttpStatus { .. } => {
            RunFailure::new(FailureKind::HttpStatus, error.to_string())
        }
        _ => RunFailure::new(FailureKind::Transport, error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameters_skip_absent_filters() {
        let value = serde_json::to_value(JobParameters::for_workspace("ws-1")).unwrap();
        assert_eq!(value, serde_json::json!({"workspace_id": "ws-1", "dry_run": false}));
    }

    #[test]
    fn omitted_filters_are_optional_in_bindings() {
        let decl = JobParameters::decl();
        assert!(decl.contains("claim_types?:"), "{decl}");
        assert!(decl.contains("date_from?:"), "{decl}");
        assert!(decl.contains("date_to?:"), "{decl}");
    }

    #[tokio::test]
    async fn empty_flush_does_not_wake_subscribers() {
        use crate::infrastructure::config::StreamConfig;
        use crate::infrastructure::http_client::ReqwestStreamOpener;

        let run_id = Uuid::new_v4();
        let (state_tx, _) = watch::channel(ProgressSnapshot::new());
        state_tx.send_modify(|state| {
            state.apply(&EngineInput::RunStarted {
                run_id,
                started_at: Utc::now(),
            });
        });
        let ctx = RunContext {
            run_id,
            opener: Arc::new(ReqwestStreamOpener::new(&StreamConfig::default()).unwrap()),
            request: StreamRequest::post("http://localhost/jobs", serde_json::json!({})),
            cancel: CancellationToken::new(),
            state_tx: Arc::new(state_tx),
        };
        let mut rx = ctx.state_tx.subscribe();
        rx.mark_unchanged();

        assert_eq!(ctx.publish_events(Vec::new()), Some(RunState::Running));
        assert!(!rx.has_changed().unwrap());

        let events = vec![DecodedEvent::new("progress", r#"{"phase":"rules","progress":5}"#)];
        assert_eq!(ctx.publish_events(events), Some(RunState::Running));
        assert!(rx.has_changed().unwrap());
    }

    #[test]
    fn timeout_failure_has_distinct_kind_and_message() {
        let failure = failure_from(&TransportError::Timeout { seconds: 600 });
        assert_eq!(failure.kind, FailureKind::Timeout);
        assert!(failure.message.contains("likely overloaded"));

        let failure = failure_from(&TransportError::Connection {
            message: "connection reset".into(),
        });
        assert_eq!(failure.kind, FailureKind::Transport);
        assert!(failure.message.contains("connection reset"));
    }

    #[test]
    fn http_status_failure_keeps_status() {
        let failure = failure_from(&TransportError::HttpStatus {
            status: 503,
            body: "busy".into(),
        });
        assert_eq!(failure.kind, FailureKind::HttpStatus);
        assert!(failure.message.contains("503"));
    }
}
