//! Command-line job monitor
//!
//! Starts a scoring run against the configured backend and logs every phase
//! transition until the run ends. Ctrl-C cancels the run.
//!
//! Usage: `job_monitor <workspace-id> [config-file]`
//! Settings can also come from `FWA_CONSOLE__*` environment variables.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use fwa_review_console_lib::application::{AppState, JobParameters};
use fwa_review_console_lib::domain::{PhaseKey, PhaseStatus, ProgressSnapshot, RunState};
use fwa_review_console_lib::infrastructure::config::{AppConfig, ConfigManager};
use fwa_review_console_lib::infrastructure::logging;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(RunState::Completed | RunState::Cancelled) => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("job_monitor: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<RunState> {
    let mut args = std::env::args().skip(1);
    let workspace_id = args
        .next()
        .context("usage: job_monitor <workspace-id> [config-file]")?;

    let config = match args.next().map(PathBuf::from) {
        Some(path) => AppConfig::load(Some(&path))
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ConfigManager::new()?.load_config()?,
    };

    logging::init_logging_with_config(&config.logging)?;
    logging::log_system_info();

    let state = AppState::from_config(config)?;
    let mut updates = state.monitor.subscribe();
    state
        .monitor
        .start(JobParameters::for_workspace(workspace_id))
        .await?;

    let mut reported: HashMap<PhaseKey, PhaseStatus> = HashMap::new();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                report_transitions(&snapshot, &mut reported);
                if snapshot.run_state().is_terminal() {
                    break;
                }
            }
            result = &mut ctrl_c => {
                if let Err(e) = result {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                }
                info!("🛑 Ctrl-C received, cancelling run");
                state.monitor.cancel().await;
                break;
            }
        }
    }

    let snapshot = state.monitor.wait_for_terminal().await;
    report_outcome(&snapshot);
    Ok(snapshot.run_state())
}

fn report_transitions(snapshot: &ProgressSnapshot, reported: &mut HashMap<PhaseKey, PhaseStatus>) {
    for phase in snapshot.phases() {
        let previous = reported.insert(phase.key, phase.status);
        if previous != Some(phase.status) && phase.status != PhaseStatus::Pending {
            info!(
                "[{}] {} -> {:?} ({:.0}%)",
                phase.key, phase.label, phase.status, phase.progress
            );
        }
    }
    if let Some(frontier) = snapshot.frontier() {
        if let (Some(current), Some(total)) = (frontier.current, frontier.total) {
            info!("[{}] {}/{} {}", frontier.key, current, total, frontier.detail.as_deref().unwrap_or(""));
        }
    }
}

fn report_outcome(snapshot: &ProgressSnapshot) {
    match snapshot.run_state() {
        RunState::Completed => {
            if let Some(summary) = snapshot.summary() {
                info!(
                    "✅ Batch {}: {} claims, {} rules evaluated, {} scores, {} cases ({:.1}s)",
                    summary.batch_id,
                    summary.total_claims,
                    summary.rules_evaluated,
                    summary.scores_generated,
                    summary.cases_created,
                    summary.elapsed_seconds
                );
                info!(
                    "Risk tiers: critical={} high={} medium={} low={}",
                    summary.critical_risk, summary.high_risk, summary.medium_risk, summary.low_risk
                );
            }
        }
        RunState::Cancelled => info!("Run cancelled at {:.0}% overall", snapshot.overall_progress()),
        RunState::Failed => {
            let message = snapshot.failure().map_or("unknown failure", |f| f.message.as_str());
            error!("❌ Run failed: {}", message);
        }
        RunState::NotStarted | RunState::Running => {}
    }
}
