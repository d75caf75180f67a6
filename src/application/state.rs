//! Application state shared by the UI command layer
//!
//! Holds the loaded configuration and the single [`JobMonitor`] that owns the
//! active job run.

use anyhow::{Context, Result};
use tracing::info;

use crate::application::job_monitor::JobMonitor;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::http_client::{ReqwestStreamOpener, StreamOpener};

/// Global application state
pub struct AppState<O: StreamOpener + 'static = ReqwestStreamOpener> {
    /// Application configuration
    pub config: AppConfig,

    /// Driver of the job run shown on the dashboard
    pub monitor: JobMonitor<O>,
}

impl AppState<ReqwestStreamOpener> {
    /// Build the production state: `reqwest` transport against the configured
    /// job endpoint.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let job_url = config.stream.job_url()?;
        let opener = ReqwestStreamOpener::new(&config.stream)
            .context("Failed to create job stream client")?;
        info!("Job endpoint: {}", job_url);
        Ok(Self::new(config, JobMonitor::new(opener, job_url.as_str())))
    }
}

impl<O: StreamOpener + 'static> AppState<O> {
    pub fn new(config: AppConfig, monitor: JobMonitor<O>) -> Self {
        Self { config, monitor }
    }
}
