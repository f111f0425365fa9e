//! Job Update Feed - Data-Load Completion Signals
//!
//! Consumed with a prefetch of 1 so status changes apply in order. The
//! configured ready job flips the data-ready gate: `Started` clears it,
//! `Completed` sets it. Other jobs are logged and acknowledged.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use super::wire::decode;
use crate::domain::market::DataReadyFlag;
use crate::ports::feed::{FeedError, FeedHandler};

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum JobStatus {
    Started,
    Completed,
    Failed,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobUpdateMsg {
    job_name: String,
    status: JobStatus,
}

/// Decoder for the job-update feed.
pub struct JobUpdateFeed {
    name: String,
    ready_job: String,
    data_ready: Arc<DataReadyFlag>,
}

impl JobUpdateFeed {
    pub fn new(
        name: impl Into<String>,
        ready_job: impl Into<String>,
        data_ready: Arc<DataReadyFlag>,
    ) -> Self {
        Self {
            name: name.into(),
            ready_job: ready_job.into(),
            data_ready,
        }
    }
}

impl FeedHandler for JobUpdateFeed {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, payload: &[u8]) -> Result<usize, FeedError> {
        let msg: JobUpdateMsg = decode(&self.name, payload)?;

        if msg.job_name != self.ready_job {
            info!(job = %msg.job_name, status = ?msg.status, "job update");
            return Ok(0);
        }

        match msg.status {
            JobStatus::Started => {
                if self.data_ready.set(false) {
                    info!(job = %msg.job_name, "data reload started, dispatch paused");
                }
            }
            JobStatus::Completed => {
                if !self.data_ready.set(true) {
                    info!(job = %msg.job_name, "data load complete, dispatch enabled");
                }
            }
            JobStatus::Failed => {
                warn!(job = %msg.job_name, "data load failed, readiness unchanged");
            }
        }
        Ok(1)
    }
}
