use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::{Entity, JobId, ServiceId, entity::is_stale};

/// State of a file-writer process as last reported (or inferred).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Running and waiting for work.
    Idle,
    /// Running and writing a file.
    Writing,
    /// No recent messages; the process may be gone.
    Unavailable,
    #[default]
    Unknown,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::Idle => write!(f, "idle"),
            WorkerState::Writing => write!(f, "writing"),
            WorkerState::Unavailable => write!(f, "unavailable"),
            WorkerState::Unknown => write!(f, "unknown"),
        }
    }
}

/// Last known status of one file-writer process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub service_id: ServiceId,
    pub state: WorkerState,
    pub host_name: Option<String>,
    pub process_id: Option<u32>,
    /// Job the worker reported as currently writing, if any.
    pub job_id: Option<JobId>,
    pub last_update: SystemTime,
}

impl WorkerStatus {
    pub fn new(service_id: ServiceId, state: WorkerState, last_update: SystemTime) -> Self {
        Self {
            service_id,
            state,
            host_name: None,
            process_id: None,
            job_id: None,
            last_update,
        }
    }

    pub fn with_host(mut self, host_name: impl Into<String>, process_id: u32) -> Self {
        self.host_name = Some(host_name.into());
        self.process_id = Some(process_id);
        self
    }

    pub fn with_job(mut self, job_id: JobId) -> Self {
        self.job_id = Some(job_id);
        self
    }
}

impl Entity for WorkerStatus {
    type Id = ServiceId;

    fn id(&self) -> &ServiceId {
        &self.service_id
    }

    fn last_update(&self) -> SystemTime {
        self.last_update
    }

    fn update_status(&mut self, new: Self) {
        debug_assert_eq!(self.service_id, new.service_id);
        self.state = new.state;
        self.host_name = new.host_name.or(self.host_name.take());
        self.process_id = new.process_id.or(self.process_id);
        // An idle worker reports no job, so the job id follows the state.
        self.job_id = match new.state {
            WorkerState::Writing => new.job_id.or(self.job_id.take()),
            WorkerState::Unavailable | WorkerState::Unknown => self.job_id.take(),
            WorkerState::Idle => None,
        };
        self.last_update = self.last_update.max(new.last_update);
    }

    fn check_if_outdated(&mut self, now: SystemTime, stale_after: Duration) {
        if is_stale(now, self.last_update, stale_after) {
            self.state = WorkerState::Unavailable;
        }
    }

    fn is_possibly_lost(&self) -> bool {
        self.state == WorkerState::Unavailable
    }
}
