use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::{Entity, JobId, ServiceId, entity::is_stale};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Known to the controller but not yet picked up by a worker.
    #[default]
    Waiting,
    Writing,
    Done,
    Error,
    /// No recent messages while the job was still in progress.
    Unavailable,
}

impl JobState {
    /// `Done` and `Error` are final; staleness no longer applies to them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Error)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Waiting => write!(f, "waiting"),
            JobState::Writing => write!(f, "writing"),
            JobState::Done => write!(f, "done"),
            JobState::Error => write!(f, "error"),
            JobState::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Last known status of one write job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_id: JobId,
    pub state: JobState,
    /// Worker that reported on this job.
    pub service_id: Option<ServiceId>,
    pub file_name: Option<String>,
    /// Error description for failed jobs.
    pub message: Option<String>,
    pub start_time: Option<SystemTime>,
    pub stop_time: Option<SystemTime>,
    pub last_update: SystemTime,
}

impl JobStatus {
    pub fn new(job_id: JobId, state: JobState, last_update: SystemTime) -> Self {
        Self {
            job_id,
            state,
            service_id: None,
            file_name: None,
            message: None,
            start_time: None,
            stop_time: None,
            last_update,
        }
    }

    pub fn with_service(mut self, service_id: ServiceId) -> Self {
        self.service_id = Some(service_id);
        self
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl Entity for JobStatus {
    type Id = JobId;

    fn id(&self) -> &JobId {
        &self.job_id
    }

    fn last_update(&self) -> SystemTime {
        self.last_update
    }

    fn update_status(&mut self, new: Self) {
        debug_assert_eq!(self.job_id, new.job_id);
        self.state = new.state;
        self.service_id = new.service_id.or(self.service_id.take());
        self.file_name = new.file_name.or(self.file_name.take());
        self.message = new.message.or(self.message.take());
        self.start_time = new.start_time.or(self.start_time);
        self.stop_time = new.stop_time.or(self.stop_time);
        self.last_update = self.last_update.max(new.last_update);
    }

    fn check_if_outdated(&mut self, now: SystemTime, stale_after: Duration) {
        if !self.state.is_terminal() && is_stale(now, self.last_update, stale_after) {
            self.state = JobState::Unavailable;
        }
    }

    fn is_possibly_lost(&self) -> bool {
        self.state == JobState::Unavailable
    }
}
