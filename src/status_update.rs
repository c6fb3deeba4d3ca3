use std::time::SystemTime;

use crate::{CommandStatus, Entity, JobStatus, WorkerStatus};

/// A decoded status message, ready to be applied to the registry.
///
/// Produced by a [`Classifier`](crate::Classifier) on the consumer thread
/// (or synthesized by its liveness sweep) and carried to the registry over
/// the status queue.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
    Worker(WorkerStatus),
    Job(JobStatus),
    Command(CommandStatus),
}

impl StatusUpdate {
    /// Short name of the update kind, used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            StatusUpdate::Worker(_) => "worker",
            StatusUpdate::Job(_) => "job",
            StatusUpdate::Command(_) => "command",
        }
    }

    pub fn last_update(&self) -> SystemTime {
        match self {
            StatusUpdate::Worker(w) => w.last_update(),
            StatusUpdate::Job(j) => j.last_update(),
            StatusUpdate::Command(c) => c.last_update(),
        }
    }
}

impl From<WorkerStatus> for StatusUpdate {
    fn from(status: WorkerStatus) -> Self {
        StatusUpdate::Worker(status)
    }
}

impl From<JobStatus> for StatusUpdate {
    fn from(status: JobStatus) -> Self {
        StatusUpdate::Job(status)
    }
}

impl From<CommandStatus> for StatusUpdate {
    fn from(status: CommandStatus) -> Self {
        StatusUpdate::Command(status)
    }
}
