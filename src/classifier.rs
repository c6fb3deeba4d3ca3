use std::time::{Duration, SystemTime};

use serde::Deserialize;
use serde_json::Value;

use crate::{
    CommandState, CommandStatus, Error, JobState, JobStatus, RawMessage, Result, StatusUpdate,
    WorkerState, WorkerStatus,
};

/// Turns one raw broker message into exactly one [`StatusUpdate`].
///
/// Runs on the consumer thread only. A failed classification drops that one
/// message; it never stops the consumer.
///
/// Any `Fn(&RawMessage, SystemTime) -> Result<StatusUpdate>` closure is a
/// classifier, which keeps tests and custom wire formats short:
///
/// ```rust
/// use writer_registry::{Classifier, Error, RawMessage, Result, StatusUpdate};
/// use std::time::SystemTime;
///
/// let reject_all = |_: &RawMessage, _: SystemTime| -> Result<StatusUpdate> {
///     Err(Error::Classification("unsupported".into()))
/// };
/// let msg = RawMessage::new(b"x".to_vec(), None, 0);
/// assert!(reject_all.classify(&msg, SystemTime::now()).is_err());
/// ```
pub trait Classifier: Send + 'static {
    /// `received_at` is the local time the consumer read the message.
    fn classify(&self, message: &RawMessage, received_at: SystemTime) -> Result<StatusUpdate>;
}

impl<F> Classifier for F
where
    F: Fn(&RawMessage, SystemTime) -> Result<StatusUpdate> + Send + 'static,
{
    fn classify(&self, message: &RawMessage, received_at: SystemTime) -> Result<StatusUpdate> {
        self(message, received_at)
    }
}

/// Classifier for JSON status messages tagged by a `"type"` field.
///
/// ```json
/// {"type": "worker_status", "service_id": "fw-1", "state": "writing", "job_id": "j1"}
/// {"type": "job_status", "job_id": "j1", "state": "done", "file_name": "run.nxs"}
/// {"type": "command_answer", "job_id": "j1", "command_id": "c1", "outcome": "success"}
/// ```
///
/// Timestamps inside payloads (`start_time`, `stop_time`) are milliseconds
/// since the Unix epoch. The update's `last_update` is the broker timestamp
/// of the message, or `received_at` when the broker did not record one;
/// clocks of remote producers are never trusted for staleness.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonClassifier;

#[derive(Deserialize)]
struct WorkerMessage {
    service_id: String,
    state: WorkerState,
    host_name: Option<String>,
    process_id: Option<u32>,
    job_id: Option<String>,
}

#[derive(Deserialize)]
struct JobMessage {
    job_id: String,
    state: JobState,
    service_id: Option<String>,
    file_name: Option<String>,
    message: Option<String>,
    start_time: Option<u64>,
    stop_time: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum Outcome {
    Success,
    Failure,
}

#[derive(Deserialize)]
struct CommandAnswer {
    job_id: String,
    command_id: String,
    outcome: Outcome,
    response_code: Option<i32>,
    message: Option<String>,
}

impl Classifier for JsonClassifier {
    fn classify(&self, message: &RawMessage, received_at: SystemTime) -> Result<StatusUpdate> {
        let last_update = message.timestamp.unwrap_or(received_at);
        let mut value: Value = serde_json::from_slice(&message.payload)?;
        let kind = match value.as_object_mut().and_then(|obj| obj.remove("type")) {
            Some(Value::String(kind)) => kind,
            _ => return Err(Error::Classification("missing \"type\" field".to_string())),
        };

        let update = match kind.as_str() {
            "worker_status" => {
                let msg: WorkerMessage = serde_json::from_value(value)?;
                let service_id = non_empty(msg.service_id, "service_id")?;
                let mut status = WorkerStatus::new(service_id.into(), msg.state, last_update);
                status.host_name = msg.host_name;
                status.process_id = msg.process_id;
                status.job_id = msg.job_id.filter(|id| !id.is_empty()).map(Into::into);
                StatusUpdate::Worker(status)
            }
            "job_status" => {
                let msg: JobMessage = serde_json::from_value(value)?;
                let job_id = non_empty(msg.job_id, "job_id")?;
                let mut status = JobStatus::new(job_id.into(), msg.state, last_update);
                status.service_id = msg.service_id.filter(|id| !id.is_empty()).map(Into::into);
                status.file_name = msg.file_name;
                status.message = msg.message;
                status.start_time = msg.start_time.map(from_millis).transpose()?;
                status.stop_time = msg.stop_time.map(from_millis).transpose()?;
                StatusUpdate::Job(status)
            }
            "command_answer" => {
                let msg: CommandAnswer = serde_json::from_value(value)?;
                let state = match msg.outcome {
                    Outcome::Success => CommandState::Success,
                    Outcome::Failure => CommandState::Error,
                };
                let mut status = CommandStatus::new(
                    non_empty(msg.job_id, "job_id")?.into(),
                    non_empty(msg.command_id, "command_id")?.into(),
                    state,
                    last_update,
                );
                status.response_code = msg.response_code;
                status.message = msg.message;
                StatusUpdate::Command(status)
            }
            _ => return Err(Error::UnknownMessageKind(kind)),
        };
        Ok(update)
    }
}

fn non_empty(id: String, field: &str) -> Result<String> {
    if id.is_empty() {
        return Err(Error::Classification(format!("empty {field}")));
    }
    Ok(id)
}

fn from_millis(ms: u64) -> Result<SystemTime> {
    SystemTime::UNIX_EPOCH
        .checked_add(Duration::from_millis(ms))
        .ok_or_else(|| Error::Classification(format!("timestamp {ms} ms is out of range")))
}
