use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::{CommandId, Entity, JobId, entity::is_stale};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandState {
    #[default]
    NoCommand,
    /// Sent (or about to be sent) and awaiting an answer from a worker.
    WaitingResponse,
    Success,
    Error,
    /// No answer arrived in time.
    TimeoutResponse,
}

impl CommandState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CommandState::Success | CommandState::Error)
    }
}

impl std::fmt::Display for CommandState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandState::NoCommand => write!(f, "no command"),
            CommandState::WaitingResponse => write!(f, "waiting for response"),
            CommandState::Success => write!(f, "success"),
            CommandState::Error => write!(f, "error"),
            CommandState::TimeoutResponse => write!(f, "timed out"),
        }
    }
}

/// Outcome of one control instruction sent to a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandStatus {
    pub job_id: JobId,
    pub command_id: CommandId,
    pub state: CommandState,
    pub response_code: Option<i32>,
    pub message: Option<String>,
    pub last_update: SystemTime,
}

impl CommandStatus {
    pub fn new(
        job_id: JobId,
        command_id: CommandId,
        state: CommandState,
        last_update: SystemTime,
    ) -> Self {
        Self {
            job_id,
            command_id,
            state,
            response_code: None,
            message: None,
            last_update,
        }
    }

    pub fn with_response(mut self, response_code: i32, message: impl Into<String>) -> Self {
        self.response_code = Some(response_code);
        self.message = Some(message.into());
        self
    }
}

impl Entity for CommandStatus {
    type Id = CommandId;

    fn id(&self) -> &CommandId {
        &self.command_id
    }

    fn last_update(&self) -> SystemTime {
        self.last_update
    }

    fn update_status(&mut self, new: Self) {
        debug_assert_eq!(self.command_id, new.command_id);
        self.job_id = new.job_id;
        self.state = new.state;
        self.response_code = new.response_code.or(self.response_code);
        self.message = new.message.or(self.message.take());
        self.last_update = self.last_update.max(new.last_update);
    }

    fn check_if_outdated(&mut self, now: SystemTime, stale_after: Duration) {
        if !self.state.is_terminal() && is_stale(now, self.last_update, stale_after) {
            self.state = CommandState::TimeoutResponse;
        }
    }

    fn is_possibly_lost(&self) -> bool {
        self.state == CommandState::TimeoutResponse
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn unanswered_command_times_out() {
        let state = CommandState::WaitingResponse;
        let mut cmd = CommandStatus::new("j1".into(), "c1".into(), state, at(0));
        cmd.check_if_outdated(at(20), Duration::from_secs(30));
        assert_eq!(cmd.state, CommandState::WaitingResponse);
        cmd.check_if_outdated(at(31), Duration::from_secs(30));
        assert!(cmd.is_possibly_lost());
    }

    #[test]
    fn answer_after_timeout_is_applied() {
        let state = CommandState::TimeoutResponse;
        let mut cmd = CommandStatus::new("j1".into(), "c1".into(), state, at(0));
        cmd.update_status(
            CommandStatus::new("j1".into(), "c1".into(), CommandState::Success, at(40))
                .with_response(200, "stopped"),
        );
        assert_eq!(cmd.state, CommandState::Success);
        assert_eq!(cmd.response_code, Some(200));
        cmd.check_if_outdated(at(500), Duration::from_secs(30));
        assert_eq!(cmd.state, CommandState::Success);
    }
}
