use std::{
    collections::{HashMap, hash_map::Entry},
    fmt::Display,
    sync::Arc,
    thread::JoinHandle,
    time::{Duration, SystemTime},
};

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, error::TryRecvError, unbounded_channel};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    Classifier, CommandId, CommandState, CommandStatus, Config, Entity, Error, JobId, JobState,
    JobStatus, Result, ServiceId, StatusSource, StatusUpdate, WorkerStatus,
    internal::StreamConsumer,
};

enum ConsumerThread {
    NotStarted(UnboundedSender<StatusUpdate>),
    Running(JoinHandle<()>),
    Stopped,
}

/// Live view of the file-writer fleet, built from the status topic.
///
/// - `connect(source, classifier, config)` creates the registry and starts
///   the background consumer; it returns immediately.
/// - Queries (`list_*`, `get_*`) first reconcile the registry with whatever
///   the consumer has queued so far, then answer from the local maps.
/// - `stop_thread()` stops and joins the consumer. It also runs when the
///   registry is dropped, so an abandoned registry never leaks its thread.
///
/// The maps are owned by the registry and only touched by the thread calling
/// its methods; the consumer communicates through the status queue alone.
/// Callers sharing a registry between threads must serialize access
/// themselves (e.g. behind a `Mutex`).
///
/// # Example
///
/// ```rust
/// use writer_registry::{Config, JsonClassifier, MemoryBroker, Registry, TopicUrl};
///
/// let broker = MemoryBroker::new();
/// let url = TopicUrl::parse("memory://local/status").unwrap();
/// let source = broker.source(&url);
/// let mut registry = Registry::connect(source, JsonClassifier, Config::default()).unwrap();
///
/// registry.add_job_id("job-1".into());
/// assert!(registry.get_job("job-1").is_some());
/// registry.stop_thread();
/// ```
pub struct Registry {
    config: Arc<Config>,
    workers: HashMap<ServiceId, WorkerStatus>,
    jobs: HashMap<JobId, JobStatus>,
    commands: HashMap<CommandId, CommandStatus>,
    updates: UnboundedReceiver<StatusUpdate>,
    cancel_token: CancellationToken,
    consumer: ConsumerThread,
}

impl Registry {
    /// Create a registry whose consumer has not been started yet.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let (tx, rx) = unbounded_channel();
        Ok(Self {
            config: Arc::new(config),
            workers: HashMap::new(),
            jobs: HashMap::new(),
            commands: HashMap::new(),
            updates: rx,
            cancel_token: CancellationToken::new(),
            consumer: ConsumerThread::NotStarted(tx),
        })
    }

    /// Create a registry and start consuming `source` in the background.
    pub fn connect<S, C>(source: S, classifier: C, config: Config) -> Result<Self>
    where
        S: StatusSource,
        C: Classifier,
    {
        let mut registry = Self::new(config)?;
        registry.start(source, classifier)?;
        Ok(registry)
    }

    /// Spawn the consumer thread. This returns immediately.
    ///
    /// A registry can be started only once; a stopped registry stays stopped.
    pub fn start<S, C>(&mut self, source: S, classifier: C) -> Result<()>
    where
        S: StatusSource,
        C: Classifier,
    {
        let ConsumerThread::NotStarted(sender) = &self.consumer else {
            return Err(Error::ConsumerAlreadyStarted);
        };
        let consumer = StreamConsumer::new(
            source,
            classifier,
            sender.clone(),
            self.cancel_token.clone(),
            self.config.clone(),
        );
        let handle = std::thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || consumer.run())?;
        // Dropping the registry's own sender leaves the consumer as the only producer.
        self.consumer = ConsumerThread::Running(handle);
        Ok(())
    }

    /// Whether the consumer thread is alive.
    pub fn is_running(&self) -> bool {
        matches!(&self.consumer, ConsumerThread::Running(handle) if !handle.is_finished())
    }

    /// Stop the consumer and wait for its thread to finish.
    ///
    /// Returns within about one poll timeout (or one retry interval while the
    /// broker is unreachable). Calling it on a registry that was never
    /// started, or calling it twice, does nothing.
    pub fn stop_thread(&mut self) {
        match std::mem::replace(&mut self.consumer, ConsumerThread::Stopped) {
            ConsumerThread::NotStarted(sender) => {
                self.consumer = ConsumerThread::NotStarted(sender);
            }
            ConsumerThread::Running(handle) => {
                self.cancel_token.cancel();
                if handle.join().is_err() {
                    error!("status consumer thread panicked");
                }
                info!("status consumer joined");
            }
            ConsumerThread::Stopped => {}
        }
    }

    /// Pre-register a job so it can be queried before any message mentions it.
    ///
    /// Does nothing if the job is already known.
    pub fn add_job_id(&mut self, job_id: JobId) {
        if let Entry::Vacant(entry) = self.jobs.entry(job_id) {
            let status = JobStatus::new(entry.key().clone(), JobState::Waiting, SystemTime::now());
            entry.insert(status);
        }
    }

    /// Pre-register a command that is about to be sent, awaiting its answer.
    ///
    /// Does nothing if the command is already known.
    pub fn add_command_id(&mut self, job_id: JobId, command_id: CommandId) {
        if let Entry::Vacant(entry) = self.commands.entry(command_id) {
            let status = CommandStatus::new(
                job_id,
                entry.key().clone(),
                CommandState::WaitingResponse,
                SystemTime::now(),
            );
            entry.insert(status);
        }
    }

    /// Reconcile the registry with the current time.
    pub fn update_workers(&mut self) {
        self.update_workers_at(SystemTime::now());
    }

    /// Reconcile the registry as of `now`.
    ///
    /// 1. Applies every update queued at call time, in queue order.
    /// 2. Flags entities silent for longer than `stale_after` as possibly lost.
    /// 3. Evicts entities silent for longer than `dead_after`.
    ///
    /// Never waits for the consumer.
    pub fn update_workers_at(&mut self, now: SystemTime) {
        let applied = self.drain();

        let stale_after = self.config.stale_after;
        let dead_after = self.config.dead_after;
        let evicted = sweep(&mut self.workers, now, stale_after, dead_after)
            + sweep(&mut self.jobs, now, stale_after, dead_after)
            + sweep(&mut self.commands, now, stale_after, dead_after);

        if applied > 0 || evicted > 0 {
            debug!(applied, evicted, "registry reconciled");
        }
    }

    fn drain(&mut self) -> usize {
        let pending = self.updates.len();
        let mut applied = 0;
        for _ in 0..pending {
            match self.updates.try_recv() {
                Ok(update) => {
                    self.apply(update);
                    applied += 1;
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        applied
    }

    fn apply(&mut self, update: StatusUpdate) {
        match update {
            StatusUpdate::Worker(status) => upsert(&mut self.workers, status),
            StatusUpdate::Job(status) => upsert(&mut self.jobs, status),
            StatusUpdate::Command(status) => upsert(&mut self.commands, status),
        }
    }

    pub fn list_workers(&mut self) -> Vec<WorkerStatus> {
        self.update_workers();
        self.workers.values().cloned().collect()
    }

    pub fn list_jobs(&mut self) -> Vec<JobStatus> {
        self.update_workers();
        self.jobs.values().cloned().collect()
    }

    pub fn list_commands(&mut self) -> Vec<CommandStatus> {
        self.update_workers();
        self.commands.values().cloned().collect()
    }

    /// Returns `None` when the worker was never seen or has been evicted.
    pub fn get_worker(&mut self, service_id: &str) -> Option<WorkerStatus> {
        self.update_workers();
        self.workers.get(service_id).cloned()
    }

    pub fn get_job(&mut self, job_id: &str) -> Option<JobStatus> {
        self.update_workers();
        self.jobs.get(job_id).cloned()
    }

    pub fn get_command(&mut self, command_id: &str) -> Option<CommandStatus> {
        self.update_workers();
        self.commands.get(command_id).cloned()
    }

    /// The thresholds this registry was built with, already validated.
    pub fn config(&self) -> &Config {
        self.config.as_ref()
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.stop_thread();
    }
}

fn upsert<E: Entity>(map: &mut HashMap<E::Id, E>, status: E) {
    match map.entry(status.id().clone()) {
        Entry::Occupied(mut entry) => entry.get_mut().update_status(status),
        Entry::Vacant(entry) => {
            entry.insert(status);
        }
    }
}

/// Flags stale entities, then evicts dead ones. Returns the number evicted.
fn sweep<E>(
    map: &mut HashMap<E::Id, E>,
    now: SystemTime,
    stale_after: Duration,
    dead_after: Duration,
) -> usize
where
    E: Entity,
    E::Id: Display,
{
    for entity in map.values_mut() {
        let was_lost = entity.is_possibly_lost();
        entity.check_if_outdated(now, stale_after);
        if !was_lost && entity.is_possibly_lost() {
            info!(id = %entity.id(), "no recent status, marking as possibly lost");
        }
    }
    let before = map.len();
    map.retain(|id, entity| {
        let dead = entity.is_dead(now, dead_after);
        if dead {
            debug!(id = %id, "evicting entity");
        }
        !dead
    });
    before - map.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WorkerState;

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn config() -> Config {
        Config::default()
            .with_stale_after(Duration::from_secs(30))
            .with_dead_after(Duration::from_secs(300))
    }

    impl Registry {
        fn enqueue(&self, update: impl Into<StatusUpdate>) {
            let ConsumerThread::NotStarted(sender) = &self.consumer else {
                panic!("enqueue is only available before start");
            };
            sender.send(update.into()).unwrap();
        }
    }

    #[test]
    fn pre_registration_is_idempotent() {
        let mut registry = Registry::new(config()).unwrap();
        registry.add_job_id("j1".into());
        registry.enqueue(JobStatus::new("j1".into(), JobState::Writing, SystemTime::now()));
        registry.update_workers();

        registry.add_job_id("j1".into());
        let jobs = registry.list_jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].state, JobState::Writing);
    }

    #[test]
    fn pre_registered_command_awaits_response() {
        let mut registry = Registry::new(config()).unwrap();
        registry.add_command_id("j1".into(), "c1".into());
        registry.add_command_id("j2".into(), "c1".into());
        let cmd = registry.get_command("c1").unwrap();
        assert_eq!(cmd.state, CommandState::WaitingResponse);
        assert_eq!(cmd.job_id, JobId::from("j1"));
    }

    #[test]
    fn drain_applies_everything_queued() {
        let mut registry = Registry::new(config()).unwrap();
        for i in 0..10 {
            let service_id = format!("fw-{i}").into();
            registry.enqueue(WorkerStatus::new(service_id, WorkerState::Idle, at(0)));
        }
        registry.enqueue(JobStatus::new("j1".into(), JobState::Waiting, at(0)));
        registry.enqueue(JobStatus::new("j1".into(), JobState::Done, at(1)));

        registry.update_workers_at(at(1));
        assert_eq!(registry.updates.len(), 0);
        assert_eq!(registry.workers.len(), 10);
        assert_eq!(registry.jobs[&JobId::from("j1")].state, JobState::Done);
    }

    #[test]
    fn stale_worker_is_flagged_not_removed() {
        let mut registry = Registry::new(config()).unwrap();
        registry.enqueue(WorkerStatus::new("fw-1".into(), WorkerState::Writing, at(0)));
        registry.update_workers_at(at(0));

        let stale_after = registry.config().stale_after;
        registry.update_workers_at(at(0) + stale_after + Duration::from_secs(1));
        let worker = registry.workers.get("fw-1").unwrap();
        assert_eq!(worker.state, WorkerState::Unavailable);
    }

    #[test]
    fn dead_worker_is_evicted() {
        let mut registry = Registry::new(config()).unwrap();
        registry.enqueue(WorkerStatus::new("fw-1".into(), WorkerState::Idle, at(0)));
        registry.update_workers_at(at(0));

        let dead_after = registry.config().dead_after;
        registry.update_workers_at(at(0) + dead_after);
        assert!(!registry.workers.is_empty());
        registry.update_workers_at(at(0) + dead_after + Duration::from_secs(1));
        assert!(registry.workers.is_empty());
    }

    #[test]
    fn job_lifecycle_from_running_to_evicted() {
        let mut registry = Registry::new(config()).unwrap();
        registry.enqueue(JobStatus::new("j1".into(), JobState::Writing, at(0)));
        registry.update_workers_at(at(0));
        assert_eq!(registry.jobs[&JobId::from("j1")].state, JobState::Writing);

        registry.update_workers_at(at(300) + Duration::from_secs(1));
        assert!(!registry.jobs.contains_key("j1"));
    }

    #[test]
    fn fresh_update_revives_a_stale_worker() {
        let mut registry = Registry::new(config()).unwrap();
        registry.enqueue(WorkerStatus::new("fw-1".into(), WorkerState::Idle, at(0)));
        registry.update_workers_at(at(40));
        assert!(registry.workers["fw-1"].is_possibly_lost());

        registry.enqueue(WorkerStatus::new("fw-1".into(), WorkerState::Writing, at(41)));
        registry.update_workers_at(at(42));
        assert_eq!(registry.workers["fw-1"].state, WorkerState::Writing);
    }

    #[test]
    fn stop_before_start_is_a_no_op() {
        let mut registry = Registry::new(config()).unwrap();
        registry.stop_thread();
        assert!(!registry.is_running());
        assert!(matches!(registry.consumer, ConsumerThread::NotStarted(_)));
    }

    #[test]
    fn rejects_invalid_config() {
        let config = config().with_stale_after(Duration::from_secs(600));
        assert!(matches!(Registry::new(config), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn unknown_ids_are_not_found() {
        let mut registry = Registry::new(config()).unwrap();
        assert!(registry.get_worker("nobody").is_none());
        assert!(registry.get_job("nothing").is_none());
        assert!(registry.get_command("never").is_none());
    }
}
