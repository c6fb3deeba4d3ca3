//! End-to-end behaviour of a registry consuming a live topic.

use std::time::{Duration, Instant, SystemTime};

use writer_registry::{
    CommandState, Config, Error, JobState, JsonClassifier, MemoryBroker, RawMessage, Registry,
    Result, StatusUpdate, TopicUrl, WorkerState,
};

const TOPIC: &str = "writer_status";

fn url() -> TopicUrl {
    TopicUrl::parse(&format!("memory://localhost:9092/{TOPIC}")).unwrap()
}

fn fast_config() -> Config {
    Config::default()
        .with_poll_timeout(Duration::from_millis(5))
        .with_retry_interval(Duration::from_millis(10))
}

fn connect(broker: &MemoryBroker) -> Registry {
    Registry::connect(broker.source(&url()), JsonClassifier, fast_config()).unwrap()
}

fn publish(broker: &MemoryBroker, json: &str) {
    broker.publish(TOPIC, json.as_bytes().to_vec());
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Queries the registry until `check` holds or five seconds pass.
fn eventually<T>(
    registry: &mut Registry,
    mut check: impl FnMut(&mut Registry) -> Option<T>,
) -> T {
    let start = Instant::now();
    loop {
        if let Some(value) = check(registry) {
            return value;
        }
        assert!(start.elapsed() < Duration::from_secs(5), "condition not met in time");
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn reflects_published_statuses() {
    init_tracing();
    let broker = MemoryBroker::new();
    let mut registry = connect(&broker);

    publish(
        &broker,
        r#"{"type":"worker_status","service_id":"fw-1","state":"writing",
            "host_name":"node-a","process_id":11,"job_id":"j1"}"#,
    );
    publish(
        &broker,
        r#"{"type":"job_status","job_id":"j1","service_id":"fw-1","state":"writing",
            "file_name":"scan.nxs"}"#,
    );
    publish(
        &broker,
        r#"{"type":"command_answer","job_id":"j1","command_id":"stop-1",
            "outcome":"success","response_code":201}"#,
    );

    let command = eventually(&mut registry, |r| r.get_command("stop-1"));
    assert_eq!(command.state, CommandState::Success);

    let worker = registry.get_worker("fw-1").unwrap();
    assert_eq!(worker.state, WorkerState::Writing);
    assert_eq!(worker.host_name.as_deref(), Some("node-a"));

    let job = registry.get_job("j1").unwrap();
    assert_eq!(job.file_name.as_deref(), Some("scan.nxs"));
    assert_eq!(registry.list_workers().len(), 1);
    assert_eq!(registry.list_jobs().len(), 1);
    assert_eq!(registry.list_commands().len(), 1);
}

#[test]
fn pre_registered_job_is_updated_by_messages() {
    let broker = MemoryBroker::new();
    let mut registry = connect(&broker);

    registry.add_job_id("j7".into());
    assert_eq!(registry.get_job("j7").unwrap().state, JobState::Waiting);

    publish(&broker, r#"{"type":"job_status","job_id":"j7","state":"done"}"#);
    eventually(&mut registry, |r| r.get_job("j7").filter(|j| j.state == JobState::Done));
    registry.add_job_id("j7".into());
    assert_eq!(registry.get_job("j7").unwrap().state, JobState::Done);
}

#[test]
fn bad_messages_never_reach_the_registry() {
    let broker = MemoryBroker::new();
    let mut registry = connect(&broker);

    broker.publish(TOPIC, b"\x00\x01binary".to_vec());
    publish(&broker, r#"{"type":"mystery"}"#);
    publish(&broker, r#"{"type":"worker_status","service_id":"fw-2","state":"idle"}"#);

    eventually(&mut registry, |r| r.get_worker("fw-2"));
    assert_eq!(registry.list_workers().len(), 1);
    assert!(registry.list_jobs().is_empty());
    assert!(registry.list_commands().is_empty());
    assert!(registry.is_running());
}

#[test]
fn old_broker_timestamps_lead_to_staleness_and_eviction() {
    let broker = MemoryBroker::new();
    let config = fast_config()
        .with_stale_after(Duration::from_secs(30))
        .with_dead_after(Duration::from_secs(300));
    let mut registry = Registry::connect(broker.source(&url()), JsonClassifier, config).unwrap();

    let now = SystemTime::now();
    let stale = br#"{"type":"worker_status","service_id":"stale","state":"idle"}"#;
    let dead = br#"{"type":"worker_status","service_id":"dead","state":"idle"}"#;
    broker.publish_at(TOPIC, stale.to_vec(), now - Duration::from_secs(60));
    broker.publish_at(TOPIC, dead.to_vec(), now - Duration::from_secs(600));
    publish(&broker, r#"{"type":"worker_status","service_id":"fresh","state":"idle"}"#);

    eventually(&mut registry, |r| r.get_worker("fresh"));
    assert_eq!(registry.get_worker("stale").unwrap().state, WorkerState::Unavailable);
    assert!(registry.get_worker("dead").is_none());
    let ids: Vec<String> =
        registry.list_workers().iter().map(|w| w.service_id.to_string()).collect();
    assert!(!ids.contains(&"dead".to_string()));
}

#[test]
fn stop_terminates_a_consumer_stuck_connecting() {
    let broker = MemoryBroker::unavailable();
    let mut registry = connect(&broker);
    std::thread::sleep(Duration::from_millis(30));
    assert!(registry.is_running());

    let requested = Instant::now();
    registry.stop_thread();
    assert!(requested.elapsed() < Duration::from_secs(1));
    assert!(!registry.is_running());

    registry.stop_thread();
}

#[test]
fn registry_catches_up_after_broker_recovers() {
    let broker = MemoryBroker::unavailable();
    let mut registry = connect(&broker);
    publish(&broker, r#"{"type":"job_status","job_id":"late","state":"writing"}"#);
    std::thread::sleep(Duration::from_millis(20));
    assert!(registry.get_job("late").is_none());

    broker.set_available(true);
    let job = eventually(&mut registry, |r| r.get_job("late"));
    assert_eq!(job.state, JobState::Writing);
}

#[test]
fn dropping_the_registry_stops_the_consumer() {
    let broker = MemoryBroker::unavailable();
    let registry = connect(&broker);
    let requested = Instant::now();
    drop(registry);
    assert!(requested.elapsed() < Duration::from_secs(1));
}

#[test]
fn starting_twice_is_rejected() {
    let broker = MemoryBroker::new();
    let mut registry = connect(&broker);
    let err = registry.start(broker.source(&url()), JsonClassifier).unwrap_err();
    assert!(matches!(err, Error::ConsumerAlreadyStarted));

    registry.stop_thread();
    assert!(registry.start(broker.source(&url()), JsonClassifier).is_err());
}

#[test]
fn custom_classifiers_plug_in() {
    let broker = MemoryBroker::new();
    let by_prefix = |message: &RawMessage, received_at: SystemTime| -> Result<StatusUpdate> {
        let text = std::str::from_utf8(&message.payload)
            .map_err(|e| Error::Classification(e.to_string()))?;
        let id = text
            .strip_prefix("alive:")
            .ok_or_else(|| Error::UnknownMessageKind(text.to_string()))?;
        Ok(writer_registry::WorkerStatus::new(id.into(), WorkerState::Idle, received_at).into())
    };
    let mut registry = Registry::connect(broker.source(&url()), by_prefix, fast_config()).unwrap();

    broker.publish(TOPIC, b"alive:fw-9".to_vec());
    broker.publish(TOPIC, b"ignored".to_vec());
    let worker = eventually(&mut registry, |r| r.get_worker("fw-9"));
    assert_eq!(worker.state, WorkerState::Idle);
}
