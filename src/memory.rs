use std::{
    collections::HashMap,
    sync::{
        Arc, Condvar, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant, SystemTime},
};

use crate::{Error, RawMessage, Result, StatusSource, StatusStream, TopicUrl};

/// In-process broker keeping one append-only log per topic.
///
/// Cheap to clone; all clones share the same topics. Useful for tests,
/// demos and single-process deployments where workers publish their status
/// through the same handle.
///
/// # Example
///
/// ```rust
/// use writer_registry::{MemoryBroker, TopicUrl};
///
/// let broker = MemoryBroker::new();
/// let url = TopicUrl::parse("memory://local/status").unwrap();
/// let waiting = br#"{"type":"job_status","job_id":"j1","state":"waiting"}"#;
/// broker.publish(url.topic(), waiting.to_vec());
/// assert_eq!(broker.message_count(url.topic()), 1);
/// let _source = broker.source(&url);
/// ```
#[derive(Clone)]
pub struct MemoryBroker {
    shared: Arc<Shared>,
}

struct Shared {
    state: Mutex<BrokerState>,
    changed: Condvar,
}

struct BrokerState {
    available: bool,
    topics: HashMap<String, Vec<RawMessage>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(BrokerState {
                    available: true,
                    topics: HashMap::new(),
                }),
                changed: Condvar::new(),
            }),
        }
    }

    /// A broker that refuses connections until [`set_available`](Self::set_available)
    /// is called with `true`.
    pub fn unavailable() -> Self {
        let broker = Self::new();
        broker.set_available(false);
        broker
    }

    /// Append a message stamped with the current time. Returns its offset.
    pub fn publish(&self, topic: &str, payload: impl Into<Arc<[u8]>>) -> u64 {
        self.publish_at(topic, payload, SystemTime::now())
    }

    /// Append a message with an explicit broker timestamp. Returns its offset.
    pub fn publish_at(
        &self,
        topic: &str,
        payload: impl Into<Arc<[u8]>>,
        timestamp: SystemTime,
    ) -> u64 {
        let mut state = self.lock();
        let log = state.topics.entry(topic.to_string()).or_default();
        let offset = log.len() as u64;
        log.push(RawMessage::new(payload, Some(timestamp), offset));
        drop(state);
        self.shared.changed.notify_all();
        offset
    }

    /// Make the broker reachable or unreachable. Open streams see the
    /// change on their next poll.
    pub fn set_available(&self, available: bool) {
        self.lock().available = available;
        self.shared.changed.notify_all();
    }

    pub fn is_available(&self) -> bool {
        self.lock().available
    }

    pub fn message_count(&self, topic: &str) -> usize {
        self.lock().topics.get(topic).map_or(0, Vec::len)
    }

    /// A [`StatusSource`] reading `url`'s topic from the earliest offset.
    ///
    /// Each source keeps its own committed offset: a stream opened after a
    /// lost connection resumes where the previous one stopped.
    pub fn source(&self, url: &TopicUrl) -> MemorySource {
        MemorySource {
            broker: self.clone(),
            url: url.clone(),
            committed: Arc::new(AtomicU64::new(0)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

pub struct MemorySource {
    broker: MemoryBroker,
    url: TopicUrl,
    committed: Arc<AtomicU64>,
}

impl StatusSource for MemorySource {
    type Stream = MemoryStream;

    fn connect(&mut self) -> Result<MemoryStream> {
        if !self.broker.is_available() {
            return Err(Error::BrokerUnavailable(format!("{} is not reachable", self.url.host())));
        }
        Ok(MemoryStream {
            broker: self.broker.clone(),
            topic: self.url.topic().to_string(),
            offset: self.committed.load(Ordering::Acquire),
            committed: self.committed.clone(),
            closed: false,
        })
    }
}

pub struct MemoryStream {
    broker: MemoryBroker,
    topic: String,
    offset: u64,
    committed: Arc<AtomicU64>,
    closed: bool,
}

impl MemoryStream {
    /// Offset of the next message this stream will return.
    pub fn position(&self) -> u64 {
        self.offset
    }
}

impl StatusStream for MemoryStream {
    fn poll(&mut self, timeout: Duration) -> Result<Option<RawMessage>> {
        if self.closed {
            return Err(Error::Stream("stream is closed".to_string()));
        }
        let deadline = Instant::now() + timeout;
        let mut state = self.broker.lock();
        loop {
            if !state.available {
                return Err(Error::BrokerUnavailable("connection lost".to_string()));
            }
            let next = state
                .topics
                .get(&self.topic)
                .and_then(|log| log.get(self.offset as usize));
            if let Some(message) = next {
                self.offset += 1;
                self.committed.store(self.offset, Ordering::Release);
                return Ok(Some(message.clone()));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            state = self
                .broker
                .shared
                .changed
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
