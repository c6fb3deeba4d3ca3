use std::{
    sync::Arc,
    time::{Duration, Instant, SystemTime},
};

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::LivenessTracker;
use crate::{Classifier, Config, RawMessage, StatusSource, StatusStream, StatusUpdate};

/// Background half of the registry.
///
/// Owns the broker connection and the classifier. Everything it learns is
/// pushed onto the status queue; it never sees the registry's maps.
///
/// ```text
/// Connecting ──▶ Consuming ──▶ Liveness sweep ──▶ stop requested? ──▶ Stopping
///     ▲              ▲                                   │ no
///     │              └───────────────────────────────────┘
///     └──── broker lost
/// ```
pub(crate) struct StreamConsumer<S: StatusSource, C: Classifier> {
    source: S,
    classifier: C,
    updates: UnboundedSender<StatusUpdate>,
    cancel_token: CancellationToken,
    liveness: LivenessTracker,
    read_failures: u32,
    config: Arc<Config>,
}

enum Pass {
    Consumed,
    /// A read failed; the failing message is skipped and the next pass waits.
    ReadFailed,
    Disconnected,
}

impl<S: StatusSource, C: Classifier> StreamConsumer<S, C> {
    pub fn new(
        source: S,
        classifier: C,
        updates: UnboundedSender<StatusUpdate>,
        cancel_token: CancellationToken,
        config: Arc<Config>,
    ) -> Self {
        Self {
            source,
            classifier,
            updates,
            cancel_token,
            liveness: LivenessTracker::new(config.liveness_timeout, config.dead_after),
            read_failures: 0,
            config,
        }
    }

    /// Runs until a stop is requested. Meant to be the body of a dedicated thread.
    pub fn run(mut self) {
        info!("status consumer started");
        'connecting: while let Some(mut stream) = self.connect() {
            loop {
                let pass = self.consume_pass(&mut stream);
                if let Pass::Disconnected = pass {
                    stream.close();
                    continue 'connecting;
                }
                self.emit_lost_workers();
                if self.should_stop() {
                    stream.close();
                    break 'connecting;
                }
                if let Pass::ReadFailed = pass {
                    self.pause(self.config.poll_timeout);
                }
            }
        }
        info!(tracked_workers = self.liveness.tracked(), "status consumer stopped");
    }

    fn should_stop(&self) -> bool {
        self.cancel_token.is_cancelled() || self.updates.is_closed()
    }

    /// Retries until connected, or returns `None` once a stop is requested.
    fn connect(&mut self) -> Option<S::Stream> {
        let mut attempts: u32 = 0;
        loop {
            if self.should_stop() {
                return None;
            }
            match self.source.connect() {
                Ok(stream) => {
                    info!(attempts = attempts + 1, "connected to status topic");
                    return Some(stream);
                }
                Err(e) => {
                    attempts += 1;
                    if attempts == 1 {
                        warn!(
                            error = %e,
                            connectivity = e.is_connectivity(),
                            "status topic not reachable, retrying"
                        );
                    } else {
                        debug!(error = %e, attempts, "status topic still not reachable");
                    }
                }
            }
            self.pause(self.config.retry_interval);
        }
    }

    /// Sleeps for `duration`, waking early when a stop is requested.
    fn pause(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        let slice = self.config.poll_timeout.min(duration);
        while !self.should_stop() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep(slice.min(deadline - now));
        }
    }

    fn consume_pass(&mut self, stream: &mut S::Stream) -> Pass {
        for _ in 0..self.config.max_messages_per_pass {
            match stream.poll(self.config.poll_timeout) {
                Ok(Some(message)) => {
                    self.read_failures = 0;
                    self.handle_message(&message);
                }
                Ok(None) => break,
                Err(e) if e.is_connectivity() => {
                    warn!(error = %e, "lost connection to status topic");
                    return Pass::Disconnected;
                }
                Err(e) => {
                    self.read_failures = self.read_failures.saturating_add(1);
                    if self.read_failures == 1 {
                        warn!(error = %e, "failed to read status message, skipping it");
                    } else {
                        debug!(
                            error = %e,
                            failures = self.read_failures,
                            "status reads still failing"
                        );
                    }
                    return Pass::ReadFailed;
                }
            }
            if self.cancel_token.is_cancelled() {
                break;
            }
        }
        Pass::Consumed
    }

    fn handle_message(&mut self, message: &RawMessage) {
        let received_at = SystemTime::now();
        match self.classifier.classify(message, received_at) {
            Ok(update) => {
                self.liveness.observe(&update, received_at);
                self.emit(update);
            }
            Err(e) => {
                warn!(
                    offset = message.offset,
                    error = %e,
                    "dropping unclassifiable status message"
                );
            }
        }
    }

    fn emit_lost_workers(&mut self) {
        for update in self.liveness.sweep(SystemTime::now()) {
            self.emit(update);
        }
    }

    fn emit(&self, update: StatusUpdate) {
        if let Err(e) = self.updates.send(update) {
            debug!(kind = e.0.kind(), "registry is gone, update discarded");
        }
    }
}
