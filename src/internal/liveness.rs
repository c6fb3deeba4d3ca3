use std::{
    collections::HashMap,
    time::{Duration, SystemTime},
};

use tracing::info;

use crate::{ServiceId, StatusUpdate, WorkerState, WorkerStatus, entity::age};

struct Sighting {
    last_status: WorkerStatus,
    seen_at: SystemTime,
    reported: bool,
}

/// Consumer-side record of when each worker was last heard from.
///
/// Produces one synthetic `Unavailable` update per silence period. The
/// synthetic update carries the worker's last real `last_update`, so it
/// never delays the registry's eviction of that worker.
pub(crate) struct LivenessTracker {
    timeout: Duration,
    forget_after: Duration,
    workers: HashMap<ServiceId, Sighting>,
}

impl LivenessTracker {
    pub fn new(timeout: Duration, forget_after: Duration) -> Self {
        Self {
            timeout,
            forget_after,
            workers: HashMap::new(),
        }
    }

    /// Record a classified update read at `received_at`.
    pub fn observe(&mut self, update: &StatusUpdate, received_at: SystemTime) {
        if let StatusUpdate::Worker(status) = update {
            self.workers.insert(
                status.service_id.clone(),
                Sighting {
                    last_status: status.clone(),
                    seen_at: received_at,
                    reported: status.state == WorkerState::Unavailable,
                },
            );
        }
    }

    /// Updates for workers that went silent since the previous sweep.
    pub fn sweep(&mut self, now: SystemTime) -> Vec<StatusUpdate> {
        let forget_after = self.forget_after;
        self.workers
            .retain(|_, sighting| age(now, sighting.seen_at) <= forget_after);

        let mut lost = Vec::new();
        for (service_id, sighting) in self.workers.iter_mut() {
            if sighting.reported || age(now, sighting.seen_at) <= self.timeout {
                continue;
            }
            sighting.reported = true;
            info!(
                service_id = %service_id,
                "no status from worker recently, reporting it unavailable"
            );
            let mut status = sighting.last_status.clone();
            status.state = WorkerState::Unavailable;
            lost.push(StatusUpdate::Worker(status));
        }
        lost
    }

    pub fn tracked(&self) -> usize {
        self.workers.len()
    }
}
