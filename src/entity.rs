use std::{
    hash::Hash,
    time::{Duration, SystemTime},
};

/// Common shape of the records tracked by the [`Registry`](crate::Registry).
///
/// Every entity has an identity, a kind-specific state and the time of the
/// last message that touched it. The registry only ever talks to records
/// through this trait when applying updates and running the staleness sweep.
pub trait Entity: Clone {
    type Id: Clone + Eq + Hash;

    fn id(&self) -> &Self::Id;

    /// Time of the most recent update applied to this entity.
    fn last_update(&self) -> SystemTime;

    /// Apply a newer update for the same id.
    ///
    /// Updates are applied in arrival order: mutable fields are overwritten
    /// by `new` (optional fields only when `new` carries a value), while
    /// `last_update` only ever moves forward.
    fn update_status(&mut self, new: Self);

    /// Flip the entity to its "possibly lost" state when it has not been
    /// updated for longer than `stale_after`. Never removes anything.
    fn check_if_outdated(&mut self, now: SystemTime, stale_after: Duration);

    /// Whether the entity currently sits in its "possibly lost" state.
    fn is_possibly_lost(&self) -> bool;

    /// Whether the entity has been silent for longer than `dead_after`.
    fn is_dead(&self, now: SystemTime, dead_after: Duration) -> bool {
        age(now, self.last_update()) > dead_after
    }
}

/// Time elapsed between `last_update` and `now`.
///
/// Timestamps from the future (remote clock skew) count as zero age.
pub(crate) fn age(now: SystemTime, last_update: SystemTime) -> Duration {
    now.duration_since(last_update).unwrap_or(Duration::ZERO)
}

pub(crate) fn is_stale(now: SystemTime, last_update: SystemTime, stale_after: Duration) -> bool {
    age(now, last_update) > stale_after
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn future_timestamps_have_zero_age() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(10);
        let later = now + Duration::from_secs(5);
        assert_eq!(age(now, later), Duration::ZERO);
        assert_eq!(age(later, now), Duration::from_secs(5));
    }

    #[test]
    fn stale_threshold_is_exclusive() {
        let t0 = SystemTime::UNIX_EPOCH;
        let limit = Duration::from_secs(30);
        assert!(!is_stale(t0 + limit, t0, limit));
        assert!(is_stale(t0 + limit + Duration::from_millis(1), t0, limit));
    }
}
