mod consumer;
mod liveness;

pub(crate) use consumer::StreamConsumer;
pub(crate) use liveness::LivenessTracker;
