//! Writer Registry - live status of a file-writer fleet
//!
//! Observes remote file-writer processes, their jobs and the commands sent to
//! them purely by consuming the status topic they publish to. A background
//! consumer thread classifies raw messages into typed updates; the
//! [`Registry`] applies them lazily whenever it is queried, and flags or
//! evicts entities that have gone quiet.
//!
//! ```rust
//! use writer_registry::{Config, JsonClassifier, MemoryBroker, Registry, TopicUrl};
//!
//! let broker = MemoryBroker::new();
//! let url = TopicUrl::parse("memory://local/status")?;
//! let mut registry = Registry::connect(broker.source(&url), JsonClassifier, Config::default())?;
//!
//! let idle = br#"{"type":"worker_status","service_id":"fw-1","state":"idle"}"#;
//! broker.publish(url.topic(), idle.to_vec());
//! // ... later
//! for worker in registry.list_workers() {
//!     println!("{}: {}", worker.service_id, worker.state);
//! }
//! # Ok::<(), writer_registry::Error>(())
//! ```

mod classifier;
mod command_status;
mod config;
mod entity;
mod error;
mod ids;
mod job_status;
mod memory;
mod registry;
mod source;
mod status_update;
mod worker_status;

mod internal;

pub use classifier::{Classifier, JsonClassifier};
pub use command_status::{CommandState, CommandStatus};
pub use config::Config;
pub use entity::Entity;
pub use error::Error;
pub use ids::{CommandId, JobId, ServiceId};
pub use job_status::{JobState, JobStatus};
pub use memory::{MemoryBroker, MemorySource, MemoryStream};
pub use registry::Registry;
pub use source::{RawMessage, StatusSource, StatusStream, TopicUrl};
pub use status_update::StatusUpdate;
pub use worker_status::{WorkerState, WorkerStatus};

pub type Result<T = ()> = std::result::Result<T, Error>;
