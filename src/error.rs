#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("No broker available: {0}")]
    BrokerUnavailable(String),

    #[error("Failed to read from the status stream: {0}")]
    Stream(String),

    #[error("Couldn't classify the status message: {0}")]
    Classification(String),

    #[error("Unknown status message kind '{0}'")]
    UnknownMessageKind(String),

    #[error("Invalid topic URL '{0}'")]
    InvalidTopicUrl(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Status consumer has already started.")]
    ConsumerAlreadyStarted,

    #[error("IO Error: {0}")]
    IOError(#[from] std::io::Error),

    #[error("Malformed JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Errors the consumer retries by reconnecting rather than by skipping a message.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Error::BrokerUnavailable(_))
    }
}
