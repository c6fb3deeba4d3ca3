use std::{sync::Arc, time::{Duration, SystemTime}};

use crate::{Error, Result};

/// One message read from the status topic, before classification.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage {
    pub payload: Arc<[u8]>,
    /// Time the broker accepted the message, when the broker records one.
    pub timestamp: Option<SystemTime>,
    /// Position of the message in its topic.
    pub offset: u64,
}

impl RawMessage {
    pub fn new(payload: impl Into<Arc<[u8]>>, timestamp: Option<SystemTime>, offset: u64) -> Self {
        Self {
            payload: payload.into(),
            timestamp,
            offset,
        }
    }
}

/// Connects the status consumer to a broker topic.
///
/// Implement this for a broker client. The source is moved onto the
/// consumer thread, which calls [`connect`](StatusSource::connect) until it
/// succeeds or the registry is stopped.
///
/// Return [`Error::BrokerUnavailable`] for failures worth retrying; any other
/// error is logged and retried the same way, so a source can never end the
/// consumer on its own.
pub trait StatusSource: Send + 'static {
    type Stream: StatusStream;

    fn connect(&mut self) -> Result<Self::Stream>;
}

/// An open subscription to the status topic.
pub trait StatusStream {
    /// Wait up to `timeout` for the next message.
    ///
    /// `Ok(None)` means nothing arrived in time. An error affects only the
    /// message being read; [`Error::BrokerUnavailable`] additionally makes
    /// the consumer drop this stream and reconnect.
    fn poll(&mut self, timeout: Duration) -> Result<Option<RawMessage>>;

    /// Release the subscription. Called once when the consumer stops.
    fn close(&mut self) {}
}

/// Location of a status topic: `[scheme://]host[:port]/topic`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicUrl {
    host: String,
    topic: String,
}

impl TopicUrl {
    pub fn parse(url: &str) -> Result<Self> {
        let invalid = || Error::InvalidTopicUrl(url.to_string());
        let rest = match url.split_once("://") {
            Some((scheme, rest)) if !scheme.is_empty() => rest,
            Some(_) => return Err(invalid()),
            None => url,
        };
        let (host, topic) = rest.split_once('/').ok_or_else(invalid)?;
        let topic = topic.trim_end_matches('/');
        if host.is_empty() || topic.is_empty() || topic.contains('/') {
            return Err(invalid());
        }
        Ok(Self {
            host: host.to_string(),
            topic: topic.to_string(),
        })
    }

    /// Broker address, including the port when one was given.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl std::str::FromStr for TopicUrl {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        TopicUrl::parse(s)
    }
}

impl std::fmt::Display for TopicUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.host, self.topic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_url_with_scheme_and_port() {
        let url = TopicUrl::parse("kafka://broker.local:9092/writer_status").unwrap();
        assert_eq!(url.host(), "broker.local:9092");
        assert_eq!(url.topic(), "writer_status");
    }

    #[test]
    fn parses_url_without_scheme() {
        let url: TopicUrl = "localhost/status/".parse().unwrap();
        assert_eq!(url.host(), "localhost");
        assert_eq!(url.topic(), "status");
        assert_eq!(url.to_string(), "localhost/status");
    }

    #[test]
    fn rejects_incomplete_urls() {
        for url in ["localhost", "/status", "kafka://host/", "://host/topic", "host/a/b"] {
            assert!(
                matches!(TopicUrl::parse(url), Err(Error::InvalidTopicUrl(_))),
                "{url} should be rejected"
            );
        }
    }
}
