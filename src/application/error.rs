use std::error::Error as StdError;

use thiserror::Error;

use crate::infra::error::InfraError;

pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Failures surfaced while reading a remote timeline.
///
/// Raised by the fetch step and passed through the feed source and timeline
/// unchanged; nothing in between retries or swallows them.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
    #[error("malformed response: {message}")]
    MalformedResponse { message: String },
}

impl FeedError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    pub fn transport_from(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Transport {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, FeedError::Transport { .. })
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Messages of the whole source chain, outermost first.
    pub fn chain(&self) -> Vec<String> {
        let mut messages = vec![self.to_string()];
        let mut current = self.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_walks_transport_sources() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let error = AppError::from(FeedError::transport_from("GET failed", io));

        let chain = error.chain();
        assert_eq!(chain[0], "transport error: GET failed");
        assert_eq!(chain.last().map(String::as_str), Some("reset by peer"));
    }
}
