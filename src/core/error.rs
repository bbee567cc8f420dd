use std::error::Error as StdError;
use thiserror::Error;

pub type WriterResult<T> = Result<T, WriterError>;
pub type SinkResult = Result<(), SinkError>;

#[derive(Debug, Error)]
pub enum WriterError {
    #[error("configuration error: {message}")]
    Config { message: String },
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },
    #[error("invalid state: {message}")]
    InvalidState { message: String },
    #[error("no data to flush")]
    NoDataToFlush,
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl WriterError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    pub fn with_context(context: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        WriterError::Context {
            context: context.into(),
            source: source.into().into(),
        }
    }
}

/// Failure reported by a [`crate::sink::Sink`].
///
/// `Unavailable` means the sink cannot accept anything right now (for example
/// the target directory cannot be created); the flush engine stops writing the
/// current block. `Write` concerns one output unit only.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink unavailable: {context}: {source}")]
    Unavailable {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
    #[error("write failed: {context}: {source}")]
    Write {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl SinkError {
    pub fn unavailable(context: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Unavailable {
            context: context.into(),
            source: source.into().into(),
        }
    }

    pub fn write(context: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Write {
            context: context.into(),
            source: source.into().into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, SinkError::Unavailable { .. })
    }
}
