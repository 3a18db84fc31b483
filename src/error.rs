//! Error types for brigade.

use thiserror::Error;

use crate::engine::handoff::Step;

#[derive(Debug, Error)]
pub enum Error {
    #[error("request kind missing or unrecognized")]
    MissingKind,

    #[error("request is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("no available worker for capabilities {0:?}")]
    NoAvailableWorker(Vec<String>),

    #[error("hand-off timed out during {step}")]
    Timeout { step: Step },

    #[error("channel closed during {step}")]
    ChannelClosed { step: Step },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Short machine-readable label, used for metrics and events.
    pub fn label(&self) -> &'static str {
        match self {
            Error::MissingKind => "missing_kind",
            Error::MissingField(_) => "missing_field",
            Error::NoAvailableWorker(_) => "no_available_worker",
            Error::Timeout { .. } => "timeout",
            Error::ChannelClosed { .. } => "channel_closed",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
            Error::Other(_) => "other",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
