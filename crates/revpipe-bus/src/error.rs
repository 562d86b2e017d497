use thiserror::Error;

use crate::messages::MessageKind;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("failed to encode {kind} message: {source}")]
    Encode {
        kind: MessageKind,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to decode {kind} message: {source}")]
    Decode {
        kind: MessageKind,
        #[source]
        source: serde_json::Error,
    },

    #[error("envelope carries {actual} but {expected} was requested")]
    KindMismatch {
        expected: MessageKind,
        actual: MessageKind,
    },

    #[error("unknown message type: {0}")]
    UnknownKind(String),

    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("consumer for {kind} failed: {source}")]
    Consumer {
        kind: MessageKind,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl BusError {
    pub fn transport<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        BusError::Transport(Box::new(err))
    }
}
