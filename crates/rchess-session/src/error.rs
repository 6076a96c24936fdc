//! Error types surfaced by the session controller.
//!
//! Every failure reaches the caller as a [`SessionError`] value. None of them
//! is fatal: the controller always stays usable after reporting one.

use std::time::Duration;

use crate::controller::ControllerState;

/// Error categories exposed to the UI error channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A human tried an illegal move. Nothing changed.
    InvalidMove,
    /// The engine answered with something unusable (malformed, `(none)`, illegal).
    EngineProtocol,
    /// The engine process could not be started or failed its handshake.
    EngineStartup,
    /// The engine did not answer within the configured timeout.
    EngineTimeout,
    /// Reading or writing the durable store failed.
    Persistence,
    /// Stored history could not be replayed.
    CorruptedHistory,
    /// The call is not valid in the controller's current state.
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("invalid move: {0}")]
    InvalidMove(String),

    #[error("engine protocol error: {0}")]
    EngineProtocol(String),

    #[error("engine failed to start: {0}")]
    EngineStartup(String),

    #[error("engine did not answer within {0:?}")]
    EngineTimeout(Duration),

    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("stored history is corrupted at ply {ply}: {reason}")]
    CorruptedHistory { ply: usize, reason: String },

    #[error("the game is over")]
    GameOver,

    #[error("cannot {action} while {state}")]
    WrongState {
        action: &'static str,
        state: ControllerState,
    },

    #[error("nothing to undo")]
    NothingToUndo,

    #[error("no engine is available for this game")]
    EngineUnavailable,
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::InvalidMove(_) => ErrorKind::InvalidMove,
            SessionError::EngineProtocol(_) => ErrorKind::EngineProtocol,
            SessionError::EngineStartup(_) => ErrorKind::EngineStartup,
            SessionError::EngineTimeout(_) => ErrorKind::EngineTimeout,
            SessionError::Persistence(_) => ErrorKind::Persistence,
            SessionError::CorruptedHistory { .. } => ErrorKind::CorruptedHistory,
            SessionError::GameOver
            | SessionError::WrongState { .. }
            | SessionError::NothingToUndo
            | SessionError::EngineUnavailable => ErrorKind::Rejected,
        }
    }
}

impl From<std::io::Error> for SessionError {
    fn from(e: std::io::Error) -> Self {
        SessionError::Persistence(e.to_string())
    }
}
