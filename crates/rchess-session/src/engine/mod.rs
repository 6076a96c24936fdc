//! Engine Client: talks UCI to a move-search engine.

pub mod client;
pub mod process;
pub mod protocol;

pub use client::{EngineClient, EngineReply, RequestTag, SearchRequest, spawn_line_reader};
pub use process::EngineConfig;
pub use protocol::{EngineInfo, ProtocolError};

use crate::error::SessionError;

/// Creates a fresh engine connection for a session generation.
///
/// The controller calls this on start-up and on every new game; a connection
/// is never reused across generations.
pub trait EngineLauncher {
    fn launch(&mut self, generation: u64) -> Result<EngineClient, SessionError>;
}
