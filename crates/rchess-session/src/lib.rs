//! Chess session controller.
//!
//! Sequences moves between a human and either a second human or a UCI engine
//! process, persists the game after every change, and supports undo.
//!
//! Chess rules come from `shakmaty`; this crate only orchestrates turns.

pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod notation;
pub mod persistence;
pub mod rules;
pub mod session;
pub mod store;

pub use config::SessionConfig;
pub use controller::{Controller, ControllerState, Status};
pub use engine::{EngineClient, EngineConfig, EngineInfo, EngineLauncher, EngineReply, RequestTag};
pub use error::{ErrorKind, SessionError};
pub use notation::CoordinateMove;
pub use persistence::SessionStore;
pub use session::{DepthRange, DrawReason, MoveRecord, OpponentMode, Outcome, SearchDepth, Session};
pub use store::{FileStore, KeyValueStore, MemoryStore};
