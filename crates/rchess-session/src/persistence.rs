//! Persistence Adapter: saves a session as its move list and rebuilds it by
//! replaying that list through the rules engine.

use chrono::Utc;
use log::debug;
use serde::{Deserialize, Serialize};
use shakmaty::Color;

use crate::error::SessionError;
use crate::session::{DepthRange, OpponentMode, Session};
use crate::store::KeyValueStore;

pub const DEFAULT_STORAGE_KEY: &str = "rchess.session";
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct SavedSession {
    #[serde(default = "format_version")]
    version: u32,
    /// Moves in algebraic notation, oldest first.
    history: Vec<String>,
    #[serde(default)]
    search_depth: Option<u32>,
    /// Absent settings fall back to the configured ones.
    #[serde(default)]
    opponent: Option<OpponentMode>,
    #[serde(default)]
    engine_plays_white: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    saved_at: Option<String>,
}

fn format_version() -> u32 {
    FORMAT_VERSION
}

/// A full record, or a bare list of moves.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredForm {
    Full(SavedSession),
    Moves(Vec<String>),
}

pub struct SessionStore<S> {
    backend: S,
    key: String,
}

impl<S: KeyValueStore> SessionStore<S> {
    pub fn new(backend: S, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
        }
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    pub fn save(&mut self, session: &Session) -> Result<(), SessionError> {
        let record = SavedSession {
            version: FORMAT_VERSION,
            history: session.history().iter().map(|m| m.san.clone()).collect(),
            search_depth: Some(u32::from(session.search_depth().get())),
            opponent: Some(session.opponent()),
            engine_plays_white: Some(session.engine_color() == Color::White),
            saved_at: Some(Utc::now().to_rfc3339()),
        };
        let json = serde_json::to_string(&record)
            .map_err(|e| SessionError::Persistence(format!("cannot encode session: {e}")))?;
        self.backend.set(&self.key, &json)?;
        debug!("saved {} plies under '{}'", record.history.len(), self.key);
        Ok(())
    }

    /// `Ok(None)` when nothing is stored. A record that cannot be decoded or
    /// replayed is rejected as a whole.
    pub fn load(&self, defaults: &Session, range: DepthRange) -> Result<Option<Session>, SessionError> {
        let Some(raw) = self.backend.get(&self.key)? else {
            return Ok(None);
        };
        let record = match serde_json::from_str::<StoredForm>(&raw) {
            Ok(StoredForm::Full(record)) => record,
            Ok(StoredForm::Moves(history)) => SavedSession {
                version: FORMAT_VERSION,
                history,
                search_depth: None,
                opponent: None,
                engine_plays_white: None,
                saved_at: None,
            },
            Err(e) => {
                return Err(SessionError::CorruptedHistory {
                    ply: 0,
                    reason: format!("undecodable record: {e}"),
                });
            }
        };
        if record.version > FORMAT_VERSION {
            return Err(SessionError::CorruptedHistory {
                ply: 0,
                reason: format!("unsupported format version {}", record.version),
            });
        }
        let depth = record
            .search_depth
            .map(|d| range.clamp(d))
            .unwrap_or_else(|| defaults.search_depth());
        let opponent = record.opponent.unwrap_or_else(|| defaults.opponent());
        let engine_color = record
            .engine_plays_white
            .map(Color::from_white)
            .unwrap_or_else(|| defaults.engine_color());
        let session = Session::replay(
            opponent,
            engine_color,
            depth,
            record.history.iter().map(String::as_str),
        )
        .map_err(|(ply, e)| SessionError::CorruptedHistory {
            ply: ply + 1,
            reason: e.to_string(),
        })?;
        debug!("loaded {} plies from '{}'", session.history().len(), self.key);
        Ok(Some(session))
    }

    pub fn clear(&mut self) -> Result<(), SessionError> {
        self.backend.remove(&self.key)?;
        Ok(())
    }
}
