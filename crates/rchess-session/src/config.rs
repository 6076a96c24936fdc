//! Session configuration, loadable from TOML.
//!
//! ```toml
//! opponent = "engine"
//! search_depth = 8
//! engine_timeout_ms = 30000
//!
//! [engine]
//! path = "/usr/local/bin/stockfish"
//! [engine.options]
//! Threads = 2
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use shakmaty::Color;

use crate::engine::EngineConfig;
use crate::persistence::DEFAULT_STORAGE_KEY;
use crate::session::{DepthRange, OpponentMode, SearchDepth};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub opponent: OpponentMode,
    pub engine_plays_white: bool,
    pub search_depth: u32,
    pub min_depth: u8,
    pub max_depth: u8,
    /// No timeout when absent.
    pub engine_timeout_ms: Option<u64>,
    pub storage_key: String,
    pub engine: EngineConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            opponent: OpponentMode::Engine,
            engine_plays_white: false,
            search_depth: u32::from(DepthRange::DEFAULT_MIN),
            min_depth: DepthRange::DEFAULT_MIN,
            max_depth: DepthRange::DEFAULT_MAX,
            engine_timeout_ms: None,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            engine: EngineConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn depth_range(&self) -> DepthRange {
        DepthRange::new(self.min_depth, self.max_depth)
    }

    pub fn initial_depth(&self) -> SearchDepth {
        self.depth_range().clamp(self.search_depth)
    }

    pub fn engine_color(&self) -> Color {
        Color::from_white(self.engine_plays_white)
    }

    pub fn engine_timeout(&self) -> Option<Duration> {
        self.engine_timeout_ms.map(Duration::from_millis)
    }
}
