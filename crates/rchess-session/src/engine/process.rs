use std::collections::BTreeMap;
use std::io::BufReader;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use log::info;
use serde::Deserialize;

use super::EngineLauncher;
use super::client::{ENGINE_READY_TIMEOUT, EngineClient, spawn_line_reader};
use crate::error::SessionError;

/// How to start the engine executable.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub path: PathBuf,
    pub args: Vec<String>,
    /// Name used in log lines; defaults to the executable's file name.
    pub label: Option<String>,
    pub ready_timeout_ms: u64,
    /// UCI options sent with `setoption` during the handshake.
    pub options: BTreeMap<String, toml::Value>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("stockfish"),
            args: Vec::new(),
            label: None,
            ready_timeout_ms: ENGINE_READY_TIMEOUT.as_millis() as u64,
            options: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    pub fn label(&self) -> String {
        self.label.clone().unwrap_or_else(|| {
            self.path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "engine".to_string())
        })
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    /// Option values rendered the way `setoption` expects them.
    pub fn option_pairs(&self) -> Vec<(String, String)> {
        self.options
            .iter()
            .map(|(name, value)| {
                let value = match value {
                    toml::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (name.clone(), value)
            })
            .collect()
    }

    /// Start the engine process and complete the UCI handshake.
    pub fn spawn(&self, generation: u64) -> Result<EngineClient> {
        let mut cmd = Command::new(&self.path);
        cmd.args(&self.args).stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::null());
        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn engine at {}", self.path.display()))?;
        let stdin = child.stdin.take().ok_or_else(|| anyhow!("no stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| anyhow!("no stdout"))?;
        let lines = spawn_line_reader(BufReader::new(stdout));

        let mut client = EngineClient::from_channels(self.label(), generation, Box::new(stdin), lines);
        // attached before the handshake so a failed handshake still reaps the process
        client.attach_child(child);
        client.initialize(&self.option_pairs(), self.ready_timeout())?;
        info!("{}: spawned {}", client.label(), self.path.display());
        Ok(client)
    }
}

impl EngineLauncher for EngineConfig {
    fn launch(&mut self, generation: u64) -> Result<EngineClient, SessionError> {
        self.spawn(generation).map_err(|e| SessionError::EngineStartup(format!("{e:#}")))
    }
}
