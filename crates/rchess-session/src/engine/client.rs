use std::collections::{HashSet, VecDeque};
use std::io::{BufRead, Write};
use std::process::Child;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow, bail};
use log::{debug, info, warn};

use super::protocol::{self, EngineInfo, EngineLine, ProtocolError};
use crate::error::SessionError;
use crate::notation::CoordinateMove;
use crate::session::SearchDepth;

pub const ENGINE_READY_TIMEOUT: Duration = Duration::from_secs(30);
pub const ENGINE_QUIT_TIMEOUT: Duration = Duration::from_millis(300);
pub const ENGINE_QUIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Identifies one engine request. `generation` changes whenever the session
/// is replaced, `sequence` on every request within a generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestTag {
    pub generation: u64,
    pub sequence: u64,
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub tag: RequestTag,
    pub fen: String,
    pub depth: SearchDepth,
}

/// Parsed answer to one request, carrying the tag of the request it answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineReply {
    pub tag: RequestTag,
    pub result: Result<CoordinateMove, ProtocolError>,
}

/// Spawns a thread that forwards every line of `reader` into a channel.
/// The channel disconnects when the stream ends.
pub fn spawn_line_reader<R: BufRead + Send + 'static>(reader: R) -> Receiver<String> {
    let (tx, rx) = mpsc::channel::<String>();
    std::thread::spawn(move || {
        for line in reader.lines() {
            match line {
                Ok(l) => {
                    if tx.send(l).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });
    rx
}

/// Connection to one UCI engine for the lifetime of one session generation.
///
/// Requests are written immediately and never block; answers are collected
/// later with [`EngineClient::drain`] or [`EngineClient::recv_timeout`].
/// UCI answers carry no id, so every `go` is queued and each `bestmove`
/// line is attributed to the oldest unanswered request. A cancelled request
/// stays queued until its (stopped) search answers, so the answer is still
/// attributed to it and can be discarded.
pub struct EngineClient {
    label: String,
    generation: u64,
    writer: Box<dyn Write + Send>,
    lines: Receiver<String>,
    outstanding: VecDeque<RequestTag>,
    cancelled: HashSet<RequestTag>,
    info: EngineInfo,
    connected: bool,
    child: Option<Child>,
}

impl EngineClient {
    pub fn from_channels(
        label: impl Into<String>,
        generation: u64,
        writer: Box<dyn Write + Send>,
        lines: Receiver<String>,
    ) -> Self {
        Self {
            label: label.into(),
            generation,
            writer,
            lines,
            outstanding: VecDeque::new(),
            cancelled: HashSet::new(),
            info: EngineInfo::default(),
            connected: true,
            child: None,
        }
    }

    pub(crate) fn attach_child(&mut self, child: Child) {
        self.child = Some(child);
    }

    /// UCI handshake. Options are only sent when the engine advertises them
    /// (or advertises nothing at all).
    pub fn initialize(&mut self, options: &[(String, String)], ready_timeout: Duration) -> Result<()> {
        self.write_line("uci")?;
        let mut advertised = HashSet::new();
        loop {
            let line = self.recv_line(ready_timeout)?;
            if let Some(rest) = line.strip_prefix("option ") {
                if let Some(name) = protocol::parse_option_name(rest) {
                    advertised.insert(name);
                }
            } else if line.trim() == "uciok" {
                break;
            }
        }
        for (name, value) in options {
            if advertised.is_empty() || advertised.contains(name) {
                self.write_line(&protocol::setoption_command(name, value))?;
            } else {
                warn!("{}: engine does not support option '{name}', skipped", self.label);
            }
        }
        self.write_line("ucinewgame")?;
        self.sync_ready(ready_timeout)?;
        info!("{}: engine ready (generation {})", self.label, self.generation);
        Ok(())
    }

    pub fn sync_ready(&mut self, timeout: Duration) -> Result<()> {
        self.write_line("isready")?;
        loop {
            let line = self.recv_line(timeout)?;
            if line.trim() == "readyok" {
                return Ok(());
            }
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// True while any request, cancelled or not, still awaits its `bestmove`.
    pub fn is_busy(&self) -> bool {
        !self.outstanding.is_empty()
    }

    /// Progress of the current (non-cancelled) search.
    pub fn info(&self) -> &EngineInfo {
        &self.info
    }

    pub fn request(&mut self, req: &SearchRequest) -> Result<(), SessionError> {
        if req.tag.generation != self.generation {
            return Err(SessionError::EngineProtocol(format!(
                "request for generation {} sent to engine of generation {}",
                req.tag.generation, self.generation
            )));
        }
        if !self.connected {
            return Err(SessionError::EngineProtocol(format!("{}: engine connection closed", self.label)));
        }
        let sent = self
            .write_line(&protocol::position_command(&req.fen))
            .and_then(|_| self.write_line(&protocol::go_command(req.depth)));
        if let Err(e) = sent {
            self.connected = false;
            return Err(SessionError::EngineProtocol(format!("{}: failed to send request: {e}", self.label)));
        }
        debug!(
            "{}: request generation={} sequence={} depth={}",
            self.label, req.tag.generation, req.tag.sequence, req.depth
        );
        self.info = EngineInfo::default();
        self.outstanding.push_back(req.tag);
        Ok(())
    }

    /// Stop every search still running. Their answers will still arrive and
    /// carry the cancelled tags.
    pub fn cancel(&mut self) {
        let live: Vec<RequestTag> =
            self.outstanding.iter().filter(|t| !self.cancelled.contains(*t)).copied().collect();
        if live.is_empty() {
            return;
        }
        self.cancelled.extend(live);
        if let Err(e) = self.write_line("stop") {
            warn!("{}: failed to send stop: {e}", self.label);
        }
    }

    /// Collect every answer already received, without blocking.
    pub fn drain(&mut self) -> Vec<EngineReply> {
        let mut replies = Vec::new();
        loop {
            match self.lines.try_recv() {
                Ok(line) => replies.extend(self.handle_line(&line)),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.mark_disconnected();
                    break;
                }
            }
        }
        replies
    }

    /// Wait up to `timeout` for the next answer.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<EngineReply> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.lines.recv_timeout(remaining) {
                Ok(line) => {
                    if let Some(reply) = self.handle_line(&line) {
                        return Some(reply);
                    }
                }
                Err(RecvTimeoutError::Timeout) => return None,
                Err(RecvTimeoutError::Disconnected) => {
                    self.mark_disconnected();
                    return None;
                }
            }
        }
    }

    fn handle_line(&mut self, line: &str) -> Option<EngineReply> {
        match protocol::classify(line) {
            EngineLine::BestMove(result) => {
                let Some(tag) = self.outstanding.pop_front() else {
                    warn!("{}: unsolicited '{line}' ignored", self.label);
                    return None;
                };
                self.cancelled.remove(&tag);
                Some(EngineReply { tag, result })
            }
            EngineLine::Info(info) => {
                let live = self.outstanding.front().is_some_and(|t| !self.cancelled.contains(t));
                if live {
                    self.info.update_from_line(info);
                }
                None
            }
            EngineLine::Other(other) => {
                if !other.is_empty() {
                    debug!("{}: {other}", self.label);
                }
                None
            }
        }
    }

    fn mark_disconnected(&mut self) {
        if self.connected {
            warn!("{}: engine output closed", self.label);
        }
        self.connected = false;
    }

    fn recv_line(&mut self, timeout: Duration) -> Result<String> {
        match self.lines.recv_timeout(timeout) {
            Ok(line) => Ok(line),
            Err(RecvTimeoutError::Timeout) => bail!("{}: engine read timeout", self.label),
            Err(RecvTimeoutError::Disconnected) => {
                self.connected = false;
                Err(anyhow!("{}: engine exited unexpectedly", self.label))
            }
        }
    }

    fn write_line(&mut self, msg: &str) -> std::io::Result<()> {
        self.writer.write_all(msg.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }
}

impl Drop for EngineClient {
    fn drop(&mut self) {
        let _ = self.write_line("quit");
        let Some(child) = self.child.as_mut() else {
            return;
        };
        let deadline = Instant::now() + ENGINE_QUIT_TIMEOUT;
        while Instant::now() < deadline {
            if let Ok(Some(_)) = child.try_wait() {
                return;
            }
            std::thread::sleep(ENGINE_QUIT_POLL_INTERVAL);
        }
        warn!("{}: engine did not quit, killing it", self.label);
        let _ = child.kill();
        let _ = child.wait();
    }
}
