//! Session Controller: the turn state machine.
//!
//! All mutation of the game goes through `&mut self` methods, so moves, engine
//! replies, undo and new games never interleave. The only concurrent part is
//! the engine search itself; its answers are pulled in with
//! [`Controller::poll_engine`] or [`Controller::wait_for_engine`] and are
//! applied only when they answer the request the controller is waiting for.

use std::fmt;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use shakmaty::{Color, Role, Square};

use crate::config::SessionConfig;
use crate::engine::{EngineClient, EngineInfo, EngineLauncher, EngineReply, RequestTag, SearchRequest};
use crate::error::SessionError;
use crate::persistence::SessionStore;
use crate::rules;
use crate::session::{DepthRange, MoveRecord, OpponentMode, Outcome, SearchDepth, Session, color_name};
use crate::store::KeyValueStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    WaitingForInput,
    AwaitingEngine,
    GameOver,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ControllerState::WaitingForInput => "waiting for input",
            ControllerState::AwaitingEngine => "awaiting the engine",
            ControllerState::GameOver => "the game is over",
        };
        f.write_str(s)
    }
}

/// Snapshot of everything a UI needs to draw.
#[derive(Debug, Clone)]
pub struct Status {
    pub fen: String,
    pub turn: Color,
    pub state: ControllerState,
    pub outcome: Outcome,
    pub opponent: OpponentMode,
    pub engine_color: Color,
    pub search_depth: SearchDepth,
    pub last_move_white: Option<String>,
    pub last_move_black: Option<String>,
    pub engine_thinking: bool,
    pub engine_info: Option<EngineInfo>,
    pub error: Option<SessionError>,
}

impl Status {
    pub fn last_move(&self, color: Color) -> Option<&str> {
        match color {
            Color::White => self.last_move_white.as_deref(),
            Color::Black => self.last_move_black.as_deref(),
        }
    }
}

#[derive(Debug)]
struct PendingSearch {
    tag: RequestTag,
    fen: String,
    started: Instant,
}

pub struct Controller<S: KeyValueStore> {
    session: Session,
    state: ControllerState,
    store: SessionStore<S>,
    launcher: Box<dyn EngineLauncher>,
    engine: Option<EngineClient>,
    generation: u64,
    next_sequence: u64,
    pending: Option<PendingSearch>,
    depth_range: DepthRange,
    engine_timeout: Option<Duration>,
    last_error: Option<SessionError>,
}

impl<S: KeyValueStore> Controller<S> {
    /// Restore the stored game, or start a fresh one when nothing usable is
    /// stored. Load and engine start-up failures are reported through
    /// [`Controller::last_error`], never returned.
    pub fn open(config: &SessionConfig, backend: S, launcher: Box<dyn EngineLauncher>) -> Self {
        let depth_range = config.depth_range();
        let fresh = Session::new(config.opponent, config.engine_color(), config.initial_depth());
        let store = SessionStore::new(backend, config.storage_key.clone());
        let mut last_error = None;
        let session = match store.load(&fresh, depth_range) {
            Ok(Some(session)) => {
                info!("restored game with {} plies", session.history().len());
                session
            }
            Ok(None) => fresh,
            Err(e) => {
                warn!("discarding stored game: {e}");
                last_error = Some(e);
                fresh
            }
        };
        let mut controller = Self {
            session,
            state: ControllerState::WaitingForInput,
            store,
            launcher,
            engine: None,
            generation: 0,
            next_sequence: 0,
            pending: None,
            depth_range,
            engine_timeout: config.engine_timeout(),
            last_error,
        };
        controller.start_generation();
        controller
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn depth_range(&self) -> DepthRange {
        self.depth_range
    }

    pub fn is_engine_thinking(&self) -> bool {
        self.pending.is_some()
    }

    pub fn set_engine_timeout(&mut self, timeout: Option<Duration>) {
        self.engine_timeout = timeout;
    }

    /// Most recent error, kept until the next one or until taken.
    pub fn last_error(&self) -> Option<&SessionError> {
        self.last_error.as_ref()
    }

    pub fn take_error(&mut self) -> Option<SessionError> {
        self.last_error.take()
    }

    pub fn status(&self) -> Status {
        let info = self
            .engine
            .as_ref()
            .filter(|_| self.pending.is_some())
            .map(|e| e.info().clone())
            .filter(|i| !i.is_empty());
        Status {
            fen: self.session.fen(),
            turn: self.session.turn(),
            state: self.state,
            outcome: self.session.outcome(),
            opponent: self.session.opponent(),
            engine_color: self.session.engine_color(),
            search_depth: self.session.search_depth(),
            last_move_white: self.session.last_move(Color::White).map(|m| m.san.clone()),
            last_move_black: self.session.last_move(Color::Black).map(|m| m.san.clone()),
            engine_thinking: self.pending.is_some(),
            engine_info: info,
            error: self.last_error.clone(),
        }
    }

    pub fn last_engine_move(&self) -> Option<&MoveRecord> {
        match self.session.opponent() {
            OpponentMode::Engine => self.session.last_move(self.session.engine_color()),
            OpponentMode::Human => None,
        }
    }

    /// Empty unless the human may move right now.
    pub fn legal_destinations(&self, square: Square) -> Vec<Square> {
        if self.state != ControllerState::WaitingForInput || self.session.is_engine_turn() {
            return Vec::new();
        }
        rules::legal_destinations(self.session.position(), square)
    }

    // ---------------------------------------------------------------------
    // human input
    // ---------------------------------------------------------------------

    pub fn attempt_move(
        &mut self,
        from: Square,
        to: Square,
        promotion: Option<Role>,
    ) -> Result<MoveRecord, SessionError> {
        match self.state {
            ControllerState::WaitingForInput => {}
            ControllerState::GameOver => return Err(self.report(SessionError::GameOver)),
            state => {
                return Err(self.report(SessionError::WrongState {
                    action: "accept a move",
                    state,
                }));
            }
        }
        let turn = self.session.turn();
        if self.session.is_engine_turn() {
            return Err(self.report(SessionError::InvalidMove(format!(
                "it is the engine's turn ({})",
                color_name(turn)
            ))));
        }
        match rules::piece_at(self.session.position(), from) {
            Some(piece) if piece.color == turn => {}
            _ => {
                return Err(self.report(SessionError::InvalidMove(format!(
                    "no {} piece on {from}",
                    color_name(turn)
                ))));
            }
        }
        let played = self.session.play(from, to, promotion).map(|r| r.clone());
        let record = match played {
            Ok(record) => record,
            Err(e) => return Err(self.report(SessionError::InvalidMove(e.to_string()))),
        };
        debug!("human played {} ({}{})", record.san, record.from, record.to);
        self.after_move();
        Ok(record)
    }

    // ---------------------------------------------------------------------
    // engine turn
    // ---------------------------------------------------------------------

    /// Ask the engine for a move. Returns `Ok(false)` without sending anything
    /// when a request is already in flight.
    pub fn request_engine_move(&mut self) -> Result<bool, SessionError> {
        if self.state != ControllerState::AwaitingEngine {
            let state = self.state;
            return Err(self.report(SessionError::WrongState {
                action: "request an engine move",
                state,
            }));
        }
        if self.pending.is_some() {
            debug!("engine request already in flight");
            return Ok(false);
        }
        let Some(engine) = self.engine.as_mut() else {
            return Err(self.report(SessionError::EngineUnavailable));
        };
        self.next_sequence += 1;
        let tag = RequestTag {
            generation: self.generation,
            sequence: self.next_sequence,
        };
        let request = SearchRequest {
            tag,
            fen: self.session.fen(),
            depth: self.session.search_depth(),
        };
        if let Err(e) = engine.request(&request) {
            self.state = ControllerState::WaitingForInput;
            return Err(self.report(e));
        }
        info!(
            "engine request {}:{} depth {}",
            tag.generation, tag.sequence, request.depth
        );
        self.pending = Some(PendingSearch {
            tag,
            fen: request.fen,
            started: Instant::now(),
        });
        Ok(true)
    }

    /// Re-arm the engine turn after a protocol error or timeout left the
    /// engine to move while waiting for input.
    pub fn resume_engine(&mut self) -> Result<bool, SessionError> {
        if self.state == ControllerState::WaitingForInput && self.session.is_engine_turn() {
            self.state = ControllerState::AwaitingEngine;
        }
        self.request_engine_move()
    }

    /// Apply an engine answer. Answers that do not belong to the request
    /// currently awaited (older generation, cancelled, or for another
    /// position) are discarded and yield `Ok(None)`.
    pub fn on_engine_move_ready(&mut self, reply: EngineReply) -> Result<Option<MoveRecord>, SessionError> {
        let current_fen = self.session.fen();
        let is_current = self.state == ControllerState::AwaitingEngine
            && self
                .pending
                .as_ref()
                .is_some_and(|p| p.tag == reply.tag && p.fen == current_fen);
        if !is_current {
            debug!(
                "discarding stale engine reply {}:{}",
                reply.tag.generation, reply.tag.sequence
            );
            return Ok(None);
        }
        self.pending = None;

        let mv = match reply.result {
            Ok(mv) => mv,
            Err(e) => {
                self.state = ControllerState::WaitingForInput;
                return Err(self.report(e.into()));
            }
        };
        let played = self.session.play(mv.from, mv.to, mv.promotion).map(|r| r.clone());
        let record = match played {
            Ok(record) => record,
            Err(e) => {
                self.state = ControllerState::WaitingForInput;
                return Err(self.report(SessionError::EngineProtocol(format!(
                    "engine proposed {mv}: {e}"
                ))));
            }
        };
        debug!("engine played {} ({mv})", record.san);
        self.after_move();
        Ok(Some(record))
    }

    /// Apply whatever the engine has answered so far, without blocking, and
    /// enforce the optional timeout.
    pub fn poll_engine(&mut self) -> Result<Option<MoveRecord>, SessionError> {
        let replies = match self.engine.as_mut() {
            Some(engine) => engine.drain(),
            None => Vec::new(),
        };
        for reply in replies {
            if let Some(record) = self.on_engine_move_ready(reply)? {
                return Ok(Some(record));
            }
        }
        self.check_pending()?;
        Ok(None)
    }

    /// Block until the awaited answer arrives, the timeout expires, or
    /// `max_wait` elapses.
    pub fn wait_for_engine(&mut self, max_wait: Duration) -> Result<Option<MoveRecord>, SessionError> {
        let give_up = Instant::now() + max_wait;
        while self.pending.is_some() {
            let now = Instant::now();
            let mut until = give_up;
            if let (Some(timeout), Some(p)) = (self.engine_timeout, self.pending.as_ref()) {
                until = until.min(p.started + timeout);
            }
            let reply = match self.engine.as_mut() {
                Some(engine) => engine.recv_timeout(until.saturating_duration_since(now)),
                None => None,
            };
            if let Some(reply) = reply {
                if let Some(record) = self.on_engine_move_ready(reply)? {
                    return Ok(Some(record));
                }
            }
            self.check_pending()?;
            if Instant::now() >= give_up {
                break;
            }
        }
        Ok(None)
    }

    fn check_pending(&mut self) -> Result<(), SessionError> {
        let Some(started) = self.pending.as_ref().map(|p| p.started) else {
            return Ok(());
        };
        let disconnected = self.engine.as_ref().map_or(true, |e| !e.is_connected());
        if disconnected {
            self.pending = None;
            self.state = ControllerState::WaitingForInput;
            self.engine = None;
            return Err(self.report(SessionError::EngineProtocol(
                "engine connection closed while searching".to_string(),
            )));
        }
        match self.engine_timeout {
            Some(timeout) if started.elapsed() >= timeout => {
                warn!("engine did not answer within {timeout:?}");
                self.cancel_pending();
                self.state = ControllerState::WaitingForInput;
                Err(self.report(SessionError::EngineTimeout(timeout)))
            }
            _ => Ok(()),
        }
    }

    // ---------------------------------------------------------------------
    // undo / new game / settings
    // ---------------------------------------------------------------------

    /// Plies `undo` would retract right now: against the engine, one when the
    /// engine has not replied yet and two (reply plus the human move before
    /// it) otherwise; between humans, always one.
    pub fn undo_span(&self) -> usize {
        let wanted = match self.session.opponent() {
            OpponentMode::Human => 1,
            OpponentMode::Engine if self.session.turn() == self.session.engine_color() => 1,
            OpponentMode::Engine => 2,
        };
        wanted.min(self.session.history().len())
    }

    pub fn undo(&mut self) -> Result<usize, SessionError> {
        if self.session.history().is_empty() {
            return Err(self.report(SessionError::NothingToUndo));
        }
        self.last_error = None;
        let span = self.undo_span();
        self.cancel_pending();
        let removed = self.session.retract(span);
        info!("undo: retracted {removed} plies");
        self.persist();
        self.state = self.derive_state();
        Ok(removed)
    }

    pub fn new_game(&mut self, opponent: OpponentMode, search_depth: u32) {
        self.new_game_as(opponent, self.session.engine_color(), search_depth);
    }

    pub fn new_game_as(&mut self, opponent: OpponentMode, engine_color: Color, search_depth: u32) {
        self.last_error = None;
        self.cancel_pending();
        self.engine = None;
        let depth = self.depth_range.clamp(search_depth);
        self.session = Session::new(opponent, engine_color, depth);
        if let Err(e) = self.store.clear() {
            warn!("failed to clear stored game: {e}");
            self.last_error = Some(e);
        }
        info!("new game: opponent {opponent:?}, depth {depth}");
        self.start_generation();
    }

    /// Clamp and store the depth. An engine search already running keeps the
    /// depth it was started with.
    pub fn set_search_depth(&mut self, depth: u32) -> SearchDepth {
        let depth = self.depth_range.clamp(depth);
        self.session.set_search_depth(depth);
        self.persist();
        depth
    }

    // ---------------------------------------------------------------------
    // internals
    // ---------------------------------------------------------------------

    fn start_generation(&mut self) {
        self.engine = None;
        self.pending = None;
        self.generation += 1;
        self.next_sequence = 0;
        if self.session.opponent() == OpponentMode::Engine {
            match self.launcher.launch(self.generation) {
                Ok(engine) => self.engine = Some(engine),
                Err(e) => {
                    warn!("engine unavailable: {e}");
                    self.last_error = Some(e);
                }
            }
        }
        self.state = self.derive_state();
    }

    fn derive_state(&self) -> ControllerState {
        if self.session.outcome().is_over() {
            ControllerState::GameOver
        } else if self.session.is_engine_turn() {
            ControllerState::AwaitingEngine
        } else {
            ControllerState::WaitingForInput
        }
    }

    fn after_move(&mut self) {
        self.last_error = None;
        self.persist();
        self.state = self.derive_state();
        if self.state == ControllerState::GameOver {
            info!("game over: {}", self.session.outcome());
        }
    }

    fn cancel_pending(&mut self) {
        if self.pending.take().is_none() {
            return;
        }
        if let Some(engine) = self.engine.as_mut() {
            engine.cancel();
        }
    }

    fn persist(&mut self) {
        if let Err(e) = self.store.save(&self.session) {
            warn!("failed to save game: {e}");
            self.last_error = Some(e);
        }
    }

    fn report(&mut self, e: SessionError) -> SessionError {
        debug!("{e}");
        self.last_error = Some(e.clone());
        e
    }
}
