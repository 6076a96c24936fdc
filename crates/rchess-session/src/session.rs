//! Authoritative in-memory record of one game.

use std::fmt;

use serde::{Deserialize, Serialize};
use shakmaty::{Chess, Color, Position, Role, Square};

use crate::notation::{repetition_key, to_fen};
use crate::rules::{self, IllegalMove};

/// One completed ply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveRecord {
    pub from: Square,
    pub to: Square,
    pub promotion: Option<Role>,
    pub color: Color,
    /// Algebraic notation, e.g. `Nf3`, `exd5`, `O-O`.
    pub san: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpponentMode {
    Human,
    #[default]
    Engine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawReason {
    Stalemate,
    InsufficientMaterial,
    FiftyMoveRule,
    ThreefoldRepetition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    InProgress,
    Checkmate { winner: Color },
    Draw(DrawReason),
}

impl Outcome {
    pub fn is_over(self) -> bool {
        !matches!(self, Outcome::InProgress)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::InProgress => write!(f, "in progress"),
            Outcome::Checkmate { winner } => write!(f, "checkmate, {} wins", color_name(*winner)),
            Outcome::Draw(reason) => {
                let reason = match reason {
                    DrawReason::Stalemate => "stalemate",
                    DrawReason::InsufficientMaterial => "insufficient material",
                    DrawReason::FiftyMoveRule => "fifty-move rule",
                    DrawReason::ThreefoldRepetition => "threefold repetition",
                };
                write!(f, "draw by {reason}")
            }
        }
    }
}

pub fn color_name(color: Color) -> &'static str {
    match color {
        Color::White => "white",
        Color::Black => "black",
    }
}

/// Engine search depth, always inside a [`DepthRange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SearchDepth(u8);

impl SearchDepth {
    pub fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for SearchDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthRange {
    min: u8,
    max: u8,
}

impl DepthRange {
    pub const DEFAULT_MIN: u8 = 5;
    pub const DEFAULT_MAX: u8 = 20;

    /// Bounds are reordered if given backwards; zero is lifted to one.
    pub fn new(min: u8, max: u8) -> Self {
        let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
        Self {
            min: lo.max(1),
            max: hi.max(1),
        }
    }

    pub fn clamp(&self, depth: u32) -> SearchDepth {
        let clamped = depth.clamp(u32::from(self.min), u32::from(self.max));
        SearchDepth(clamped as u8)
    }

    pub fn min(&self) -> u8 {
        self.min
    }

    pub fn max(&self) -> u8 {
        self.max
    }
}

impl Default for DepthRange {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MIN, Self::DEFAULT_MAX)
    }
}

/// Game state. `positions[i]` is the position after `i` plies, so the
/// current position and every undo target are always derived from history.
#[derive(Debug, Clone)]
pub struct Session {
    positions: Vec<Chess>,
    history: Vec<MoveRecord>,
    opponent: OpponentMode,
    engine_color: Color,
    search_depth: SearchDepth,
    outcome: Outcome,
}

impl Session {
    pub fn new(opponent: OpponentMode, engine_color: Color, search_depth: SearchDepth) -> Self {
        Self {
            positions: vec![Chess::default()],
            history: Vec::new(),
            opponent,
            engine_color,
            search_depth,
            outcome: Outcome::InProgress,
        }
    }

    /// Rebuild a session by replaying algebraic moves from the initial
    /// position. Fails on the first token that does not apply, returning its
    /// zero-based ply index; nothing of a partial replay is kept.
    pub fn replay<'a, I>(
        opponent: OpponentMode,
        engine_color: Color,
        search_depth: SearchDepth,
        moves: I,
    ) -> Result<Self, (usize, IllegalMove)>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut session = Session::new(opponent, engine_color, search_depth);
        for (ply, token) in moves.into_iter().enumerate() {
            if session.outcome.is_over() {
                return Err((ply, IllegalMove::NotLegal(token.to_string())));
            }
            let (next, record) = rules::apply_san(session.position(), token).map_err(|e| (ply, e))?;
            session.push(next, record);
        }
        Ok(session)
    }

    pub fn position(&self) -> &Chess {
        // positions always holds at least the initial position
        &self.positions[self.positions.len() - 1]
    }

    pub fn fen(&self) -> String {
        to_fen(self.position())
    }

    pub fn history(&self) -> &[MoveRecord] {
        &self.history
    }

    /// Side to move, from history parity: even length means White.
    pub fn turn(&self) -> Color {
        Color::from_white(self.history.len() % 2 == 0)
    }

    pub fn opponent(&self) -> OpponentMode {
        self.opponent
    }

    pub fn engine_color(&self) -> Color {
        self.engine_color
    }

    /// True when the engine opponent is the side to move.
    pub fn is_engine_turn(&self) -> bool {
        self.opponent == OpponentMode::Engine && self.turn() == self.engine_color
    }

    pub fn search_depth(&self) -> SearchDepth {
        self.search_depth
    }

    pub fn set_search_depth(&mut self, depth: SearchDepth) {
        self.search_depth = depth;
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn last_move(&self, color: Color) -> Option<&MoveRecord> {
        self.history.iter().rev().find(|m| m.color == color)
    }

    /// Apply a move for the side to move.
    pub fn play(
        &mut self,
        from: Square,
        to: Square,
        promotion: Option<Role>,
    ) -> Result<&MoveRecord, IllegalMove> {
        if self.outcome.is_over() {
            return Err(IllegalMove::GameOver(self.outcome));
        }
        let (next, record) = rules::apply_move(self.position(), from, to, promotion)?;
        self.push(next, record);
        Ok(&self.history[self.history.len() - 1])
    }

    fn push(&mut self, next: Chess, record: MoveRecord) {
        debug_assert_eq!(record.color, self.turn());
        self.history.push(record);
        self.positions.push(next);
        self.outcome = self.compute_outcome();
    }

    /// Remove up to `plies` moves from the end of history. Returns how many
    /// were actually removed.
    pub fn retract(&mut self, plies: usize) -> usize {
        let n = plies.min(self.history.len());
        self.history.truncate(self.history.len() - n);
        self.positions.truncate(self.history.len() + 1);
        self.outcome = self.compute_outcome();
        n
    }

    fn compute_outcome(&self) -> Outcome {
        let pos = self.position();
        if pos.is_checkmate() {
            return Outcome::Checkmate { winner: !pos.turn() };
        }
        if pos.is_stalemate() {
            return Outcome::Draw(DrawReason::Stalemate);
        }
        if pos.is_insufficient_material() {
            return Outcome::Draw(DrawReason::InsufficientMaterial);
        }
        if pos.halfmoves() >= 100 {
            return Outcome::Draw(DrawReason::FiftyMoveRule);
        }
        let key = repetition_key(pos);
        let seen = self.positions.iter().filter(|p| repetition_key(p) == key).count();
        if seen >= 3 {
            return Outcome::Draw(DrawReason::ThreefoldRepetition);
        }
        Outcome::InProgress
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notation::START_FEN;

    fn fresh() -> Session {
        Session::new(OpponentMode::Engine, Color::Black, DepthRange::default().clamp(5))
    }

    #[test]
    fn turn_follows_history_parity() {
        let mut s = fresh();
        assert_eq!(s.turn(), Color::White);
        s.play(Square::E2, Square::E4, None).unwrap();
        assert_eq!(s.turn(), Color::Black);
        assert!(s.is_engine_turn());
        s.play(Square::E7, Square::E5, None).unwrap();
        assert_eq!(s.turn(), Color::White);
        assert_eq!(s.last_move(Color::Black).unwrap().san, "e5");
        for pair in s.history().windows(2) {
            assert_ne!(pair[0].color, pair[1].color);
        }
    }

    #[test]
    fn history_replays_to_current_position() {
        let mut s = fresh();
        for (from, to) in [
            (Square::E2, Square::E4),
            (Square::C7, Square::C5),
            (Square::G1, Square::F3),
            (Square::D7, Square::D6),
        ] {
            s.play(from, to, None).unwrap();
        }
        let sans: Vec<&str> = s.history().iter().map(|m| m.san.as_str()).collect();
        let replayed = Session::replay(s.opponent(), s.engine_color(), s.search_depth(), sans).unwrap();
        assert_eq!(replayed.fen(), s.fen());
        assert_eq!(replayed.history(), s.history());
    }

    #[test]
    fn replay_reports_failing_ply() {
        let err = Session::replay(
            OpponentMode::Engine,
            Color::Black,
            DepthRange::default().clamp(5),
            ["e4", "e5", "Nf9"],
        )
        .unwrap_err();
        assert_eq!(err.0, 2);
    }

    #[test]
    fn retract_restores_earlier_position() {
        let mut s = fresh();
        s.play(Square::E2, Square::E4, None).unwrap();
        let after_one = s.fen();
        s.play(Square::E7, Square::E5, None).unwrap();
        assert_eq!(s.retract(1), 1);
        assert_eq!(s.fen(), after_one);
        assert_eq!(s.retract(5), 1);
        assert_eq!(s.fen(), START_FEN);
        assert_eq!(s.retract(1), 0);
    }

    #[test]
    fn checkmate_blocks_further_moves_until_retracted() {
        let mut s = fresh();
        for (from, to) in [
            (Square::F2, Square::F3),
            (Square::E7, Square::E5),
            (Square::G2, Square::G4),
            (Square::D8, Square::H4),
        ] {
            s.play(from, to, None).unwrap();
        }
        assert_eq!(s.outcome(), Outcome::Checkmate { winner: Color::Black });
        assert_eq!(
            s.play(Square::A2, Square::A3, None).unwrap_err(),
            IllegalMove::GameOver(Outcome::Checkmate { winner: Color::Black })
        );
        assert_eq!(
            s.play(Square::A2, Square::A3, None).unwrap_err().to_string(),
            "the game is over (checkmate, black wins)"
        );
        s.retract(1);
        assert_eq!(s.outcome(), Outcome::InProgress);
    }

    #[test]
    fn threefold_repetition_is_a_draw() {
        let mut s = fresh();
        let shuffle = [
            (Square::G1, Square::F3),
            (Square::G8, Square::F6),
            (Square::F3, Square::G1),
            (Square::F6, Square::G8),
        ];
        for _ in 0..2 {
            for (from, to) in shuffle {
                s.play(from, to, None).unwrap();
            }
        }
        assert_eq!(s.outcome(), Outcome::Draw(DrawReason::ThreefoldRepetition));
    }

    #[test]
    fn depth_range_clamps() {
        let range = DepthRange::new(20, 5);
        assert_eq!(range.min(), 5);
        assert_eq!(range.clamp(1).get(), 5);
        assert_eq!(range.clamp(12).get(), 12);
        assert_eq!(range.clamp(99).get(), 20);
        assert_eq!(DepthRange::new(0, 0).clamp(0).get(), 1);
    }
}
