//! Conversions between rules-engine positions and the strings used for
//! persistence and the engine wire protocol.

use std::fmt;
use std::str::FromStr;

use shakmaty::fen::Fen;
use shakmaty::{CastlingMode, Chess, EnPassantMode, Role, Square};

use crate::engine::protocol::ProtocolError;

/// Standard starting position.
pub const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

pub fn to_fen(pos: &Chess) -> String {
    Fen::from_position(pos.clone(), EnPassantMode::Legal).to_string()
}

pub fn from_fen(fen: &str) -> anyhow::Result<Chess> {
    let parsed: Fen = fen
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid FEN '{fen}': {e}"))?;
    parsed
        .into_position(CastlingMode::Standard)
        .map_err(|e| anyhow::anyhow!("illegal position '{fen}': {e}"))
}

/// FEN without the move counters: identical keys mean a repeated position.
pub fn repetition_key(pos: &Chess) -> String {
    let fen = to_fen(pos);
    fen.split_whitespace().take(4).collect::<Vec<_>>().join(" ")
}

pub fn parse_square(s: &str) -> Option<Square> {
    s.trim().parse().ok()
}

/// Origin/destination pair with an optional promotion piece, as used by the
/// engine protocol (`e2e4`, `e7e8q`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinateMove {
    pub from: Square,
    pub to: Square,
    pub promotion: Option<Role>,
}

impl FromStr for CoordinateMove {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ProtocolError::MalformedMove(s.to_string());
        if !s.is_ascii() || !(s.len() == 4 || s.len() == 5) {
            return Err(malformed());
        }
        let from = parse_square(&s[0..2]).ok_or_else(malformed)?;
        let to = parse_square(&s[2..4]).ok_or_else(malformed)?;
        let promotion = match s[4..].chars().next() {
            None => None,
            Some(ch) => match Role::from_char(ch) {
                Some(role @ (Role::Queen | Role::Rook | Role::Bishop | Role::Knight)) => Some(role),
                _ => return Err(malformed()),
            },
        };
        Ok(CoordinateMove {
            from,
            to,
            promotion,
        })
    }
}

impl fmt::Display for CoordinateMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.from, self.to)?;
        if let Some(role) = self.promotion {
            write!(f, "{}", role.char())?;
        }
        Ok(())
    }
}
