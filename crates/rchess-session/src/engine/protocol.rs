//! UCI line building and parsing.

use crate::error::SessionError;
use crate::notation::CoordinateMove;
use crate::session::SearchDepth;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("engine reported no legal move")]
    NoMove,
    #[error("bestmove line without a move: '{0}'")]
    MissingMove(String),
    #[error("malformed move '{0}'")]
    MalformedMove(String),
}

impl From<ProtocolError> for SessionError {
    fn from(e: ProtocolError) -> Self {
        SessionError::EngineProtocol(e.to_string())
    }
}

pub fn position_command(fen: &str) -> String {
    format!("position fen {fen}")
}

pub fn go_command(depth: SearchDepth) -> String {
    format!("go depth {depth}")
}

pub fn setoption_command(name: &str, value: &str) -> String {
    format!("setoption name {name} value {value}")
}

/// Classified engine output line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineLine<'a> {
    BestMove(Result<CoordinateMove, ProtocolError>),
    Info(&'a str),
    /// `id`, `option`, `uciok`, `readyok` and anything else the engine prints.
    Other(&'a str),
}

pub fn classify(line: &str) -> EngineLine<'_> {
    let trimmed = line.trim();
    let mut tokens = trimmed.split_whitespace();
    match tokens.next() {
        Some("bestmove") => EngineLine::BestMove(parse_bestmove_move(trimmed, tokens.next())),
        Some("info") => EngineLine::Info(trimmed),
        _ => EngineLine::Other(trimmed),
    }
}

fn parse_bestmove_move(line: &str, token: Option<&str>) -> Result<CoordinateMove, ProtocolError> {
    match token {
        None => Err(ProtocolError::MissingMove(line.to_string())),
        Some("(none)") | Some("0000") => Err(ProtocolError::NoMove),
        Some(mv) => mv.parse(),
    }
}

/// Extracts the option name from the tail of an `option name <..> type <..>` line.
pub fn parse_option_name(line: &str) -> Option<String> {
    let mut tokens = line.split_whitespace().peekable();
    while let Some(tok) = tokens.next() {
        if tok == "name" {
            let mut parts = Vec::new();
            while let Some(next) = tokens.next_if(|t| *t != "type") {
                parts.push(next);
            }
            if !parts.is_empty() {
                return Some(parts.join(" "));
            }
        }
    }
    None
}

/// Latest search progress reported by the engine for the active request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineInfo {
    pub depth: Option<u32>,
    pub nodes: Option<u64>,
    pub score_cp: Option<i32>,
    pub score_mate: Option<i32>,
    pub pv: Vec<String>,
}

impl EngineInfo {
    /// Fold an `info` line into the snapshot. Only the primary line
    /// (multipv 1) is kept.
    pub fn update_from_line(&mut self, line: &str) {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.first().copied() != Some("info") {
            return;
        }
        let multipv = tokens
            .iter()
            .position(|t| *t == "multipv")
            .and_then(|idx| tokens.get(idx + 1))
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(1);
        if multipv != 1 {
            return;
        }
        let mut i = 1;
        while i < tokens.len() {
            let next = tokens.get(i + 1).copied();
            match tokens[i] {
                "depth" => {
                    self.depth = next.and_then(|v| v.parse().ok());
                    i += 1;
                }
                "nodes" => {
                    self.nodes = next.and_then(|v| v.parse().ok());
                    i += 1;
                }
                "score" => {
                    let value = tokens.get(i + 2).and_then(|v| v.parse::<i32>().ok());
                    match next {
                        Some("cp") => {
                            self.score_cp = value;
                            self.score_mate = None;
                        }
                        Some("mate") => {
                            self.score_mate = value;
                            self.score_cp = None;
                        }
                        _ => {}
                    }
                    i += 2;
                }
                "pv" => {
                    let pv: Vec<String> = tokens[i + 1..].iter().map(|t| t.to_string()).collect();
                    if !pv.is_empty() {
                        self.pv = pv;
                    }
                    break;
                }
                _ => {}
            }
            i += 1;
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == EngineInfo::default()
    }
}
