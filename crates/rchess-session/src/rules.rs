//! Rules-engine facade.
//!
//! Legality, move application and notation all come from `shakmaty`. This
//! module only adapts its API to origin/destination squares, which is what
//! both a board UI and the engine protocol speak.

use shakmaty::san::SanPlus;
use shakmaty::{Chess, File, Move, Piece, Position, Role, Square};

use crate::session::{MoveRecord, Outcome};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IllegalMove {
    #[error("no legal move from {from} to {to}")]
    NoSuchMove { from: Square, to: Square },
    #[error("cannot read move '{0}'")]
    Unreadable(String),
    #[error("'{0}' is not legal here")]
    NotLegal(String),
    #[error("the game is over ({0})")]
    GameOver(Outcome),
}

/// Square the king lands on. `shakmaty` encodes castling as king-takes-rook,
/// while UIs and UCI use the king's two-square step.
fn destination(m: &Move) -> Square {
    match *m {
        Move::Castle { king, rook } => {
            let file = if rook.file() > king.file() { File::G } else { File::C };
            Square::from_coords(file, king.rank())
        }
        _ => m.to(),
    }
}

/// Resolve a square pair to a legal move. A missing promotion piece defaults
/// to a queen; a promotion hint on a non-promoting move is ignored.
pub fn find_move(pos: &Chess, from: Square, to: Square, promotion: Option<Role>) -> Option<Move> {
    let candidates: Vec<Move> = pos
        .legal_moves()
        .into_iter()
        .filter(|m| m.from() == Some(from) && destination(m) == to)
        .collect();
    let wanted = promotion.unwrap_or(Role::Queen);
    candidates
        .iter()
        .find(|m| m.promotion().is_none())
        .or_else(|| candidates.iter().find(|m| m.promotion() == Some(wanted)))
        .cloned()
}

fn play(pos: &Chess, m: &Move) -> (Chess, MoveRecord) {
    let color = pos.turn();
    let from = m.from().unwrap_or_else(|| m.to());
    let mut next = pos.clone();
    let san = SanPlus::from_move_and_play_unchecked(&mut next, m);
    let record = MoveRecord {
        from,
        to: destination(m),
        promotion: m.promotion(),
        color,
        san: san.to_string(),
    };
    (next, record)
}

/// Apply a move given as squares. The input position is left untouched.
pub fn apply_move(
    pos: &Chess,
    from: Square,
    to: Square,
    promotion: Option<Role>,
) -> Result<(Chess, MoveRecord), IllegalMove> {
    let m = find_move(pos, from, to, promotion).ok_or(IllegalMove::NoSuchMove { from, to })?;
    Ok(play(pos, &m))
}

/// Apply a move given in algebraic notation (`Nf3`, `exd5`, `O-O`, `e8=Q+`).
pub fn apply_san(pos: &Chess, token: &str) -> Result<(Chess, MoveRecord), IllegalMove> {
    let san: SanPlus = token
        .trim()
        .parse()
        .map_err(|_| IllegalMove::Unreadable(token.to_string()))?;
    let m = san
        .san
        .to_move(pos)
        .map_err(|_| IllegalMove::NotLegal(token.to_string()))?;
    Ok(play(pos, &m))
}

pub fn legal_destinations(pos: &Chess, square: Square) -> Vec<Square> {
    let mut squares: Vec<Square> = pos
        .legal_moves()
        .into_iter()
        .filter(|m| m.from() == Some(square))
        .map(|m| destination(&m))
        .collect();
    squares.sort();
    squares.dedup();
    squares
}

pub fn is_checkmate(pos: &Chess) -> bool {
    pos.is_checkmate()
}

pub fn piece_at(pos: &Chess, square: Square) -> Option<Piece> {
    pos.board().piece_at(square)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notation::{from_fen, to_fen};
    use shakmaty::Color;

    #[test]
    fn applies_pawn_push_and_records_san() {
        let pos = Chess::default();
        let (next, record) = apply_move(&pos, Square::E2, Square::E4, None).unwrap();
        assert_eq!(record.san, "e4");
        assert_eq!(record.color, Color::White);
        assert_eq!(
            to_fen(&next),
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1"
        );
        // input position untouched
        assert_eq!(to_fen(&pos), crate::notation::START_FEN);
    }

    #[test]
    fn rejects_moves_that_do_not_exist() {
        let pos = Chess::default();
        assert_eq!(
            apply_move(&pos, Square::E2, Square::E5, None).unwrap_err(),
            IllegalMove::NoSuchMove { from: Square::E2, to: Square::E5 }
        );
        // empty square
        assert!(apply_move(&pos, Square::E4, Square::E5, None).is_err());
    }

    #[test]
    fn castling_uses_king_destination() {
        let pos = from_fen("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1").unwrap();
        let (_, record) = apply_move(&pos, Square::E1, Square::G1, None).unwrap();
        assert_eq!(record.san, "O-O");
        assert_eq!(record.to, Square::G1);
        let (_, record) = apply_move(&pos, Square::E1, Square::C1, None).unwrap();
        assert_eq!(record.san, "O-O-O");
        assert!(legal_destinations(&pos, Square::E1).contains(&Square::G1));
    }

    #[test]
    fn promotion_defaults_to_queen() {
        let pos = from_fen("8/4P3/8/8/8/8/k7/4K3 w - - 0 1").unwrap();
        let (_, record) = apply_move(&pos, Square::E7, Square::E8, None).unwrap();
        assert_eq!(record.promotion, Some(Role::Queen));
        let (_, record) = apply_move(&pos, Square::E7, Square::E8, Some(Role::Knight)).unwrap();
        assert_eq!(record.promotion, Some(Role::Knight));
        // promotion squares are listed once
        assert_eq!(legal_destinations(&pos, Square::E7), vec![Square::E8]);
    }

    #[test]
    fn san_replay_detects_checkmate() {
        let mut pos = Chess::default();
        for token in ["f3", "e5", "g4", "Qh4#"] {
            pos = apply_san(&pos, token).unwrap().0;
        }
        assert!(is_checkmate(&pos));
        assert!(apply_san(&Chess::default(), "Nf6").is_err());
        assert!(apply_san(&Chess::default(), "zz").is_err());
    }

    #[test]
    fn piece_lookup() {
        let pos = Chess::default();
        let piece = piece_at(&pos, Square::G1).unwrap();
        assert_eq!(piece.color, Color::White);
        assert_eq!(piece.role, Role::Knight);
        assert!(piece_at(&pos, Square::E4).is_none());
    }
}
