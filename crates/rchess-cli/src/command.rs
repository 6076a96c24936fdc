//! Parsing of the commands typed at the prompt.

use anyhow::{Context, Result, bail};
use rchess_session::notation::parse_square;
use rchess_session::{CoordinateMove, OpponentMode};
use shakmaty::Square;

pub const HELP: &str = "\
commands:
  e2e4 | e2 e4 | move e7e8q   play a move (promotion defaults to queen)
  undo                        take back your last move and the engine's reply
  new [engine|human] [depth]  start a new game
  depth N                     set the engine search depth
  moves <square>              list legal destinations of a piece
  go                          ask the engine to move (after an engine error)
  status                      show the board position and game state
  history                     list the moves played
  help                        show this text
  quit                        leave (the game is saved)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Move(CoordinateMove),
    Undo,
    New {
        opponent: Option<OpponentMode>,
        depth: Option<u32>,
    },
    Depth(u32),
    Moves(Square),
    Go,
    Status,
    History,
    Help,
    Quit,
}

impl Command {
    /// `Ok(None)` for a blank line.
    pub fn parse(line: &str) -> Result<Option<Command>> {
        let line = line.trim().to_ascii_lowercase();
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some((&head, rest)) = tokens.split_first() else {
            return Ok(None);
        };
        let cmd = match head {
            "undo" | "u" => Command::Undo,
            "new" => parse_new(rest)?,
            "depth" => {
                let [value] = rest else {
                    bail!("usage: depth N");
                };
                Command::Depth(value.parse().with_context(|| format!("invalid depth '{value}'"))?)
            }
            "moves" => {
                let [square] = rest else {
                    bail!("usage: moves <square>");
                };
                Command::Moves(parse_square(square).with_context(|| format!("invalid square '{square}'"))?)
            }
            "go" => Command::Go,
            "status" | "s" => Command::Status,
            "history" | "h" => Command::History,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            "move" | "m" => {
                if rest.is_empty() {
                    bail!("usage: move e2e4");
                }
                Command::Move(parse_move(&rest.concat())?)
            }
            _ => Command::Move(
                parse_move(&tokens.concat()).with_context(|| format!("unknown command '{line}'"))?,
            ),
        };
        Ok(Some(cmd))
    }
}

fn parse_move(text: &str) -> Result<CoordinateMove> {
    text.parse::<CoordinateMove>()
        .with_context(|| format!("'{text}' is not a move like e2e4"))
}

fn parse_new(args: &[&str]) -> Result<Command> {
    let mut opponent = None;
    let mut depth = None;
    for arg in args {
        match *arg {
            "engine" => opponent = Some(OpponentMode::Engine),
            "human" => opponent = Some(OpponentMode::Human),
            other => match other.parse::<u32>() {
                Ok(d) => depth = Some(d),
                Err(_) => bail!("usage: new [engine|human] [depth]"),
            },
        }
    }
    Ok(Command::New { opponent, depth })
}
