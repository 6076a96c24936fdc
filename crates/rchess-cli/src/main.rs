use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::debug;
use rchess_cli::command::{Command, HELP};
use rchess_session::{
    Controller, ControllerState, FileStore, KeyValueStore, OpponentMode, SessionConfig, Status,
};
use shakmaty::Color;

/// How long one blocking wait lasts before the engine's progress is printed.
const ENGINE_WAIT_SLICE: Duration = Duration::from_millis(500);

#[derive(Parser, Debug)]
#[command(author, version, about = "Play chess against a UCI engine in the terminal")]
struct Cli {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Engine executable (overrides the config)
    #[arg(long)]
    engine: Option<PathBuf>,

    /// Extra arguments passed to the engine
    #[arg(long, num_args = 1.., allow_hyphen_values = true)]
    engine_args: Option<Vec<String>>,

    /// Initial search depth
    #[arg(long)]
    depth: Option<u32>,

    /// Two humans at one keyboard, no engine
    #[arg(long)]
    human: bool,

    /// The engine plays White
    #[arg(long)]
    engine_white: bool,

    /// Give up on an engine answer after this many milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Directory holding the saved game
    #[arg(long, default_value = ".rchess")]
    store_dir: PathBuf,
}

fn build_config(cli: &Cli) -> Result<SessionConfig> {
    let mut config = match &cli.config {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };
    if let Some(path) = &cli.engine {
        config.engine.path = path.clone();
    }
    if let Some(args) = &cli.engine_args {
        config.engine.args = args.clone();
    }
    if let Some(depth) = cli.depth {
        config.search_depth = depth;
    }
    if cli.human {
        config.opponent = OpponentMode::Human;
    }
    if cli.engine_white {
        config.engine_plays_white = true;
    }
    if cli.timeout_ms.is_some() {
        config.engine_timeout_ms = cli.timeout_ms;
    }
    Ok(config)
}

fn print_status(status: &Status) {
    println!("position: {}", status.fen);
    let side = match status.turn {
        Color::White => "White",
        Color::Black => "Black",
    };
    match status.state {
        ControllerState::GameOver => println!("game over: {}", status.outcome),
        ControllerState::AwaitingEngine => println!("{side} to move (engine, depth {})", status.search_depth),
        ControllerState::WaitingForInput => println!("{side} to move"),
    }
    for color in [Color::White, Color::Black] {
        if let Some(san) = status.last_move(color) {
            println!("last {color:?} move: {san}");
        }
    }
}

fn print_history<S: KeyValueStore>(ctl: &Controller<S>) {
    let history = ctl.session().history();
    if history.is_empty() {
        println!("no moves yet");
        return;
    }
    for (i, pair) in history.chunks(2).enumerate() {
        let black = pair.get(1).map(|m| m.san.as_str()).unwrap_or("");
        println!("{:>3}. {:<8} {black}", i + 1, pair[0].san);
    }
}

/// Let the engine move if it is its turn.
fn drive_engine<S: KeyValueStore>(ctl: &mut Controller<S>) {
    if ctl.state() != ControllerState::AwaitingEngine {
        return;
    }
    match ctl.request_engine_move() {
        Ok(_) => await_engine(ctl),
        Err(e) => println!("error: {e}"),
    }
}

/// Block on the running search, printing its progress meanwhile.
fn await_engine<S: KeyValueStore>(ctl: &mut Controller<S>) {
    while ctl.is_engine_thinking() {
        match ctl.wait_for_engine(ENGINE_WAIT_SLICE) {
            Ok(Some(record)) => {
                println!("engine plays {}", record.san);
                break;
            }
            Ok(None) => {
                if let Some(info) = ctl.status().engine_info {
                    let score = match (info.score_mate, info.score_cp) {
                        (Some(mate), _) => format!("mate {mate}"),
                        (None, Some(cp)) => format!("{cp} cp"),
                        (None, None) => "-".to_string(),
                    };
                    println!("  thinking: depth {} score {score}", info.depth.unwrap_or(0));
                }
            }
            Err(e) => {
                println!("error: {e} (type 'go' to retry or 'undo')");
                break;
            }
        }
    }
    let status = ctl.status();
    if status.state == ControllerState::GameOver {
        println!("game over: {}", status.outcome);
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();
    let config = build_config(&cli)?;
    debug!("config: {config:?}");

    let launcher = Box::new(config.engine.clone());
    let mut ctl = Controller::open(&config, FileStore::new(&cli.store_dir), launcher);
    if let Some(e) = ctl.take_error() {
        println!("note: {e}");
    }
    print_status(&ctl.status());
    drive_engine(&mut ctl);

    let stdin = io::stdin();
    let mut input = stdin.lock();
    loop {
        print!("> ");
        io::stdout().flush().context("failed to flush stdout")?;
        let mut line = String::new();
        if input.read_line(&mut line).context("failed to read stdin")? == 0 {
            break;
        }
        let cmd = match Command::parse(&line) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => continue,
            Err(e) => {
                println!("{e:#}");
                continue;
            }
        };
        match cmd {
            Command::Move(mv) => match ctl.attempt_move(mv.from, mv.to, mv.promotion) {
                Ok(record) => {
                    println!("you play {}", record.san);
                    if ctl.state() == ControllerState::GameOver {
                        println!("game over: {}", ctl.status().outcome);
                    }
                    drive_engine(&mut ctl);
                }
                Err(e) => println!("error: {e}"),
            },
            Command::Undo => match ctl.undo() {
                Ok(n) => {
                    println!("took back {n} move(s)");
                    print_status(&ctl.status());
                    drive_engine(&mut ctl);
                }
                Err(e) => println!("error: {e}"),
            },
            Command::New { opponent, depth } => {
                let opponent = opponent.unwrap_or(ctl.session().opponent());
                let depth = depth.unwrap_or(u32::from(ctl.session().search_depth().get()));
                ctl.new_game(opponent, depth);
                if let Some(e) = ctl.take_error() {
                    println!("note: {e}");
                }
                print_status(&ctl.status());
                drive_engine(&mut ctl);
            }
            Command::Depth(depth) => {
                let applied = ctl.set_search_depth(depth);
                let range = ctl.depth_range();
                println!("search depth {applied} (allowed {}..={})", range.min(), range.max());
            }
            Command::Moves(square) => {
                let targets: Vec<String> =
                    ctl.legal_destinations(square).iter().map(|s| s.to_string()).collect();
                if targets.is_empty() {
                    println!("no legal moves from {square}");
                } else {
                    println!("{square}: {}", targets.join(" "));
                }
            }
            Command::Go => match ctl.resume_engine() {
                Ok(_) => await_engine(&mut ctl),
                Err(e) => println!("error: {e}"),
            },
            Command::Status => print_status(&ctl.status()),
            Command::History => print_history(&ctl),
            Command::Help => println!("{HELP}"),
            Command::Quit => break,
        }
    }
    Ok(())
}
