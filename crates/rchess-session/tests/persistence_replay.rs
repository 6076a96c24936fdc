mod common;

use std::io;

use rchess_session::persistence::DEFAULT_STORAGE_KEY;
use rchess_session::{
    Controller, ControllerState, ErrorKind, FileStore, KeyValueStore, MemoryStore, OpponentMode, SessionConfig,
    SessionError,
};
use shakmaty::Square;

use common::{FakeEngine, engine_game, open};

/// Store whose writes always fail.
#[derive(Clone, Default)]
struct ReadOnlyStore;

impl KeyValueStore for ReadOnlyStore {
    fn get(&self, _key: &str) -> io::Result<Option<String>> {
        Ok(None)
    }

    fn set(&mut self, _key: &str, _value: &str) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only store"))
    }

    fn remove(&mut self, _key: &str) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn restart_restores_the_game() {
    let (mut ctl, engine, store) = engine_game();
    engine.reply("bestmove e7e5");
    ctl.attempt_move(Square::E2, Square::E4, None).unwrap();
    ctl.request_engine_move().unwrap();
    ctl.poll_engine().unwrap().unwrap();
    ctl.attempt_move(Square::G1, Square::F3, None).unwrap();
    let fen = ctl.session().fen();
    drop(ctl);

    let restarted = open(&SessionConfig::default(), store, &FakeEngine::new());
    assert_eq!(restarted.session().fen(), fen);
    assert_eq!(
        restarted.session().history().iter().map(|m| m.san.as_str()).collect::<Vec<_>>(),
        vec!["e4", "e5", "Nf3"]
    );
    // the engine was to move when the game was saved
    assert_eq!(restarted.state(), ControllerState::AwaitingEngine);
    assert!(restarted.last_error().is_none());
}

#[test]
fn bare_move_list_is_restored() {
    let mut store = MemoryStore::new();
    store.set(DEFAULT_STORAGE_KEY, r#"["d4","d5","c4"]"#).unwrap();
    let ctl = open(&SessionConfig::default(), store, &FakeEngine::new());
    assert_eq!(ctl.session().history().len(), 3);
    assert_eq!(
        ctl.session().fen(),
        "rnbqkbnr/ppp1pppp/8/3p4/2PP4/8/PP2PPPP/RNBQKBNR b KQkq - 0 2"
    );
}

#[test]
fn corrupted_history_falls_back_to_fresh_game() {
    let mut store = MemoryStore::new();
    store.set(DEFAULT_STORAGE_KEY, r#"{"history":["e4","e5","Nf9"]}"#).unwrap();
    let mut ctl = open(&SessionConfig::default(), store.clone(), &FakeEngine::new());

    assert!(ctl.session().history().is_empty());
    assert_eq!(ctl.state(), ControllerState::WaitingForInput);
    assert!(matches!(
        ctl.last_error(),
        Some(SessionError::CorruptedHistory { ply: 3, .. })
    ));

    // the bad record is replaced by the next save
    ctl.attempt_move(Square::C2, Square::C4, None).unwrap();
    let saved = store.get(DEFAULT_STORAGE_KEY).unwrap().unwrap();
    assert!(saved.contains(r#""history":["c4"]"#));
}

#[test]
fn save_failure_is_not_fatal() {
    let engine = FakeEngine::new();
    let config = SessionConfig {
        opponent: OpponentMode::Human,
        ..SessionConfig::default()
    };
    let mut ctl = Controller::open(&config, ReadOnlyStore, engine.launcher());
    let record = ctl.attempt_move(Square::E2, Square::E4, None).unwrap();
    assert_eq!(record.san, "e4");
    assert_eq!(ctl.session().history().len(), 1);
    assert_eq!(ctl.last_error().map(|e| e.kind()), Some(ErrorKind::Persistence));
    assert_eq!(ctl.state(), ControllerState::WaitingForInput);
}

#[test]
fn settings_survive_restart() {
    let store = MemoryStore::new();
    let config = SessionConfig {
        opponent: OpponentMode::Human,
        ..SessionConfig::default()
    };
    let mut ctl = open(&config, store.clone(), &FakeEngine::new());
    ctl.set_search_depth(11);
    ctl.attempt_move(Square::E2, Square::E4, None).unwrap();
    drop(ctl);

    let engine = FakeEngine::new();
    let restarted = open(&SessionConfig::default(), store, &engine);
    assert_eq!(restarted.session().opponent(), OpponentMode::Human);
    assert_eq!(restarted.session().search_depth().get(), 11);
    assert_eq!(engine.launches(), 0);
}

#[test]
fn file_store_persists_across_controllers() {
    let dir = tempfile::tempdir().unwrap();
    let config = SessionConfig {
        opponent: OpponentMode::Human,
        ..SessionConfig::default()
    };
    let engine = FakeEngine::new();

    let mut ctl = Controller::open(&config, FileStore::new(dir.path()), engine.launcher());
    for (from, to) in [
        (Square::E2, Square::E4),
        (Square::C7, Square::C5),
        (Square::G1, Square::F3),
        (Square::B8, Square::C6),
        (Square::F1, Square::B5),
        (Square::G8, Square::F6),
        (Square::E1, Square::G1),
    ] {
        ctl.attempt_move(from, to, None).unwrap();
    }
    let fen = ctl.session().fen();
    drop(ctl);

    let restarted = Controller::open(&config, FileStore::new(dir.path()), engine.launcher());
    assert_eq!(restarted.session().fen(), fen);
    assert_eq!(restarted.session().history().last().map(|m| m.san.as_str()), Some("O-O"));
}
