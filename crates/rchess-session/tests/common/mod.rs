//! Scripted in-process UCI engine for controller tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::Write;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rchess_session::{Controller, EngineClient, EngineLauncher, MemoryStore, SessionConfig, SessionError};

#[derive(Default)]
struct Script {
    replies: VecDeque<String>,
    hold: bool,
    held: usize,
    received: Vec<String>,
    launches: u64,
    fail_startup: bool,
    crash_on_go: bool,
}

/// Shared handle to the fake engine's script and transcript.
#[derive(Clone, Default)]
pub struct FakeEngine {
    script: Arc<Mutex<Script>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Line sent in answer to the next `go` (default `bestmove (none)`).
    pub fn reply(&self, line: &str) {
        self.script.lock().unwrap().replies.push_back(line.to_string());
    }

    /// While holding, `go` is not answered until `stop` arrives.
    pub fn hold(&self, on: bool) {
        self.script.lock().unwrap().hold = on;
    }

    pub fn fail_startup(&self, on: bool) {
        self.script.lock().unwrap().fail_startup = on;
    }

    /// Close the engine's output on the next `go`.
    pub fn crash_on_go(&self) {
        self.script.lock().unwrap().crash_on_go = true;
    }

    pub fn received(&self) -> Vec<String> {
        self.script.lock().unwrap().received.clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.received().iter().filter(|l| l.starts_with(prefix)).count()
    }

    pub fn launches(&self) -> u64 {
        self.script.lock().unwrap().launches
    }

    pub fn launcher(&self) -> Box<dyn EngineLauncher> {
        Box::new(FakeLauncher {
            engine: self.clone(),
        })
    }
}

struct FakeLauncher {
    engine: FakeEngine,
}

impl EngineLauncher for FakeLauncher {
    fn launch(&mut self, generation: u64) -> Result<EngineClient, SessionError> {
        {
            let mut script = self.engine.script.lock().unwrap();
            script.launches += 1;
            script.held = 0;
            if script.fail_startup {
                return Err(SessionError::EngineStartup("fake engine refused to start".into()));
            }
        }
        let (tx, rx) = mpsc::channel();
        let input = FakeInput {
            engine: self.engine.clone(),
            out: Some(tx),
            buf: Vec::new(),
        };
        let mut client = EngineClient::from_channels("fake", generation, Box::new(input), rx);
        client
            .initialize(&[], Duration::from_secs(1))
            .map_err(|e| SessionError::EngineStartup(e.to_string()))?;
        Ok(client)
    }
}

/// The engine's stdin: answers each complete line it is given.
struct FakeInput {
    engine: FakeEngine,
    out: Option<Sender<String>>,
    buf: Vec<u8>,
}

impl FakeInput {
    fn send(&self, line: &str) {
        if let Some(out) = &self.out {
            let _ = out.send(line.to_string());
        }
    }

    fn answer(&self, script: &mut Script) {
        let line = script.replies.pop_front().unwrap_or_else(|| "bestmove (none)".to_string());
        self.send("info depth 1 score cp 10");
        self.send(&line);
    }

    fn handle(&mut self, line: &str) {
        let mut script = self.engine.script.lock().unwrap();
        script.received.push(line.to_string());
        match line.split_whitespace().next() {
            Some("uci") => {
                self.send("id name fake");
                self.send("uciok");
            }
            Some("isready") => self.send("readyok"),
            Some("go") => {
                if script.crash_on_go {
                    self.out = None;
                } else if script.hold {
                    script.held += 1;
                } else {
                    self.answer(&mut script);
                }
            }
            Some("stop") => {
                if script.held > 0 {
                    script.held -= 1;
                    self.answer(&mut script);
                }
            }
            _ => {}
        }
    }
}

impl Write for FakeInput {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        self.buf.extend_from_slice(data);
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line).trim().to_string();
            self.handle(&line);
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

pub fn open(config: &SessionConfig, store: MemoryStore, engine: &FakeEngine) -> Controller<MemoryStore> {
    Controller::open(config, store, engine.launcher())
}

pub fn engine_game() -> (Controller<MemoryStore>, FakeEngine, MemoryStore) {
    let engine = FakeEngine::new();
    let store = MemoryStore::new();
    let controller = open(&SessionConfig::default(), store.clone(), &engine);
    (controller, engine, store)
}
