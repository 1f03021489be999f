//! Test doubles for the host collaborators.

use std::cell::{Cell, RefCell};

use crate::error::{EffectError, SinkError};
use crate::host::{Clock, CssSource, ScriptHost, ScriptRequest};
use crate::logs::LogSink;
use crate::types::{LogAction, LogEntry};

type Timer = (f64, Box<dyn FnOnce()>);

/// Virtual clock. `sleep` advances time instantly and runs timers that
/// became due.
#[derive(Default)]
pub struct FakeClock {
    now: Cell<f64>,
    sleeps: Cell<u32>,
    timers: RefCell<Vec<Timer>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` once virtual time reaches `at_ms`.
    pub fn at(&self, at_ms: f64, f: impl FnOnce() + 'static) {
        self.timers.borrow_mut().push((at_ms, Box::new(f)));
    }

    pub fn sleeps(&self) -> u32 {
        self.sleeps.get()
    }

    fn fire_due(&self) {
        let now = self.now.get();
        let due: Vec<Timer> = {
            let mut timers = self.timers.borrow_mut();
            let (due, rest) = timers.drain(..).partition(|(at, _)| *at <= now);
            *timers = rest;
            due
        };
        for (_, f) in due {
            f();
        }
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> f64 {
        self.now.get()
    }

    fn epoch_ms(&self) -> u64 {
        1_700_000_000_000 + self.now.get() as u64
    }

    async fn sleep(&self, ms: u32) {
        self.sleeps.set(self.sleeps.get() + 1);
        self.now.set(self.now.get() + f64::from(ms));
        self.fire_due();
    }
}

#[derive(Default)]
pub struct RecordingSink {
    entries: RefCell<Vec<LogEntry>>,
    fail: Cell<bool>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.set(fail);
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.borrow().clone()
    }

    pub fn actions(&self) -> Vec<(String, LogAction)> {
        self.entries
            .borrow()
            .iter()
            .map(|e| (e.rule_id.clone(), e.action))
            .collect()
    }
}

impl LogSink for RecordingSink {
    async fn append(&self, entry: LogEntry) -> Result<(), SinkError> {
        if self.fail.get() {
            return Err(SinkError("sink offline".to_string()));
        }
        self.entries.borrow_mut().push(entry);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingScripts {
    requests: RefCell<Vec<ScriptRequest>>,
    css: RefCell<Vec<CssSource>>,
    fail: Cell<bool>,
}

impl RecordingScripts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.set(fail);
    }

    pub fn requests(&self) -> Vec<ScriptRequest> {
        self.requests.borrow().clone()
    }

    pub fn css(&self) -> Vec<CssSource> {
        self.css.borrow().clone()
    }
}

impl ScriptHost for RecordingScripts {
    async fn execute(&self, request: ScriptRequest) -> Result<(), EffectError> {
        if self.fail.get() {
            return Err(EffectError::Script("execution refused".to_string()));
        }
        self.requests.borrow_mut().push(request);
        Ok(())
    }

    async fn insert_css(&self, source: CssSource) -> Result<(), EffectError> {
        if self.fail.get() {
            return Err(EffectError::Script("insertion refused".to_string()));
        }
        self.css.borrow_mut().push(source);
        Ok(())
    }
}
