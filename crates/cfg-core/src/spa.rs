//! In-page navigation detection.
//!
//! The host reports every history mutation (`pushState`, `replaceState`) and
//! every `popstate` / `hashchange`. Signals are debounced: each one takes a
//! ticket, waits [`SPA_DEBOUNCE_MS`] and only the newest ticket proceeds to
//! compare the URL with the one the last pass ran for.

use std::cell::Cell;

use crate::dom::Document;
use crate::engine::{Engine, PassReport};
use crate::error::StoreError;
use crate::host::{Clock, ScriptHost};
use crate::logs::LogSink;
use crate::session::PageSession;
use crate::store::RuleStore;

pub const SPA_DEBOUNCE_MS: u32 = 50;

/// Source of a navigation signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NavSignal {
    PushState,
    ReplaceState,
    PopState,
    HashChange,
}

impl NavSignal {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PushState => "pushState",
            Self::ReplaceState => "replaceState",
            Self::PopState => "popstate",
            Self::HashChange => "hashchange",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavDecision {
    /// A newer signal arrived during the debounce window.
    Superseded,
    Unchanged,
    /// The page view was reset; a pass should run for this URL.
    Changed(String),
}

#[derive(Debug)]
pub struct NavigationWatcher {
    debounce_ms: u32,
    latest: Cell<u64>,
}

impl Default for NavigationWatcher {
    fn default() -> Self {
        Self::new(SPA_DEBOUNCE_MS)
    }
}

impl NavigationWatcher {
    pub fn new(debounce_ms: u32) -> Self {
        Self {
            debounce_ms,
            latest: Cell::new(0),
        }
    }

    pub fn debounce_ms(&self) -> u32 {
        self.debounce_ms
    }

    /// Record a signal; any ticket handed out earlier is now stale.
    pub fn signal(&self, source: NavSignal) -> Ticket {
        let next = self.latest.get() + 1;
        self.latest.set(next);
        log::trace!("navigation signal {} (#{})", source.as_str(), next);
        Ticket(next)
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.latest.get() == ticket.0
    }

    /// Wait out the debounce window. Returns whether `ticket` is still the
    /// newest signal afterwards.
    pub async fn debounce<C: Clock>(&self, clock: &C, ticket: Ticket) -> bool {
        clock.sleep(self.debounce_ms).await;
        self.is_current(ticket)
    }

    /// Compare `current_url` to the session and reset the page view when it
    /// changed.
    pub fn settle(&self, ticket: Ticket, session: &PageSession, current_url: &str) -> NavDecision {
        if !self.is_current(ticket) {
            return NavDecision::Superseded;
        }
        if session.advance_if_changed(current_url) {
            log::info!("navigated to {}", current_url);
            NavDecision::Changed(current_url.to_string())
        } else {
            NavDecision::Unchanged
        }
    }

    /// Full handling of one signal: debounce, compare, and re-run the engine
    /// on a change. `current_url` is read after the debounce window.
    pub async fn handle<D, S, L, X, C, F>(
        &self,
        engine: &Engine<D, S, L, X, C>,
        session: &PageSession,
        source: NavSignal,
        current_url: F,
    ) -> Result<Option<PassReport>, StoreError>
    where
        D: Document,
        S: RuleStore,
        L: LogSink,
        X: ScriptHost,
        C: Clock,
        F: FnOnce() -> String,
    {
        let ticket = self.signal(source);
        if !self.debounce(engine.clock(), ticket).await {
            return Ok(None);
        }
        match self.settle(ticket, session, &current_url()) {
            NavDecision::Changed(url) => engine.run_pass(session, &url).await.map(Some),
            NavDecision::Superseded | NavDecision::Unchanged => Ok(None),
        }
    }
}
