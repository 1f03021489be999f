//! Per-page-view state.
//!
//! A page view starts at document load and again on every SPA URL change.
//! Its state is the set of rule ids already applied, the URL the last pass
//! ran for, and the rules still waiting for a later lifecycle point. All
//! checks that must be atomic (claim a rule id, advance the URL) happen
//! without an await in between, so interleaved async passes cannot double
//! apply a rule.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;

use crate::dom::ReadyState;
use crate::types::{Rule, RunAt};

/// Document lifecycle notifications delivered by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    DomContentLoaded,
    Load,
    /// Zero-delay timer scheduled for `document_idle` rules.
    IdleTimeout,
}

/// When a selected rule may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gate {
    Now,
    /// After `DOMContentLoaded` (or `load`, whichever is seen first).
    Parsed,
    /// After `load` or the idle timer, whichever comes first.
    Idle,
}

impl Gate {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Now => "now",
            Self::Parsed => "dom-content-loaded",
            Self::Idle => "idle",
        }
    }

    pub fn for_rule(run_at: RunAt, ready: ReadyState) -> Self {
        match run_at {
            RunAt::DocumentStart => Self::Now,
            RunAt::DocumentEnd if ready.is_parsed() => Self::Now,
            RunAt::DocumentEnd => Self::Parsed,
            RunAt::DocumentIdle if ready.is_complete() => Self::Now,
            RunAt::DocumentIdle => Self::Idle,
        }
    }

    pub fn is_open(self, event: LifecycleEvent) -> bool {
        match self {
            Self::Now => true,
            Self::Parsed => matches!(event, LifecycleEvent::DomContentLoaded | LifecycleEvent::Load),
            Self::Idle => matches!(event, LifecycleEvent::Load | LifecycleEvent::IdleTimeout),
        }
    }
}

/// A selected rule waiting for its gate.
#[derive(Debug, Clone)]
pub struct PendingRule {
    pub rule: Rule,
    pub url: String,
    pub safe_mode: bool,
    pub gate: Gate,
    generation: u64,
}

#[derive(Debug, Default)]
pub struct PageSession {
    applied: RefCell<HashSet<String>>,
    last_url: RefCell<String>,
    generation: Cell<u64>,
    pending: RefCell<Vec<PendingRule>>,
    pass_in_flight: Cell<bool>,
    rerun_requested: Cell<bool>,
}

impl PageSession {
    pub fn new(url: &str) -> Self {
        Self {
            last_url: RefCell::new(url.to_string()),
            ..Self::default()
        }
    }

    /// Record `rule_id` as applied. Returns false when it already was.
    pub fn try_claim(&self, rule_id: &str) -> bool {
        self.applied.borrow_mut().insert(rule_id.to_string())
    }

    pub fn is_applied(&self, rule_id: &str) -> bool {
        self.applied.borrow().contains(rule_id)
    }

    pub fn applied_count(&self) -> usize {
        self.applied.borrow().len()
    }

    pub fn last_url(&self) -> String {
        self.last_url.borrow().clone()
    }

    pub fn mark_url(&self, url: &str) {
        *self.last_url.borrow_mut() = url.to_string();
    }

    /// Start a new page view if `url` differs from the last one seen.
    pub fn advance_if_changed(&self, url: &str) -> bool {
        if *self.last_url.borrow() == url {
            return false;
        }
        self.mark_url(url);
        self.reset();
        true
    }

    /// Forget every applied rule and drop deferred rules of the old view.
    pub fn reset(&self) {
        self.applied.borrow_mut().clear();
        self.pending.borrow_mut().clear();
        self.generation.set(self.generation.get() + 1);
    }

    pub fn generation(&self) -> u64 {
        self.generation.get()
    }

    pub fn defer(&self, rule: Rule, url: &str, safe_mode: bool, gate: Gate) {
        self.pending.borrow_mut().push(PendingRule {
            rule,
            url: url.to_string(),
            safe_mode,
            gate,
            generation: self.generation.get(),
        });
    }

    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Remove and return the deferred rules `event` releases, in the order
    /// they were deferred.
    pub fn take_ready(&self, event: LifecycleEvent) -> Vec<PendingRule> {
        let generation = self.generation.get();
        let mut pending = self.pending.borrow_mut();
        pending.retain(|p| p.generation == generation);
        let (ready, waiting): (Vec<_>, Vec<_>) = pending.drain(..).partition(|p| p.gate.is_open(event));
        *pending = waiting;
        ready
    }

    /// Mark a pass as running. Returns `None` (and asks the running pass to
    /// go again when it finishes) if one already is.
    pub(crate) fn begin_pass(&self) -> Option<PassGuard<'_>> {
        if self.pass_in_flight.replace(true) {
            self.rerun_requested.set(true);
            return None;
        }
        Some(PassGuard { session: self })
    }

    pub(crate) fn take_rerun(&self) -> bool {
        self.rerun_requested.replace(false)
    }
}

/// Clears the in-flight flag when the pass ends, including on error.
pub(crate) struct PassGuard<'a> {
    session: &'a PageSession,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.session.pass_in_flight.set(false);
    }
}
