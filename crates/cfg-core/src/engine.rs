//! Rule application engine.
//!
//! A pass reads the store, gates on the kill switch and the blocklist,
//! selects matching rules in priority order and applies each one at its
//! `runAt` point. Rules whose lifecycle point has not been reached are parked
//! in the [`PageSession`] and released by [`Engine::on_lifecycle`].

use crate::dom::{Document, ReadyState};
use crate::effects::{run_safe_actions, EffectKind, Effects, SafeActionReport};
use crate::error::StoreError;
use crate::host::{Clock, ScriptHost};
use crate::logs::LogSink;
use crate::pattern::{any_matches, exclude_matches, matches};
use crate::session::{Gate, LifecycleEvent, PageSession};
use crate::store::RuleStore;
use crate::types::{LogAction, LogEntry, Rule, SafeActions, StoreState};

/// Rules that apply to `url`: enabled, pattern match, no exclude match;
/// ordered by ascending priority, ties in list order.
pub fn select_rules<'a>(rules: &'a [Rule], url: &str) -> Vec<&'a Rule> {
    let mut selected: Vec<&Rule> = rules
        .iter()
        .filter(|r| r.enabled && matches(url, &r.pattern) && !exclude_matches(url, &r.exclude_patterns))
        .collect();
    selected.sort_by_key(|r| r.priority);
    selected
}

/// Why a pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    Completed,
    /// Nothing stored yet.
    NoState,
    Disabled,
    Blocked,
    /// Another pass was running; it will run again when done.
    Coalesced,
    /// The page view was reset while the pass was running.
    Superseded,
}

impl PassOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::NoState => "no-state",
            Self::Disabled => "disabled",
            Self::Blocked => "blocked",
            Self::Coalesced => "coalesced",
            Self::Superseded => "superseded",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub outcome: PassOutcome,
    pub url: String,
    pub applied: Vec<String>,
    pub safe_skipped: Vec<String>,
    pub deferred: usize,
    /// A `document_idle` rule is waiting; the host should schedule the
    /// zero-delay idle timer.
    pub wants_idle_timer: bool,
}

impl PassReport {
    fn new(outcome: PassOutcome, url: &str) -> Self {
        Self {
            outcome,
            url: url.to_string(),
            applied: Vec::new(),
            safe_skipped: Vec::new(),
            deferred: 0,
            wants_idle_timer: false,
        }
    }

    fn record(&mut self, rule: &Rule, outcome: ApplyOutcome) {
        match outcome {
            ApplyOutcome::Applied => self.applied.push(rule.id.clone()),
            ApplyOutcome::SafeSkipped => self.safe_skipped.push(rule.id.clone()),
            ApplyOutcome::AlreadyApplied => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    AlreadyApplied,
    SafeSkipped,
    Applied,
}

/// The engine and its collaborators.
pub struct Engine<D, S, L, X, C> {
    doc: D,
    store: S,
    sink: L,
    scripts: X,
    clock: C,
}

impl<D, S, L, X, C> Engine<D, S, L, X, C>
where
    D: Document,
    S: RuleStore,
    L: LogSink,
    X: ScriptHost,
    C: Clock,
{
    pub fn new(doc: D, store: S, sink: L, scripts: X, clock: C) -> Self {
        Self {
            doc,
            store,
            sink,
            scripts,
            clock,
        }
    }

    pub fn document(&self) -> &D {
        &self.doc
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn sink(&self) -> &L {
        &self.sink
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn scripts(&self) -> &X {
        &self.scripts
    }

    /// Run a pass for `url`. If a pass is already running on this session
    /// the request is folded into it and the running pass goes again for the
    /// session's latest URL once it finishes.
    pub async fn run_pass(&self, session: &PageSession, url: &str) -> Result<PassReport, StoreError> {
        let Some(guard) = session.begin_pass() else {
            log::debug!("pass for {} coalesced into running pass", url);
            return Ok(PassReport::new(PassOutcome::Coalesced, url));
        };

        let mut report = self.pass_once(session, url).await;
        while session.take_rerun() {
            let latest = session.last_url();
            report = self.pass_once(session, &latest).await;
        }
        drop(guard);
        report
    }

    async fn pass_once(&self, session: &PageSession, url: &str) -> Result<PassReport, StoreError> {
        session.mark_url(url);
        let generation = session.generation();

        let Some(state) = self.store.read().await? else {
            return Ok(PassReport::new(PassOutcome::NoState, url));
        };
        if session.generation() != generation {
            return Ok(PassReport::new(PassOutcome::Superseded, url));
        }
        if !state.enabled {
            log::debug!("disabled, nothing applied to {}", url);
            return Ok(PassReport::new(PassOutcome::Disabled, url));
        }
        if any_matches(url, &state.blocklist) {
            log::info!("{} is blocklisted", url);
            return Ok(PassReport::new(PassOutcome::Blocked, url));
        }

        let mut report = PassReport::new(PassOutcome::Completed, url);
        for rule in select_rules(&state.rules, url) {
            if session.generation() != generation {
                report.outcome = PassOutcome::Superseded;
                break;
            }
            // Earlier rules may have awaited across DOMContentLoaded or load.
            match Gate::for_rule(rule.run_at, self.doc.ready_state()) {
                Gate::Now => {
                    let outcome = self.apply_rule(session, rule, url, state.safe_mode).await;
                    report.record(rule, outcome);
                }
                gate => {
                    session.defer(rule.clone(), url, state.safe_mode, gate);
                    report.deferred += 1;
                    report.wants_idle_timer |= gate == Gate::Idle;
                }
            }
        }

        log::debug!(
            "pass {}: {} applied, {} safe-skipped, {} deferred",
            url,
            report.applied.len(),
            report.safe_skipped.len(),
            report.deferred
        );
        Ok(report)
    }

    /// Release deferred rules whose lifecycle point `event` satisfies.
    pub async fn on_lifecycle(&self, session: &PageSession, event: LifecycleEvent) -> Vec<String> {
        let mut applied = Vec::new();
        for pending in session.take_ready(event) {
            let outcome = self
                .apply_rule(session, &pending.rule, &pending.url, pending.safe_mode)
                .await;
            if outcome == ApplyOutcome::Applied {
                applied.push(pending.rule.id);
            }
        }
        applied
    }

    /// Apply one rule at most once per page view.
    pub async fn apply_rule(&self, session: &PageSession, rule: &Rule, url: &str, global_safe_mode: bool) -> ApplyOutcome {
        if !session.try_claim(&rule.id) {
            return ApplyOutcome::AlreadyApplied;
        }

        if global_safe_mode || rule.safe_mode {
            log::info!("safe mode: skipping rule {} ({})", rule.id, rule.name);
            self.log(rule, url, LogAction::SafeSkip, None).await;
            return ApplyOutcome::SafeSkipped;
        }

        let effects = Effects::new(&self.doc, &self.scripts, &self.clock);
        for kind in EffectKind::ORDER {
            match effects.apply(kind, rule).await {
                Ok(Some(applied)) => self.log(rule, url, kind.log_action(), applied.meta).await,
                Ok(None) => {}
                Err(e) => log::warn!("rule {} ({}): {}", rule.id, rule.name, e),
            }
        }
        ApplyOutcome::Applied
    }

    /// Run `actions` on the page right away, outside any rule.
    pub async fn run_safe_actions_now(&self, actions: &SafeActions) -> SafeActionReport {
        let report = run_safe_actions(&self.doc, &self.clock, actions).await;
        log::info!("safe actions run on request: {}", report.summary());
        report
    }

    async fn log(&self, rule: &Rule, url: &str, action: LogAction, meta: Option<String>) {
        let entry = LogEntry {
            timestamp: self.clock.epoch_ms(),
            url: url.to_string(),
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            action,
            meta,
        };
        if let Err(e) = self.sink.append(entry).await {
            log::debug!("log entry for {} dropped: {}", rule.id, e);
        }
    }
}

/// A rule a pass would apply, with the point it would run at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreviewEntry<'a> {
    pub rule: &'a Rule,
    pub gate: Gate,
}

/// What a pass over `state` would do for `url` at `ready`, or why it would
/// do nothing.
pub fn preview<'a>(state: &'a StoreState, url: &str, ready: ReadyState) -> Result<Vec<PreviewEntry<'a>>, PassOutcome> {
    if !state.enabled {
        return Err(PassOutcome::Disabled);
    }
    if any_matches(url, &state.blocklist) {
        return Err(PassOutcome::Blocked);
    }
    Ok(select_rules(&state.rules, url)
        .into_iter()
        .map(|rule| PreviewEntry {
            rule,
            gate: Gate::for_rule(rule.run_at, ready),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::mock::MockDocument;
    use crate::dom::DomElement;
    use crate::store::MemoryStore;
    use crate::testing::{FakeClock, RecordingScripts, RecordingSink};
    use crate::types::{RunAt, SafeActions};

    type TestEngine = Engine<MockDocument, MemoryStore, RecordingSink, RecordingScripts, FakeClock>;

    const URL: &str = "https://news.example.com/article/1";

    fn rule(id: &str, priority: i32) -> Rule {
        Rule {
            id: id.to_string(),
            name: format!("rule {id}"),
            enabled: true,
            pattern: "*://*.example.com/*".to_string(),
            priority,
            css: format!(".ad-{id} {{ display: none; }}"),
            ..Rule::default()
        }
    }

    fn state(rules: Vec<Rule>) -> StoreState {
        StoreState {
            rules,
            ..StoreState::initial()
        }
    }

    fn engine(state: Option<StoreState>) -> TestEngine {
        Engine::new(
            MockDocument::new(),
            MemoryStore::new(state),
            RecordingSink::new(),
            RecordingScripts::new(),
            FakeClock::new(),
        )
    }

    fn style_order(engine: &TestEngine) -> Vec<String> {
        engine
            .document()
            .query_selector_all("style[data-cfg-rule]")
            .unwrap()
            .iter()
            .filter_map(|s| s.get_attribute("data-cfg-rule"))
            .collect()
    }

    #[test]
    fn test_select_rules_filters_and_orders() {
        let mut disabled = rule("off", 0);
        disabled.enabled = false;
        let mut excluded = rule("ex", 0);
        excluded.exclude_patterns = vec!["*://news.example.com/*".to_string()];
        let mut other = rule("other", 0);
        other.pattern = "*://*.other.org/*".to_string();
        let rules = vec![rule("c", 300), disabled, rule("a", 100), excluded, other, rule("b", 200)];

        let ids: Vec<&str> = select_rules(&rules, URL).iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_select_rules_is_stable_on_ties() {
        let rules = vec![rule("x", 50), rule("y", 50), rule("z", 10), rule("w", 50)];
        let ids: Vec<&str> = select_rules(&rules, URL).iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["z", "x", "y", "w"]);
    }

    #[tokio::test]
    async fn test_pass_applies_in_priority_order() {
        let engine = engine(Some(state(vec![rule("c", 300), rule("a", 100), rule("b", 200)])));
        let session = PageSession::new(URL);

        let report = engine.run_pass(&session, URL).await.unwrap();

        assert_eq!(report.outcome, PassOutcome::Completed);
        assert_eq!(report.applied, vec!["a", "b", "c"]);
        assert_eq!(style_order(&engine), vec!["a", "b", "c"]);
        let actions = engine.sink().actions();
        assert_eq!(actions.len(), 3);
        assert!(actions.iter().all(|(_, a)| *a == LogAction::CssInline));
    }

    #[tokio::test]
    async fn test_pass_is_idempotent_within_view() {
        let engine = engine(Some(state(vec![rule("a", 0)])));
        let session = PageSession::new(URL);

        engine.run_pass(&session, URL).await.unwrap();
        let second = engine.run_pass(&session, URL).await.unwrap();

        assert!(second.applied.is_empty());
        assert_eq!(style_order(&engine).len(), 1);
        assert_eq!(engine.sink().entries().len(), 1);
    }

    #[tokio::test]
    async fn test_spa_reset_reapplies() {
        let engine = engine(Some(state(vec![rule("a", 0)])));
        let session = PageSession::new(URL);

        engine.run_pass(&session, URL).await.unwrap();
        let next = "https://news.example.com/article/2";
        assert!(session.advance_if_changed(next));
        let report = engine.run_pass(&session, next).await.unwrap();

        assert_eq!(report.applied, vec!["a"]);
        assert_eq!(style_order(&engine).len(), 2);
        assert_eq!(engine.sink().entries().len(), 2);
    }

    #[tokio::test]
    async fn test_global_safe_mode_skips_every_rule() {
        let mut s = state(vec![rule("a", 0), rule("b", 1)]);
        s.safe_mode = true;
        let engine = engine(Some(s));
        let session = PageSession::new(URL);

        let report = engine.run_pass(&session, URL).await.unwrap();

        assert_eq!(report.safe_skipped, vec!["a", "b"]);
        assert!(style_order(&engine).is_empty());
        assert_eq!(
            engine.sink().actions(),
            vec![("a".to_string(), LogAction::SafeSkip), ("b".to_string(), LogAction::SafeSkip)]
        );
    }

    #[tokio::test]
    async fn test_rule_safe_mode_skips_only_that_rule() {
        let mut quiet = rule("quiet", 0);
        quiet.safe_mode = true;
        let engine = engine(Some(state(vec![quiet, rule("loud", 1)])));
        let session = PageSession::new(URL);

        let report = engine.run_pass(&session, URL).await.unwrap();

        assert_eq!(report.safe_skipped, vec!["quiet"]);
        assert_eq!(report.applied, vec!["loud"]);
    }

    #[tokio::test]
    async fn test_disabled_blocked_and_missing_state() {
        let mut s = state(vec![rule("a", 0)]);
        s.enabled = false;
        let session = PageSession::new(URL);
        assert_eq!(engine(Some(s)).run_pass(&session, URL).await.unwrap().outcome, PassOutcome::Disabled);

        let mut s = state(vec![rule("a", 0)]);
        s.blocklist = vec!["*://news.example.com/*".to_string()];
        let blocked = engine(Some(s));
        assert_eq!(blocked.run_pass(&session, URL).await.unwrap().outcome, PassOutcome::Blocked);
        assert!(blocked.sink().entries().is_empty());

        assert_eq!(engine(None).run_pass(&session, URL).await.unwrap().outcome, PassOutcome::NoState);
    }

    #[tokio::test]
    async fn test_store_error_propagates() {
        let engine = engine(Some(state(vec![rule("a", 0)])));
        engine.store().set_fail_reads(true);
        let session = PageSession::new(URL);

        assert!(matches!(engine.run_pass(&session, URL).await, Err(StoreError::Read(_))));
        assert_eq!(session.applied_count(), 0);
        // The in-flight marker is released on error.
        engine.store().set_fail_reads(false);
        assert!(engine.run_pass(&session, URL).await.is_ok());
    }

    #[tokio::test]
    async fn test_failing_kind_does_not_block_later_kinds() {
        let mut r = rule("a", 0);
        r.js_files = vec!["inject.js".to_string()];
        r.safe_actions = SafeActions::parse(r#"{ "hide": [".promo"] }"#);
        let engine = engine(Some(state(vec![r])));
        engine.scripts().set_fail(true);
        let promo = {
            let doc = engine.document();
            let body = doc.body().unwrap();
            doc.append(&body, "div", &[("class", "promo")])
        };
        let session = PageSession::new(URL);

        engine.run_pass(&session, URL).await.unwrap();

        assert_eq!(promo.style("display").as_deref(), Some("none"));
        assert_eq!(
            engine.sink().actions(),
            vec![("a".to_string(), LogAction::CssInline), ("a".to_string(), LogAction::SafeActions)]
        );
    }

    #[tokio::test]
    async fn test_sink_failure_is_swallowed() {
        let engine = engine(Some(state(vec![rule("a", 0)])));
        engine.sink().set_fail(true);
        let session = PageSession::new(URL);

        let report = engine.run_pass(&session, URL).await.unwrap();
        assert_eq!(report.applied, vec!["a"]);
    }

    #[tokio::test]
    async fn test_run_at_gating() {
        let mut start = rule("start", 0);
        start.run_at = RunAt::DocumentStart;
        let mut end = rule("end", 1);
        end.run_at = RunAt::DocumentEnd;
        let mut idle = rule("idle", 2);
        idle.run_at = RunAt::DocumentIdle;
        let engine = engine(Some(state(vec![idle, end, start])));
        engine.document().set_ready_state(ReadyState::Loading);
        let session = PageSession::new(URL);

        let report = engine.run_pass(&session, URL).await.unwrap();
        assert_eq!(report.applied, vec!["start"]);
        assert_eq!(report.deferred, 2);
        assert!(report.wants_idle_timer);

        assert_eq!(engine.on_lifecycle(&session, LifecycleEvent::DomContentLoaded).await, vec!["end"]);
        assert_eq!(engine.on_lifecycle(&session, LifecycleEvent::IdleTimeout).await, vec!["idle"]);
        assert!(engine.on_lifecycle(&session, LifecycleEvent::Load).await.is_empty());
        assert_eq!(style_order(&engine), vec!["start", "end", "idle"]);
    }

    #[tokio::test]
    async fn test_readiness_rechecked_after_slow_rule() {
        let mut start = rule("start", 0);
        start.run_at = RunAt::DocumentStart;
        start.safe_actions = SafeActions::parse(r##"{ "waitFor": [{ "selector": "#never", "timeoutMs": 300 }] }"##);
        let mut end = rule("end", 1);
        end.run_at = RunAt::DocumentEnd;
        let engine = engine(Some(state(vec![end, start])));
        engine.document().set_ready_state(ReadyState::Loading);
        let ready = engine.document().ready_handle();
        engine.clock().at(100.0, move || ready.set(ReadyState::Complete));
        let session = PageSession::new(URL);

        let report = engine.run_pass(&session, URL).await.unwrap();

        assert_eq!(report.applied, vec!["start", "end"]);
        assert_eq!(report.deferred, 0);
        assert_eq!(session.pending_count(), 0);
        assert_eq!(style_order(&engine), vec!["start", "end"]);
    }

    #[tokio::test]
    async fn test_deferred_rules_dropped_on_navigation() {
        let mut idle = rule("idle", 0);
        idle.run_at = RunAt::DocumentIdle;
        let engine = engine(Some(state(vec![idle])));
        engine.document().set_ready_state(ReadyState::Interactive);
        let session = PageSession::new(URL);

        engine.run_pass(&session, URL).await.unwrap();
        session.advance_if_changed("https://news.example.com/other");

        assert!(engine.on_lifecycle(&session, LifecycleEvent::Load).await.is_empty());
        assert!(style_order(&engine).is_empty());
    }

    #[test]
    fn test_preview() {
        let mut idle = rule("b", 2);
        idle.run_at = RunAt::DocumentIdle;
        let mut s = state(vec![idle, rule("a", 1)]);
        let entries = preview(&s, URL, ReadyState::Interactive).unwrap();
        let ids: Vec<(&str, Gate)> = entries.iter().map(|e| (e.rule.id.as_str(), e.gate)).collect();
        assert_eq!(ids, vec![("a", Gate::Now), ("b", Gate::Idle)]);

        s.enabled = false;
        assert_eq!(preview(&s, URL, ReadyState::Complete).unwrap_err(), PassOutcome::Disabled);
    }

    #[tokio::test]
    async fn test_safe_actions_now() {
        let engine = engine(None);
        let ad = {
            let doc = engine.document();
            let body = doc.body().unwrap();
            doc.append(&body, "aside", &[("class", "ad")])
        };

        let report = engine
            .run_safe_actions_now(&SafeActions::parse(r#"{ "remove": ["aside.ad"] }"#))
            .await;

        assert_eq!(report.touched, 1);
        assert!(!ad.is_connected());
        assert!(engine.sink().entries().is_empty());
    }
}
