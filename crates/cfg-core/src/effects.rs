//! Effect appliers.
//!
//! A rule carries up to four kinds of effect. They are applied in a fixed
//! order through [`EffectKind`], each one isolated: a failing kind is logged
//! and the next kind still runs. Within a kind, the kind fails only if every
//! item in it failed.

use crate::dom::{DomElement, Document};
use crate::error::{DomError, EffectError};
use crate::host::{Clock, ScriptHost, ScriptRequest};
use crate::types::{LogAction, Rule, SafeActions, SetAttr, WaitFor};

/// Interval between `waitFor` selector checks.
pub const WAIT_FOR_POLL_MS: u32 = 50;

/// The effect kinds, in application order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectKind {
    InlineCss,
    CssFiles,
    ScriptFiles,
    SafeActions,
}

impl EffectKind {
    pub const ORDER: [EffectKind; 4] = [Self::InlineCss, Self::CssFiles, Self::ScriptFiles, Self::SafeActions];

    pub fn log_action(self) -> LogAction {
        match self {
            Self::InlineCss => LogAction::CssInline,
            Self::CssFiles => LogAction::CssFiles,
            Self::ScriptFiles => LogAction::JsFiles,
            Self::SafeActions => LogAction::SafeActions,
        }
    }

    /// Whether `rule` has anything of this kind to apply.
    pub fn is_present(self, rule: &Rule) -> bool {
        match self {
            Self::InlineCss => !rule.css.trim().is_empty(),
            Self::CssFiles => !rule.css_files.is_empty(),
            Self::ScriptFiles => !rule.js_files.is_empty(),
            Self::SafeActions => !rule.safe_actions.is_empty(),
        }
    }
}

/// Result of a successfully applied kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Applied {
    /// Free-form detail stored in the log entry.
    pub meta: Option<String>,
}

/// Borrowed collaborators needed to apply effects.
pub struct Effects<'a, D, X, C> {
    pub doc: &'a D,
    pub scripts: &'a X,
    pub clock: &'a C,
}

impl<'a, D, X, C> Effects<'a, D, X, C>
where
    D: Document,
    X: ScriptHost,
    C: Clock,
{
    pub fn new(doc: &'a D, scripts: &'a X, clock: &'a C) -> Self {
        Self { doc, scripts, clock }
    }

    /// Apply one kind of `rule`. `Ok(None)` means the kind was empty.
    pub async fn apply(&self, kind: EffectKind, rule: &Rule) -> Result<Option<Applied>, EffectError> {
        if !kind.is_present(rule) {
            return Ok(None);
        }
        let applied = match kind {
            EffectKind::InlineCss => self.inline_css(rule)?,
            EffectKind::CssFiles => self.css_files(rule)?,
            EffectKind::ScriptFiles => self.script_files(rule).await?,
            EffectKind::SafeActions => {
                let report = run_safe_actions(self.doc, self.clock, &rule.safe_actions).await;
                report.into_result()?
            }
        };
        Ok(Some(applied))
    }

    fn inline_css(&self, rule: &Rule) -> Result<Applied, EffectError> {
        self.doc.inject_style(&rule.id, &rule.css).map_err(EffectError::CssInline)?;
        Ok(Applied::default())
    }

    fn css_files(&self, rule: &Rule) -> Result<Applied, EffectError> {
        let mut injected = Vec::new();
        let mut last_err = None;
        for file in &rule.css_files {
            match self.doc.inject_stylesheet(&rule.id, file) {
                Ok(()) => injected.push(file.as_str()),
                Err(source) => {
                    log::warn!("rule {}: stylesheet {} failed: {}", rule.id, file, source);
                    last_err = Some(EffectError::CssFile {
                        file: file.clone(),
                        source,
                    });
                }
            }
        }
        match (injected.is_empty(), last_err) {
            (true, Some(err)) => Err(err),
            _ => Ok(Applied {
                meta: Some(injected.join(", ")),
            }),
        }
    }

    async fn script_files(&self, rule: &Rule) -> Result<Applied, EffectError> {
        self.scripts
            .execute(ScriptRequest::files(&rule.js_files, rule.world))
            .await?;
        Ok(Applied {
            meta: Some(format!("{} {}", rule.world.as_str(), rule.js_files.join(", "))),
        })
    }
}

// =============================================================================
// Safe actions
// =============================================================================

/// One DOM-level step of a [`SafeActions`] set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafeAction<'a> {
    Hide(&'a str),
    Remove(&'a str),
    Click(&'a str),
    SetAttr(&'a SetAttr),
    WaitFor(&'a WaitFor),
}

impl SafeAction<'_> {
    pub fn selector(&self) -> &str {
        match self {
            Self::Hide(s) | Self::Remove(s) | Self::Click(s) => *s,
            Self::SetAttr(a) => &a.selector,
            Self::WaitFor(w) => &w.selector,
        }
    }
}

/// Steps in execution order: every hide, then remove, click, setAttr, waitFor.
pub fn steps(actions: &SafeActions) -> Vec<SafeAction<'_>> {
    let mut out = Vec::new();
    out.extend(actions.hide.iter().map(|s| SafeAction::Hide(s)));
    out.extend(actions.remove.iter().map(|s| SafeAction::Remove(s)));
    out.extend(actions.click.iter().map(|s| SafeAction::Click(s)));
    out.extend(actions.set_attr.iter().map(SafeAction::SetAttr));
    out.extend(actions.wait_for.iter().map(SafeAction::WaitFor));
    out
}

/// Outcome of running a safe-action set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SafeActionReport {
    pub steps: usize,
    /// Elements hidden, removed, clicked or modified.
    pub touched: usize,
    pub waits_satisfied: usize,
    pub waits_timed_out: usize,
    pub errors: Vec<EffectError>,
}

impl SafeActionReport {
    pub fn into_result(mut self) -> Result<Applied, EffectError> {
        if self.steps > 0 && self.errors.len() == self.steps {
            return Err(self.errors.swap_remove(0));
        }
        Ok(Applied {
            meta: Some(self.summary()),
        })
    }

    pub fn summary(&self) -> String {
        let mut s = format!("{} elements", self.touched);
        if self.waits_satisfied + self.waits_timed_out > 0 {
            s.push_str(&format!(
                ", waits {} ok / {} timed out",
                self.waits_satisfied, self.waits_timed_out
            ));
        }
        if !self.errors.is_empty() {
            s.push_str(&format!(", {} skipped", self.errors.len()));
        }
        s
    }
}

/// Run every step of `actions`. An invalid selector skips that step only.
pub async fn run_safe_actions<D, C>(doc: &D, clock: &C, actions: &SafeActions) -> SafeActionReport
where
    D: Document,
    C: Clock,
{
    let mut report = SafeActionReport::default();
    for step in steps(actions) {
        report.steps += 1;
        match run_step(doc, clock, step).await {
            Ok(StepOutcome::Touched(n)) => report.touched += n,
            Ok(StepOutcome::Waited(true)) => report.waits_satisfied += 1,
            Ok(StepOutcome::Waited(false)) => report.waits_timed_out += 1,
            Err(source) => {
                log::warn!("safe action on {:?} skipped: {}", step.selector(), source);
                report.errors.push(EffectError::SafeAction {
                    selector: step.selector().to_string(),
                    source,
                });
            }
        }
    }
    report
}

enum StepOutcome {
    Touched(usize),
    Waited(bool),
}

async fn run_step<D, C>(doc: &D, clock: &C, step: SafeAction<'_>) -> Result<StepOutcome, DomError>
where
    D: Document,
    C: Clock,
{
    if let SafeAction::WaitFor(w) = step {
        return wait_for(doc, clock, &w.selector, w.timeout_ms).await.map(StepOutcome::Waited);
    }

    let elements = doc.query_selector_all(step.selector())?;
    for el in &elements {
        match step {
            SafeAction::Hide(_) => el.set_style_property("display", "none", true)?,
            SafeAction::Remove(_) => el.remove(),
            SafeAction::Click(_) => el.click(),
            SafeAction::SetAttr(a) => el.set_attribute(&a.name, &a.value)?,
            SafeAction::WaitFor(_) => {}
        }
    }
    Ok(StepOutcome::Touched(elements.len()))
}

/// Poll for `selector` every [`WAIT_FOR_POLL_MS`] until it matches or
/// `timeout_ms` has elapsed. Returns whether it matched.
pub async fn wait_for<D, C>(doc: &D, clock: &C, selector: &str, timeout_ms: u64) -> Result<bool, DomError>
where
    D: Document,
    C: Clock,
{
    let start = clock.now_ms();
    loop {
        if doc.query_selector_exists(selector)? {
            return Ok(true);
        }
        if clock.now_ms() - start >= timeout_ms as f64 {
            return Ok(false);
        }
        clock.sleep(WAIT_FOR_POLL_MS).await;
    }
}
