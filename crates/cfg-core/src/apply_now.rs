//! One-shot application of a rule to an open tab, outside the page-view
//! engine: no matching, no once-per-view bookkeeping, no log entries.

use crate::error::EffectError;
use crate::host::{CssSource, ScriptHost, ScriptRequest};
use crate::types::{LocalScript, Rule};

/// One host call of an apply-now run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    InsertCss(CssSource),
    Execute(ScriptRequest),
}

/// Wrap user code so a throw is reported instead of escaping.
pub fn guard_script(code: &str) -> String {
    format!(
        "(function(){{\ntry {{\n{}\n}} catch(e){{ console.error('[cfg-AdBlocker] applyNow error', e); }}\n}})();",
        code
    )
}

/// Concatenate non-empty local script blobs into one guarded bundle.
pub fn bundle_local_js(scripts: &[LocalScript]) -> Option<String> {
    let parts: Vec<&str> = scripts
        .iter()
        .map(|s| s.content.as_str())
        .filter(|c| !c.is_empty())
        .collect();
    (!parts.is_empty()).then(|| guard_script(&parts.join("\n\n")))
}

/// Host calls for `rule`, in order: inline CSS, each stylesheet file,
/// packaged scripts, then the local-script bundle.
pub fn plan(rule: &Rule) -> Vec<Command> {
    let mut commands = Vec::new();
    if !rule.css.trim().is_empty() {
        commands.push(Command::InsertCss(CssSource::Inline(rule.css.clone())));
    }
    for file in &rule.css_files {
        commands.push(Command::InsertCss(CssSource::File(file.clone())));
    }
    let world = rule.world;
    if !rule.js_files.is_empty() {
        commands.push(Command::Execute(ScriptRequest::files(&rule.js_files, world)));
    }
    if let Some(bundle) = bundle_local_js(&rule.local_js) {
        commands.push(Command::Execute(ScriptRequest::code(bundle, world)));
    }
    commands
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyNowReport {
    pub succeeded: usize,
    pub failed: Vec<EffectError>,
}

/// Run `plan(rule)` against `host`. Every command is attempted; failures are
/// collected.
pub async fn apply_now<X: ScriptHost>(host: &X, rule: &Rule) -> ApplyNowReport {
    let mut report = ApplyNowReport::default();
    for command in plan(rule) {
        let result = match command {
            Command::InsertCss(source) => host.insert_css(source).await,
            Command::Execute(request) => host.execute(request).await,
        };
        match result {
            Ok(()) => report.succeeded += 1,
            Err(e) => {
                log::warn!("apply now of rule {}: {}", rule.id, e);
                report.failed.push(e);
            }
        }
    }
    report
}
