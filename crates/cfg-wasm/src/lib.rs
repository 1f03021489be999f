//! WebAssembly bindings for cfg-AdBlocker
//!
//! Exports for the three extension contexts: the content script (rule
//! engine and watchers), the picker, and the background worker. The options
//! page uses the pure helpers at the bottom.

mod background;
mod chrome;
mod console;
mod content;
mod convert;
mod picker;
mod timers;
mod web_dom;

use std::cell::RefCell;
use std::rc::Rc;

use cfg_core::draft::{draft_from_pick, pattern_for_scope, upsert_draft};
use cfg_core::effects::run_safe_actions;
use cfg_core::picker::PickResult;
use cfg_core::store::state_from_export;
use cfg_core::types::{Rule, SafeActions, Scope, StoreState};
use cfg_core::validate::validate_export;
use cfg_core::ReadyState;
use log::LevelFilter;
use wasm_bindgen::prelude::*;

use crate::content::ContentRuntime;
use crate::convert::{from_js, set, to_js, to_json};
use crate::timers::BrowserClock;
use crate::web_dom::WebDocument;

thread_local! {
    static RUNTIME: RefCell<Option<Rc<ContentRuntime>>> = const { RefCell::new(None) };
}

fn parse_level(level: Option<String>) -> LevelFilter {
    level
        .as_deref()
        .and_then(|l| l.parse().ok())
        .unwrap_or(LevelFilter::Info)
}

#[wasm_bindgen]
pub fn init_logging(level: Option<String>) {
    console::init(parse_level(level));
}

/// Start the content-script runtime for this document. Idempotent.
#[wasm_bindgen]
pub fn start_content_script() -> Result<(), JsValue> {
    console::ensure(LevelFilter::Info);
    if RUNTIME.with(|r| r.borrow().is_some()) {
        return Ok(());
    }
    let doc = WebDocument::current().ok_or_else(|| JsValue::from_str("no document"))?;
    let runtime = ContentRuntime::new(doc);
    runtime.start();
    RUNTIME.with(|r| *r.borrow_mut() = Some(runtime));
    Ok(())
}

#[wasm_bindgen]
pub fn is_started() -> bool {
    RUNTIME.with(|r| r.borrow().is_some())
}

/// Rules applied in the current page view.
#[wasm_bindgen]
pub fn applied_count() -> u32 {
    RUNTIME.with(|r| r.borrow().as_ref().map_or(0, |rt| rt.session.applied_count() as u32))
}

#[wasm_bindgen]
pub fn start_picker() -> Result<(), JsValue> {
    console::ensure(LevelFilter::Info);
    picker::start()
}

/// Run a safe-actions document against the current page, outside any rule.
#[wasm_bindgen]
pub async fn run_safe_actions_now(actions: JsValue) -> Result<JsValue, JsValue> {
    let actions = SafeActions::from_value(&to_json(&actions).map_err(|e| JsValue::from_str(&e))?);
    let doc = WebDocument::current().ok_or_else(|| JsValue::from_str("no document"))?;
    let report = run_safe_actions(&doc, &BrowserClock, &actions).await;

    let result = js_sys::Object::new();
    set(&result, "steps", &JsValue::from(report.steps as u32));
    set(&result, "touched", &JsValue::from(report.touched as u32));
    set(&result, "waitsSatisfied", &JsValue::from(report.waits_satisfied as u32));
    set(&result, "waitsTimedOut", &JsValue::from(report.waits_timed_out as u32));
    let errors: js_sys::Array = report
        .errors
        .iter()
        .map(|e| JsValue::from_str(&e.to_string()))
        .collect();
    set(&result, "errors", &errors);
    set(&result, "summary", &JsValue::from_str(&report.summary()));
    Ok(result.into())
}

// =============================================================================
// Background
// =============================================================================

#[wasm_bindgen]
pub async fn background_append_log(entry: JsValue) -> Result<(), JsValue> {
    background::append_log(entry).await
}

#[wasm_bindgen]
pub async fn background_apply_now(tab_id: i32, rule: JsValue) -> Result<JsValue, JsValue> {
    background::apply_rule_now(tab_id, rule).await
}

#[wasm_bindgen]
pub async fn background_execute_files(tab_id: i32, files: Vec<String>, world: String) -> Result<(), JsValue> {
    background::execute_files(tab_id, files, &world).await
}

#[wasm_bindgen]
pub async fn background_insert_css(tab_id: i32, css: Option<String>, file: Option<String>) -> Result<(), JsValue> {
    background::insert_css(tab_id, css, file).await
}

#[wasm_bindgen]
pub async fn background_picker_result(pick: JsValue) -> Result<JsValue, JsValue> {
    background::picker_result(pick).await
}

// =============================================================================
// Editor helpers
// =============================================================================

#[wasm_bindgen]
pub fn initial_state() -> Result<JsValue, JsValue> {
    to_js(&StoreState::initial())
}

/// Which rules a page view of `url` would apply, and when. `null` state
/// means nothing is stored yet.
#[wasm_bindgen]
pub fn preview_rules(state: JsValue, url: &str, ready_state: Option<String>) -> Result<JsValue, JsValue> {
    let value = to_json(&state).map_err(|e| JsValue::from_str(&e))?;
    let state = state_from_export(value).map_err(|e| JsValue::from_str(&e.to_string()))?;
    let ready = ReadyState::parse(ready_state.as_deref().unwrap_or("loading"));

    let result = js_sys::Object::new();
    let Some(state) = state else {
        set(&result, "outcome", &JsValue::from_str("no-state"));
        return Ok(result.into());
    };
    match cfg_core::preview(&state, url, ready) {
        Ok(entries) => {
            set(&result, "outcome", &JsValue::from_str("completed"));
            let rules = js_sys::Array::new();
            for entry in entries {
                let item = js_sys::Object::new();
                set(&item, "id", &JsValue::from_str(&entry.rule.id));
                set(&item, "name", &JsValue::from_str(&entry.rule.name));
                set(&item, "priority", &JsValue::from(entry.rule.priority));
                set(&item, "gate", &JsValue::from_str(entry.gate.as_str()));
                rules.push(&item);
            }
            set(&result, "rules", &rules);
        }
        Err(outcome) => set(&result, "outcome", &JsValue::from_str(outcome.as_str())),
    }
    Ok(result.into())
}

#[wasm_bindgen]
pub fn validate_state(state: JsValue) -> Result<JsValue, JsValue> {
    let value = to_json(&state).map_err(|e| JsValue::from_str(&e))?;
    let findings = validate_export(value).map_err(|e| JsValue::from_str(&e.to_string()))?;
    let out = js_sys::Array::new();
    for finding in findings {
        let item = js_sys::Object::new();
        set(&item, "index", &JsValue::from(finding.index as u32));
        set(&item, "ruleId", &JsValue::from_str(&finding.rule_id));
        set(&item, "message", &JsValue::from_str(&finding.issue.to_string()));
        out.push(&item);
    }
    Ok(out.into())
}

#[wasm_bindgen]
pub fn draft_rule(selector: String, url: String) -> Result<JsValue, JsValue> {
    let draft = draft_from_pick(&PickResult { selector, url }, js_sys::Date::now() as u64);
    to_js(&draft)
}

/// Merge `draft` into `rules` (same pattern and scope) or append it.
/// Returns `{ rules, id }`.
#[wasm_bindgen]
pub fn upsert_draft_rule(rules: JsValue, draft: JsValue) -> Result<JsValue, JsValue> {
    let mut rules: Vec<Rule> = from_js(&rules)?;
    let draft: Rule = from_js(&draft)?;
    let id = upsert_draft(&mut rules, draft);
    let result = js_sys::Object::new();
    set(&result, "rules", &to_js(&rules)?);
    set(&result, "id", &JsValue::from_str(&id));
    Ok(result.into())
}

#[wasm_bindgen]
pub fn pattern_for(url: &str, scope: &str) -> String {
    let scope = match scope {
        "URL" => Scope::Url,
        "PATTERN" => Scope::Pattern,
        _ => Scope::Domain,
    };
    pattern_for_scope(url, scope)
}

#[wasm_bindgen]
pub fn url_matches(url: &str, pattern: &str) -> bool {
    cfg_core::matches(url, pattern)
}
