//! Background (service worker) side: the store-backed log, tab injection on
//! behalf of content scripts, and picker drafts.

use cfg_core::apply_now::apply_now;
use cfg_core::draft::draft_from_pick;
use cfg_core::host::{CssSource, ScriptHost, ScriptRequest};
use cfg_core::logs::{LogSink, StoreLogSink};
use cfg_core::picker::PickResult;
use cfg_core::types::{LogEntry, Rule, World, DRAFT_STORAGE_KEY};
use wasm_bindgen::prelude::*;

use crate::chrome::{open_options_page, storage_write, ChromeStore, TabScriptHost};
use crate::convert::{from_js, set};

/// Append one entry to the persisted log ring.
pub async fn append_log(entry: JsValue) -> Result<(), JsValue> {
    let entry: LogEntry = from_js(&entry)?;
    StoreLogSink::new(ChromeStore)
        .append(entry)
        .await
        .map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Inject every effect of `rule` into `tab_id` right away.
pub async fn apply_rule_now(tab_id: i32, rule: JsValue) -> Result<JsValue, JsValue> {
    let rule: Rule = from_js(&rule)?;
    let report = apply_now(&TabScriptHost::new(tab_id), &rule).await;

    let result = js_sys::Object::new();
    set(&result, "ok", &JsValue::from(report.failed.is_empty()));
    set(&result, "succeeded", &JsValue::from(report.succeeded as u32));
    let errors: js_sys::Array = report
        .failed
        .iter()
        .map(|e| JsValue::from_str(&e.to_string()))
        .collect();
    set(&result, "errors", &errors);
    Ok(result.into())
}

pub async fn execute_files(tab_id: i32, files: Vec<String>, world: &str) -> Result<(), JsValue> {
    let world = match world {
        "MAIN" => World::Main,
        _ => World::Isolated,
    };
    TabScriptHost::new(tab_id)
        .execute(ScriptRequest::files(&files, world))
        .await
        .map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Insert either inline `css` or a packaged `file`; `css` wins when both
/// are given.
pub async fn insert_css(tab_id: i32, css: Option<String>, file: Option<String>) -> Result<(), JsValue> {
    let source = match (css, file) {
        (Some(css), _) => CssSource::Inline(css),
        (None, Some(file)) => CssSource::File(file),
        (None, None) => return Err(JsValue::from_str("nothing to insert")),
    };
    TabScriptHost::new(tab_id)
        .insert_css(source)
        .await
        .map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Turn a pick into a draft rule, stash it for the options page and open it.
pub async fn picker_result(pick: JsValue) -> Result<JsValue, JsValue> {
    let pick: PickResult = from_js(&pick)?;
    let draft = draft_from_pick(&pick, js_sys::Date::now() as u64);
    storage_write(DRAFT_STORAGE_KEY, &draft)
        .await
        .map_err(|e| JsValue::from_str(&e.to_string()))?;
    log::info!("draft {} saved for {}", draft.id, pick.url);
    if let Err(e) = open_options_page().await {
        log::warn!("options page not opened: {}", crate::convert::describe(&e));
    }
    Ok(JsValue::from_str(&draft.id))
}
