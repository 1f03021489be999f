//! Extension API bindings and the collaborators built on them.

use cfg_core::host::{CssSource, ScriptHost, ScriptRequest, ScriptSource};
use cfg_core::logs::LogSink;
use cfg_core::store::RuleStore;
use cfg_core::types::{LogEntry, World, STORAGE_KEY};
use cfg_core::{EffectError, SinkError, StoreError};
use serde::Serialize;
use wasm_bindgen::prelude::*;

use crate::convert::{describe, get, set, to_js, to_json};

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(catch, js_namespace = ["chrome", "storage", "local"], js_name = get)]
    async fn storage_get(keys: &JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "storage", "local"], js_name = set)]
    async fn storage_set(items: &JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "runtime"], js_name = sendMessage)]
    async fn runtime_send_message(message: &JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "runtime"], js_name = getURL)]
    fn runtime_get_url(path: &str) -> Result<String, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "runtime"], js_name = openOptionsPage)]
    async fn runtime_open_options_page() -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "scripting"], js_name = executeScript)]
    async fn scripting_execute_script(injection: &JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "scripting"], js_name = insertCSS)]
    async fn scripting_insert_css(injection: &JsValue) -> Result<JsValue, JsValue>;
}

/// Message types exchanged between content script and background.
pub mod message {
    pub const LOGS_ADD: &str = "CFG_LOGS_ADD";
    pub const EXECUTE_JS_FILES: &str = "CFG_EXECUTE_JS_FILES";
    pub const INSERT_CSS: &str = "CFG_INSERT_CSS";
    pub const PICKER_RESULT: &str = "CFG_PICKER_RESULT";
}

pub fn extension_url(path: &str) -> Result<String, JsValue> {
    runtime_get_url(path)
}

pub async fn open_options_page() -> Result<(), JsValue> {
    runtime_open_options_page().await.map(|_| ())
}

/// Send `{ type, ...payload }` to the background and fail on `{ ok: false }`.
pub async fn send<T: Serialize>(kind: &str, payload: &T) -> Result<JsValue, String> {
    let message = to_js(payload).map_err(|e| describe(&e))?;
    set(&message, "type", &JsValue::from_str(kind));
    let response = runtime_send_message(&message).await.map_err(|e| describe(&e))?;
    if get(&response, "ok").as_bool() == Some(false) {
        let error = get(&response, "error").as_string().unwrap_or_else(|| "rejected".to_string());
        return Err(error);
    }
    Ok(response)
}

/// Read raw storage entries by key.
pub async fn storage_read(key: &str) -> Result<serde_json::Value, StoreError> {
    let items = storage_get(&JsValue::from_str(key))
        .await
        .map_err(|e| StoreError::Read(describe(&e)))?;
    to_json(&get(&items, key)).map_err(StoreError::Decode)
}

pub async fn storage_write<T: Serialize>(key: &str, value: &T) -> Result<(), StoreError> {
    let items = js_sys::Object::new();
    let value = to_js(value).map_err(|e| StoreError::Write(describe(&e)))?;
    set(&items, key, &value);
    storage_set(&items)
        .await
        .map(|_| ())
        .map_err(|e| StoreError::Write(describe(&e)))
}

/// `chrome.storage.local` under the `cfgState` key.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromeStore;

impl RuleStore for ChromeStore {
    async fn read_raw(&self) -> Result<serde_json::Value, StoreError> {
        storage_read(STORAGE_KEY).await
    }

    async fn write_raw(&self, doc: serde_json::Value) -> Result<(), StoreError> {
        storage_write(STORAGE_KEY, &doc).await
    }
}

#[derive(Serialize)]
struct LogMessage<'a> {
    entry: &'a LogEntry,
}

/// Content-script sink: forwards entries to the background, which owns the
/// store-backed log.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageLogSink;

impl LogSink for MessageLogSink {
    async fn append(&self, entry: LogEntry) -> Result<(), SinkError> {
        send(message::LOGS_ADD, &LogMessage { entry: &entry })
            .await
            .map(|_| ())
            .map_err(SinkError)
    }
}

#[derive(Serialize)]
struct FilesMessage<'a> {
    files: &'a [String],
    world: World,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CssMessage<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    css: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file: Option<&'a str>,
}

impl<'a> CssMessage<'a> {
    fn new(source: &'a CssSource) -> Self {
        match source {
            CssSource::Inline(css) => Self {
                css: Some(css),
                file: None,
            },
            CssSource::File(file) => Self {
                css: None,
                file: Some(file),
            },
        }
    }
}

/// Content-script script host: asks the background to inject into this tab.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageScriptHost;

impl ScriptHost for MessageScriptHost {
    async fn execute(&self, request: ScriptRequest) -> Result<(), EffectError> {
        let ScriptSource::Files(files) = &request.source else {
            return Err(EffectError::Script("inline code is not run from the page".to_string()));
        };
        let msg = FilesMessage {
            files,
            world: request.world,
        };
        send(message::EXECUTE_JS_FILES, &msg)
            .await
            .map(|_| ())
            .map_err(EffectError::Script)
    }

    async fn insert_css(&self, source: CssSource) -> Result<(), EffectError> {
        send(message::INSERT_CSS, &CssMessage::new(&source))
            .await
            .map(|_| ())
            .map_err(EffectError::Script)
    }
}

// Serialized by `chrome.scripting` and run inside the tab.
#[wasm_bindgen(inline_js = "export function run_code_func() {
    return (code) => {
        try { (new Function(code))(); } catch (e) { console.error('[cfg-AdBlocker] applyNow error', e); }
    };
}")]
extern "C" {
    fn run_code_func() -> JsValue;
}

/// Background-side host: `chrome.scripting` against one tab.
#[derive(Debug, Clone, Copy)]
pub struct TabScriptHost {
    tab_id: i32,
}

impl TabScriptHost {
    pub fn new(tab_id: i32) -> Self {
        Self { tab_id }
    }

    fn injection(&self) -> js_sys::Object {
        let target = js_sys::Object::new();
        set(&target, "tabId", &JsValue::from(self.tab_id));
        let injection = js_sys::Object::new();
        set(&injection, "target", &target);
        injection
    }
}

fn string_array(items: &[String]) -> js_sys::Array {
    items.iter().map(|s| JsValue::from_str(s)).collect()
}

impl ScriptHost for TabScriptHost {
    async fn execute(&self, request: ScriptRequest) -> Result<(), EffectError> {
        let injection = self.injection();
        set(&injection, "world", &JsValue::from_str(request.world.as_str()));
        match &request.source {
            ScriptSource::Files(files) => set(&injection, "files", &string_array(files)),
            ScriptSource::Code(code) => {
                set(&injection, "func", &run_code_func());
                let args = js_sys::Array::of1(&JsValue::from_str(code));
                set(&injection, "args", &args);
            }
        }
        scripting_execute_script(&injection)
            .await
            .map(|_| ())
            .map_err(|e| EffectError::Script(describe(&e)))
    }

    async fn insert_css(&self, source: CssSource) -> Result<(), EffectError> {
        let injection = self.injection();
        match &source {
            CssSource::Inline(css) => set(&injection, "css", &JsValue::from_str(css)),
            CssSource::File(file) => set(&injection, "files", &string_array(std::slice::from_ref(file))),
        }
        scripting_insert_css(&injection)
            .await
            .map(|_| ())
            .map_err(|e| EffectError::Script(describe(&e)))
    }
}
