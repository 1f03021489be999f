//! JSON bridging between `JsValue` and serde types.
//!
//! Values cross the boundary as JSON text, which keeps the schema in one
//! place (the serde derives in `cfg-core`).

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use wasm_bindgen::JsValue;

pub fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, JsValue> {
    let text = serde_json::to_string(value).map_err(|e| JsValue::from_str(&e.to_string()))?;
    js_sys::JSON::parse(&text)
}

pub fn to_json(value: &JsValue) -> Result<Value, String> {
    if value.is_undefined() || value.is_null() {
        return Ok(Value::Null);
    }
    let text = js_sys::JSON::stringify(value).map_err(|e| format!("{:?}", e))?;
    let text: String = text.into();
    serde_json::from_str(&text).map_err(|e| e.to_string())
}

pub fn from_js<T: DeserializeOwned>(value: &JsValue) -> Result<T, JsValue> {
    let json = to_json(value).map_err(|e| JsValue::from_str(&e))?;
    serde_json::from_value(json).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Read one property, `undefined` when absent.
pub fn get(target: &JsValue, key: &str) -> JsValue {
    js_sys::Reflect::get(target, &JsValue::from_str(key)).unwrap_or(JsValue::UNDEFINED)
}

pub fn set(target: &JsValue, key: &str, value: &JsValue) {
    let _ = js_sys::Reflect::set(target, &JsValue::from_str(key), value);
}

/// Human-readable text of a thrown JS value.
pub fn describe(err: &JsValue) -> String {
    err.as_string()
        .or_else(|| get(err, "message").as_string())
        .unwrap_or_else(|| format!("{:?}", err))
}
