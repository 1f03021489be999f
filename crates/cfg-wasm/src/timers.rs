//! Timers, the browser clock and method hooking.

use cfg_core::host::Clock;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;

use crate::convert::get;

#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserClock;

impl Clock for BrowserClock {
    fn now_ms(&self) -> f64 {
        web_sys::window()
            .and_then(|w| w.performance())
            .map(|p| p.now())
            .unwrap_or_else(js_sys::Date::now)
    }

    fn epoch_ms(&self) -> u64 {
        js_sys::Date::now() as u64
    }

    async fn sleep(&self, ms: u32) {
        let promise = js_sys::Promise::new(&mut |resolve, _reject| {
            if let Some(window) = web_sys::window() {
                let _ = window.set_timeout_with_callback_and_timeout_and_arguments_0(&resolve, ms as i32);
            }
        });
        let _ = JsFuture::from(promise).await;
    }
}

/// Run `f` once after `ms`. The closure is released after it fires.
pub fn set_timeout(ms: i32, f: impl FnOnce() + 'static) -> Result<i32, JsValue> {
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
    let callback = Closure::once_into_js(f);
    window.set_timeout_with_callback_and_timeout_and_arguments_0(callback.unchecked_ref(), ms)
}

/// Run `f` every `ms` for the lifetime of the page.
pub fn set_interval(ms: i32, f: impl FnMut() + 'static) -> Result<i32, JsValue> {
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
    let callback = Closure::<dyn FnMut()>::new(f);
    let id = window.set_interval_with_callback_and_timeout_and_arguments_0(callback.as_ref().unchecked_ref(), ms)?;
    callback.forget();
    Ok(id)
}

#[wasm_bindgen(inline_js = "export function wrap_with_hook(original, hook) {
    return function (...args) {
        const result = original.apply(this, args);
        try { hook(result); } catch (e) { console.warn('[cfg-AdBlocker] hook failed', e); }
        return result;
    };
}")]
extern "C" {
    fn wrap_with_hook(original: &JsValue, hook: &JsValue) -> JsValue;
}

/// Replace `target[name]` with a wrapper that calls the original and then
/// `hook` with its return value. The hook lives for the page lifetime.
pub fn wrap_method(target: &JsValue, name: &str, hook: impl FnMut(JsValue) + 'static) -> Result<(), JsValue> {
    let original = get(target, name);
    if !original.is_function() {
        return Err(JsValue::from_str(&format!("{} is not a function", name)));
    }
    let hook = Closure::<dyn FnMut(JsValue)>::new(hook);
    let wrapped = wrap_with_hook(&original, hook.as_ref());
    if !js_sys::Reflect::set(target, &JsValue::from_str(name), &wrapped)? {
        return Err(JsValue::from_str(&format!("{} is read-only", name)));
    }
    hook.forget();
    Ok(())
}
