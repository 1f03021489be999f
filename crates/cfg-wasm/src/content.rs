//! Content-script runtime: one engine and one page session per document,
//! plus the watchers that keep them fed.

use std::rc::Rc;

use cfg_core::cosmetic::{CosmeticCleaner, CosmeticConfig, Mutation, SponsoredRowCleaner};
use cfg_core::spa::{NavSignal, NavigationWatcher};
use cfg_core::{Document, Engine, LifecycleEvent, PageSession, PassReport, ReadyState};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::spawn_local;
use web_sys::{AddEventListenerOptions, Element, MutationObserver, MutationObserverInit, MutationRecord};

use crate::chrome::{ChromeStore, MessageLogSink, MessageScriptHost};
use crate::convert::describe;
use crate::timers::{set_interval, set_timeout, wrap_method, BrowserClock};
use crate::web_dom::{WebDocument, WebElement};

pub type PageEngine = Engine<WebDocument, ChromeStore, MessageLogSink, MessageScriptHost, BrowserClock>;

pub struct ContentRuntime {
    pub engine: PageEngine,
    pub session: PageSession,
    nav: NavigationWatcher,
    cosmetic: CosmeticConfig,
}

fn current_url() -> String {
    web_sys::window()
        .and_then(|w| w.location().href().ok())
        .unwrap_or_default()
}

impl ContentRuntime {
    pub fn new(doc: WebDocument) -> Rc<Self> {
        Rc::new(Self {
            engine: Engine::new(doc, ChromeStore, MessageLogSink, MessageScriptHost, BrowserClock),
            session: PageSession::new(&current_url()),
            nav: NavigationWatcher::default(),
            cosmetic: CosmeticConfig::default(),
        })
    }

    fn doc(&self) -> &WebDocument {
        self.engine.document()
    }

    /// Wire everything up and run the first pass. A watcher that cannot be
    /// installed is logged and skipped; the pass runs regardless.
    pub fn start(self: &Rc<Self>) {
        installed("lifecycle listeners", self.install_lifecycle_listeners());
        self.install_cosmetic_watchers();
        self.install_navigation_watcher();
        if SponsoredRowCleaner::applies_to(&current_url()) {
            installed("sponsored row watcher", self.install_sponsored_row_watcher());
        }
        self.spawn_pass(current_url());
    }

    fn spawn_pass(self: &Rc<Self>, url: String) {
        let rt = Rc::clone(self);
        spawn_local(async move {
            let result = rt.engine.run_pass(&rt.session, &url).await;
            rt.after_pass(result.map(Some));
        });
    }

    fn after_pass(self: &Rc<Self>, result: Result<Option<PassReport>, cfg_core::StoreError>) {
        match result {
            Ok(Some(report)) if report.wants_idle_timer => {
                let rt = Rc::clone(self);
                let scheduled = set_timeout(0, move || rt.spawn_lifecycle(LifecycleEvent::IdleTimeout));
                if let Err(e) = scheduled {
                    log::warn!("idle timer not scheduled: {}", describe(&e));
                }
            }
            Ok(_) => {}
            Err(e) => log::error!("rule pass failed: {}", e),
        }
    }

    fn spawn_lifecycle(self: &Rc<Self>, event: LifecycleEvent) {
        let rt = Rc::clone(self);
        spawn_local(async move {
            let applied = rt.engine.on_lifecycle(&rt.session, event).await;
            if !applied.is_empty() {
                log::debug!("{:?} released {} rules", event, applied.len());
            }
        });
    }

    fn install_lifecycle_listeners(self: &Rc<Self>) -> Result<(), JsValue> {
        let ready = self.doc().ready_state();
        let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
        let options = AddEventListenerOptions::new();
        options.set_once(true);

        if !ready.is_parsed() {
            let rt = Rc::clone(self);
            let on_parsed = Closure::once_into_js(move || rt.spawn_lifecycle(LifecycleEvent::DomContentLoaded));
            self.doc().raw().add_event_listener_with_callback_and_add_event_listener_options(
                "DOMContentLoaded",
                on_parsed.unchecked_ref(),
                &options,
            )?;
        }
        if ready != ReadyState::Complete {
            let rt = Rc::clone(self);
            let on_load = Closure::once_into_js(move || rt.spawn_lifecycle(LifecycleEvent::Load));
            window.add_event_listener_with_callback_and_add_event_listener_options(
                "load",
                on_load.unchecked_ref(),
                &options,
            )?;
        }
        Ok(())
    }

    fn install_cosmetic_watchers(self: &Rc<Self>) {
        CosmeticCleaner::new(self.doc()).sweep();
        match self.install_cosmetic_observer() {
            Ok(observer) => installed("shadow root hook", self.install_shadow_root_hook(observer)),
            Err(e) => log::warn!("cosmetic observer not installed: {}", describe(&e)),
        }
        let rt = Rc::clone(self);
        let sweep = set_interval(self.cosmetic.sweep_interval_ms as i32, move || {
            CosmeticCleaner::new(rt.doc()).sweep();
        });
        installed("cosmetic sweep", sweep.map(|_| ()));
    }

    fn install_cosmetic_observer(self: &Rc<Self>) -> Result<MutationObserver, JsValue> {
        let rt = Rc::clone(self);
        let on_records = Closure::<dyn FnMut(js_sys::Array, MutationObserver)>::new(
            move |records: js_sys::Array, _observer: MutationObserver| {
                let batch = mutations(&records);
                if !batch.is_empty() {
                    CosmeticCleaner::new(rt.doc()).on_mutations(batch);
                }
            },
        );
        let observer = MutationObserver::new(on_records.as_ref().unchecked_ref())?;
        on_records.forget();

        if let Some(root) = self.doc().raw().document_element() {
            observer.observe_with_options(&root, &self.observer_init())?;
        }
        Ok(observer)
    }

    /// Shadow roots are invisible to the document observer; watch each one
    /// as it is created, attached to the page or not.
    fn install_shadow_root_hook(self: &Rc<Self>, observer: MutationObserver) -> Result<(), JsValue> {
        let element_proto = js_sys::Reflect::get(&js_sys::global(), &JsValue::from_str("Element"))
            .and_then(|ctor| js_sys::Reflect::get(&ctor, &JsValue::from_str("prototype")))?;
        let rt = Rc::clone(self);
        wrap_method(&element_proto, "attachShadow", move |root: JsValue| {
            let Ok(root) = root.dyn_into::<web_sys::ShadowRoot>() else {
                return;
            };
            if let Err(e) = observer.observe_with_options(&root, &rt.observer_init()) {
                log::debug!("shadow root not observed: {}", describe(&e));
            }
            let children = root.children();
            let cleaner = CosmeticCleaner::new(rt.doc());
            for i in 0..children.length() {
                if let Some(child) = children.item(i) {
                    cleaner.purge(&WebElement(child));
                }
            }
        })
    }

    fn observer_init(&self) -> MutationObserverInit {
        let init = MutationObserverInit::new();
        init.set_child_list(true);
        init.set_subtree(true);
        init.set_attributes(true);
        let filter: js_sys::Array = self
            .cosmetic
            .observed_attributes
            .iter()
            .map(|a| JsValue::from_str(a))
            .collect();
        init.set_attribute_filter(&filter);
        init
    }

    fn install_sponsored_row_watcher(self: &Rc<Self>) -> Result<(), JsValue> {
        self.sweep_sponsored_rows();

        let rt = Rc::clone(self);
        let on_records = Closure::<dyn FnMut(js_sys::Array, MutationObserver)>::new(
            move |_records: js_sys::Array, _observer: MutationObserver| rt.sweep_sponsored_rows(),
        );
        let observer = MutationObserver::new(on_records.as_ref().unchecked_ref())?;
        on_records.forget();

        let init = MutationObserverInit::new();
        init.set_child_list(true);
        init.set_subtree(true);
        if let Some(root) = self.doc().raw().document_element() {
            observer.observe_with_options(&root, &init)?;
        }

        let rt = Rc::clone(self);
        set_interval(self.cosmetic.sweep_interval_ms as i32, move || rt.sweep_sponsored_rows())?;
        Ok(())
    }

    fn sweep_sponsored_rows(&self) {
        match SponsoredRowCleaner::sweep(self.doc()) {
            Ok(report) if report.hit() => log::debug!("hid {} sponsored rows", report.removed),
            Ok(_) => {}
            Err(e) => log::debug!("sponsored row sweep failed: {}", e),
        }
    }

    fn install_navigation_watcher(self: &Rc<Self>) {
        let Some(window) = web_sys::window() else {
            log::warn!("navigation watcher not installed: no window");
            return;
        };
        match window.history() {
            Ok(history) => {
                let history: JsValue = history.into();
                for (method, signal) in [("pushState", NavSignal::PushState), ("replaceState", NavSignal::ReplaceState)] {
                    let rt = Rc::clone(self);
                    if let Err(e) = wrap_method(&history, method, move |_| rt.on_navigation(signal)) {
                        log::warn!("history.{} not hooked: {}", method, describe(&e));
                    }
                }
            }
            Err(e) => log::warn!("history not reachable: {}", describe(&e)),
        }

        for (event, signal) in [("popstate", NavSignal::PopState), ("hashchange", NavSignal::HashChange)] {
            let rt = Rc::clone(self);
            let listener = Closure::<dyn FnMut()>::new(move || rt.on_navigation(signal));
            match window.add_event_listener_with_callback(event, listener.as_ref().unchecked_ref()) {
                Ok(()) => listener.forget(),
                Err(e) => log::warn!("{} listener not installed: {}", event, describe(&e)),
            }
        }
    }

    fn on_navigation(self: &Rc<Self>, signal: NavSignal) {
        let rt = Rc::clone(self);
        spawn_local(async move {
            let result = rt.nav.handle(&rt.engine, &rt.session, signal, current_url).await;
            rt.after_pass(result);
        });
    }
}

fn installed(what: &str, result: Result<(), JsValue>) {
    if let Err(e) = result {
        log::warn!("{} not installed: {}", what, describe(&e));
    }
}

/// Reduce observer records to the cleaner's mutation list.
fn mutations(records: &js_sys::Array) -> Vec<Mutation<WebElement>> {
    let mut out = Vec::new();
    for record in records.iter() {
        let Ok(record) = record.dyn_into::<MutationRecord>() else {
            continue;
        };
        match record.type_().as_str() {
            "childList" => {
                let added = record.added_nodes();
                for i in 0..added.length() {
                    if let Some(el) = added.item(i).and_then(|n| n.dyn_into::<Element>().ok()) {
                        out.push(Mutation::Added(WebElement(el)));
                    }
                }
            }
            "attributes" => {
                if let Some(el) = record.target().and_then(|n| n.dyn_into::<Element>().ok()) {
                    out.push(Mutation::AttributeChanged(WebElement(el)));
                }
            }
            _ => {}
        }
    }
    out
}
