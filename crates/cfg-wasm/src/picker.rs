//! Element picker overlay and input handling.

use std::cell::RefCell;
use std::rc::Rc;

use cfg_core::dom::Document;
use cfg_core::picker::{OutlineBox, PickResult, Picker, PickerEvent, PickerStep, Rect, OUTLINE_BORDER_PX};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::spawn_local;
use web_sys::{Element, Event, HtmlElement, KeyboardEvent};

use crate::chrome::{message, send};
use crate::web_dom::{WebDocument, WebElement};

const OVERLAY_ATTR: &str = "data-cfg-picker";

type Listener = Closure<dyn FnMut(Event)>;

thread_local! {
    static ACTIVE: RefCell<Option<Rc<PickerUi>>> = const { RefCell::new(None) };
}

struct PickerUi {
    doc: WebDocument,
    picker: RefCell<Picker<WebElement>>,
    overlay: HtmlElement,
    listeners: RefCell<Vec<(&'static str, Listener)>>,
}

/// Start picking on the current page. A second call while a pick is in
/// progress is a no-op.
pub fn start() -> Result<(), JsValue> {
    if ACTIVE.with(|a| a.borrow().is_some()) {
        return Ok(());
    }
    let doc = WebDocument::current().ok_or_else(|| JsValue::from_str("no document"))?;
    let overlay = create_overlay(doc.raw())?;

    let mut picker = Picker::new();
    picker.start();
    let ui = Rc::new(PickerUi {
        doc,
        picker: RefCell::new(picker),
        overlay,
        listeners: RefCell::new(Vec::new()),
    });
    ui.listen("mousemove", |ui, event| ui.on_move(event))?;
    ui.listen("click", |ui, event| ui.on_click(event))?;
    ui.listen("keydown", |ui, event| ui.on_key(event))?;

    ACTIVE.with(|a| *a.borrow_mut() = Some(ui));
    log::info!("picker started");
    Ok(())
}

fn create_overlay(doc: &web_sys::Document) -> Result<HtmlElement, JsValue> {
    let overlay: HtmlElement = doc.create_element("div")?.dyn_into()?;
    overlay.set_attribute(OVERLAY_ATTR, "")?;
    let style = overlay.style();
    style.set_property("position", "fixed")?;
    style.set_property("pointer-events", "none")?;
    style.set_property("z-index", "2147483647")?;
    style.set_property("border", &format!("{}px solid #e0245e", OUTLINE_BORDER_PX))?;
    style.set_property("background", "rgba(224, 36, 94, 0.15)")?;
    style.set_property("display", "none")?;
    let parent: Element = match doc.body() {
        Some(body) => body.into(),
        None => doc.document_element().ok_or_else(|| JsValue::from_str("no root"))?,
    };
    parent.append_child(&overlay)?;
    Ok(overlay)
}

fn target_element(event: &Event) -> Option<Element> {
    event.target().and_then(|t| t.dyn_into::<Element>().ok())
}

impl PickerUi {
    fn listen(self: &Rc<Self>, kind: &'static str, mut f: impl FnMut(&Rc<Self>, Event) + 'static) -> Result<(), JsValue> {
        let ui = Rc::clone(self);
        let listener: Listener = Closure::new(move |event: Event| f(&ui, event));
        self.doc
            .raw()
            .add_event_listener_with_callback_and_bool(kind, listener.as_ref().unchecked_ref(), true)?;
        self.listeners.borrow_mut().push((kind, listener));
        Ok(())
    }

    fn step(&self, event: PickerEvent<WebElement>) -> PickerStep {
        let body = self.doc.body();
        let root = self.doc.document_element();
        let url = web_sys::window()
            .and_then(|w| w.location().href().ok())
            .unwrap_or_default();
        self.picker
            .borrow_mut()
            .handle(event, body.as_ref(), root.as_ref(), &url)
    }

    fn is_overlay(&self, el: &Element) -> bool {
        el.has_attribute(OVERLAY_ATTR)
    }

    fn on_move(self: &Rc<Self>, event: Event) {
        let Some(el) = target_element(&event) else {
            return;
        };
        if self.is_overlay(&el) {
            return;
        }
        let rect = el.get_bounding_client_rect();
        self.step(PickerEvent::Hover(WebElement(el)));
        let outline = OutlineBox::from_rect(Rect {
            left: rect.left(),
            top: rect.top(),
            width: rect.width(),
            height: rect.height(),
        });
        self.draw(outline);
    }

    fn draw(&self, outline: OutlineBox) {
        let style = self.overlay.style();
        let _ = style.set_property("left", &format!("{}px", outline.left));
        let _ = style.set_property("top", &format!("{}px", outline.top));
        let _ = style.set_property("width", &format!("{}px", outline.width));
        let _ = style.set_property("height", &format!("{}px", outline.height));
        let _ = style.set_property("display", "block");
    }

    fn on_click(self: &Rc<Self>, event: Event) {
        event.prevent_default();
        event.stop_propagation();
        let Some(el) = target_element(&event) else {
            return;
        };
        if let PickerStep::Picked(result) = self.step(PickerEvent::Click(WebElement(el))) {
            self.teardown();
            spawn_local(report(result));
        }
    }

    fn on_key(self: &Rc<Self>, event: Event) {
        let Some(key) = event.dyn_ref::<KeyboardEvent>().map(|k| k.key()) else {
            return;
        };
        if key != "Escape" {
            return;
        }
        event.prevent_default();
        if self.step(PickerEvent::Escape) == PickerStep::Cancelled {
            log::info!("picker cancelled");
            self.teardown();
        }
    }

    fn teardown(&self) {
        self.picker.borrow_mut().stop();
        self.overlay.remove();
        let listeners: Vec<_> = self.listeners.borrow_mut().drain(..).collect();
        for (kind, listener) in &listeners {
            let _ = self
                .doc
                .raw()
                .remove_event_listener_with_callback_and_bool(kind, listener.as_ref().unchecked_ref(), true);
        }
        ACTIVE.with(|a| a.borrow_mut().take());
        // Teardown runs inside one of these listeners; release them once the
        // current event has returned.
        spawn_local(async move { drop(listeners) });
    }
}

async fn report(result: PickResult) {
    match send(message::PICKER_RESULT, &result).await {
        Ok(_) => log::info!("picked {} on {}", result.selector, result.url),
        Err(e) => log::error!("picker result not delivered: {}", e),
    }
}
