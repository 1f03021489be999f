//! `cfg_core::dom` on top of `web-sys`.

use cfg_core::dom::{DomElement, Document, ReadyState};
use cfg_core::DomError;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Element, HtmlElement, NodeList};

use crate::chrome;
use crate::convert::describe;

fn host_err(e: JsValue) -> DomError {
    DomError::Host(describe(&e))
}

fn selector_err(selector: &str) -> impl FnOnce(JsValue) -> DomError + '_ {
    move |_| DomError::InvalidSelector(selector.to_string())
}

fn elements(list: NodeList) -> Vec<WebElement> {
    (0..list.length())
        .filter_map(|i| list.item(i))
        .filter_map(|node| node.dyn_into::<Element>().ok())
        .map(WebElement)
        .collect()
}

/// A live DOM element.
#[derive(Debug, Clone, PartialEq)]
pub struct WebElement(pub Element);

impl WebElement {
    fn style_target(&self) -> Result<&HtmlElement, DomError> {
        self.0
            .dyn_ref::<HtmlElement>()
            .ok_or_else(|| DomError::Host(format!("<{}> has no inline style", self.tag_name())))
    }
}

impl DomElement for WebElement {
    fn tag_name(&self) -> String {
        self.0.tag_name().to_ascii_lowercase()
    }

    fn id(&self) -> String {
        self.0.id()
    }

    fn class_name(&self) -> String {
        self.0.class_name()
    }

    fn get_attribute(&self, name: &str) -> Option<String> {
        self.0.get_attribute(name)
    }

    fn set_attribute(&self, name: &str, value: &str) -> Result<(), DomError> {
        self.0.set_attribute(name, value).map_err(host_err)
    }

    fn parent_element(&self) -> Option<Self> {
        self.0.parent_element().map(WebElement)
    }

    fn previous_element_sibling(&self) -> Option<Self> {
        self.0.previous_element_sibling().map(WebElement)
    }

    fn text_content(&self) -> String {
        self.0.text_content().unwrap_or_default()
    }

    fn query_selector_all(&self, selector: &str) -> Result<Vec<Self>, DomError> {
        self.0
            .query_selector_all(selector)
            .map(elements)
            .map_err(selector_err(selector))
    }

    fn matches(&self, selector: &str) -> Result<bool, DomError> {
        self.0.matches(selector).map_err(selector_err(selector))
    }

    fn set_style_property(&self, name: &str, value: &str, important: bool) -> Result<(), DomError> {
        let style = self.style_target()?.style();
        let priority = if important { "important" } else { "" };
        style.set_property_with_priority(name, value, priority).map_err(host_err)
    }

    fn remove_style_property(&self, name: &str) -> Result<(), DomError> {
        self.style_target()?.style().remove_property(name).map(|_| ()).map_err(host_err)
    }

    fn click(&self) {
        if let Some(el) = self.0.dyn_ref::<HtmlElement>() {
            el.click();
        }
    }

    fn remove(&self) {
        self.0.remove();
    }
}

/// The page document.
#[derive(Debug, Clone)]
pub struct WebDocument {
    doc: web_sys::Document,
}

impl WebDocument {
    pub fn new(doc: web_sys::Document) -> Self {
        Self { doc }
    }

    pub fn current() -> Option<Self> {
        web_sys::window().and_then(|w| w.document()).map(Self::new)
    }

    pub fn raw(&self) -> &web_sys::Document {
        &self.doc
    }

    fn append_to_head(&self, el: &Element) -> Result<(), DomError> {
        let parent: Element = match self.doc.head() {
            Some(head) => head.into(),
            None => self.doc.document_element().ok_or(DomError::NoRoot)?,
        };
        parent.append_child(el).map(|_| ()).map_err(host_err)
    }
}

impl Document for WebDocument {
    type Element = WebElement;

    fn ready_state(&self) -> ReadyState {
        ReadyState::parse(&self.doc.ready_state())
    }

    fn document_element(&self) -> Option<WebElement> {
        self.doc.document_element().map(WebElement)
    }

    fn body(&self) -> Option<WebElement> {
        self.doc.body().map(|b| WebElement(b.into()))
    }

    fn query_selector_all(&self, selector: &str) -> Result<Vec<WebElement>, DomError> {
        self.doc
            .query_selector_all(selector)
            .map(elements)
            .map_err(selector_err(selector))
    }

    fn inject_style(&self, rule_id: &str, css: &str) -> Result<(), DomError> {
        let style = self.doc.create_element("style").map_err(host_err)?;
        style.set_attribute("data-cfg-rule", rule_id).map_err(host_err)?;
        style.set_text_content(Some(css));
        self.append_to_head(&style)
    }

    fn inject_stylesheet(&self, rule_id: &str, file: &str) -> Result<(), DomError> {
        let href = chrome::extension_url(file).map_err(host_err)?;
        let link = self.doc.create_element("link").map_err(host_err)?;
        link.set_attribute("rel", "stylesheet").map_err(host_err)?;
        link.set_attribute("href", &href).map_err(host_err)?;
        link.set_attribute("data-cfg-rule", rule_id).map_err(host_err)?;
        self.append_to_head(&link)
    }
}
