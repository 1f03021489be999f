//! DOM surface consumed by the engine, the cosmetic cleaner and the picker.
//!
//! The browser implementation lives in `cfg-wasm` on top of `web-sys`; tests
//! use the in-memory tree in [`mock`].

#[cfg(test)]
pub(crate) mod mock;

use crate::error::DomError;

/// `document.readyState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReadyState {
    Loading,
    Interactive,
    Complete,
}

impl ReadyState {
    /// Parse the DOM string; anything unknown is treated as still loading.
    pub fn parse(s: &str) -> Self {
        match s {
            "complete" => Self::Complete,
            "interactive" => Self::Interactive,
            _ => Self::Loading,
        }
    }

    /// Parsing has finished (`DOMContentLoaded` has fired or is firing).
    pub fn is_parsed(self) -> bool {
        self >= Self::Interactive
    }

    /// The load event has fired.
    pub fn is_complete(self) -> bool {
        self == Self::Complete
    }
}

/// An element handle. Handles are cheap to clone and compare by identity.
pub trait DomElement: Clone + PartialEq {
    /// Lowercase tag name.
    fn tag_name(&self) -> String;
    fn id(&self) -> String;
    fn class_name(&self) -> String;
    fn get_attribute(&self, name: &str) -> Option<String>;
    fn set_attribute(&self, name: &str, value: &str) -> Result<(), DomError>;
    fn parent_element(&self) -> Option<Self>;
    fn previous_element_sibling(&self) -> Option<Self>;
    fn text_content(&self) -> String;
    /// Descendants of this element matching `selector`, in document order.
    fn query_selector_all(&self, selector: &str) -> Result<Vec<Self>, DomError>;
    /// Whether this element itself matches `selector`.
    fn matches(&self, selector: &str) -> Result<bool, DomError>;
    fn set_style_property(&self, name: &str, value: &str, important: bool) -> Result<(), DomError>;
    fn remove_style_property(&self, name: &str) -> Result<(), DomError>;
    fn click(&self);
    /// Detach from the tree. Removing a detached element is a no-op.
    fn remove(&self);

    /// Whitespace-separated class tokens.
    fn class_list(&self) -> Vec<String> {
        self.class_name().split_whitespace().map(str::to_owned).collect()
    }
}

/// The page document.
pub trait Document {
    type Element: DomElement;

    fn ready_state(&self) -> ReadyState;
    /// `<html>`
    fn document_element(&self) -> Option<Self::Element>;
    fn body(&self) -> Option<Self::Element>;
    fn query_selector_all(&self, selector: &str) -> Result<Vec<Self::Element>, DomError>;

    fn query_selector_exists(&self, selector: &str) -> Result<bool, DomError> {
        Ok(!self.query_selector_all(selector)?.is_empty())
    }

    /// Append a `<style data-cfg-rule=rule_id>` with `css` to head (or root).
    fn inject_style(&self, rule_id: &str, css: &str) -> Result<(), DomError>;

    /// Append a `<link rel=stylesheet data-cfg-rule=rule_id>` pointing at a
    /// packaged extension file.
    fn inject_stylesheet(&self, rule_id: &str, file: &str) -> Result<(), DomError>;
}

/// Nearest inclusive ancestor satisfying `pred`, never walking past `stop`
/// (which is itself excluded).
pub fn closest_where<E, F>(el: &E, stop: Option<&E>, mut pred: F) -> Option<E>
where
    E: DomElement,
    F: FnMut(&E) -> bool,
{
    let mut cur = Some(el.clone());
    while let Some(node) = cur {
        if stop == Some(&node) {
            return None;
        }
        if pred(&node) {
            return Some(node);
        }
        cur = node.parent_element();
    }
    None
}
