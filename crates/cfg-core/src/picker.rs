//! Interactive element picker.
//!
//! The host forwards pointer and key events; the picker tracks the element
//! under the cursor and, on click, produces a CSS selector that identifies
//! it. Event capture, default prevention and the outline overlay are the
//! host's job. The overlay geometry is computed here.

use serde::{Deserialize, Serialize};

use crate::dom::DomElement;

/// Class tokens kept per path segment.
const MAX_CLASSES: usize = 2;

/// Backslash-escape every character outside `[A-Za-z0-9_-]`.
pub fn css_escape(ident: &str) -> String {
    let mut out = String::with_capacity(ident.len());
    for c in ident.chars() {
        if !(c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// 1-based position among preceding siblings with the same tag.
fn nth_of_type<E: DomElement>(el: &E) -> usize {
    let tag = el.tag_name();
    let mut index = 1;
    let mut sib = el.previous_element_sibling();
    while let Some(s) = sib {
        if s.tag_name() == tag {
            index += 1;
        }
        sib = s.previous_element_sibling();
    }
    index
}

fn segment<E: DomElement>(el: &E) -> (String, bool) {
    let tag = el.tag_name();
    let id = el.id();
    if !id.is_empty() {
        return (format!("#{}", css_escape(&id)), true);
    }
    let mut part = format!("{}:nth-of-type({})", tag, nth_of_type(el));
    for class in el.class_list().iter().take(MAX_CLASSES) {
        part.push('.');
        part.push_str(&css_escape(class));
    }
    (part, false)
}

/// Selector for `el`: path segments from the nearest ancestor with an id (or
/// from just below `body`) down to `el`, joined with ` > `.
pub fn unique_selector<E: DomElement>(el: &E, body: Option<&E>, root: Option<&E>) -> String {
    if root == Some(el) {
        return "html".to_string();
    }
    if body == Some(el) {
        return "body".to_string();
    }

    let mut parts = Vec::new();
    let mut cur = Some(el.clone());
    while let Some(node) = cur {
        if body == Some(&node) {
            break;
        }
        let (part, anchored) = segment(&node);
        parts.push(part);
        if anchored {
            break;
        }
        cur = node.parent_element();
    }
    parts.reverse();
    parts.join(" > ")
}

/// What the picker reports once an element is chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct PickResult {
    pub selector: String,
    pub url: String,
}

/// Viewport rectangle of an element.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// Border width of the hover outline.
pub const OUTLINE_BORDER_PX: f64 = 2.0;

/// Viewport box for the fixed-position outline overlay. The overlay's border
/// sits outside the element so it never covers the element's own edge.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OutlineBox {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl OutlineBox {
    pub fn from_rect(rect: Rect) -> Self {
        Self {
            left: rect.left - OUTLINE_BORDER_PX,
            top: rect.top - OUTLINE_BORDER_PX,
            width: rect.width,
            height: rect.height,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PickerEvent<E> {
    Hover(E),
    Click(E),
    Escape,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickerStep {
    /// Still picking; redraw the outline if the hovered element changed.
    Continue,
    Picked(PickResult),
    Cancelled,
}

/// Picker state; at most one is active per page.
#[derive(Debug, Clone)]
pub struct Picker<E> {
    active: bool,
    hovered: Option<E>,
}

impl<E> Default for Picker<E> {
    fn default() -> Self {
        Self {
            active: false,
            hovered: None,
        }
    }
}

impl<E: DomElement> Picker<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activate. Returns false when a pick is already in progress.
    pub fn start(&mut self) -> bool {
        if self.active {
            return false;
        }
        self.active = true;
        self.hovered = None;
        true
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn hovered(&self) -> Option<&E> {
        self.hovered.as_ref()
    }

    /// Feed one event. Events after the picker stopped are ignored.
    pub fn handle(&mut self, event: PickerEvent<E>, body: Option<&E>, root: Option<&E>, url: &str) -> PickerStep {
        if !self.active {
            return PickerStep::Cancelled;
        }
        match event {
            PickerEvent::Hover(el) => {
                self.hovered = Some(el);
                PickerStep::Continue
            }
            PickerEvent::Click(target) => {
                let chosen = self.hovered.take().unwrap_or(target);
                self.active = false;
                let selector = unique_selector(&chosen, body, root);
                log::info!("picked {}", selector);
                PickerStep::Picked(PickResult {
                    selector,
                    url: url.to_string(),
                })
            }
            PickerEvent::Escape => {
                self.stop();
                PickerStep::Cancelled
            }
        }
    }

    pub fn stop(&mut self) {
        self.active = false;
        self.hovered = None;
    }
}
