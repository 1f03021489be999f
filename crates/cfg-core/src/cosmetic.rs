//! Structural ad cleanup.
//!
//! Independently of user rules, the content script removes a fixed set of
//! ad shapes and the overlay wrappers that usually carry them, then restores
//! page scrolling that the overlay had locked. The cleaner runs once at
//! start, on every mutation batch, on every new shadow root and on a periodic
//! sweep. Subtrees not yet attached to the page (shadow roots built in a
//! component constructor) are purged too. Within one purge or one mutation
//! batch a node is removed at most once.

use bitflags::bitflags;

use crate::dom::{closest_where, DomElement, Document};
use crate::error::DomError;
use crate::url::extract_host;

/// Google Publisher Tag slots.
pub const AD_SLOT_SELECTOR: &str = r#"ins[id^="gpt_unit_"]"#;

/// Ad-network iframes.
pub const AD_IFRAME_SELECTOR: &str =
    r#"iframe[src*="googlesyndication"], iframe[src*="doubleclick"], iframe[id*="google_ads_iframe"]"#;

const OVERLAY_MARKERS: [&str; 4] = ["overlay", "interstitial", "modal", "backdrop"];

bitflags! {
    /// Ad shapes seen during a purge.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AdShape: u8 {
        const SLOT = 1 << 0;
        const IFRAME = 1 << 1;
        const SPONSORED_ROW = 1 << 2;
    }
}

/// Observer and sweep settings for the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CosmeticConfig {
    pub sweep_interval_ms: u32,
    /// Attribute changes worth re-checking a node for.
    pub observed_attributes: Vec<String>,
}

impl Default for CosmeticConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: 3000,
            observed_attributes: vec!["id".to_string(), "class".to_string(), "style".to_string()],
        }
    }
}

/// A single mutation record, reduced to what the cleaner looks at.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation<E> {
    Added(E),
    AttributeChanged(E),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub removed: usize,
    pub shapes: AdShape,
}

impl PurgeReport {
    pub fn hit(&self) -> bool {
        self.removed > 0
    }

    fn merge(&mut self, other: PurgeReport) {
        self.removed += other.removed;
        self.shapes |= other.shapes;
    }
}

/// Class, id, role or aria flags that mark a full-page overlay.
pub fn is_overlay_wrapper<E: DomElement>(el: &E) -> bool {
    let class = el.class_name();
    let id = el.id();
    if OVERLAY_MARKERS.iter().any(|m| class.contains(m) || id.contains(m)) {
        return true;
    }
    el.get_attribute("role").as_deref() == Some("dialog") || el.get_attribute("aria-modal").as_deref() == Some("true")
}

fn has_stacking_style<E: DomElement>(el: &E) -> bool {
    el.get_attribute("style").is_some_and(|s| s.contains("z-index"))
}

/// Removes known ad shapes under a root.
pub struct CosmeticCleaner<'a, D> {
    doc: &'a D,
}

impl<'a, D: Document> CosmeticCleaner<'a, D> {
    pub fn new(doc: &'a D) -> Self {
        Self { doc }
    }

    /// Remove every ad shape in `root`'s subtree (root included), whether or
    /// not the subtree is attached to the document yet.
    pub fn purge(&self, root: &D::Element) -> PurgeReport {
        let report = self.purge_into(root, &mut Vec::new());
        if report.hit() {
            self.unlock_scroll();
        }
        report
    }

    fn purge_into(&self, root: &D::Element, removed: &mut Vec<D::Element>) -> PurgeReport {
        let mut report = PurgeReport::default();
        let body = self.doc.body();
        let html = self.doc.document_element();
        let guard = Guard {
            body: body.as_ref(),
            html: html.as_ref(),
        };

        for slot in inclusive_matches(root, AD_SLOT_SELECTOR) {
            let wrapper = guard
                .closest(&slot, is_overlay_wrapper)
                .or_else(|| guard.closest(&slot, has_stacking_style))
                .unwrap_or(slot);
            if remove_once(&wrapper, removed) {
                report.removed += 1;
                report.shapes |= AdShape::SLOT;
            }
        }

        for frame in inclusive_matches(root, AD_IFRAME_SELECTOR) {
            let wrapper = guard.closest(&frame, is_overlay_wrapper).unwrap_or(frame);
            if remove_once(&wrapper, removed) {
                report.removed += 1;
                report.shapes |= AdShape::IFRAME;
            }
        }

        if report.hit() {
            log::debug!("cosmetic purge removed {} nodes ({:?})", report.removed, report.shapes);
        }
        report
    }

    /// Purge the whole document.
    pub fn sweep(&self) -> PurgeReport {
        match self.doc.document_element() {
            Some(root) => self.purge(&root),
            None => PurgeReport::default(),
        }
    }

    /// Handle one observer batch.
    pub fn on_mutations<I>(&self, batch: I) -> PurgeReport
    where
        I: IntoIterator<Item = Mutation<D::Element>>,
    {
        let mut report = PurgeReport::default();
        let mut removed = Vec::new();
        for mutation in batch {
            match mutation {
                Mutation::Added(node) => report.merge(self.purge_into(&node, &mut removed)),
                Mutation::AttributeChanged(node) => {
                    if matches_any(&node, &[AD_SLOT_SELECTOR, AD_IFRAME_SELECTOR]) {
                        report.merge(self.purge_into(&node, &mut removed));
                    }
                }
            }
        }
        if report.hit() {
            self.unlock_scroll();
        }
        report
    }

    /// Undo the scroll lock overlays put on the page.
    pub fn unlock_scroll(&self) {
        if let Some(body) = self.doc.body() {
            let result = body.set_style_property("overflow", "visible", false).and_then(|()| {
                ["position", "height", "pointer-events", "user-select"]
                    .iter()
                    .try_for_each(|p| body.remove_style_property(p))
            });
            if let Err(e) = result {
                log::debug!("scroll unlock on body failed: {}", e);
            }
        }
        if let Some(html) = self.doc.document_element() {
            if let Err(e) = html.set_style_property("overflow", "visible", false) {
                log::debug!("scroll unlock on html failed: {}", e);
            }
        }
    }
}

/// Never lets a wrapper walk reach `<body>` or `<html>`.
struct Guard<'e, E> {
    body: Option<&'e E>,
    html: Option<&'e E>,
}

impl<E: DomElement> Guard<'_, E> {
    fn closest(&self, el: &E, mut pred: impl FnMut(&E) -> bool) -> Option<E> {
        closest_where(el, self.body, |node| Some(node) != self.html && pred(node))
    }
}

fn inclusive_matches<E: DomElement>(root: &E, selector: &str) -> Vec<E> {
    let mut out = Vec::new();
    if root.matches(selector).unwrap_or(false) {
        out.push(root.clone());
    }
    match root.query_selector_all(selector) {
        Ok(found) => out.extend(found),
        Err(e) => log::debug!("cosmetic query failed: {}", e),
    }
    out
}

fn matches_any<E: DomElement>(el: &E, selectors: &[&str]) -> bool {
    selectors.iter().any(|s| el.matches(s).unwrap_or(false))
}

/// Remove `el` unless it, or an ancestor, was already removed in this pass.
fn remove_once<E: DomElement>(el: &E, removed: &mut Vec<E>) -> bool {
    let mut cur = Some(el.clone());
    while let Some(node) = cur {
        if removed.contains(&node) {
            return false;
        }
        cur = node.parent_element();
    }
    el.remove();
    removed.push(el.clone());
    true
}

// =============================================================================
// Sponsored mail rows
// =============================================================================

/// Host the sponsored-row cleaner runs on.
pub const SPONSORED_ROW_HOST: &str = "mail.google.com";

const ROW_SELECTOR: &str = "tr.zA, div.zA";
const AD_INFO_SELECTOR: &str = r#"[aria-label="Reklam bilgileri"]"#;
const SPONSORED_LABELS: [&str; 3] = ["sponsored", "sponsorlu", "reklam"];
const HIDDEN_MARKER: &str = "data-cfg-sponsored";

/// Hides promoted rows in a webmail inbox list.
pub struct SponsoredRowCleaner;

impl SponsoredRowCleaner {
    pub fn applies_to(url: &str) -> bool {
        extract_host(url).is_some_and(|h| h.to_ascii_lowercase().ends_with(SPONSORED_ROW_HOST))
    }

    /// Hide every sponsored row at or under `root`. Returns rows newly hidden.
    pub fn purge<E: DomElement>(root: &E) -> Result<PurgeReport, DomError> {
        let mut report = PurgeReport::default();
        for row in inclusive_matches(root, ROW_SELECTOR) {
            if row.get_attribute(HIDDEN_MARKER).is_some() || !Self::is_sponsored(&row)? {
                continue;
            }
            row.set_style_property("display", "none", true)?;
            row.set_attribute(HIDDEN_MARKER, "")?;
            report.removed += 1;
            report.shapes |= AdShape::SPONSORED_ROW;
        }
        Ok(report)
    }

    /// Hide sponsored rows anywhere in `doc`, starting from the root element
    /// so it works before `<body>` exists.
    pub fn sweep<D: Document>(doc: &D) -> Result<PurgeReport, DomError> {
        match doc.document_element() {
            Some(root) => Self::purge(&root),
            None => Ok(PurgeReport::default()),
        }
    }

    pub fn is_sponsored<E: DomElement>(row: &E) -> Result<bool, DomError> {
        if !row.query_selector_all(AD_INFO_SELECTOR)?.is_empty() {
            return Ok(true);
        }
        let text = row.text_content();
        Ok(SPONSORED_LABELS.iter().any(|label| contains_word(&text, label)))
    }
}

/// Case-insensitive whole-word search; word characters are ASCII
/// alphanumerics and `_`.
pub fn contains_word(haystack: &str, word: &str) -> bool {
    let hay = haystack.to_ascii_lowercase();
    let word = word.to_ascii_lowercase();
    if word.is_empty() {
        return false;
    }
    let bytes = hay.as_bytes();
    let is_word = |b: u8| b.is_ascii_alphanumeric() || b == b'_';

    let mut from = 0;
    while let Some(pos) = hay[from..].find(&word) {
        let start = from + pos;
        let end = start + word.len();
        let before_ok = start == 0 || !is_word(bytes[start - 1]);
        let after_ok = end == bytes.len() || !is_word(bytes[end]);
        if before_ok && after_ok {
            return true;
        }
        from = start + 1;
        while !hay.is_char_boundary(from) {
            from += 1;
        }
    }
    false
}
