//! In-memory DOM for tests.
//!
//! Supports the selector subset the crate itself produces and consumes:
//! type, `*`, `#id`, `.class`, `[attr]`, `[attr=v]`, `[attr^=v]`,
//! `[attr*=v]`, `[attr$=v]`, `:nth-of-type(n)`, descendant and `>`
//! combinators, and comma-separated groups.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::rc::Rc;

use super::{Document, DomElement, ReadyState};
use crate::error::DomError;

#[derive(Debug, Default)]
struct Node {
    tag: String,
    attrs: Vec<(String, String)>,
    style: BTreeMap<String, (String, bool)>,
    text: String,
    parent: Option<usize>,
    children: Vec<usize>,
    clicks: u32,
}

#[derive(Debug, Default)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn add(&mut self, tag: &str, attrs: &[(&str, &str)]) -> usize {
        self.nodes.push(Node {
            tag: tag.to_ascii_lowercase(),
            attrs: attrs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            ..Node::default()
        });
        self.nodes.len() - 1
    }

    fn attach(&mut self, parent: usize, child: usize) {
        self.detach(child);
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.push(child);
    }

    fn detach(&mut self, child: usize) {
        if let Some(parent) = self.nodes[child].parent.take() {
            self.nodes[parent].children.retain(|&c| c != child);
        }
    }

    fn attr(&self, idx: usize, name: &str) -> Option<&str> {
        self.nodes[idx]
            .attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn descendants(&self, idx: usize, out: &mut Vec<usize>) {
        for &child in &self.nodes[idx].children {
            out.push(child);
            self.descendants(child, out);
        }
    }

    fn text(&self, idx: usize) -> String {
        let mut s = self.nodes[idx].text.clone();
        for &child in &self.nodes[idx].children {
            s.push_str(&self.text(child));
        }
        s
    }

    fn nth_of_type(&self, idx: usize) -> usize {
        let Some(parent) = self.nodes[idx].parent else {
            return 1;
        };
        let tag = &self.nodes[idx].tag;
        let mut n = 0;
        for &sib in &self.nodes[parent].children {
            if self.nodes[sib].tag == *tag {
                n += 1;
            }
            if sib == idx {
                break;
            }
        }
        n
    }
}

// =============================================================================
// Element
// =============================================================================

#[derive(Clone)]
pub struct MockElement {
    tree: Rc<RefCell<Tree>>,
    idx: usize,
}

impl PartialEq for MockElement {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.tree, &other.tree) && self.idx == other.idx
    }
}

impl fmt::Debug for MockElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tree = self.tree.borrow();
        let node = &tree.nodes[self.idx];
        write!(f, "<{}#{}>", node.tag, self.idx)
    }
}

impl MockElement {
    fn wrap(&self, idx: usize) -> Self {
        Self {
            tree: Rc::clone(&self.tree),
            idx,
        }
    }

    pub fn set_text(&self, text: &str) {
        self.tree.borrow_mut().nodes[self.idx].text = text.to_string();
    }

    pub fn clicks(&self) -> u32 {
        self.tree.borrow().nodes[self.idx].clicks
    }

    pub fn style(&self, name: &str) -> Option<String> {
        self.tree.borrow().nodes[self.idx].style.get(name).map(|(v, _)| v.clone())
    }

    pub fn style_is_important(&self, name: &str) -> bool {
        self.tree.borrow().nodes[self.idx]
            .style
            .get(name)
            .is_some_and(|(_, important)| *important)
    }

    /// Reachable from the document root.
    pub fn is_connected(&self) -> bool {
        let tree = self.tree.borrow();
        let mut cur = self.idx;
        while let Some(parent) = tree.nodes[cur].parent {
            cur = parent;
        }
        cur == 0
    }
}

impl DomElement for MockElement {
    fn tag_name(&self) -> String {
        self.tree.borrow().nodes[self.idx].tag.clone()
    }

    fn id(&self) -> String {
        self.get_attribute("id").unwrap_or_default()
    }

    fn class_name(&self) -> String {
        self.get_attribute("class").unwrap_or_default()
    }

    fn get_attribute(&self, name: &str) -> Option<String> {
        self.tree.borrow().attr(self.idx, name).map(str::to_owned)
    }

    fn set_attribute(&self, name: &str, value: &str) -> Result<(), DomError> {
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(DomError::Host(format!("invalid attribute name {:?}", name)));
        }
        let mut tree = self.tree.borrow_mut();
        let attrs = &mut tree.nodes[self.idx].attrs;
        match attrs.iter_mut().find(|(k, _)| k == name) {
            Some((_, v)) => *v = value.to_string(),
            None => attrs.push((name.to_string(), value.to_string())),
        }
        Ok(())
    }

    fn parent_element(&self) -> Option<Self> {
        let parent = self.tree.borrow().nodes[self.idx].parent;
        parent.map(|p| self.wrap(p))
    }

    fn previous_element_sibling(&self) -> Option<Self> {
        let tree = self.tree.borrow();
        let parent = tree.nodes[self.idx].parent?;
        let siblings = &tree.nodes[parent].children;
        let pos = siblings.iter().position(|&c| c == self.idx)?;
        let prev = pos.checked_sub(1).map(|p| siblings[p]);
        drop(tree);
        prev.map(|p| self.wrap(p))
    }

    fn text_content(&self) -> String {
        self.tree.borrow().text(self.idx)
    }

    fn query_selector_all(&self, selector: &str) -> Result<Vec<Self>, DomError> {
        let list = parse_selector_list(selector)?;
        let tree = self.tree.borrow();
        let mut all = Vec::new();
        tree.descendants(self.idx, &mut all);
        let hits: Vec<usize> = all.into_iter().filter(|&n| list.iter().any(|c| c.matches(&tree, n))).collect();
        drop(tree);
        Ok(hits.into_iter().map(|n| self.wrap(n)).collect())
    }

    fn matches(&self, selector: &str) -> Result<bool, DomError> {
        let list = parse_selector_list(selector)?;
        let tree = self.tree.borrow();
        Ok(list.iter().any(|c| c.matches(&tree, self.idx)))
    }

    fn set_style_property(&self, name: &str, value: &str, important: bool) -> Result<(), DomError> {
        self.tree.borrow_mut().nodes[self.idx]
            .style
            .insert(name.to_string(), (value.to_string(), important));
        Ok(())
    }

    fn remove_style_property(&self, name: &str) -> Result<(), DomError> {
        self.tree.borrow_mut().nodes[self.idx].style.remove(name);
        Ok(())
    }

    fn click(&self) {
        self.tree.borrow_mut().nodes[self.idx].clicks += 1;
    }

    fn remove(&self) {
        self.tree.borrow_mut().detach(self.idx);
    }
}

// =============================================================================
// Document
// =============================================================================

pub struct MockDocument {
    tree: Rc<RefCell<Tree>>,
    ready: Rc<Cell<ReadyState>>,
    failing_sheets: RefCell<HashSet<String>>,
    head: usize,
    body: usize,
}

impl MockDocument {
    /// `<html><head></head><body></body></html>`, fully loaded.
    pub fn new() -> Self {
        let mut tree = Tree::default();
        let html = tree.add("html", &[]);
        let head = tree.add("head", &[]);
        let body = tree.add("body", &[]);
        tree.attach(html, head);
        tree.attach(html, body);
        Self {
            tree: Rc::new(RefCell::new(tree)),
            ready: Rc::new(Cell::new(ReadyState::Complete)),
            failing_sheets: RefCell::new(HashSet::new()),
            head,
            body,
        }
    }

    fn wrap(&self, idx: usize) -> MockElement {
        MockElement {
            tree: Rc::clone(&self.tree),
            idx,
        }
    }

    pub fn set_ready_state(&self, state: ReadyState) {
        self.ready.set(state);
    }

    /// Shared readiness cell, for changing it from a timer callback.
    pub fn ready_handle(&self) -> Rc<Cell<ReadyState>> {
        Rc::clone(&self.ready)
    }

    pub fn fail_stylesheet(&self, file: &str) {
        self.failing_sheets.borrow_mut().insert(file.to_string());
    }

    pub fn head(&self) -> MockElement {
        self.wrap(self.head)
    }

    /// Create a detached element.
    pub fn create(&self, tag: &str, attrs: &[(&str, &str)]) -> MockElement {
        let idx = self.tree.borrow_mut().add(tag, attrs);
        self.wrap(idx)
    }

    /// Append `child` under `parent`, moving it if already attached.
    pub fn attach(&self, parent: &MockElement, child: &MockElement) {
        self.tree.borrow_mut().attach(parent.idx, child.idx);
    }

    /// Create an element and append it under `parent`.
    pub fn append(&self, parent: &MockElement, tag: &str, attrs: &[(&str, &str)]) -> MockElement {
        let el = self.create(tag, attrs);
        self.attach(parent, &el);
        el
    }
}

impl Document for MockDocument {
    type Element = MockElement;

    fn ready_state(&self) -> ReadyState {
        self.ready.get()
    }

    fn document_element(&self) -> Option<MockElement> {
        Some(self.wrap(0))
    }

    fn body(&self) -> Option<MockElement> {
        Some(self.wrap(self.body))
    }

    fn query_selector_all(&self, selector: &str) -> Result<Vec<MockElement>, DomError> {
        let root = self.wrap(0);
        let mut hits = Vec::new();
        if root.matches(selector)? {
            hits.push(root.clone());
        }
        hits.extend(root.query_selector_all(selector)?);
        Ok(hits)
    }

    fn inject_style(&self, rule_id: &str, css: &str) -> Result<(), DomError> {
        let head = self.head();
        let style = self.append(&head, "style", &[("data-cfg-rule", rule_id)]);
        style.set_text(css);
        Ok(())
    }

    fn inject_stylesheet(&self, rule_id: &str, file: &str) -> Result<(), DomError> {
        if self.failing_sheets.borrow().contains(file) {
            return Err(DomError::Host(format!("cannot resolve {}", file)));
        }
        let href = format!("chrome-extension://mock/{}", file);
        self.append(
            &self.head(),
            "link",
            &[("rel", "stylesheet"), ("href", href.as_str()), ("data-cfg-rule", rule_id)],
        );
        Ok(())
    }
}

// =============================================================================
// Selectors
// =============================================================================

#[derive(Debug, Clone)]
enum AttrOp {
    Exists,
    Equals(String),
    Prefix(String),
    Contains(String),
    Suffix(String),
}

#[derive(Debug, Clone, Default)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<(String, AttrOp)>,
    nth_of_type: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone)]
struct Complex {
    compounds: Vec<Compound>,
    /// `combinators[i]` sits between `compounds[i]` and `compounds[i + 1]`.
    combinators: Vec<Combinator>,
}

impl Compound {
    fn matches(&self, tree: &Tree, idx: usize) -> bool {
        let node = &tree.nodes[idx];
        if let Some(tag) = &self.tag {
            if node.tag != *tag {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if tree.attr(idx, "id") != Some(id.as_str()) {
                return false;
            }
        }
        if !self.classes.is_empty() {
            let class = tree.attr(idx, "class").unwrap_or("");
            if !self.classes.iter().all(|c| class.split_whitespace().any(|t| t == c)) {
                return false;
            }
        }
        for (name, op) in &self.attrs {
            let Some(value) = tree.attr(idx, name) else {
                return false;
            };
            let ok = match op {
                AttrOp::Exists => true,
                AttrOp::Equals(v) => value == v,
                AttrOp::Prefix(v) => !v.is_empty() && value.starts_with(v.as_str()),
                AttrOp::Contains(v) => !v.is_empty() && value.contains(v.as_str()),
                AttrOp::Suffix(v) => !v.is_empty() && value.ends_with(v.as_str()),
            };
            if !ok {
                return false;
            }
        }
        if let Some(n) = self.nth_of_type {
            if tree.nth_of_type(idx) != n {
                return false;
            }
        }
        true
    }
}

impl Complex {
    fn matches(&self, tree: &Tree, idx: usize) -> bool {
        self.match_at(tree, idx, self.compounds.len() - 1)
    }

    fn match_at(&self, tree: &Tree, idx: usize, pos: usize) -> bool {
        if !self.compounds[pos].matches(tree, idx) {
            return false;
        }
        if pos == 0 {
            return true;
        }
        match self.combinators[pos - 1] {
            Combinator::Child => tree.nodes[idx]
                .parent
                .is_some_and(|p| self.match_at(tree, p, pos - 1)),
            Combinator::Descendant => {
                let mut cur = tree.nodes[idx].parent;
                while let Some(p) = cur {
                    if self.match_at(tree, p, pos - 1) {
                        return true;
                    }
                    cur = tree.nodes[p].parent;
                }
                false
            }
        }
    }
}

fn invalid(selector: &str) -> DomError {
    DomError::InvalidSelector(selector.to_string())
}

fn parse_selector_list(selector: &str) -> Result<Vec<Complex>, DomError> {
    let mut groups = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in selector.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(c),
            (None, '[') | (None, '(') => depth += 1,
            (None, ']') | (None, ')') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                groups.push(&selector[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    groups.push(&selector[start..]);

    groups
        .into_iter()
        .map(|g| SelectorParser::new(g).complex().ok_or_else(|| invalid(selector)))
        .collect()
}

struct SelectorParser {
    chars: Vec<char>,
    pos: usize,
}

impl SelectorParser {
    fn new(src: &str) -> Self {
        Self {
            chars: src.trim().chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn ident(&mut self) -> Option<String> {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c == '\\' {
                self.pos += 1;
                out.push(self.bump()?);
            } else if c.is_alphanumeric() || c == '-' || c == '_' {
                out.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        (!out.is_empty()).then_some(out)
    }

    fn complex(mut self) -> Option<Complex> {
        let mut compounds = vec![self.compound()?];
        let mut combinators = Vec::new();
        loop {
            let had_ws = self.skip_ws();
            if self.peek().is_none() {
                break;
            }
            if self.eat('>') {
                self.skip_ws();
                combinators.push(Combinator::Child);
            } else if had_ws {
                combinators.push(Combinator::Descendant);
            } else {
                return None;
            }
            compounds.push(self.compound()?);
        }
        Some(Complex { compounds, combinators })
    }

    fn compound(&mut self) -> Option<Compound> {
        let start = self.pos;
        let mut compound = Compound::default();

        if self.eat('*') {
            // universal
        } else if self.peek().is_some_and(|c| c.is_alphabetic()) {
            compound.tag = Some(self.ident()?.to_ascii_lowercase());
        }

        loop {
            match self.peek() {
                Some('#') => {
                    self.pos += 1;
                    compound.id = Some(self.ident()?);
                }
                Some('.') => {
                    self.pos += 1;
                    compound.classes.push(self.ident()?);
                }
                Some('[') => {
                    self.pos += 1;
                    compound.attrs.push(self.attribute()?);
                }
                Some(':') => {
                    self.pos += 1;
                    compound.nth_of_type = Some(self.nth_of_type()?);
                }
                _ => break,
            }
        }

        (self.pos > start).then_some(compound)
    }

    fn attribute(&mut self) -> Option<(String, AttrOp)> {
        self.skip_ws();
        let name = self.ident()?;
        self.skip_ws();
        if self.eat(']') {
            return Some((name, AttrOp::Exists));
        }

        let op = match self.bump()? {
            '=' => '=',
            c @ ('^' | '*' | '$') if self.eat('=') => c,
            _ => return None,
        };
        self.skip_ws();
        let value = self.attr_value()?;
        self.skip_ws();
        if !self.eat(']') {
            return None;
        }

        let op = match op {
            '=' => AttrOp::Equals(value),
            '^' => AttrOp::Prefix(value),
            '*' => AttrOp::Contains(value),
            _ => AttrOp::Suffix(value),
        };
        Some((name, op))
    }

    fn attr_value(&mut self) -> Option<String> {
        match self.peek()? {
            q @ ('"' | '\'') => {
                self.pos += 1;
                let mut out = String::new();
                loop {
                    let c = self.bump()?;
                    if c == q {
                        return Some(out);
                    }
                    out.push(c);
                }
            }
            _ => self.ident(),
        }
    }

    fn nth_of_type(&mut self) -> Option<usize> {
        let name = self.ident()?;
        if name != "nth-of-type" || !self.eat('(') {
            return None;
        }
        let mut digits = String::new();
        while let Some(c) = self.peek().filter(char::is_ascii_digit) {
            digits.push(c);
            self.pos += 1;
        }
        if !self.eat(')') {
            return None;
        }
        digits.parse().ok().filter(|&n| n > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_compound_selectors() {
        let doc = MockDocument::new();
        let body = doc.body().unwrap();
        let ins = doc.append(&body, "ins", &[("id", "gpt_unit_1"), ("class", "adsbygoogle x")]);
        doc.append(&body, "iframe", &[("src", "https://tpc.googlesyndication.com/x")]);

        assert_eq!(doc.query_selector_all(r#"ins[id^="gpt_unit_"]"#).unwrap(), vec![ins.clone()]);
        assert_eq!(doc.query_selector_all(".adsbygoogle.x").unwrap().len(), 1);
        assert_eq!(doc.query_selector_all("iframe[src*=googlesyndication]").unwrap().len(), 1);
        assert_eq!(doc.query_selector_all("ins, iframe").unwrap().len(), 2);
        assert!(doc.query_selector_all("[[").is_err());
        assert!(doc.query_selector_all("").is_err());
        assert!(doc.query_selector_all("div >").is_err());
    }

    #[test]
    fn test_combinators_and_nth_of_type() {
        let doc = MockDocument::new();
        let body = doc.body().unwrap();
        let ul = doc.append(&body, "ul", &[]);
        doc.append(&ul, "li", &[]);
        doc.append(&ul, "span", &[]);
        let second = doc.append(&ul, "li", &[("class", "b")]);

        assert_eq!(doc.query_selector_all("ul > li:nth-of-type(2)").unwrap(), vec![second.clone()]);
        assert_eq!(doc.query_selector_all("body li.b").unwrap(), vec![second]);
        assert!(doc.query_selector_all("body > li").unwrap().is_empty());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let doc = MockDocument::new();
        let body = doc.body().unwrap();
        let div = doc.append(&body, "div", &[]);
        assert!(div.is_connected());
        div.remove();
        div.remove();
        assert!(!div.is_connected());
        assert_eq!(div.parent_element(), None);
    }

    #[test]
    fn test_escaped_identifiers() {
        let doc = MockDocument::new();
        let body = doc.body().unwrap();
        let el = doc.append(&body, "div", &[("id", "a:b")]);
        assert_eq!(doc.query_selector_all(r"div#a\:b").unwrap(), vec![el]);
    }
}
