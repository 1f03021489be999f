//! Wildcard URL patterns
//!
//! A pattern is literal text where `*` matches any run of characters
//! (including none). Patterns are anchored: they must cover the whole URL.
//!
//! Compilation splits the pattern on `*` into literal segments, the same
//! shape as a FIND_LIT / SKIP_ANY program: the first segment is asserted at
//! the start, the last at the end, and the middle ones are found left to
//! right. Without backtracking this is exact for `*`-only globs.
//!
//! A pattern that contains `://*.` additionally matches with that wildcard
//! label removed, so `*://*.example.com/*` covers `example.com` as well as
//! its subdomains.

use crate::error::PatternError;
use crate::types::SchemeMask;
use crate::url::extract_scheme;

/// Chrome-style pattern matching every web or file URL.
pub const ALL_URLS: &str = "<all_urls>";

const WILDCARD_HOST: &str = "://*.";

/// A compiled `*` glob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Glob {
    /// Literal text between wildcards; always at least one element.
    segments: Vec<String>,
}

impl Glob {
    fn compile(pattern: &str) -> Self {
        Self {
            segments: pattern.split('*').map(str::to_owned).collect(),
        }
    }

    pub fn is_match(&self, text: &str) -> bool {
        let segments = &self.segments;
        if segments.len() == 1 {
            return text == segments[0];
        }

        let first = &segments[0];
        let last = &segments[segments.len() - 1];
        if text.len() < first.len() + last.len() {
            return false;
        }
        if !text.starts_with(first.as_str()) || !text.ends_with(last.as_str()) {
            return false;
        }

        let mut rest = &text[first.len()..text.len() - last.len()];
        for literal in &segments[1..segments.len() - 1] {
            match rest.find(literal.as_str()) {
                Some(pos) => rest = &rest[pos + literal.len()..],
                None => return false,
            }
        }
        true
    }
}

/// A compiled URL pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlPattern {
    AllUrls,
    Glob {
        primary: Glob,
        /// The `://*.` -> `://` variant, when the pattern has one.
        bare_host: Option<Glob>,
    },
}

impl UrlPattern {
    pub fn compile(pattern: &str) -> Result<Self, PatternError> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Err(PatternError::Empty);
        }
        if let Some(pos) = pattern.bytes().position(|b| b.is_ascii_control()) {
            return Err(PatternError::ControlChar(pos));
        }
        if pattern == ALL_URLS {
            return Ok(Self::AllUrls);
        }

        let bare_host = pattern
            .contains(WILDCARD_HOST)
            .then(|| Glob::compile(&pattern.replace(WILDCARD_HOST, "://")));

        Ok(Self::Glob {
            primary: Glob::compile(pattern),
            bare_host,
        })
    }

    pub fn matches(&self, url: &str) -> bool {
        match self {
            Self::AllUrls => extract_scheme(url).is_some_and(|s| SchemeMask::ALL_URLS.contains(s)),
            Self::Glob { primary, bare_host } => {
                primary.is_match(url) || bare_host.as_ref().is_some_and(|g| g.is_match(url))
            }
        }
    }
}

/// True when `url` matches `pattern`. Malformed patterns never match.
pub fn matches(url: &str, pattern: &str) -> bool {
    match UrlPattern::compile(pattern) {
        Ok(compiled) => compiled.matches(url),
        Err(e) => {
            log::debug!("pattern {:?} treated as non-match: {}", pattern, e);
            false
        }
    }
}

/// True when any of `patterns` matches `url`.
pub fn any_matches<S: AsRef<str>>(url: &str, patterns: &[S]) -> bool {
    patterns.iter().any(|p| matches(url, p.as_ref()))
}

/// True when the URL is vetoed by an exclude pattern.
pub fn exclude_matches<S: AsRef<str>>(url: &str, exclude_patterns: &[S]) -> bool {
    any_matches(url, exclude_patterns)
}
