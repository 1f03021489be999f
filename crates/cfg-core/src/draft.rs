//! Rule drafts created from picker results, and how they fold into an
//! existing rule for the same site.

use std::hash::Hasher;

use twox_hash::XxHash64;

use crate::pattern::ALL_URLS;
use crate::picker::PickResult;
use crate::types::{Rule, RunAt, Scope, World};
use crate::url::{extract_host, registrable_host};

/// Priority given to picker drafts.
pub const DRAFT_PRIORITY: i32 = 100;

/// Pattern any URL on the same registrable host matches.
fn host_pattern(url: &str) -> Option<String> {
    registrable_host(url).map(|host| format!("*://*.{}/*", host))
}

/// `*://*.<host>/*` for the page, `<all_urls>` when it has no host.
pub fn domain_pattern(url: &str) -> String {
    host_pattern(url).unwrap_or_else(|| ALL_URLS.to_string())
}

/// Pattern the rule editor proposes for `scope` on `url`.
pub fn pattern_for_scope(url: &str, scope: Scope) -> String {
    match scope {
        Scope::Url if extract_host(url).is_some() => url.to_string(),
        Scope::Domain => host_pattern(url).unwrap_or_else(|| "*://*/*".to_string()),
        _ => "*://*/*".to_string(),
    }
}

/// Stable 16-hex-digit id for a draft.
pub fn draft_id(selector: &str, url: &str, nonce: u64) -> String {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(selector.as_bytes());
    hasher.write_u8(0);
    hasher.write(url.as_bytes());
    hasher.write_u64(nonce);
    format!("{:016x}", hasher.finish())
}

/// Rule that hides the picked element on the whole site.
pub fn draft_from_pick(pick: &PickResult, nonce: u64) -> Rule {
    Rule {
        id: draft_id(&pick.selector, &pick.url, nonce),
        name: format!("Hide: {}", pick.selector),
        enabled: true,
        pattern: domain_pattern(&pick.url),
        scope: Scope::Domain,
        priority: DRAFT_PRIORITY,
        run_at: RunAt::DocumentStart,
        world: World::Isolated,
        css: format!("{} {{ display: none !important; }}", pick.selector),
        safe_mode: false,
        notes: "Created with the element picker".to_string(),
        ..Rule::default()
    }
}

/// Rule a draft should be merged into: same pattern and scope.
pub fn find_merge_target<'a>(rules: &'a [Rule], draft: &Rule) -> Option<&'a Rule> {
    rules
        .iter()
        .find(|r| r.pattern == draft.pattern && r.scope == draft.scope)
}

/// Fold `draft` into `existing`. The existing rule keeps its identity and
/// settings; its CSS gains the draft CSS unless already present and its hide
/// list gains the draft's hide selectors.
pub fn merge_draft(existing: &Rule, draft: &Rule) -> Rule {
    let mut merged = existing.clone();

    let addition = draft.css.trim();
    if !addition.is_empty() && !existing.css.contains(addition) {
        merged.css = if existing.css.is_empty() {
            draft.css.clone()
        } else {
            format!("{}\n{}", existing.css, draft.css)
        };
    }

    for selector in &draft.safe_actions.hide {
        if !merged.safe_actions.hide.contains(selector) {
            merged.safe_actions.hide.push(selector.clone());
        }
    }
    merged
}

/// Merge `draft` into the matching rule of `rules`, or append it.
/// Returns the id of the rule that now carries the draft.
pub fn upsert_draft(rules: &mut Vec<Rule>, draft: Rule) -> String {
    let target = rules
        .iter()
        .position(|r| r.pattern == draft.pattern && r.scope == draft.scope);
    match target {
        Some(i) => {
            rules[i] = merge_draft(&rules[i], &draft);
            rules[i].id.clone()
        }
        None => {
            let id = draft.id.clone();
            rules.push(draft);
            id
        }
    }
}
