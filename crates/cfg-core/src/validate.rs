//! Rule and state validation for the editor and the CLI.
//!
//! Decoding is lenient, so a bad enum string silently becomes the default.
//! [`validate_rule_value`] looks at the raw JSON to surface those.

use std::collections::HashSet;
use std::fmt;

use serde_json::Value;

use crate::error::{PatternError, StoreError};
use crate::pattern::UrlPattern;
use crate::store::state_from_export;
use crate::types::{Rule, StoreState, STORAGE_KEY};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleIssue {
    MissingId,
    MissingName,
    MissingPattern,
    BadPattern { pattern: String, error: PatternError },
    BadExcludePattern { pattern: String, error: PatternError },
    UnknownValue { field: &'static str, value: String },
    DuplicateId(String),
}

impl fmt::Display for RuleIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingId => write!(f, "rule has no id"),
            Self::MissingName => write!(f, "rule has no name"),
            Self::MissingPattern => write!(f, "rule has no pattern"),
            Self::BadPattern { pattern, error } => write!(f, "pattern {:?}: {}", pattern, error),
            Self::BadExcludePattern { pattern, error } => write!(f, "exclude pattern {:?}: {}", pattern, error),
            Self::UnknownValue { field, value } => write!(f, "{} has unknown value {:?}", field, value),
            Self::DuplicateId(id) => write!(f, "id {:?} is used by more than one rule", id),
        }
    }
}

/// Problems with one rule, identified by its position in the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub index: usize,
    pub rule_id: String,
    pub issue: RuleIssue,
}

pub fn validate_rule(rule: &Rule) -> Vec<RuleIssue> {
    let mut issues = Vec::new();
    if rule.id.trim().is_empty() {
        issues.push(RuleIssue::MissingId);
    }
    if rule.name.trim().is_empty() {
        issues.push(RuleIssue::MissingName);
    }
    if rule.pattern.trim().is_empty() {
        issues.push(RuleIssue::MissingPattern);
    } else if let Err(error) = UrlPattern::compile(&rule.pattern) {
        issues.push(RuleIssue::BadPattern {
            pattern: rule.pattern.clone(),
            error,
        });
    }
    for pattern in &rule.exclude_patterns {
        if let Err(error) = UrlPattern::compile(pattern) {
            issues.push(RuleIssue::BadExcludePattern {
                pattern: pattern.clone(),
                error,
            });
        }
    }
    issues
}

/// Every rule checked on its own, plus id uniqueness across the list.
pub fn validate_state(state: &StoreState) -> Vec<Finding> {
    let mut findings = Vec::new();
    let mut seen = HashSet::new();
    for (index, rule) in state.rules.iter().enumerate() {
        for issue in validate_rule(rule) {
            findings.push(Finding {
                index,
                rule_id: rule.id.clone(),
                issue,
            });
        }
        if !rule.id.is_empty() && !seen.insert(rule.id.as_str()) {
            findings.push(Finding {
                index,
                rule_id: rule.id.clone(),
                issue: RuleIssue::DuplicateId(rule.id.clone()),
            });
        }
    }
    findings
}

const ENUM_FIELDS: [(&str, &[&str]); 3] = [
    ("runAt", &["document_start", "document_end", "document_idle"]),
    ("world", &["ISOLATED", "MAIN"]),
    ("scope", &["DOMAIN", "URL", "PATTERN"]),
];

/// Enum fields of a raw rule object that decoding would replace with the
/// default.
pub fn validate_rule_value(value: &Value) -> Vec<RuleIssue> {
    let Some(obj) = value.as_object() else {
        return Vec::new();
    };
    ENUM_FIELDS
        .iter()
        .filter_map(|(field, allowed)| {
            let raw = obj.get(*field)?;
            match raw.as_str() {
                Some(s) if allowed.contains(&s) => None,
                _ => Some(RuleIssue::UnknownValue {
                    field: *field,
                    value: raw.to_string(),
                }),
            }
        })
        .collect()
}

/// Validate a state document or storage export as the editor would load
/// it: raw enum values first, then the decoded rules.
pub fn validate_export(value: Value) -> Result<Vec<Finding>, StoreError> {
    let raw_rules = value
        .get(STORAGE_KEY)
        .unwrap_or(&value)
        .get("rules")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let Some(state) = state_from_export(value)? else {
        return Ok(Vec::new());
    };

    let mut findings = Vec::new();
    for (index, raw) in raw_rules.iter().enumerate() {
        let rule_id = raw.get("id").and_then(Value::as_str).unwrap_or_default();
        findings.extend(validate_rule_value(raw).into_iter().map(|issue| Finding {
            index,
            rule_id: rule_id.to_string(),
            issue,
        }));
    }
    findings.extend(validate_state(&state));
    Ok(findings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rule(id: &str) -> Rule {
        Rule {
            id: id.to_string(),
            name: "n".to_string(),
            pattern: "*://*.a.test/*".to_string(),
            ..Rule::default()
        }
    }

    #[test]
    fn test_valid_rule_has_no_issues() {
        assert!(validate_rule(&rule("a")).is_empty());
    }

    #[test]
    fn test_missing_fields_and_bad_patterns() {
        let mut r = rule("");
        r.name = " ".to_string();
        r.pattern.clear();
        r.exclude_patterns = vec!["ok/*".to_string(), "".to_string()];

        let issues = validate_rule(&r);
        assert!(issues.contains(&RuleIssue::MissingId));
        assert!(issues.contains(&RuleIssue::MissingName));
        assert!(issues.contains(&RuleIssue::MissingPattern));
        assert!(issues.contains(&RuleIssue::BadExcludePattern {
            pattern: String::new(),
            error: PatternError::Empty
        }));
    }

    #[test]
    fn test_duplicate_ids() {
        let state = StoreState {
            rules: vec![rule("a"), rule("b"), rule("a")],
            ..StoreState::initial()
        };
        let findings = validate_state(&state);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].index, 2);
        assert_eq!(findings[0].issue, RuleIssue::DuplicateId("a".to_string()));
    }

    #[test]
    fn test_raw_enum_values() {
        let issues = validate_rule_value(&json!({ "runAt": "document_later", "world": "MAIN", "scope": 3 }));
        assert_eq!(issues.len(), 2);
        assert_eq!(
            issues[0],
            RuleIssue::UnknownValue {
                field: "runAt",
                value: "\"document_later\"".to_string()
            }
        );
        assert!(validate_rule_value(&json!({})).is_empty());
    }

    #[test]
    fn test_export_reports_raw_and_decoded_issues() {
        let export = json!({
            "cfgState": {
                "enabled": true,
                "rules": [
                    { "id": "a", "name": "A", "pattern": "*://a.test/*", "runAt": "later" },
                    { "id": "a", "name": "B", "pattern": "*://b.test/*" }
                ]
            }
        });
        let findings = validate_export(export).unwrap();
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].index, 0);
        assert!(matches!(findings[0].issue, RuleIssue::UnknownValue { field: "runAt", .. }));
        assert_eq!(findings[1].issue, RuleIssue::DuplicateId("a".to_string()));
    }

    #[test]
    fn test_export_without_state() {
        assert!(validate_export(Value::Null).unwrap().is_empty());
    }
}
