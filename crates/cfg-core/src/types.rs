//! Persisted data model for cfg-AdBlocker
//!
//! These types map directly to the JSON document stored under
//! [`STORAGE_KEY`] in extension storage. Decoding is deliberately lenient:
//! the management UI and older schema versions write loosely-typed values,
//! and one bad field must never take the whole rule list down with it.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Storage key holding the whole state document.
pub const STORAGE_KEY: &str = "cfgState";

/// Storage key holding a rule drafted by the element picker.
pub const DRAFT_STORAGE_KEY: &str = "draftRuleCandidate";

/// Schema version written by [`StoreState::initial`].
pub const STATE_VERSION: u32 = 1;

/// `waitFor` timeout used when an entry gives none (or zero).
pub const WAIT_FOR_DEFAULT_TIMEOUT_MS: u64 = 3000;

// =============================================================================
// Scheme Masks
// =============================================================================

bitflags::bitflags! {
    /// URL scheme mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SchemeMask: u8 {
        const HTTP = 1 << 0;
        const HTTPS = 1 << 1;
        const WS = 1 << 2;
        const WSS = 1 << 3;
        const DATA = 1 << 4;
        const FTP = 1 << 5;
        const FILE = 1 << 6;
        /// Schemes covered by `<all_urls>`
        const ALL_URLS = Self::HTTP.bits()
            | Self::HTTPS.bits()
            | Self::WS.bits()
            | Self::WSS.bits()
            | Self::FTP.bits()
            | Self::FILE.bits();
    }
}

// =============================================================================
// Rule enums
// =============================================================================

/// How a rule's pattern was derived. Informational only; matching uses
/// the pattern text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Scope {
    #[default]
    Domain,
    Url,
    Pattern,
}

/// Document lifecycle point at which a rule's effects fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "snake_case")]
pub enum RunAt {
    #[default]
    DocumentStart,
    DocumentEnd,
    DocumentIdle,
}

/// Execution context for injected scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum World {
    /// Extension-private script context
    #[default]
    Isolated,
    /// The page's own global scope
    Main,
}

impl World {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Isolated => "ISOLATED",
            Self::Main => "MAIN",
        }
    }
}

impl RunAt {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DocumentStart => "document_start",
            Self::DocumentEnd => "document_end",
            Self::DocumentIdle => "document_idle",
        }
    }
}

impl Scope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Domain => "DOMAIN",
            Self::Url => "URL",
            Self::Pattern => "PATTERN",
        }
    }
}

// =============================================================================
// Local scripts
// =============================================================================

/// A user-imported script blob attached to a rule.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(default, rename_all = "camelCase")]
pub struct LocalScript {
    #[serde(deserialize_with = "lenient")]
    pub title: String,
    #[serde(deserialize_with = "lenient")]
    #[cfg_attr(feature = "ts", ts(type = "number"))]
    pub size: u64,
    /// Hex SHA-256 of `content`, computed by the importer
    #[serde(deserialize_with = "lenient")]
    pub hash: String,
    #[serde(deserialize_with = "lenient")]
    #[cfg_attr(feature = "ts", ts(type = "number | null"))]
    pub last_imported_at: Option<u64>,
    #[serde(deserialize_with = "lenient")]
    pub handle_id: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub content: String,
}

/// Catalog entry from which rules pick their `localJs`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(default)]
pub struct LocalJsItem {
    #[serde(deserialize_with = "lenient")]
    pub id: String,
    #[serde(flatten)]
    pub script: LocalScript,
}

// =============================================================================
// Safe actions
// =============================================================================

/// One `setAttr` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct SetAttr {
    pub selector: String,
    pub name: String,
    pub value: String,
}

/// One `waitFor` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct WaitFor {
    pub selector: String,
    #[cfg_attr(feature = "ts", ts(type = "number"))]
    pub timeout_ms: u64,
}

/// Declarative DOM actions of a rule.
///
/// Decoding never fails: a value that is not an object yields an empty set,
/// and a category that is not well-formed is dropped on its own.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct SafeActions {
    pub hide: Vec<String>,
    pub remove: Vec<String>,
    pub click: Vec<String>,
    pub set_attr: Vec<SetAttr>,
    pub wait_for: Vec<WaitFor>,
}

impl SafeActions {
    /// Parse a JSON text; malformed input is an empty action set.
    pub fn parse(json: &str) -> Self {
        match serde_json::from_str::<Value>(json) {
            Ok(value) => Self::from_value(&value),
            Err(e) => {
                log::warn!("malformed safeActions JSON treated as empty: {}", e);
                Self::default()
            }
        }
    }

    pub fn from_value(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self::default();
        };

        Self {
            hide: string_list(obj.get("hide")),
            remove: string_list(obj.get("remove")),
            click: string_list(obj.get("click")),
            set_attr: object_list(obj.get("setAttr"), SetAttr::from_object),
            wait_for: object_list(obj.get("waitFor"), WaitFor::from_object),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hide.is_empty()
            && self.remove.is_empty()
            && self.click.is_empty()
            && self.set_attr.is_empty()
            && self.wait_for.is_empty()
    }
}

impl<'de> Deserialize<'de> for SafeActions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_value(&value))
    }
}

impl SetAttr {
    fn from_object(obj: &Map<String, Value>) -> Option<Self> {
        let selector = scalar_text(obj.get("selector"));
        let name = scalar_text(obj.get("name"));
        if selector.trim().is_empty() || name.trim().is_empty() {
            return None;
        }
        Some(Self {
            selector,
            name,
            value: scalar_text(obj.get("value")),
        })
    }
}

impl WaitFor {
    fn from_object(obj: &Map<String, Value>) -> Option<Self> {
        let selector = scalar_text(obj.get("selector"));
        if selector.trim().is_empty() {
            return None;
        }
        Some(Self {
            selector,
            timeout_ms: wait_timeout(obj.get("timeoutMs")),
        })
    }
}

/// A list category is kept only when every item is a string.
fn string_list(value: Option<&Value>) -> Vec<String> {
    match value.and_then(Value::as_array) {
        Some(items) if items.iter().all(Value::is_string) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_owned))
            .collect(),
        _ => Vec::new(),
    }
}

fn object_list<T>(value: Option<&Value>, parse: fn(&Map<String, Value>) -> Option<T>) -> Vec<T> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_object).filter_map(parse).collect())
        .unwrap_or_default()
}

fn scalar_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(true)) => "true".to_string(),
        _ => String::new(),
    }
}

/// Zero, missing and empty mean "default"; anything non-numeric waits 0ms.
fn wait_timeout(value: Option<&Value>) -> u64 {
    match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => WAIT_FOR_DEFAULT_TIMEOUT_MS,
        Some(Value::Number(n)) => {
            let ms = n.as_f64().unwrap_or(0.0);
            if ms == 0.0 {
                WAIT_FOR_DEFAULT_TIMEOUT_MS
            } else {
                ms.max(0.0) as u64
            }
        }
        Some(Value::String(s)) if s.is_empty() => WAIT_FOR_DEFAULT_TIMEOUT_MS,
        Some(Value::String(s)) => s.trim().parse::<f64>().map(|ms| ms.max(0.0) as u64).unwrap_or(0),
        _ => 0,
    }
}

// =============================================================================
// Rule
// =============================================================================

/// The unit of configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(default, rename_all = "camelCase")]
pub struct Rule {
    #[serde(deserialize_with = "lenient")]
    pub id: String,
    #[serde(deserialize_with = "lenient")]
    pub name: String,
    #[serde(deserialize_with = "lenient")]
    pub enabled: bool,
    #[serde(deserialize_with = "lenient")]
    pub pattern: String,
    #[serde(deserialize_with = "lenient")]
    pub exclude_patterns: Vec<String>,
    #[serde(deserialize_with = "lenient")]
    pub scope: Scope,
    /// Lower applies earlier
    #[serde(deserialize_with = "lenient")]
    pub priority: i32,
    #[serde(deserialize_with = "lenient")]
    pub run_at: RunAt,
    #[serde(deserialize_with = "lenient")]
    pub world: World,
    #[serde(deserialize_with = "lenient")]
    pub css: String,
    #[serde(deserialize_with = "lenient")]
    pub css_files: Vec<String>,
    /// Legacy inline script. Kept for round-tripping, never executed.
    #[serde(deserialize_with = "lenient")]
    pub js: String,
    #[serde(deserialize_with = "lenient")]
    pub js_files: Vec<String>,
    #[serde(deserialize_with = "lenient_list")]
    pub local_js: Vec<LocalScript>,
    pub safe_actions: SafeActions,
    #[serde(deserialize_with = "lenient")]
    pub safe_mode: bool,
    #[serde(deserialize_with = "lenient")]
    pub notes: String,
}

// =============================================================================
// Logs
// =============================================================================

/// Kind of effect recorded in a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "kebab-case")]
pub enum LogAction {
    SafeSkip,
    CssInline,
    CssFiles,
    JsFiles,
    SafeActions,
    /// Anything written by another component or an older version
    #[serde(other)]
    Other,
}

impl LogAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SafeSkip => "safe-skip",
            Self::CssInline => "css-inline",
            Self::CssFiles => "css-files",
            Self::JsFiles => "js-files",
            Self::SafeActions => "safe-actions",
            Self::Other => "other",
        }
    }
}

/// One entry of the persisted rule log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct LogEntry {
    /// Milliseconds since the Unix epoch
    #[serde(rename = "ts", default, deserialize_with = "lenient")]
    #[cfg_attr(feature = "ts", ts(type = "number"))]
    pub timestamp: u64,
    #[serde(default, deserialize_with = "lenient")]
    pub url: String,
    #[serde(rename = "ruleId", default, deserialize_with = "lenient")]
    pub rule_id: String,
    #[serde(rename = "name", default, deserialize_with = "lenient")]
    pub rule_name: String,
    pub action: LogAction,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
    pub meta: Option<String>,
}

// =============================================================================
// Global state
// =============================================================================

/// Everything persisted under [`STORAGE_KEY`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(default, rename_all = "camelCase")]
pub struct StoreState {
    /// Master kill switch. A document without the field counts as disabled.
    #[serde(deserialize_with = "lenient")]
    pub enabled: bool,
    /// Global override, wins over per-rule `safeMode`
    #[serde(deserialize_with = "lenient")]
    pub safe_mode: bool,
    #[serde(deserialize_with = "lenient")]
    pub version: u32,
    #[serde(deserialize_with = "lenient_list")]
    pub rules: Vec<Rule>,
    #[serde(deserialize_with = "lenient")]
    pub allowlist: Vec<String>,
    #[serde(deserialize_with = "lenient")]
    pub blocklist: Vec<String>,
    #[serde(deserialize_with = "lenient_list")]
    pub logs: Vec<LogEntry>,
    #[serde(deserialize_with = "lenient_list")]
    pub local_js_library: Vec<LocalJsItem>,
}

impl StoreState {
    /// State written on first install.
    pub fn initial() -> Self {
        Self {
            enabled: true,
            safe_mode: false,
            version: STATE_VERSION,
            ..Self::default()
        }
    }

    /// Decode a state document. `null` means "nothing stored yet".
    pub fn from_json(value: Value) -> Result<Option<Self>, serde_json::Error> {
        match value {
            Value::Null => Ok(None),
            Value::Object(_) => serde_json::from_value(value).map(Some),
            _ => Err(serde::de::Error::custom("state document must be an object")),
        }
    }
}

// =============================================================================
// Lenient decoding helpers
// =============================================================================

/// Decode a field, falling back to its default on a type mismatch.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// Decode a list, skipping the items that do not decode.
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    let Value::Array(items) = value else {
        return Ok(Vec::new());
    };

    let mut out = Vec::with_capacity(items.len());
    for (idx, item) in items.into_iter().enumerate() {
        match serde_json::from_value(item) {
            Ok(decoded) => out.push(decoded),
            Err(e) => log::warn!("skipping undecodable list item #{}: {}", idx, e),
        }
    }
    Ok(out)
}
