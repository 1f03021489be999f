//! Rule store contract.
//!
//! The engine only ever reads. Writes come from the log sink and from the
//! management UI, and are expressed as a [`StatePatch`] merged over whatever
//! is currently stored.

use std::cell::{Cell, RefCell};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::StoreError;
use crate::types::{LocalJsItem, Rule, StoreState, STORAGE_KEY};

/// Partial update of the stored state. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatePatch {
    pub enabled: Option<bool>,
    pub safe_mode: Option<bool>,
    pub rules: Option<Vec<Rule>>,
    pub allowlist: Option<Vec<String>>,
    pub blocklist: Option<Vec<String>>,
    /// Raw entries, so records written by older builds pass through as-is.
    pub logs: Option<Vec<Value>>,
    pub local_js_library: Option<Vec<LocalJsItem>>,
}

impl StatePatch {
    pub fn logs(logs: Vec<Value>) -> Self {
        Self {
            logs: Some(logs),
            ..Self::default()
        }
    }

    pub fn rules(rules: Vec<Rule>) -> Self {
        Self {
            rules: Some(rules),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Merge into the stored document `doc`, replacing only the patched
    /// top-level keys. `null` starts from [`StoreState::initial`].
    pub fn apply_to_value(self, doc: Value) -> Result<Value, StoreError> {
        let mut map = match doc {
            Value::Object(map) => map,
            Value::Null => match encode(StoreState::initial())? {
                Value::Object(map) => map,
                _ => Map::new(),
            },
            other => {
                return Err(StoreError::Decode(format!(
                    "refusing to patch a non-object document ({})",
                    kind(&other)
                )))
            }
        };
        put(&mut map, "enabled", self.enabled)?;
        put(&mut map, "safeMode", self.safe_mode)?;
        put(&mut map, "rules", self.rules)?;
        put(&mut map, "allowlist", self.allowlist)?;
        put(&mut map, "blocklist", self.blocklist)?;
        put(&mut map, "logs", self.logs)?;
        put(&mut map, "localJsLibrary", self.local_js_library)?;
        Ok(Value::Object(map))
    }
}

fn encode<T: Serialize>(value: T) -> Result<Value, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::Write(e.to_string()))
}

fn put<T: Serialize>(map: &mut Map<String, Value>, key: &str, value: Option<T>) -> Result<(), StoreError> {
    if let Some(value) = value {
        map.insert(key.to_string(), encode(value)?);
    }
    Ok(())
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Persistent store of the rule list and global flags.
///
/// Backends only move the raw document; decoding and merging live in the
/// provided methods so every backend writes the same way.
#[allow(async_fn_in_trait)]
pub trait RuleStore {
    /// The stored document as-is, `null` when nothing has been stored yet.
    async fn read_raw(&self) -> Result<Value, StoreError>;

    /// Replace the stored document.
    async fn write_raw(&self, doc: Value) -> Result<(), StoreError>;

    /// Current state, or `None` when nothing has been stored yet.
    async fn read(&self) -> Result<Option<StoreState>, StoreError> {
        let value = self.read_raw().await?;
        StoreState::from_json(value).map_err(|e| StoreError::Decode(e.to_string()))
    }

    /// Merge `patch` over the stored document and persist.
    async fn write(&self, patch: StatePatch) -> Result<(), StoreError> {
        let current = self.read_raw().await?;
        self.write_raw(patch.apply_to_value(current)?).await
    }
}

/// Decode either a bare state document or a full storage export
/// (`{ "cfgState": { ... }, ... }`).
pub fn state_from_export(value: Value) -> Result<Option<StoreState>, StoreError> {
    let value = match value {
        Value::Object(mut map) if map.contains_key(STORAGE_KEY) => map.remove(STORAGE_KEY).unwrap_or(Value::Null),
        other => other,
    };
    StoreState::from_json(value).map_err(|e| StoreError::Decode(e.to_string()))
}

/// In-process store, used by the CLI and by tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    doc: RefCell<Value>,
    fail_reads: Cell<bool>,
    reads: Cell<usize>,
}

impl MemoryStore {
    pub fn new(state: Option<StoreState>) -> Self {
        let doc = state
            .and_then(|s| serde_json::to_value(s).ok())
            .unwrap_or(Value::Null);
        Self::from_value(doc)
    }

    /// Start from a raw stored document.
    pub fn from_value(doc: Value) -> Self {
        Self {
            doc: RefCell::new(doc),
            ..Self::default()
        }
    }

    pub fn snapshot(&self) -> Option<StoreState> {
        StoreState::from_json(self.raw()).ok().flatten()
    }

    pub fn raw(&self) -> Value {
        self.doc.borrow().clone()
    }

    /// Make subsequent reads fail (for exercising error paths).
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.set(fail);
    }

    pub fn read_count(&self) -> usize {
        self.reads.get()
    }
}

impl RuleStore for MemoryStore {
    async fn read_raw(&self) -> Result<Value, StoreError> {
        self.reads.set(self.reads.get() + 1);
        if self.fail_reads.get() {
            return Err(StoreError::Read("store unavailable".to_string()));
        }
        Ok(self.raw())
    }

    async fn write_raw(&self, doc: Value) -> Result<(), StoreError> {
        *self.doc.borrow_mut() = doc;
        Ok(())
    }
}
