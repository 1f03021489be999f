//! Error types, one enum per failure domain.
//!
//! Only [`StoreError`] ever escapes an engine pass. Everything else is
//! caught at the per-operation boundary, logged and swallowed.

/// A wildcard pattern that cannot be compiled.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    #[error("Empty pattern")]
    Empty,
    #[error("Pattern contains a control character at byte {0}")]
    ControlChar(usize),
}

/// Failure of a DOM primitive.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomError {
    #[error("Invalid selector: {0}")]
    InvalidSelector(String),
    #[error("No document root to attach to")]
    NoRoot,
    #[error("DOM operation failed: {0}")]
    Host(String),
}

/// Failure of one effect of one rule.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EffectError {
    #[error("Inline CSS injection failed: {0}")]
    CssInline(DomError),
    #[error("Stylesheet '{file}' injection failed: {source}")]
    CssFile { file: String, source: DomError },
    #[error("Script execution failed: {0}")]
    Script(String),
    #[error("Safe action on '{selector}' failed: {source}")]
    SafeAction { selector: String, source: DomError },
}

/// Failure of the rule store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Store read failed: {0}")]
    Read(String),
    #[error("Store write failed: {0}")]
    Write(String),
    #[error("Stored state could not be decoded: {0}")]
    Decode(String),
}

/// Failure to deliver a log entry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Log sink rejected entry: {0}")]
pub struct SinkError(pub String);

impl From<StoreError> for SinkError {
    fn from(e: StoreError) -> Self {
        Self(e.to_string())
    }
}
