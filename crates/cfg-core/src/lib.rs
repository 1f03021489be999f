//! cfg-AdBlocker core library
//!
//! Host-agnostic engine of a user-configurable content filter: a list of
//! rules (URL pattern plus effects) is matched against the current page and
//! applied at most once per page view.
//!
//! # Architecture
//!
//! Everything that touches the browser sits behind a trait (`Document`,
//! `RuleStore`, `LogSink`, `ScriptHost`, `Clock`). The wasm crate implements
//! them on the live DOM and extension APIs; tests use in-memory doubles.
//!
//! # Modules
//!
//! - `pattern`: `*` wildcard URL patterns
//! - `url`: URL scheme and host extraction without allocations
//! - `types`: the persisted schema (rules, logs, state)
//! - `engine`: rule selection, scheduling and application
//! - `effects`: CSS, script and safe-action appliers
//! - `session`: per-page-view state
//! - `spa`: in-page navigation detection
//! - `cosmetic`: structural ad cleanup
//! - `picker`: element picker and selector synthesis
//! - `draft`, `validate`, `apply_now`: rule editor support

pub mod apply_now;
pub mod cosmetic;
pub mod dom;
pub mod draft;
pub mod effects;
pub mod engine;
pub mod error;
pub mod host;
pub mod logs;
pub mod pattern;
pub mod picker;
pub mod session;
pub mod spa;
pub mod store;
pub mod types;
pub mod url;
pub mod validate;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use dom::{DomElement, Document, ReadyState};
pub use engine::{preview, select_rules, Engine, PassOutcome, PassReport};
pub use error::{DomError, EffectError, PatternError, SinkError, StoreError};
pub use host::{Clock, CssSource, ScriptHost, ScriptRequest, ScriptSource};
pub use logs::{LogRing, LogSink, StoreLogSink, LOG_CAPACITY};
pub use pattern::{matches, UrlPattern, ALL_URLS};
pub use session::{Gate, LifecycleEvent, PageSession};
pub use store::{MemoryStore, RuleStore, StatePatch};
pub use types::{LogAction, LogEntry, Rule, RunAt, SafeActions, Scope, StoreState, World};
