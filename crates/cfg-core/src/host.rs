//! Execution-host collaborators: script/stylesheet execution and time.

use serde::Serialize;

use crate::error::EffectError;
use crate::types::World;

/// What to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ScriptSource {
    /// Packaged extension files, executed in order.
    Files(Vec<String>),
    /// A code string.
    Code(String),
}

/// One script execution request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptRequest {
    pub source: ScriptSource,
    pub world: World,
}

impl ScriptRequest {
    pub fn files(files: &[String], world: World) -> Self {
        Self {
            source: ScriptSource::Files(files.to_vec()),
            world,
        }
    }

    pub fn code(code: String, world: World) -> Self {
        Self {
            source: ScriptSource::Code(code),
            world,
        }
    }
}

/// Stylesheet inserted by the execution host (tab-level, not via the DOM).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CssSource {
    Inline(String),
    File(String),
}

/// Executes scripts and stylesheets in the page.
///
/// Success or failure is reported per call; a multi-file request that fails
/// gives no information about which file failed.
#[allow(async_fn_in_trait)]
pub trait ScriptHost {
    async fn execute(&self, request: ScriptRequest) -> Result<(), EffectError>;

    async fn insert_css(&self, source: CssSource) -> Result<(), EffectError>;
}

/// Time source for polling and timestamps.
#[allow(async_fn_in_trait)]
pub trait Clock {
    /// Monotonic milliseconds.
    fn now_ms(&self) -> f64;

    /// Wall-clock milliseconds since the Unix epoch.
    fn epoch_ms(&self) -> u64;

    /// Yield to the event loop for at least `ms` milliseconds.
    async fn sleep(&self, ms: u32);
}
