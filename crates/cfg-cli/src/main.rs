//! cfg-AdBlocker CLI
//!
//! Inspect exported extension state: which rules a URL would get, rule
//! validation, picker drafts and the rule log.

#[cfg(feature = "e2e")]
mod e2e;

use std::fs;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;

use cfg_core::draft::{draft_from_pick, pattern_for_scope, upsert_draft};
use cfg_core::logs::{LogRing, LOG_CAPACITY};
use cfg_core::picker::PickResult;
use cfg_core::store::state_from_export;
use cfg_core::types::{Scope, StoreState};
use cfg_core::validate::validate_export;
use cfg_core::{preview, ReadyState};

#[derive(Parser)]
#[command(name = "cfg-cli")]
#[command(about = "cfg-AdBlocker state inspection tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Ready {
    Loading,
    Interactive,
    Complete,
}

impl From<Ready> for ReadyState {
    fn from(r: Ready) -> Self {
        match r {
            Ready::Loading => ReadyState::Loading,
            Ready::Interactive => ReadyState::Interactive,
            Ready::Complete => ReadyState::Complete,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum DraftScope {
    Domain,
    Url,
    Pattern,
}

impl From<DraftScope> for Scope {
    fn from(s: DraftScope) -> Self {
        match s {
            DraftScope::Domain => Scope::Domain,
            DraftScope::Url => Scope::Url,
            DraftScope::Pattern => Scope::Pattern,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show which rules a page view would apply, in order
    Preview {
        /// State document or storage export (JSON)
        #[arg(short, long)]
        state: String,

        /// Page URL
        #[arg(short, long)]
        url: String,

        /// Document readiness when the pass runs
        #[arg(short, long, value_enum, default_value = "loading")]
        ready: Ready,
    },

    /// Check every rule for missing fields, bad patterns and unknown values
    Validate {
        /// State document or storage export (JSON)
        #[arg(short, long)]
        input: String,
    },

    /// Build a hide rule from a selector, as the element picker does
    Draft {
        #[arg(long)]
        selector: String,

        #[arg(short, long)]
        url: String,

        /// Pattern scope of the draft
        #[arg(long, value_enum, default_value = "domain")]
        scope: DraftScope,

        /// Merge the draft into this state and print the result
        #[arg(short, long)]
        state: Option<String>,

        /// Write output here instead of stdout
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Print the rule log, oldest first
    Logs {
        /// State document or storage export (JSON)
        #[arg(short, long)]
        input: String,

        /// Only the newest N entries
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Smoke-test a packed extension in Chrome
    #[cfg(feature = "e2e")]
    E2e {
        #[arg(long, default_value = "http://localhost:9515")]
        chromedriver: String,

        /// Unpacked extension directory
        #[arg(short, long)]
        extension: String,

        #[arg(long)]
        headless: bool,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Preview { state, url, ready } => cmd_preview(&state, &url, ready.into()),
        Commands::Validate { input } => cmd_validate(&input),
        Commands::Draft {
            selector,
            url,
            scope,
            state,
            output,
        } => cmd_draft(selector, url, scope.into(), state.as_deref(), output.as_deref()),
        Commands::Logs { input, limit } => cmd_logs(&input, limit),
        #[cfg(feature = "e2e")]
        Commands::E2e {
            chromedriver,
            extension,
            headless,
        } => e2e::run_e2e(e2e::E2eOptions {
            chromedriver_url: chromedriver,
            extension_path: extension,
            headless,
        }),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn read_json(path: &str) -> Result<Value, String> {
    let text = fs::read_to_string(path).map_err(|e| format!("Failed to read '{}': {}", path, e))?;
    serde_json::from_str(&text).map_err(|e| format!("'{}' is not valid JSON: {}", path, e))
}

fn read_state(path: &str) -> Result<StoreState, String> {
    state_from_export(read_json(path)?)
        .map_err(|e| format!("Invalid state in '{}': {}", path, e))?
        .ok_or_else(|| format!("'{}' holds no state", path))
}

fn cmd_preview(path: &str, url: &str, ready: ReadyState) -> Result<(), String> {
    let state = read_state(path)?;
    let entries = match preview(&state, url, ready) {
        Ok(entries) => entries,
        Err(outcome) => {
            println!("No rules apply to {}: {}", url, outcome.as_str());
            return Ok(());
        }
    };

    if state.safe_mode {
        println!("Global safe mode is on; effects would be skipped and logged.");
    }
    println!("{} of {} rules apply to {}", entries.len(), state.rules.len(), url);
    for (i, entry) in entries.iter().enumerate() {
        let rule = entry.rule;
        println!(
            "  {:>3}. [{:>4}] {} ({}) runAt={} gate={}{}",
            i + 1,
            rule.priority,
            rule.name,
            rule.id,
            rule.run_at.as_str(),
            entry.gate.as_str(),
            if rule.safe_mode { " safe-mode" } else { "" },
        );
    }
    Ok(())
}

fn cmd_validate(path: &str) -> Result<(), String> {
    let findings = validate_export(read_json(path)?).map_err(|e| format!("Invalid state in '{}': {}", path, e))?;
    if findings.is_empty() {
        println!("'{}' is valid", path);
        return Ok(());
    }
    for f in &findings {
        println!("  rule #{} ({}): {}", f.index, f.rule_id, f.issue);
    }
    Err(format!("{} problems found", findings.len()))
}

fn cmd_draft(
    selector: String,
    url: String,
    scope: Scope,
    state_path: Option<&str>,
    output: Option<&str>,
) -> Result<(), String> {
    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default();
    let pick = PickResult { selector, url };
    let mut draft = draft_from_pick(&pick, nonce);
    if scope != Scope::Domain {
        draft.pattern = pattern_for_scope(&pick.url, scope);
        draft.scope = scope;
    }

    let json = match state_path {
        Some(path) => {
            let mut state = read_state(path)?;
            let id = upsert_draft(&mut state.rules, draft);
            log::info!("draft stored as rule {}", id);
            serde_json::to_string_pretty(&state)
        }
        None => serde_json::to_string_pretty(&draft),
    }
    .map_err(|e| format!("Failed to encode: {}", e))?;

    match output {
        Some(path) => fs::write(path, json).map_err(|e| format!("Failed to write '{}': {}", path, e)),
        None => {
            println!("{}", json);
            Ok(())
        }
    }
}

fn cmd_logs(path: &str, limit: Option<usize>) -> Result<(), String> {
    let state = read_state(path)?;
    let ring = LogRing::from_entries(state.logs, LOG_CAPACITY);
    let skip = limit.map_or(0, |n| ring.len().saturating_sub(n));
    for entry in ring.iter().skip(skip) {
        println!(
            "{} {:<12} {} {}{}",
            entry.timestamp,
            entry.action.as_str(),
            entry.rule_name,
            entry.url,
            entry.meta.as_deref().map(|m| format!(" ({m})")).unwrap_or_default(),
        );
    }
    println!("{} entries", ring.len());
    Ok(())
}
