use std::path::PathBuf;
use std::time::Duration;

use serde_json::{json, Value};
use thirtyfour::extensions::cdp::ChromeDevTools;
use thirtyfour::prelude::*;
use thirtyfour::ChromeCapabilities;

const TEST_PAGE_URL: &str = "https://example.com/";
const TEST_RULE_ID: &str = "e2e-hide-heading";

pub struct E2eOptions {
    pub chromedriver_url: String,
    pub extension_path: String,
    pub headless: bool,
}

pub fn run_e2e(opts: E2eOptions) -> Result<(), String> {
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to start tokio runtime: {}", e))?;
    runtime.block_on(run_e2e_async(opts))
}

async fn run_e2e_async(opts: E2eOptions) -> Result<(), String> {
    let extension_path = canonicalize_path(&opts.extension_path)?;

    let mut caps = ChromeCapabilities::new();
    let mut args = vec![
        format!("--disable-extensions-except={}", extension_path.display()),
        format!("--load-extension={}", extension_path.display()),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
    ];
    if opts.headless {
        args.push("--headless=new".to_string());
        args.push("--disable-gpu".to_string());
    }
    for arg in &args {
        caps.add_arg(arg)
            .map_err(|e| format!("Failed to set chrome arg: {}", e))?;
    }

    let driver = WebDriver::new(&opts.chromedriver_url, caps)
        .await
        .map_err(|e| format!("Failed to connect to chromedriver: {}", e))?;

    let cdp = ChromeDevTools::new(driver.handle.clone());
    tokio::time::sleep(Duration::from_secs(1)).await;

    let extension_id = find_extension_id(&cdp)
        .await
        .ok_or_else(|| "Failed to locate extension service worker".to_string())?;
    let options_url = format!("chrome-extension://{}/options/options.html", extension_id);

    let mut errors = Vec::new();

    if let Err(e) = seed_state(&driver, &options_url).await {
        errors.push(format!("Seeding state failed: {}", e));
    }

    if let Err(e) = check_rule_applied(&driver).await {
        errors.push(format!("Rule application check failed: {}", e));
    }

    if let Err(e) = check_rule_logged(&driver, &options_url).await {
        errors.push(format!("Rule log check failed: {}", e));
    }

    driver.quit().await.ok();

    if errors.is_empty() {
        println!("E2E checks passed");
        Ok(())
    } else {
        Err(format!("E2E failed:\n- {}", errors.join("\n- ")))
    }
}

async fn find_extension_id(cdp: &ChromeDevTools) -> Option<String> {
    let targets = cdp.execute_cdp("Target.getTargets").await.ok()?;
    let infos = targets.get("targetInfos")?.as_array()?;
    for info in infos {
        let target_type = info.get("type").and_then(Value::as_str).unwrap_or("");
        let url = info.get("url").and_then(Value::as_str).unwrap_or("");
        let is_worker = matches!(target_type, "service_worker" | "background_page");
        if is_worker && url.starts_with("chrome-extension://") {
            let id = url.trim_start_matches("chrome-extension://");
            if let Some(id) = id.split('/').next().filter(|id| !id.is_empty()) {
                return Some(id.to_string());
            }
        }
    }
    None
}

/// Store one rule hiding the test page's heading.
async fn seed_state(driver: &WebDriver, options_url: &str) -> Result<(), String> {
    driver.goto(options_url).await.map_err(|e| format!("Failed to open options page: {}", e))?;
    let state = json!({
        "enabled": true,
        "safeMode": false,
        "version": 1,
        "rules": [{
            "id": TEST_RULE_ID,
            "name": "E2E hide heading",
            "enabled": true,
            "pattern": "*://example.com/*",
            "priority": 0,
            "runAt": "document_start",
            "world": "ISOLATED",
            "css": "h1 { display: none !important; }"
        }],
        "logs": []
    });
    driver
        .execute_async(
            "const [state, done] = arguments; chrome.storage.local.set({ cfgState: state }).then(() => done(true));",
            vec![state],
        )
        .await
        .map_err(|e| format!("Failed to write storage: {}", e))?;
    Ok(())
}

async fn check_rule_applied(driver: &WebDriver) -> Result<(), String> {
    driver.goto(TEST_PAGE_URL)
        .await
        .map_err(|e| format!("Failed to navigate to {}: {}", TEST_PAGE_URL, e))?;
    tokio::time::sleep(Duration::from_millis(500)).await;
    let hidden = eval_bool(driver, "return getComputedStyle(document.querySelector('h1')).display === 'none';")
        .await
        .map_err(|e| format!("Failed to read heading style: {}", e))?;
    if !hidden {
        return Err("Heading is still visible".to_string());
    }
    Ok(())
}

async fn check_rule_logged(driver: &WebDriver, options_url: &str) -> Result<(), String> {
    driver.goto(options_url).await.map_err(|e| format!("Failed to open options page: {}", e))?;
    let ret = driver
        .execute_async(
            "const [done] = arguments; chrome.storage.local.get('cfgState').then(r => done(r.cfgState?.logs ?? []));",
            Vec::<Value>::new(),
        )
        .await
        .map_err(|e| format!("Failed to read storage: {}", e))?;
    let logs = ret.json().as_array().cloned().unwrap_or_default();
    let logged = logs.iter().any(|entry| {
        entry.get("ruleId").and_then(Value::as_str) == Some(TEST_RULE_ID)
            && entry.get("action").and_then(Value::as_str) == Some("css-inline")
    });
    if !logged {
        return Err(format!("No css-inline entry for {} among {} log entries", TEST_RULE_ID, logs.len()));
    }
    Ok(())
}

async fn eval_bool(driver: &WebDriver, script: &str) -> WebDriverResult<bool> {
    let result = driver.execute(script, Vec::<Value>::new()).await?;
    Ok(result.json().as_bool().unwrap_or(false))
}

fn canonicalize_path(path: &str) -> Result<PathBuf, String> {
    std::fs::canonicalize(path)
        .map_err(|e| format!("Failed to resolve '{}': {}", path, e))
}
