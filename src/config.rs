//! Runtime configuration — endpoint, model, tunable delays, onboarding flag.
//!
//! Everything is resolved from environment variables with hard defaults, the
//! same way the rest of the app reads its env-based settings. `.env.local` /
//! `.env` loading happens in main() before this module is consulted.

use std::path::PathBuf;
use std::time::Duration;

/// Resolved configuration for one process lifetime.
///
/// The settle delays are deliberate race-avoidance heuristics: the OS gives
/// no signal that the foreign app has processed a synthetic keystroke, so we
/// wait a short fixed interval before reading/restoring the clipboard. They
/// are tunable, not architectural constants.
#[derive(Debug, Clone)]
pub struct Config {
    /// Ollama generate endpoint, e.g. `http://localhost:11435/api/generate`.
    pub endpoint: String,
    /// Model name passed in every request body.
    pub model: String,
    /// Wall-clock bound on any single HTTP request.
    pub request_timeout: Duration,
    /// Wait after synthesizing Cmd+C before reading the clipboard.
    pub copy_settle: Duration,
    /// Wait after synthesizing Cmd+V before restoring the clipboard.
    pub paste_settle: Duration,
}

const DEFAULT_ENDPOINT: &str = "http://localhost:11435/api/generate";
const DEFAULT_MODEL: &str = "llama3.2:1b";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SETTLE_MS: u64 = 50;

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            copy_settle: Duration::from_millis(DEFAULT_SETTLE_MS),
            paste_settle: Duration::from_millis(DEFAULT_SETTLE_MS),
        }
    }
}

impl Config {
    /// Build a config from the environment, falling back to defaults for
    /// anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            endpoint: env_string("GLINT_OLLAMA_URL").unwrap_or(defaults.endpoint),
            model: env_string("GLINT_MODEL").unwrap_or(defaults.model),
            request_timeout: env_millis("GLINT_REQUEST_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.request_timeout),
            copy_settle: env_millis("GLINT_COPY_SETTLE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.copy_settle),
            paste_settle: env_millis("GLINT_PASTE_SETTLE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.paste_settle),
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_millis(key: &str) -> Option<u64> {
    match env_string(key)?.parse() {
        Ok(ms) => Some(ms),
        Err(_) => {
            log::warn!("[CONFIG] Ignoring unparseable {}", key);
            None
        }
    }
}

// ── Onboarding flag ──────────────────────────────────────────────────

/// Marker file recording that the user has been shown the one-time
/// permission/usage walkthrough. The walkthrough UI itself lives outside
/// this crate; we only persist the flag.
fn onboarding_marker() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("glint").join("onboarded"))
}

pub fn has_completed_onboarding() -> bool {
    onboarding_marker().map(|p| p.exists()).unwrap_or(false)
}

pub fn mark_onboarding_complete() {
    let Some(marker) = onboarding_marker() else {
        log::warn!("[CONFIG] No config dir — onboarding flag not persisted");
        return;
    };
    if let Some(parent) = marker.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            log::warn!("[CONFIG] Could not create {}: {}", parent.display(), e);
            return;
        }
    }
    if let Err(e) = std::fs::write(&marker, b"") {
        log::warn!("[CONFIG] Could not write onboarding flag: {}", e);
    }
}
