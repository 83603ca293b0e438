//! Process-wide judge configuration.
//!
//! Ports, paths, and limits are fixed for the lifetime of the process and
//! never negotiated per request. Values come from a JSON file, the
//! `CAFECODER_JUDGE_CONFIG` environment variable (inline JSON), or the
//! built-in defaults, in that order of priority.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Environment variable holding an inline JSON configuration.
pub const CONFIG_ENV: &str = "CAFECODER_JUDGE_CONFIG";

/// Top-level configuration for the judge.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listener for raw submission lines.
    pub intake_addr: String,

    /// Listener for completion notices dialed back by sandbox agents.
    pub completion_addr: String,

    /// Where results and diagnostics are delivered.
    pub backend_addr: String,

    /// Port the in-sandbox agent accepts commands on.
    pub control_port: u16,

    /// Image every sandbox is created from.
    pub image: String,

    /// Per-session work directories live under this prefix inside the sandbox.
    pub work_dir_prefix: String,

    /// Restricted user that owns the artifact before it runs.
    pub exec_user: String,

    /// Wall-clock kill timeout the agent applies to each test run.
    pub run_timeout_seconds: u64,

    /// Elapsed times above this are Time Limit Exceeded.
    pub tle_threshold_ms: i64,

    /// Grace period given to a sandbox when stopping it.
    pub stop_timeout_seconds: u64,

    /// How long one correlated round may wait for its completion notice.
    pub completion_timeout_seconds: u64,

    /// How many times to inspect a fresh sandbox for its address.
    pub address_attempts: u32,

    /// Upper bound on entries in a test manifest.
    pub max_testcases: usize,

    /// Run the syntax-check round for interpreted languages.
    pub syntax_check_interpreted: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            intake_addr: "0.0.0.0:8888".into(),
            completion_addr: "0.0.0.0:3344".into(),
            backend_addr: "localhost:5963".into(),
            control_port: 8887,
            image: "cafecoder".into(),
            work_dir_prefix: "/cafecoderUsers".into(),
            exec_user: "rbash_user".into(),
            run_timeout_seconds: 3,
            tle_threshold_ms: 2000,
            stop_timeout_seconds: 5,
            completion_timeout_seconds: 60,
            address_attempts: 20,
            max_testcases: 256,
            syntax_check_interpreted: false,
        }
    }
}

impl Config {
    /// Load configuration.
    ///
    /// Priority: explicit file > `CAFECODER_JUDGE_CONFIG` env var > defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            return Self::from_json(&raw)
                .with_context(|| format!("Failed to parse config file {}", path.display()));
        }

        match std::env::var(CONFIG_ENV) {
            Ok(raw) => Self::from_json(&raw).with_context(|| format!("Failed to parse {CONFIG_ENV}")),
            Err(_) => Ok(Self::default()),
        }
    }

    /// Parse a configuration from a JSON string. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("Failed to parse JSON")?;
        Ok(config)
    }

    /// Work directory of a session inside its sandbox.
    pub fn work_dir(&self, session_id: &str) -> String {
        format!("{}/{}", self.work_dir_prefix.trim_end_matches('/'), session_id)
    }

    pub const fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_seconds)
    }

    pub const fn completion_timeout(&self) -> Duration {
        Duration::from_secs(self.completion_timeout_seconds)
    }
}
