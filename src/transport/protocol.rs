//! Wire types for the sandbox agent.
//!
//! One JSON object per TCP connection in each direction. Field names are
//! fixed by the agent, hence the explicit renames.

use serde::{Deserialize, Serialize};

/// How the agent should run a command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// Plain tool invocation (mkdir, compile, chown).
    #[default]
    #[serde(rename = "", alias = "others")]
    Others,
    /// Supervised test run: timeout applied, stdout/stderr captured to files.
    #[serde(rename = "judge")]
    Judge,
}

/// Request sent from the judge to a sandbox agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRequest {
    #[serde(rename = "sessionID")]
    pub session_id: String,
    pub command: String,
    #[serde(default)]
    pub mode: Mode,
}

impl CommandRequest {
    pub fn new(session_id: &str, command: impl Into<String>, mode: Mode) -> Self {
        Self {
            session_id: session_id.to_string(),
            command: command.into(),
            mode,
        }
    }
}

/// Completion notice dialed back by an agent once a command finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRecord {
    #[serde(rename = "sessionID")]
    pub session_id: String,
    /// Elapsed wall-clock time in milliseconds.
    #[serde(rename = "time", default)]
    pub elapsed_ms: i64,
    #[serde(rename = "result", default)]
    pub success: bool,
    #[serde(rename = "errMessage", default)]
    pub error_message: String,
}
