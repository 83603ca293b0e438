//! Typed failures raised while judging a submission.
//!
//! Every variant here ends the submission with Internal Error; compile
//! failures and per-test verdicts are outcomes, not errors.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("cannot reach sandbox control port {addr}: {source}")]
    Control {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("session {0} is already being judged")]
    DuplicateSession(String),

    #[error("no completion for session {session_id} within {timeout:?}")]
    CompletionTimeout { session_id: String, timeout: Duration },

    #[error("completion route for session {0} was closed")]
    CompletionClosed(String),

    #[error("sandbox {name}: {source:#}")]
    Sandbox {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("test manifest lists {found} cases, limit is {max}")]
    TooManyTestcases { found: usize, max: usize },
}

impl JudgeError {
    pub(crate) fn sandbox(name: &str, source: anyhow::Error) -> Self {
        Self::Sandbox {
            name: name.to_string(),
            source,
        }
    }

    pub(crate) fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }
}
