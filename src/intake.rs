//! Submission intake: request parsing and the inbound listener.
//!
//! A request is one newline-terminated line of six comma-separated fields:
//! `<unused>,<sessionID>,<sourcePath>,<languageID 0-5>,<testcaseDirPath>,<scoreWeight>`.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

use crate::judge::Judge;
use crate::language::Language;
use crate::sandbox::SandboxRuntime;

/// Number of fields in a submission line.
pub const FIELD_COUNT: usize = 6;

/// How long a client may take to send its submission line.
const READ_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntakeError {
    #[error("field {index} contains characters outside [A-Za-z0-9./_]")]
    InvalidCharacters { index: usize },

    #[error("too few args: expected {FIELD_COUNT} fields, got {0}")]
    TooFewFields(usize),

    #[error("too many args: expected {FIELD_COUNT} fields, got {0}")]
    TooManyFields(usize),

    #[error("session id is empty")]
    EmptySessionId,

    #[error("unknown language id {0:?}")]
    UnknownLanguage(String),

    #[error("invalid score weight {0:?}")]
    InvalidScore(String),
}

/// A request that failed validation, with whatever session id could be
/// recovered for the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub session_id: String,
    pub reason: IntakeError,
}

/// A validated submission request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRequest {
    pub session_id: String,
    pub source_path: PathBuf,
    pub language: Language,
    pub testcase_dir: PathBuf,
    pub score: i64,
}

fn allowed(field: &str) -> bool {
    field
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '/' | '_'))
}

impl SubmissionRequest {
    /// Parse and validate one submission line.
    ///
    /// Character checks run before the arity check, and both before any
    /// field is interpreted.
    pub fn parse(line: &str) -> Result<Self, Rejection> {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();

        let session_id = fields
            .get(1)
            .filter(|id| allowed(id))
            .map(ToString::to_string)
            .unwrap_or_default();
        let reject = |reason| Rejection {
            session_id: session_id.clone(),
            reason,
        };

        if let Some(index) = fields.iter().position(|f| !allowed(f)) {
            return Err(reject(IntakeError::InvalidCharacters { index }));
        }
        if fields.len() < FIELD_COUNT {
            return Err(reject(IntakeError::TooFewFields(fields.len())));
        }
        if fields.len() > FIELD_COUNT {
            return Err(reject(IntakeError::TooManyFields(fields.len())));
        }
        if session_id.is_empty() {
            return Err(reject(IntakeError::EmptySessionId));
        }

        let language = fields[3]
            .parse::<u8>()
            .ok()
            .and_then(Language::from_id)
            .ok_or_else(|| reject(IntakeError::UnknownLanguage(fields[3].to_string())))?;
        let score = fields[5]
            .parse::<i64>()
            .map_err(|_| reject(IntakeError::InvalidScore(fields[5].to_string())))?;

        Ok(Self {
            session_id: session_id.clone(),
            source_path: PathBuf::from(fields[2]),
            language,
            testcase_dir: PathBuf::from(fields[4]),
            score,
        })
    }
}

/// Accept submission connections forever, one judge task per line.
pub async fn serve<R: SandboxRuntime + 'static>(judge: Judge<R>, listener: TcpListener) {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Accepting submissions");
    }

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let judge = judge.clone();
                tokio::spawn(async move {
                    match read_request_line(stream).await {
                        Ok(line) => judge.handle(&line).await,
                        Err(e) => warn!(%peer, error = %e, "Failed to read submission"),
                    }
                });
            }
            Err(e) => warn!(error = %e, "Failed to accept submission connection"),
        }
    }
}

async fn read_request_line(stream: TcpStream) -> anyhow::Result<String> {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    tokio::time::timeout(READ_TIMEOUT, reader.read_line(&mut line))
        .await
        .map_err(|_| anyhow::anyhow!("No submission line within {READ_TIMEOUT:?}"))??;
    Ok(line)
}
