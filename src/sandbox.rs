//! Sandbox runtime trait and per-submission lifecycle.
//!
//! A runtime knows how to create, start, inspect, stop, and remove one
//! named container and how to move files in and out of it. The
//! [`SandboxManager`] layers the submission lifecycle on top: acquire
//! returns a running sandbox with a routable address, release always
//! stops and removes it, recording failures as diagnostics.

mod docker;

pub use docker::DockerRuntime;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, instrument, warn};

use crate::config::Config;
use crate::error::JudgeError;
use crate::judge::Diagnostics;

/// Delay between address inspections of a fresh sandbox.
const ADDRESS_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Operations the judge needs from a container runtime.
///
/// Sandboxes are addressed by name; the judge names each one after its
/// session identifier.
#[async_trait]
pub trait SandboxRuntime: Send + Sync {
    /// Create a stopped sandbox from `image`.
    async fn create(&self, name: &str, image: &str) -> Result<()>;

    /// Start a created sandbox.
    async fn start(&self, name: &str) -> Result<()>;

    /// Private network address, or `None` while not yet assigned.
    async fn address(&self, name: &str) -> Result<Option<String>>;

    /// Stop the sandbox, killing it after `timeout`.
    async fn stop(&self, name: &str, timeout: Duration) -> Result<()>;

    /// Force-remove the sandbox and its volumes.
    async fn remove(&self, name: &str) -> Result<()>;

    /// Write `contents` to the absolute `path` inside the sandbox.
    async fn write_file(&self, name: &str, path: &str, contents: &[u8]) -> Result<()>;

    /// Read the file at the absolute `path` inside the sandbox.
    async fn read_file(&self, name: &str, path: &str) -> Result<Vec<u8>>;
}

/// A running sandbox owned by exactly one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sandbox {
    pub name: String,
    pub address: String,
}

/// Creates and destroys one sandbox per submission.
pub struct SandboxManager<R> {
    runtime: Arc<R>,
    image: String,
    stop_timeout: Duration,
    address_attempts: u32,
}

impl<R> Clone for SandboxManager<R> {
    fn clone(&self) -> Self {
        Self {
            runtime: Arc::clone(&self.runtime),
            image: self.image.clone(),
            stop_timeout: self.stop_timeout,
            address_attempts: self.address_attempts,
        }
    }
}

impl<R: SandboxRuntime> SandboxManager<R> {
    pub fn new(runtime: Arc<R>, config: &Config) -> Self {
        Self {
            runtime,
            image: config.image.clone(),
            stop_timeout: config.stop_timeout(),
            address_attempts: config.address_attempts.max(1),
        }
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    /// Create and start the sandbox for `session_id` and wait for its
    /// address.
    ///
    /// If anything after creation fails, the half-built sandbox is released
    /// before the error is returned.
    #[instrument(skip(self, diagnostics))]
    pub async fn acquire(
        &self,
        session_id: &str,
        diagnostics: &mut Diagnostics,
    ) -> Result<Sandbox, JudgeError> {
        self.runtime
            .create(session_id, &self.image)
            .await
            .map_err(|e| JudgeError::sandbox(session_id, e.context("create failed")))?;

        match self.start_and_locate(session_id).await {
            Ok(address) => {
                info!(session = %session_id, %address, "Sandbox ready");
                Ok(Sandbox {
                    name: session_id.to_string(),
                    address,
                })
            }
            Err(e) => {
                self.teardown(session_id, diagnostics).await;
                Err(e)
            }
        }
    }

    async fn start_and_locate(&self, name: &str) -> Result<String, JudgeError> {
        self.runtime
            .start(name)
            .await
            .map_err(|e| JudgeError::sandbox(name, e.context("start failed")))?;

        for _ in 0..self.address_attempts {
            let address = self
                .runtime
                .address(name)
                .await
                .map_err(|e| JudgeError::sandbox(name, e.context("inspect failed")))?;
            if let Some(address) = address.filter(|a| !a.is_empty()) {
                return Ok(address);
            }
            tokio::time::sleep(ADDRESS_POLL_INTERVAL).await;
        }

        Err(JudgeError::sandbox(
            name,
            anyhow::anyhow!(
                "no network address after {} inspections",
                self.address_attempts
            ),
        ))
    }

    /// Stop and remove the sandbox. Failures become diagnostics.
    pub async fn release(&self, sandbox: Sandbox, diagnostics: &mut Diagnostics) {
        self.teardown(&sandbox.name, diagnostics).await;
    }

    async fn teardown(&self, name: &str, diagnostics: &mut Diagnostics) {
        if let Err(e) = self.runtime.stop(name, self.stop_timeout).await {
            warn!(sandbox = %name, error = %e, "Failed to stop sandbox");
            diagnostics.note(format_args!("stop sandbox: {e:#}"));
        }
        if let Err(e) = self.runtime.remove(name).await {
            warn!(sandbox = %name, error = %e, "Failed to remove sandbox");
            diagnostics.note(format_args!("remove sandbox: {e:#}"));
        }
        info!(sandbox = %name, "Sandbox released");
    }
}
