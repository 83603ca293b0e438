//! Completion correlator: routes asynchronous completion notices to the
//! submission waiting for them.
//!
//! Agents dial back to one shared listener. Each session registers a
//! private FIFO route before its sandbox is acquired; the route is removed
//! when the returned [`CompletionSlot`] is dropped. A waiter only ever sees
//! records carrying its own session identifier.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::JudgeError;
use crate::transport::{recv_message, CompletionRecord};

/// How long an agent may take to deliver its record once connected.
const READ_TIMEOUT: Duration = Duration::from_secs(10);

type Route = mpsc::UnboundedSender<CompletionRecord>;

/// Session-keyed routing table for completion notices.
#[derive(Debug, Default)]
pub struct Correlator {
    routes: Mutex<HashMap<String, Route>>,
}

impl Correlator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn routes(&self) -> MutexGuard<'_, HashMap<String, Route>> {
        self.routes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a route for `session_id`.
    ///
    /// Fails if the session is already routed, so two submissions can never
    /// share a route.
    pub fn register(self: &Arc<Self>, session_id: &str) -> Result<CompletionSlot, JudgeError> {
        let mut routes = self.routes();
        if routes.contains_key(session_id) {
            return Err(JudgeError::DuplicateSession(session_id.to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        routes.insert(session_id.to_string(), tx);
        debug!(session = %session_id, "Completion route registered");

        Ok(CompletionSlot {
            session_id: session_id.to_string(),
            rx,
            correlator: Arc::clone(self),
        })
    }

    /// Hand a record to its session. Returns `false` if nobody is waiting
    /// for that session; the record is dropped.
    pub fn deliver(&self, record: CompletionRecord) -> bool {
        let routes = self.routes();
        match routes.get(&record.session_id) {
            Some(route) => route.send(record).is_ok(),
            None => {
                warn!(session = %record.session_id, "Dropping completion for unknown session");
                false
            }
        }
    }

    /// Number of sessions currently routed.
    pub fn pending(&self) -> usize {
        self.routes().len()
    }

    fn unregister(&self, session_id: &str) {
        if self.routes().remove(session_id).is_some() {
            debug!(session = %session_id, "Completion route removed");
        }
    }

    /// Accept completion connections forever.
    ///
    /// Each connection is decoded on its own task; a malformed record is
    /// logged and dropped without affecting the listener.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) {
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "Completion correlator listening");
        }

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let correlator = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = correlator.handle_connection(stream).await {
                            warn!(%peer, error = %e, "Discarding malformed completion");
                        }
                    });
                }
                Err(e) => warn!(error = %e, "Failed to accept completion connection"),
            }
        }
    }

    async fn handle_connection(&self, mut stream: TcpStream) -> anyhow::Result<()> {
        let record: CompletionRecord = tokio::time::timeout(READ_TIMEOUT, recv_message(&mut stream))
            .await
            .map_err(|_| anyhow::anyhow!("No completion record within {READ_TIMEOUT:?}"))??;

        debug!(
            session = %record.session_id,
            elapsed_ms = record.elapsed_ms,
            success = record.success,
            "Completion received"
        );
        self.deliver(record);
        Ok(())
    }
}

/// One session's private completion route.
///
/// Records arrive in the order the agent sent them. Dropping the slot
/// removes the route.
#[derive(Debug)]
pub struct CompletionSlot {
    session_id: String,
    rx: mpsc::UnboundedReceiver<CompletionRecord>,
    correlator: Arc<Correlator>,
}

impl CompletionSlot {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Wait for the next record of this session, up to `timeout`.
    pub async fn wait(&mut self, timeout: Duration) -> Result<CompletionRecord, JudgeError> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(record)) => Ok(record),
            Ok(None) => Err(JudgeError::CompletionClosed(self.session_id.clone())),
            Err(_) => Err(JudgeError::CompletionTimeout {
                session_id: self.session_id.clone(),
                timeout,
            }),
        }
    }
}

impl Drop for CompletionSlot {
    fn drop(&mut self) {
        self.correlator.unregister(&self.session_id);
    }
}
