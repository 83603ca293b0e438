//! Fire-and-forget command client for sandbox agents.
//!
//! Each command gets a fresh connection to `address:control_port`. The
//! client only confirms transmission; results arrive later through the
//! completion correlator.

use tokio::net::TcpStream;
use tracing::{debug, instrument};

use super::protocol::CommandRequest;
use super::send_message;
use crate::error::JudgeError;

#[derive(Debug, Clone, Copy)]
pub struct ControlClient {
    port: u16,
}

impl ControlClient {
    pub const fn new(port: u16) -> Self {
        Self { port }
    }

    /// Transmit one command. Never retried.
    #[instrument(skip(self, request), fields(session = %request.session_id, mode = ?request.mode))]
    pub async fn send(&self, address: &str, request: &CommandRequest) -> Result<(), JudgeError> {
        let addr = format!("{address}:{}", self.port);
        let io_error = |source| JudgeError::Control {
            addr: addr.clone(),
            source,
        };

        let mut stream = TcpStream::connect(&addr).await.map_err(io_error)?;
        send_message(&mut stream, request)
            .await
            .map_err(|e| io_error(std::io::Error::other(e)))?;

        debug!(command = %request.command, "Command sent");
        Ok(())
    }
}
