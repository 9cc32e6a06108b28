//! Blocking request/response over the asynchronous bus.
//!
//! Each exchange arms the shared pending-wait slot, sends one frame and then
//! suspends until the dispatcher fills the slot or the deadline passes.
//! Responses carry no correlation id, so at most one exchange may be
//! outstanding. Every exchange takes `&mut self`, which makes a second
//! concurrent exchange through the same synchronizer impossible to express.

use crate::error::{Error, Result};
use crate::protocol::response::ACK_SUCCESS;
use crate::protocol::{Command, Frame, Response, WaitKind};
use crate::state::SessionState;
use crate::transport::Transport;
use log::{error, info, trace};
use std::sync::Arc;
use std::time::Duration;

/// Default deadline for acknowledgements.
pub const ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Default deadline for checksum reports.
pub const CHECKSUM_TIMEOUT: Duration = Duration::from_secs(1);

/// Issues commands and waits for their responses.
pub struct CommandSynchronizer<T: Transport> {
    transport: T,
    state: Arc<SessionState>,
}

impl<T: Transport> CommandSynchronizer<T> {
    /// Create a synchronizer sending through `transport`.
    ///
    /// The caller is responsible for routing inbound frames into `state`
    /// (see [`crate::dispatcher::Dispatcher`]).
    pub fn new(transport: T, state: Arc<SessionState>) -> Self {
        Self { transport, state }
    }

    /// Shared session state.
    pub fn state(&self) -> &Arc<SessionState> {
        &self.state
    }

    /// Underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send `command` and wait for a successful acknowledgement.
    ///
    /// Fails with [`Error::Timeout`] when nothing arrives in time and with
    /// [`Error::DeviceRejected`] when the device answers with a failure
    /// status. Both are logged as errors.
    pub fn await_acknowledgement(
        &mut self,
        command: Command,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<()> {
        match self.exchange(WaitKind::Confirmation, command, payload, timeout)? {
            Response::Acknowledgement {
                status: ACK_SUCCESS,
            } => Ok(()),
            Response::Acknowledgement { status } => {
                error!(
                    "{} rejected by node {}, status: 0x{status:02X}",
                    command.description(),
                    self.state.target()
                );
                Err(Error::DeviceRejected { status })
            },
            other => Err(Error::Transport(format!(
                "Unexpected response to {}: {other:?}",
                command.description()
            ))),
        }
    }

    /// Request the device checksum and wait for the report.
    pub fn await_checksum(&mut self, timeout: Duration) -> Result<u32> {
        match self.exchange(WaitKind::Checksum, Command::RequestChecksum, &[], timeout)? {
            Response::ChecksumReport { value } => Ok(value),
            other => Err(Error::Transport(format!(
                "Unexpected response to CRC request: {other:?}"
            ))),
        }
    }

    fn exchange(
        &mut self,
        kind: WaitKind,
        command: Command,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<Response> {
        let target = self.state.target();
        let frame = Frame::command(target, command, payload)?;

        // Armed before sending so a fast response cannot be missed.
        self.state.arm(kind);
        if let Err(e) = self.transport.send(&frame) {
            self.state.disarm();
            error!("Failed to send {}: {e}", command.description());
            return Err(e);
        }

        if self.state.verbose() && command != Command::WriteData {
            if payload.is_empty() {
                info!("Sent: {} to node {target}", command.description());
            } else {
                info!(
                    "Sent: {} to node {target}, Data length: {}",
                    command.description(),
                    payload.len()
                );
            }
        } else {
            trace!("Sent {frame:?}");
        }

        self.state
            .wait(kind, timeout)
            .ok_or_else(|| {
                error!("Timeout waiting for {}!", kind.describe());
                Error::Timeout {
                    what: kind.describe(),
                    after: timeout,
                }
            })
    }
}
