//! Receive-side demultiplexer.
//!
//! The dispatcher is the only consumer of inbound frames. It runs on the
//! transport's receive thread, so it must never block: it classifies the
//! frame, writes at most one response into the shared slot and signals.

use crate::protocol::response::ACK_SUCCESS;
use crate::protocol::{Frame, Response};
use crate::state::{Delivery, SessionState};
use log::{debug, error, info};
use std::sync::Arc;

/// Routes inbound frames to the command currently waiting for a response.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    state: Arc<SessionState>,
}

impl Dispatcher {
    /// Create a dispatcher publishing into `state`.
    pub fn new(state: Arc<SessionState>) -> Self {
        Self { state }
    }

    /// Handle one inbound frame.
    ///
    /// Returns the classified response and whether it reached a waiter.
    pub fn dispatch(&self, frame: &Frame) -> (Response, Delivery) {
        let verbose = self.state.verbose();
        let (node, command, payload) = frame.decode();

        if verbose {
            debug!(
                "Node: {}, Cmd: 0x{command:02X}, DLC: {}",
                node.get(),
                payload.len()
            );
        }

        let response = Response::classify(frame);
        if verbose {
            match response {
                Response::ChecksumReport { value } => info!("CRC received: 0x{value:08X}"),
                Response::Acknowledgement {
                    status: ACK_SUCCESS,
                } => info!("Operation confirmed"),
                Response::Acknowledgement { status } => {
                    error!("Operation failed, status: 0x{status:02X}");
                },
                Response::Unrecognized {
                    target,
                    command,
                    len,
                } => {
                    debug!("Response from node {target}, cmd=0x{command:X}, DLC={len}");
                },
            }
        }

        let delivery = self.state.deliver(response);
        match delivery {
            Delivery::Delivered => {},
            Delivery::NoWaiter if response.wait_kind().is_none() => {},
            Delivery::NoWaiter => debug!("Dropping unsolicited {response:?}"),
            Delivery::KindMismatch { expected } => {
                debug!(
                    "Dropping {response:?} while waiting for {}",
                    expected.describe()
                );
            },
            Delivery::AlreadyAnswered => debug!("Dropping duplicate {response:?}"),
        }

        (response, delivery)
    }

    /// Wrap the dispatcher into a transport receive callback.
    pub fn into_handler(self) -> crate::transport::FrameHandler {
        Box::new(move |frame: &Frame| {
            self.dispatch(frame);
        })
    }
}
