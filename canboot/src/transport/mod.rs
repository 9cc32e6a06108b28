//! Transport abstraction for raw bootloader frames.
//!
//! The protocol engine never touches the bus directly. It sends through a
//! [`Transport`] and learns about inbound traffic through a callback that the
//! transport invokes from its own receive context:
//!
//! ```text
//! +-------------------+   send(frame)    +--------------------+
//! |  Synchronizer     | ---------------> |                    |
//! |  (command flow)   |                  |     Transport      | <==> CAN bus
//! +-------------------+                  |  (SocketCAN, ...)  |
//!          ^                             |                    |
//!          | shared slot + signal        +--------------------+
//! +-------------------+   handler(frame)          |
//! |    Dispatcher     | <--------------------------+
//! |  (receive flow)   |
//! +-------------------+
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use canboot::transport::Transport;
//! use canboot::protocol::{Command, Frame, TargetId};
//!
//! fn erase<T: Transport>(transport: &T) -> canboot::Result<()> {
//!     let frame = Frame::command(TargetId::DEFAULT, Command::Erase, &[])?;
//!     transport.send(&frame)
//! }
//! ```

#[cfg(all(feature = "socketcan", target_os = "linux"))]
pub mod native;

use crate::error::Result;
use crate::protocol::Frame;

/// Callback invoked for every inbound frame.
///
/// Runs on the transport's receive thread and must return quickly.
pub type FrameHandler = Box<dyn Fn(&Frame) + Send + Sync + 'static>;

/// Raw frame transport.
pub trait Transport: Send {
    /// Put one frame on the bus.
    fn send(&self, frame: &Frame) -> Result<()>;

    /// Install the callback for inbound frames, replacing any previous one.
    fn on_receive(&mut self, handler: FrameHandler);

    /// Begin delivering inbound frames to the installed callback.
    fn start_receiving(&mut self) -> Result<()>;

    /// Interface name used in log messages.
    fn name(&self) -> &str;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&self, frame: &Frame) -> Result<()> {
        (**self).send(frame)
    }

    fn on_receive(&mut self, handler: FrameHandler) {
        (**self).on_receive(handler);
    }

    fn start_receiving(&mut self) -> Result<()> {
        (**self).start_receiving()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

// Re-export the native implementation when available
#[cfg(all(feature = "socketcan", target_os = "linux"))]
pub use native::SocketCanTransport;
