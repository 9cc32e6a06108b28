//! Native CAN transport using Linux SocketCAN via the `socketcan` crate.
//!
//! The interface must be configured before use:
//!
//! ```text
//! sudo ip link set can0 up type can bitrate 500000
//! ```

use {
    crate::{
        error::{Error, Result},
        protocol::Frame,
        transport::{FrameHandler, Transport},
    },
    log::{debug, trace, warn},
    socketcan::{CanFrame, CanSocket, EmbeddedFrame, Id, Socket, StandardId},
    std::{
        io,
        sync::{
            Arc, PoisonError, RwLock,
            atomic::{AtomicBool, Ordering},
        },
        thread::{self, JoinHandle},
        time::Duration,
    },
};

/// How long a blocking read waits before re-checking the stop flag.
const READ_POLL_INTERVAL: Duration = Duration::from_millis(100);

type SharedHandler = Arc<RwLock<Option<FrameHandler>>>;

/// SocketCAN transport with a background reader thread.
pub struct SocketCanTransport {
    socket: Arc<CanSocket>,
    name: String,
    handler: SharedHandler,
    running: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl SocketCanTransport {
    /// Open a raw CAN socket on `interface` (e.g. "can0").
    pub fn open(interface: &str) -> Result<Self> {
        let socket = CanSocket::open(interface).map_err(|e| {
            Error::Transport(format!("Failed to open CAN interface {interface}: {e}"))
        })?;
        socket.set_read_timeout(READ_POLL_INTERVAL)?;

        debug!("Opened CAN interface {interface}");

        Ok(Self {
            socket: Arc::new(socket),
            name: interface.to_string(),
            handler: Arc::new(RwLock::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            reader: None,
        })
    }

    /// Stop the reader thread, if running.
    pub fn stop_receiving(&mut self) {
        self.running
            .store(false, Ordering::Relaxed);
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

impl Transport for SocketCanTransport {
    fn send(&self, frame: &Frame) -> Result<()> {
        let can_frame = to_can_frame(frame)?;
        trace!("TX {frame:?}");
        self.socket
            .write_frame(&can_frame)
            .map_err(|e| Error::Transport(format!("Failed to send on {}: {e}", self.name)))
    }

    fn on_receive(&mut self, handler: FrameHandler) {
        *self
            .handler
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    fn start_receiving(&mut self) -> Result<()> {
        if self.reader.is_some() {
            return Ok(());
        }

        self.running
            .store(true, Ordering::Relaxed);

        let socket = Arc::clone(&self.socket);
        let handler = Arc::clone(&self.handler);
        let running = Arc::clone(&self.running);
        let name = self.name.clone();

        let reader = thread::Builder::new()
            .name(format!("{}-rx", self.name))
            .spawn(move || read_loop(&socket, &handler, &running, &name))?;
        self.reader = Some(reader);

        debug!("Receiving on {}", self.name);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for SocketCanTransport {
    fn drop(&mut self) {
        self.stop_receiving();
    }
}

fn read_loop(socket: &CanSocket, handler: &SharedHandler, running: &AtomicBool, name: &str) {
    while running.load(Ordering::Relaxed) {
        match socket.read_frame() {
            Ok(can_frame) => {
                let Some(frame) = from_can_frame(&can_frame) else {
                    continue;
                };
                trace!("RX {frame:?}");
                if let Some(handler) = handler
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .as_ref()
                {
                    handler(&frame);
                }
            },
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) => {},
            Err(e) => {
                warn!("CAN read error on {name}: {e}");
                thread::sleep(READ_POLL_INTERVAL);
            },
        }
    }
}

/// Convert a bootloader frame into a standard-id SocketCAN data frame.
fn to_can_frame(frame: &Frame) -> Result<CanFrame> {
    let id = StandardId::new(frame.address()).ok_or_else(|| {
        Error::Transport(format!(
            "Address 0x{:03X} (target {}) does not fit an 11-bit CAN ID",
            frame.address(),
            frame.target()
        ))
    })?;

    CanFrame::new(id, frame.payload())
        .ok_or_else(|| Error::Transport(format!("Cannot build CAN frame from {frame:?}")))
}

/// Convert a received SocketCAN frame; only standard-id data frames qualify.
fn from_can_frame(can_frame: &CanFrame) -> Option<Frame> {
    match can_frame {
        CanFrame::Data(data_frame) => match data_frame.id() {
            Id::Standard(id) => Some(Frame::from_raw(id.as_raw(), data_frame.data())),
            Id::Extended(_) => None,
        },
        CanFrame::Remote(_) | CanFrame::Error(_) => None,
    }
}
