//! Simulated bootloader shared by the integration tests.
#![allow(dead_code)]

use canboot::{Command, Error, Frame, FrameHandler, TargetId, Transport, Uploader};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

pub const SHORT: Duration = Duration::from_millis(100);

/// How the simulated bootloader reacts to a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Ack,
    Nack(u8),
    Silent,
}

#[derive(Default)]
pub struct Script {
    /// Replies overriding the default acknowledgement, keyed by command.
    pub overrides: Vec<(Command, Reply)>,
    /// Reject the Write-Data command with this 0-based index.
    pub nack_word: Option<usize>,
    /// Fail to send the Write-Data command with this 0-based index.
    pub fail_send_word: Option<usize>,
    /// Checksum reported for Request-Checksum; `None` stays silent.
    pub checksum: Option<u32>,
    /// Answer from a separate thread instead of inside `send`.
    pub threaded: bool,
}

/// Bootloader double that records every frame and answers through the receive handler.
pub struct SimulatedDevice {
    script: Script,
    sent: Arc<Mutex<Vec<Frame>>>,
    handler: Option<Arc<FrameHandler>>,
    receiving: bool,
}

impl SimulatedDevice {
    fn new(script: Script) -> Self {
        Self {
            script,
            sent: Arc::new(Mutex::new(Vec::new())),
            handler: None,
            receiving: false,
        }
    }

    fn log(&self) -> Arc<Mutex<Vec<Frame>>> {
        Arc::clone(&self.sent)
    }

    fn reply_for(&self, command: Command, words_seen: usize) -> Option<Frame> {
        let target = TargetId::DEFAULT;
        let ack = |status: u8| Frame::encode(target, 0x11, &[status]).ok();

        if command == Command::RequestChecksum {
            return self
                .script
                .checksum
                .and_then(|crc| Frame::encode(target, 0x12, &crc.to_be_bytes()).ok());
        }

        if command == Command::WriteData && self.script.nack_word == Some(words_seen - 1) {
            return ack(0x00);
        }

        let reply = self
            .script
            .overrides
            .iter()
            .find(|(c, _)| *c == command)
            .map_or(Reply::Ack, |(_, r)| *r);

        match reply {
            Reply::Ack => ack(0xFF),
            Reply::Nack(status) => ack(status),
            Reply::Silent => None,
        }
    }
}

impl Transport for SimulatedDevice {
    fn send(&self, frame: &Frame) -> canboot::Result<()> {
        let (words_seen, command) = {
            let mut sent = self.sent.lock().unwrap();
            sent.push(*frame);
            let words = sent
                .iter()
                .filter(|f| f.command_id() == Command::WriteData as u8)
                .count();
            (words, Command::try_from(frame.command_id()).unwrap())
        };

        if command == Command::WriteData && self.script.fail_send_word == Some(words_seen - 1) {
            return Err(Error::Transport("bus off".into()));
        }

        let Some(handler) = self.handler.as_ref().filter(|_| self.receiving) else {
            return Ok(());
        };
        if let Some(reply) = self.reply_for(command, words_seen) {
            if self.script.threaded {
                let handler = Arc::clone(handler);
                thread::spawn(move || {
                    thread::sleep(Duration::from_millis(2));
                    handler(&reply);
                });
            } else {
                handler(&reply);
            }
        }
        Ok(())
    }

    fn on_receive(&mut self, handler: FrameHandler) {
        self.handler = Some(Arc::new(handler));
    }

    fn start_receiving(&mut self) -> canboot::Result<()> {
        self.receiving = true;
        Ok(())
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + 3) as u8).collect()
}

pub fn commands(log: &Arc<Mutex<Vec<Frame>>>) -> Vec<u8> {
    log.lock()
        .unwrap()
        .iter()
        .map(Frame::command_id)
        .collect()
}

pub fn uploader(script: Script) -> (Uploader<SimulatedDevice>, Arc<Mutex<Vec<Frame>>>) {
    let _ = env_logger::builder()
        .is_test(true)
        .try_init();

    let device = SimulatedDevice::new(script);
    let log = device.log();
    let uploader = Uploader::new(device)
        .unwrap()
        .with_timeouts(SHORT, SHORT);
    (uploader, log)
}
