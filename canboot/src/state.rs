//! Session state shared between the command flow and the receive flow.
//!
//! The pending-wait slot is the only field guarded by the lock; the target
//! identifier and verbose flag are plain atomics read by both flows. A change
//! of target while a command is in flight is prevented by the command flow
//! being single-threaded, not by this type.

use crate::protocol::{Response, TargetId, WaitKind};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Outcome of handing a response to the pending-wait slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The waiting command received the response.
    Delivered,
    /// No command is waiting.
    NoWaiter,
    /// A command is waiting, but for the other kind of response.
    KindMismatch {
        /// Kind the pending command expects.
        expected: WaitKind,
    },
    /// The waiting command already holds a response.
    AlreadyAnswered,
}

#[derive(Debug, Default)]
struct PendingWait {
    expected: Option<WaitKind>,
    result: Option<Response>,
}

/// Process-wide protocol state.
#[derive(Debug)]
pub struct SessionState {
    target: AtomicU8,
    verbose: AtomicBool,
    pending: Mutex<PendingWait>,
    signal: Condvar,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    /// New state addressing the default target with verbose logging on.
    pub fn new() -> Self {
        Self {
            target: AtomicU8::new(TargetId::DEFAULT.get()),
            verbose: AtomicBool::new(true),
            pending: Mutex::new(PendingWait::default()),
            signal: Condvar::new(),
        }
    }

    /// Currently addressed bootloader.
    pub fn target(&self) -> TargetId {
        TargetId::new(self.target.load(Ordering::Relaxed)).unwrap_or_default()
    }

    /// Address another bootloader. Must not be called while a command is in flight.
    pub fn set_target(&self, target: TargetId) {
        self.target.store(target.get(), Ordering::Relaxed);
    }

    /// Whether per-frame logging is enabled.
    pub fn verbose(&self) -> bool {
        self.verbose.load(Ordering::Relaxed)
    }

    /// Enable or disable per-frame logging.
    pub fn set_verbose(&self, enabled: bool) {
        self.verbose.store(enabled, Ordering::Relaxed);
    }

    /// Kind of response currently awaited, if any.
    pub fn pending_kind(&self) -> Option<WaitKind> {
        self.lock().expected
    }

    fn lock(&self) -> MutexGuard<'_, PendingWait> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a wait for `kind`, discarding anything left from an earlier command.
    pub(crate) fn arm(&self, kind: WaitKind) {
        let mut slot = self.lock();
        debug_assert!(slot.expected.is_none(), "a command is already outstanding");
        slot.expected = Some(kind);
        slot.result = None;
    }

    /// Close the current wait without a result.
    pub(crate) fn disarm(&self) {
        let mut slot = self.lock();
        slot.expected = None;
        slot.result = None;
    }

    /// Store `response` for the waiting command and wake it.
    ///
    /// Never blocks beyond the slot lock.
    pub(crate) fn deliver(&self, response: Response) -> Delivery {
        let Some(kind) = response.wait_kind() else {
            return Delivery::NoWaiter;
        };

        let mut slot = self.lock();
        match slot.expected {
            None => Delivery::NoWaiter,
            Some(expected) if expected != kind => Delivery::KindMismatch { expected },
            Some(_) if slot.result.is_some() => Delivery::AlreadyAnswered,
            Some(_) => {
                slot.result = Some(response);
                drop(slot);
                self.signal.notify_one();
                Delivery::Delivered
            },
        }
    }

    /// Block until the armed wait is satisfied or `timeout` elapses.
    ///
    /// The wait is closed on return either way.
    pub(crate) fn wait(&self, kind: WaitKind, timeout: Duration) -> Option<Response> {
        let slot = self.lock();
        let (mut slot, _) = self
            .signal
            .wait_timeout_while(slot, timeout, |slot| {
                !slot
                    .result
                    .is_some_and(|r| r.wait_kind() == Some(kind))
            })
            .unwrap_or_else(PoisonError::into_inner);

        slot.expected = None;
        slot.result
            .take()
            .filter(|r| r.wait_kind() == Some(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    const ACK_OK: Response = Response::Acknowledgement { status: 0xFF };

    #[test]
    fn test_defaults() {
        let state = SessionState::new();
        assert_eq!(state.target(), TargetId::DEFAULT);
        assert!(state.verbose());
        assert_eq!(state.pending_kind(), None);
    }

    #[test]
    fn test_target_and_verbose_setters() {
        let state = SessionState::new();
        state.set_target(TargetId::new(0x1F).unwrap());
        state.set_verbose(false);
        assert_eq!(state.target().get(), 0x1F);
        assert!(!state.verbose());
    }

    #[test]
    fn test_deliver_without_waiter_is_dropped() {
        let state = SessionState::new();
        assert_eq!(state.deliver(ACK_OK), Delivery::NoWaiter);

        // A response dropped earlier must not satisfy a later wait.
        state.arm(WaitKind::Confirmation);
        assert_eq!(state.wait(WaitKind::Confirmation, Duration::from_millis(20)), None);
    }

    #[test]
    fn test_deliver_kind_mismatch() {
        let state = SessionState::new();
        state.arm(WaitKind::Checksum);
        assert_eq!(
            state.deliver(ACK_OK),
            Delivery::KindMismatch {
                expected: WaitKind::Checksum
            }
        );
        assert_eq!(state.wait(WaitKind::Checksum, Duration::from_millis(20)), None);
        assert_eq!(state.pending_kind(), None);
    }

    #[test]
    fn test_unrecognized_never_delivered() {
        let state = SessionState::new();
        state.arm(WaitKind::Confirmation);
        let response = Response::Unrecognized {
            target: TargetId::DEFAULT,
            command: 0x30,
            len: 1,
        };
        assert_eq!(state.deliver(response), Delivery::NoWaiter);
        state.disarm();
    }

    #[test]
    fn test_second_response_is_rejected() {
        let state = SessionState::new();
        state.arm(WaitKind::Confirmation);
        assert_eq!(state.deliver(ACK_OK), Delivery::Delivered);
        assert_eq!(
            state.deliver(Response::Acknowledgement { status: 0x00 }),
            Delivery::AlreadyAnswered
        );
        assert_eq!(
            state.wait(WaitKind::Confirmation, Duration::from_millis(20)),
            Some(ACK_OK)
        );
    }

    #[test]
    fn test_wait_wakes_on_delivery() {
        let state = Arc::new(SessionState::new());
        state.arm(WaitKind::Checksum);

        let rx_state = Arc::clone(&state);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            rx_state.deliver(Response::ChecksumReport { value: 0x1234 })
        });

        let start = Instant::now();
        let result = state.wait(WaitKind::Checksum, Duration::from_secs(5));
        assert_eq!(result, Some(Response::ChecksumReport { value: 0x1234 }));
        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(handle.join().unwrap(), Delivery::Delivered);
    }

    #[test]
    fn test_wait_times_out() {
        let state = SessionState::new();
        state.arm(WaitKind::Confirmation);

        let start = Instant::now();
        assert_eq!(state.wait(WaitKind::Confirmation, Duration::from_millis(50)), None);
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert_eq!(state.pending_kind(), None);
    }
}
