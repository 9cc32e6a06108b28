//! Protocol implementations.

pub mod crc;
pub mod frame;
pub mod response;

// Re-export common types
pub use frame::{Command, Frame, TargetId};
pub use response::{Response, WaitKind};
