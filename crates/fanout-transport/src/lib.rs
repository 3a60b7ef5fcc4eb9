//! fanout-transport — the windowed reliability engine.
//!
//! A transfer moves one window at a time: the sender multicasts up to
//! WINDOW_SIZE data packets, announces WINDOW_DONE over every receiver's
//! TCP control channel, and blocks until each receiver has repaired its
//! losses (NACK → targeted retransmission) and verified the window's
//! checksum. One RESEND vote re-sends the whole window to everyone.
//!
//! Both engines are single-threaded readiness loops. Nothing here spawns
//! a task; the per-window barrier ordering is the correctness argument
//! and it lives entirely in the sequential control flow.

use fanout_core::wire::{ControlKind, WireError};

pub mod control;
pub mod receiver;
pub mod sender;
pub mod storage;
pub mod window;

pub use control::ControlChannel;
pub use receiver::{ReceiveStats, Receiver};
pub use sender::{Sender, TransferStats};
pub use storage::FileStore;
pub use window::WindowMap;

/// Errors that abort a transfer. A checksum mismatch is not one of
/// these; it is a protocol signal (RESEND), not a failure.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("control channel closed by peer")]
    ControlChannelClosed,

    #[error("malformed control message: {0}")]
    Malformed(#[from] WireError),

    #[error("unexpected {0:?} on control channel")]
    UnexpectedControl(ControlKind),

    #[error("peer stopped responding after {0} repair rounds")]
    PeerLost(u32),
}
