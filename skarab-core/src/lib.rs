//! Bulk firmware transfer engine for SKARAB boards.
//! Host-driven: no threads, no blocking beyond one readability wait per
//! run-loop iteration. The host supplies an image, a peer list, and a
//! socket; this crate drives the per-peer send/ack state machine to
//! completion or hard failure.

pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod exitcode;
pub mod host;
pub mod image;
pub mod peer;
pub mod runloop;
pub mod socket_io;
pub mod time;

pub use codec::{AckHeader, RequestHeader, ACK_ERROR_NONE, SKARAB_ACK, SKARAB_REQ};
pub use config::Config;
pub use engine::{PeerState, TransferEngine};
pub use error::{CodecError, ConfigError, EngineError};
pub use host::{resolve_peer, upload, upload_cancellable};
pub use image::FirmwareImage;
pub use peer::{Peer, PeerTable};
pub use runloop::{RunLoop, RunOutcome};
pub use time::{Clock, SystemClock, WallClock};
