//! Error types for every fallible seam in the engine.

use std::net::AddrParseError;

/// Failure decoding or validating a wire frame.
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone, Copy)]
pub enum CodecError {
    #[error("frame is {0} bytes, expected 8")]
    Misfit(usize),
    #[error("bad magic 0x{0:04x}")]
    BadMagic(u16),
    #[error("board reported error code 0x{0:04x}")]
    BoardError(u16),
}

/// Invalid engine configuration.
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone, Copy)]
pub enum ConfigError {
    #[error("chunk size {0} outside (64, 9000]")]
    ChunkSizeOutOfRange(usize),
}

/// Failure building the peer table.
#[derive(Debug, thiserror::Error, Clone)]
pub enum PeerTableError {
    #[error("duplicate peer address {0}")]
    DuplicateAddr(std::net::Ipv4Addr),
    #[error("unable to resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to parse address: {0}")]
    Parse(#[from] AddrParseError),
    #[error("no peers given")]
    Empty,
}

/// A problem encountered while driving the engine, distinguishing transient
/// conditions (counted, retried) from conditions that should abort the run.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sent {written} bytes, expected {expected}")]
    ShortSend { written: usize, expected: usize },
}

/// Reason the run loop terminated without every peer reaching `Done`.
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    #[error("too many problems ({0})")]
    TooManyProblems(u32),
    #[error("timeout burst exceeded limit ({0})")]
    BurstExceeded(u32),
    #[error("cancelled by operator")]
    Cancelled,
}
