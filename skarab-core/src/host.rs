//! Embedding entry point: the single function a host scripting
//! environment calls to ship a firmware image to a set of boards.
//! Address resolution and image loading are thin, out-of-core-scope
//! collaborators implemented here directly since no other crate owns
//! them; the engine itself never touches the filesystem or DNS.

use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::sync::atomic::AtomicBool;

use crate::config::Config;
use crate::engine::{SKARAB_PORT, TransferEngine};
use crate::error::{EngineError, PeerTableError};
use crate::exitcode;
use crate::image::FirmwareImage;
use crate::peer::PeerTable;
use crate::runloop::{RunLoop, RunOutcome};
use crate::socket_io::UdpSocketIo;
use crate::time::SystemClock;

/// Resolve a peer token (`name`, `name:port`, or dotted-quad) to an IPv4
/// address. A port suffix overrides the default; a bare name or
/// dotted-quad uses [`SKARAB_PORT`]. Resolution happens once, here, never
/// during transfer.
pub fn resolve_peer(token: &str) -> std::io::Result<Ipv4Addr> {
    let candidate = if token.contains(':') {
        token.to_string()
    } else {
        format!("{token}:{SKARAB_PORT}")
    };

    let mut addrs = candidate.to_socket_addrs()?;
    for addr in addrs.by_ref() {
        if let SocketAddr::V4(v4) = addr {
            return Ok(*v4.ip());
        }
    }
    Err(std::io::Error::new(
        std::io::ErrorKind::Other,
        format!("{token}: no IPv4 address found"),
    ))
}

/// Ship `image_path` to every peer in `peer_hosts`, chunked at
/// `chunk_size` bytes. Returns a sysexits-style status code; never
/// panics on ordinary failure modes (bad paths, unreachable peers).
/// The engine holds no state across calls — each invocation builds a
/// fresh peer table, image and socket.
pub fn upload(image_path: String, peer_hosts: Vec<String>, chunk_size: usize) -> i32 {
    let cancelled = AtomicBool::new(false);
    upload_cancellable(image_path, peer_hosts, chunk_size, &cancelled)
}

/// Same as [`upload`] but lets the caller supply the cancellation flag
/// (the CLI wires this to a signal handler; embedders with their own
/// cancellation source can do the same).
pub fn upload_cancellable(
    image_path: String,
    peer_hosts: Vec<String>,
    chunk_size: usize,
    cancelled: &AtomicBool,
) -> i32 {
    let config = match Config::with_defaults(chunk_size) {
        Ok(c) => c,
        Err(_) => return exitcode::EX_USAGE,
    };

    let bytes = match std::fs::read(&image_path) {
        Ok(b) => b,
        Err(_) => return exitcode::EX_OSERR,
    };

    let image = match FirmwareImage::new(bytes, chunk_size) {
        Ok(i) => i,
        Err(_) => return exitcode::EX_USAGE,
    };

    let mut addrs = Vec::with_capacity(peer_hosts.len());
    for host in &peer_hosts {
        match resolve_peer(host) {
            Ok(addr) => addrs.push(addr),
            Err(_) => return exitcode::EX_OSERR,
        }
    }

    let clock = SystemClock::new();
    let table = match PeerTable::build(addrs, clock.now(), config.retry_interval) {
        Ok(t) => t,
        Err(PeerTableError::Empty) | Err(PeerTableError::DuplicateAddr(_)) => {
            return exitcode::EX_USAGE;
        }
        Err(_) => return exitcode::EX_OSERR,
    };

    let socket = match UdpSocketIo::bind_ephemeral() {
        Ok(s) => s,
        Err(_) => return exitcode::EX_OSERR,
    };

    let mut engine = TransferEngine::new(table, image, socket, clock, config);

    match RunLoop::run(&mut engine, cancelled) {
        RunOutcome::Success => exitcode::EX_OK,
        RunOutcome::Aborted(crate::error::AbortReason::Cancelled) => exitcode::EX_UNAVAILABLE,
        RunOutcome::Aborted(_) => exitcode::EX_SOFTWARE,
    }
}

/// Kept for engine callers that want the raw send failure kind rather
/// than a collapsed exit code (the CLI uses this to print a reason).
pub fn describe_send_error(err: &EngineError) -> String {
    err.to_string()
}
