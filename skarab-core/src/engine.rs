//! The transfer engine: per-peer state machine, send scheduling, ack
//! correlation, retry/backoff and termination tracking.

use std::net::{IpAddr, Ipv4Addr, SocketAddrV4};

use crate::codec::{AckHeader, RequestHeader};
use crate::config::Config;
use crate::error::{CodecError, EngineError};
use crate::image::FirmwareImage;
use crate::peer::{Peer, PeerTable};
use crate::socket_io::SocketIo;
use crate::time::{Clock, WallClock};

pub const SKARAB_PORT: u16 = 30584;

/// Peer lifecycle state, derived from `peer.chunk()` and `chunk_count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Priming,
    Streaming,
    Done,
}

impl PeerState {
    pub fn of(peer: &Peer, chunk_count: usize) -> PeerState {
        if peer.chunk() < 0 {
            PeerState::Priming
        } else if peer.is_done(chunk_count) {
            PeerState::Done
        } else {
            PeerState::Streaming
        }
    }
}

/// Cumulative protocol-level counters. See the module-level docs for the
/// meaning of each field; all are monotonically increasing except `burst`,
/// which resets to zero on any valid ack.
#[derive(Debug, Default, Clone, Copy)]
pub struct Totals {
    pub sent: u64,
    pub got: u64,
    pub weird: u64,
    pub late: u64,
    pub future: u64,
    pub alien: u64,
    pub misfit: u64,
    pub defer: u64,
    pub timeout: u64,
    pub burst: u32,
}

/// Outcome of a single scheduling pass over all peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkSendResult {
    AllDone,
    Continue,
    Error,
}

/// Outcome of a single `drain_one_ack` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// No datagram was waiting (`EAGAIN`/`EINTR`); counted as `defer`.
    Deferred,
    /// A valid ack advanced a peer's state (and triggered a pipelined send).
    Accepted,
    /// Ack from an address not in the peer table.
    Alien,
    /// Wrong length, bad magic, or nonzero board error code.
    Protocol,
    /// Chunk number ahead of what we have sent.
    Future,
    /// Stale chunk number (already advanced past it).
    Late,
    /// Chunk number matched but sequence did not.
    MismatchedSequence,
}

enum SendOutcome {
    AlreadyDone,
    Sent,
    Deferred,
}

/// Drives the per-peer state machine to completion or hard failure. Generic
/// over the socket and clock so tests can substitute deterministic mocks;
/// no dynamic dispatch is needed since exactly one concrete type of each
/// is used per run.
pub struct TransferEngine<S: SocketIo, C: Clock> {
    peers: PeerTable,
    image: FirmwareImage,
    socket: S,
    clock: C,
    config: Config,
    totals: Totals,
    scratch: Vec<u8>,
    header_buf: [u8; 8],
    send_buf: Vec<u8>,
}

impl<S: SocketIo, C: Clock> TransferEngine<S, C> {
    pub fn new(peers: PeerTable, image: FirmwareImage, socket: S, clock: C, config: Config) -> Self {
        let chunk_size = image.chunk_size();
        let mut scratch = vec![0u8; chunk_size];
        for (i, b) in scratch.iter_mut().enumerate() {
            *b = (i & 0xff) as u8;
        }
        let send_buf = vec![0u8; 8 + chunk_size];
        TransferEngine {
            peers,
            image,
            socket,
            clock,
            config,
            totals: Totals::default(),
            scratch,
            header_buf: [0u8; 8],
            send_buf,
        }
    }

    pub fn totals(&self) -> &Totals {
        &self.totals
    }

    pub fn chunk_count(&self) -> usize {
        self.image.chunk_count()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn complete_count(&self) -> usize {
        self.peers.complete_count(self.chunk_count())
    }

    pub fn peers(&self) -> impl Iterator<Item = &Peer> {
        self.peers.iter()
    }

    /// Record a readability-wait timeout. Returns `true` if the burst
    /// counter now exceeds the configured limit (engine should abort).
    pub fn record_timeout(&mut self) -> bool {
        self.totals.timeout += 1;
        self.totals.burst += 1;
        self.totals.burst > self.config.burst_limit
    }

    pub fn wait_readable(&mut self, timeout: std::time::Duration) -> std::io::Result<bool> {
        self.socket.wait_readable(timeout)
    }

    pub fn now(&self) -> WallClock {
        self.clock.now()
    }

    pub fn problems_limit(&self) -> u32 {
        self.config.problems_limit
    }

    /// One scheduling pass: send to every peer whose deadline has passed,
    /// and compute the next `stall_until`.
    pub fn bulk_send(&mut self) -> (BulkSendResult, WallClock) {
        let now = self.clock.now();
        let chunk_count = self.image.chunk_count();
        let mut earliest_expiry = now.add(&self.config.retry_interval);
        let mut finished = 0usize;
        let mut had_error = false;

        let total_peers = self.peers.len();
        let addrs: Vec<Ipv4Addr> = self.peers.iter().map(|p| p.addr()).collect();

        for addr in addrs {
            let expires_at = self.peers.find(addr).expect("addr from own table").expires_at();
            let is_done = self
                .peers
                .find(addr)
                .expect("addr from own table")
                .is_done(chunk_count);

            if is_done {
                finished += 1;
            } else if now >= expires_at {
                match self.send_to_peer(addr) {
                    Ok(SendOutcome::AlreadyDone) => finished += 1,
                    Ok(SendOutcome::Sent) => {}
                    Ok(SendOutcome::Deferred) => {}
                    Err(_) => had_error = true,
                }
            }

            let expires_at = self.peers.find(addr).expect("addr from own table").expires_at();
            if expires_at < earliest_expiry {
                earliest_expiry = expires_at;
            }
        }

        let result = if finished >= total_peers {
            BulkSendResult::AllDone
        } else if had_error {
            BulkSendResult::Error
        } else {
            BulkSendResult::Continue
        };

        (result, earliest_expiry)
    }

    /// Send operation for a single peer. Preconditions checked by the
    /// caller (deadline reached, peer not done) except the done-check,
    /// which is re-verified defensively.
    fn send_to_peer(&mut self, addr: Ipv4Addr) -> Result<SendOutcome, EngineError> {
        let chunk_count = self.image.chunk_count();
        let retry_interval = self.config.retry_interval;

        let peer = self.peers.find_mut(addr).expect("addr from own table");
        if peer.is_done(chunk_count) {
            return Ok(SendOutcome::AlreadyDone);
        }

        let sequence = peer.next_sequence();
        let wire_chunk = peer.wire_chunk();
        let cursor = peer.chunk();

        let header = RequestHeader {
            sequence,
            chunk: wire_chunk,
            total: chunk_count as u16,
        };
        header.encode_into(&mut self.header_buf);

        let payload: &[u8] = if cursor < 0 {
            &self.scratch
        } else if (cursor as usize + 1) == chunk_count {
            let tail = self.image.chunk_slice(cursor as usize);
            self.scratch[..tail.len()].copy_from_slice(tail);
            &self.scratch
        } else {
            self.image.chunk_slice(cursor as usize)
        };

        self.send_buf[..8].copy_from_slice(&self.header_buf);
        self.send_buf[8..8 + payload.len()].copy_from_slice(payload);
        let expected = 8 + payload.len();

        let dest = SocketAddrV4::new(addr, SKARAB_PORT);
        match self.socket.send_to(&self.send_buf[..expected], dest) {
            Ok(written) => {
                self.totals.sent += 1;
                if written != expected {
                    return Err(EngineError::ShortSend { written, expected });
                }
                let now = self.clock.now();
                let peer = self.peers.find_mut(addr).expect("addr from own table");
                peer.set_last_sent_at(now, retry_interval);
                Ok(SendOutcome::Sent)
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::Interrupted =>
            {
                self.totals.defer += 1;
                Ok(SendOutcome::Deferred)
            }
            Err(e) => Err(EngineError::Io(e)),
        }
    }

    /// Receive one datagram non-blockingly and drive the resulting state
    /// transition. At most one `recv` per call, preserving send fairness
    /// across the outer loop.
    pub fn drain_one_ack(&mut self) -> ReceiveOutcome {
        let mut buf = [0u8; 8];
        let (n, from) = match self.socket.recv_from(&mut buf) {
            Ok(v) => v,
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::Interrupted =>
            {
                self.totals.defer += 1;
                return ReceiveOutcome::Deferred;
            }
            Err(_) => {
                self.totals.weird += 1;
                return ReceiveOutcome::Protocol;
            }
        };

        self.totals.got += 1;
        let now = self.clock.now();

        let ip = match from.ip() {
            IpAddr::V4(v4) => v4,
            IpAddr::V6(_) => {
                self.totals.alien += 1;
                return ReceiveOutcome::Alien;
            }
        };

        let ack = match AckHeader::decode(&buf[..n]) {
            Ok(ack) => ack,
            Err(CodecError::Misfit(_)) => {
                self.totals.misfit += 1;
                return ReceiveOutcome::Protocol;
            }
            Err(CodecError::BadMagic(_)) | Err(CodecError::BoardError(_)) => {
                self.totals.weird += 1;
                return ReceiveOutcome::Protocol;
            }
        };

        let chunk_count = self.image.chunk_count();
        let retry_interval = self.config.retry_interval;

        let peer = match self.peers.find_mut(ip) {
            Some(p) => p,
            None => {
                self.totals.alien += 1;
                return ReceiveOutcome::Alien;
            }
        };

        let expected_wire_chunk = peer.wire_chunk();

        if ack.chunk > expected_wire_chunk {
            self.totals.future += 1;
            return ReceiveOutcome::Future;
        }

        if ack.chunk < expected_wire_chunk {
            peer.extend_expiry(now, retry_interval);
            self.totals.late += 1;
            return ReceiveOutcome::Late;
        }

        if ack.sequence != peer.sequence() {
            peer.extend_expiry(now, retry_interval);
            self.totals.weird += 1;
            return ReceiveOutcome::MismatchedSequence;
        }

        peer.advance_chunk();
        self.totals.burst = 0;

        if !self.peers.find(ip).expect("just matched").is_done(chunk_count) {
            let _ = self.send_to_peer(ip);
        }

        ReceiveOutcome::Accepted
    }
}
