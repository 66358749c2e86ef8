//! Peer table: a frozen, address-sorted collection of per-board transfer
//! state, built once before the engine starts.

use std::collections::HashSet;
use std::net::Ipv4Addr;

use crate::error::PeerTableError;
use crate::time::WallClock;

pub const SEQUENCE_FIRST: u16 = 0x10;
pub const SEQUENCE_STRIDE: u16 = 0x10;

/// Chunk cursor value meaning "priming packet not yet acked".
pub const CHUNK_PRIMING: i32 = -1;

/// Per-board transfer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Peer {
    addr: Ipv4Addr,
    sequence: u16,
    chunk: i32,
    last_sent_at: WallClock,
    expires_at: WallClock,
}

impl Peer {
    pub fn addr(&self) -> Ipv4Addr {
        self.addr
    }

    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    pub fn chunk(&self) -> i32 {
        self.chunk
    }

    pub fn last_sent_at(&self) -> WallClock {
        self.last_sent_at
    }

    pub fn expires_at(&self) -> WallClock {
        self.expires_at
    }

    /// Whether this peer has reached the terminal state.
    pub fn is_done(&self, chunk_count: usize) -> bool {
        self.chunk >= chunk_count as i32
    }

    /// `peer.chunk + 1`, the value carried on the wire as the `chunk` field.
    pub fn wire_chunk(&self) -> u16 {
        (self.chunk + 1) as u16
    }

    pub(crate) fn next_sequence(&mut self) -> u16 {
        self.sequence = self.sequence.wrapping_add(1);
        self.sequence
    }

    pub(crate) fn advance_chunk(&mut self) {
        self.chunk += 1;
    }

    pub(crate) fn set_last_sent_at(&mut self, now: WallClock, retry_interval: WallClock) {
        self.last_sent_at = now;
        self.expires_at = now.add(&retry_interval);
    }

    pub(crate) fn extend_expiry(&mut self, now: WallClock, retry_interval: WallClock) {
        self.expires_at = now.add(&retry_interval);
    }
}

/// Address-sorted, frozen peer collection. Built once via [`PeerTable::build`].
pub struct PeerTable {
    peers: Vec<Peer>,
}

impl PeerTable {
    /// Build the table from resolved addresses in command-line order.
    /// `now` and `retry_interval` determine the smeared initial expiry
    /// deadlines: peer `i` (in input order) gets `now + i * (retry_interval
    /// / count)`, clamped to `[1, 999_999]` microseconds per step, so that
    /// all peers do not receive their priming packet in a single burst.
    pub fn build(
        addrs: Vec<Ipv4Addr>,
        now: WallClock,
        retry_interval: WallClock,
    ) -> Result<Self, PeerTableError> {
        if addrs.is_empty() {
            return Err(PeerTableError::Empty);
        }

        let mut seen = HashSet::with_capacity(addrs.len());
        for addr in &addrs {
            if !seen.insert(*addr) {
                return Err(PeerTableError::DuplicateAddr(*addr));
            }
        }

        let count = addrs.len() as u64;
        let mut step_usec = retry_interval.as_micros() as u64 / count;
        step_usec = step_usec.clamp(1, 999_999);
        let step = WallClock::new(0, step_usec as u32);

        let mut when = now;
        let mut peers = Vec::with_capacity(addrs.len());
        for (i, addr) in addrs.into_iter().enumerate() {
            peers.push(Peer {
                addr,
                sequence: SEQUENCE_FIRST.wrapping_add(SEQUENCE_STRIDE.wrapping_mul(i as u16)),
                chunk: CHUNK_PRIMING,
                last_sent_at: WallClock::ZERO,
                expires_at: when,
            });
            when = when.add(&step);
        }

        peers.sort_by_key(|p| p.addr);

        Ok(PeerTable { peers })
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn find(&self, addr: Ipv4Addr) -> Option<&Peer> {
        self.peers
            .binary_search_by_key(&addr, |p| p.addr)
            .ok()
            .map(|i| &self.peers[i])
    }

    pub fn find_mut(&mut self, addr: Ipv4Addr) -> Option<&mut Peer> {
        match self.peers.binary_search_by_key(&addr, |p| p.addr) {
            Ok(i) => Some(&mut self.peers[i]),
            Err(_) => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Peer> {
        self.peers.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Peer> {
        self.peers.iter_mut()
    }

    pub fn complete_count(&self, chunk_count: usize) -> usize {
        self.peers.iter().filter(|p| p.is_done(chunk_count)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 0, n)
    }

    #[test]
    fn build_rejects_duplicates() {
        let err = PeerTable::build(
            vec![addr(1), addr(2), addr(1)],
            WallClock::ZERO,
            WallClock::from_ms(20),
        )
        .unwrap_err();
        assert!(matches!(err, PeerTableError::DuplicateAddr(a) if a == addr(1)));
    }

    #[test]
    fn build_rejects_empty() {
        assert!(matches!(
            PeerTable::build(vec![], WallClock::ZERO, WallClock::from_ms(20)),
            Err(PeerTableError::Empty)
        ));
    }

    #[test]
    fn table_is_sorted_by_addr() {
        let table = PeerTable::build(
            vec![addr(3), addr(1), addr(2)],
            WallClock::ZERO,
            WallClock::from_ms(20),
        )
        .unwrap();
        let addrs: Vec<_> = table.iter().map(|p| p.addr()).collect();
        assert_eq!(addrs, vec![addr(1), addr(2), addr(3)]);
    }

    #[test]
    fn sequence_assigned_by_insertion_order_not_sorted_order() {
        let table = PeerTable::build(
            vec![addr(3), addr(1)],
            WallClock::ZERO,
            WallClock::from_ms(20),
        )
        .unwrap();
        assert_eq!(table.find(addr(3)).unwrap().sequence(), SEQUENCE_FIRST);
        assert_eq!(
            table.find(addr(1)).unwrap().sequence(),
            SEQUENCE_FIRST + SEQUENCE_STRIDE
        );
    }

    #[test]
    fn initial_expiries_are_smeared_within_retry_interval() {
        let table = PeerTable::build(
            vec![addr(1), addr(2), addr(3), addr(4)],
            WallClock::ZERO,
            WallClock::from_ms(20),
        )
        .unwrap();
        for p in table.iter() {
            assert!(p.expires_at() <= WallClock::from_ms(20));
        }
        let mut expiries: Vec<_> = table.iter().map(|p| p.expires_at()).collect();
        expiries.sort();
        expiries.dedup();
        assert_eq!(expiries.len(), 4, "expiries should be distinct (smeared)");
    }

    #[test]
    fn find_mut_returns_none_for_unknown_addr() {
        let mut table =
            PeerTable::build(vec![addr(1)], WallClock::ZERO, WallClock::from_ms(20)).unwrap();
        assert!(table.find_mut(addr(9)).is_none());
    }
}
