//! Drives the engine: waits on the socket until the next expiry, calls
//! into the engine for send-bursts and receive-drains, and tracks the
//! hard-failure conditions that are the run loop's responsibility rather
//! than the engine's (accumulated problems, operator cancellation).

use std::sync::atomic::{AtomicBool, Ordering};

use crate::engine::{BulkSendResult, TransferEngine};
use crate::error::AbortReason;
use crate::socket_io::SocketIo;
use crate::time::Clock;

/// Result of driving an engine to termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    Aborted(AbortReason),
}

pub struct RunLoop;

impl RunLoop {
    /// Run `engine` to completion or hard failure. `cancelled` is consulted
    /// at the top of every iteration; a signal handler elsewhere sets it
    /// and touches nothing else.
    pub fn run<S: SocketIo, C: Clock>(
        engine: &mut TransferEngine<S, C>,
        cancelled: &AtomicBool,
    ) -> RunOutcome {
        let mut problems: u32 = 0;

        loop {
            if cancelled.load(Ordering::Relaxed) {
                return RunOutcome::Aborted(AbortReason::Cancelled);
            }

            let (result, stall_until) = engine.bulk_send();
            match result {
                BulkSendResult::AllDone => return RunOutcome::Success,
                BulkSendResult::Error => {
                    problems += 1;
                    if problems > engine.problems_limit() {
                        return RunOutcome::Aborted(AbortReason::TooManyProblems(problems));
                    }
                }
                BulkSendResult::Continue => {}
            }

            let now = engine.now();
            let wait = stall_until.sub(&now).unwrap_or(crate::time::WallClock::ZERO);

            match engine.wait_readable(wait.to_duration()) {
                Ok(true) => {
                    engine.drain_one_ack();
                }
                Ok(false) => {
                    if engine.record_timeout() {
                        return RunOutcome::Aborted(AbortReason::BurstExceeded(
                            engine.totals().burst,
                        ));
                    }
                }
                Err(_) => {
                    problems += 1;
                    if problems > engine.problems_limit() {
                        return RunOutcome::Aborted(AbortReason::TooManyProblems(problems));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::AckHeader;
    use crate::config::Config;
    use crate::image::FirmwareImage;
    use crate::peer::PeerTable;
    use crate::socket_io::SocketIo;
    use crate::time::{ManualClock, WallClock};
    use std::collections::VecDeque;
    use std::io;
    use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

    /// A socket that auto-acks every request it sees, advancing the
    /// engine's own `ManualClock` so `wait_readable` never truly blocks.
    struct AutoAckSocket {
        clock: std::rc::Rc<ManualClock>,
        inbox: VecDeque<(Vec<u8>, SocketAddr)>,
        never_reply_to: Option<Ipv4Addr>,
    }

    impl SocketIo for AutoAckSocket {
        fn send_to(&mut self, buf: &[u8], addr: SocketAddrV4) -> io::Result<usize> {
            if Some(*addr.ip()) == self.never_reply_to {
                return Ok(buf.len());
            }
            let sequence = u16::from_be_bytes([buf[2], buf[3]]);
            let chunk = u16::from_be_bytes([buf[4], buf[5]]);
            let ack = AckHeader { sequence, chunk };
            self.inbox.push_back((
                ack.encode().to_vec(),
                SocketAddr::V4(addr),
            ));
            Ok(buf.len())
        }

        fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
            match self.inbox.pop_front() {
                Some((bytes, from)) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok((bytes.len(), from))
                }
                None => Err(io::Error::from(io::ErrorKind::WouldBlock)),
            }
        }

        fn wait_readable(&mut self, _timeout: std::time::Duration) -> io::Result<bool> {
            if self.inbox.is_empty() {
                self.clock.advance(WallClock::from_ms(20));
                Ok(false)
            } else {
                Ok(true)
            }
        }
    }

    #[test]
    fn run_to_success_with_auto_acking_socket() {
        let clock = std::rc::Rc::new(ManualClock::new(WallClock::ZERO));
        let table = PeerTable::build(
            vec![Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2)],
            clock.now(),
            WallClock::from_ms(20),
        )
        .unwrap();
        let image = FirmwareImage::new(vec![0xabu8; 3976], 1988).unwrap();
        let config = Config::with_defaults(1988).unwrap();
        let socket = AutoAckSocket {
            clock: clock.clone(),
            inbox: VecDeque::new(),
            never_reply_to: None,
        };

        struct ClockHandle(std::rc::Rc<ManualClock>);
        impl Clock for ClockHandle {
            fn now(&self) -> WallClock {
                self.0.now()
            }
        }

        let mut engine =
            TransferEngine::new(table, image, socket, ClockHandle(clock.clone()), config);

        let cancelled = AtomicBool::new(false);
        let outcome = RunLoop::run(&mut engine, &cancelled);
        assert_eq!(outcome, RunOutcome::Success);
        assert_eq!(engine.complete_count(), 2);
    }

    /// S5: no receiver at all — burst exceeds the limit and the run
    /// aborts with a software-error-style reason.
    #[test]
    fn run_aborts_when_peer_never_responds() {
        let clock = std::rc::Rc::new(ManualClock::new(WallClock::ZERO));
        let table = PeerTable::build(
            vec![Ipv4Addr::new(10, 0, 0, 1)],
            clock.now(),
            WallClock::from_ms(20),
        )
        .unwrap();
        let image = FirmwareImage::new(vec![0xabu8; 1988], 1988).unwrap();
        let config = Config::new(1988, 5, 10).unwrap();
        let socket = AutoAckSocket {
            clock: clock.clone(),
            inbox: VecDeque::new(),
            never_reply_to: Some(Ipv4Addr::new(10, 0, 0, 1)),
        };

        struct ClockHandle(std::rc::Rc<ManualClock>);
        impl Clock for ClockHandle {
            fn now(&self) -> WallClock {
                self.0.now()
            }
        }

        let mut engine =
            TransferEngine::new(table, image, socket, ClockHandle(clock.clone()), config);
        let cancelled = AtomicBool::new(false);
        let outcome = RunLoop::run(&mut engine, &cancelled);
        assert!(matches!(
            outcome,
            RunOutcome::Aborted(AbortReason::BurstExceeded(_))
        ));
        assert!(engine.totals().timeout > 0);
    }

    #[test]
    fn run_honours_cancellation_flag() {
        let clock = std::rc::Rc::new(ManualClock::new(WallClock::ZERO));
        let table = PeerTable::build(
            vec![Ipv4Addr::new(10, 0, 0, 1)],
            clock.now(),
            WallClock::from_ms(20),
        )
        .unwrap();
        let image = FirmwareImage::new(vec![0xabu8; 1988], 1988).unwrap();
        let config = Config::with_defaults(1988).unwrap();
        let socket = AutoAckSocket {
            clock: clock.clone(),
            inbox: VecDeque::new(),
            never_reply_to: Some(Ipv4Addr::new(10, 0, 0, 1)),
        };

        struct ClockHandle(std::rc::Rc<ManualClock>);
        impl Clock for ClockHandle {
            fn now(&self) -> WallClock {
                self.0.now()
            }
        }

        let mut engine =
            TransferEngine::new(table, image, socket, ClockHandle(clock), config);
        let cancelled = AtomicBool::new(true);
        let outcome = RunLoop::run(&mut engine, &cancelled);
        assert_eq!(outcome, RunOutcome::Aborted(AbortReason::Cancelled));
    }
}
