//! Socket capability: the one collaborator the engine needs for I/O,
//! exposed as a small trait so tests can substitute a mock receiver
//! instead of a real UDP socket. No dynamic dispatch is required — the
//! engine is generic over its `SocketIo` implementation.

use std::io;
use std::net::{SocketAddr, SocketAddrV4};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

pub trait SocketIo {
    /// Send `buf` to `addr`, non-blocking. `Err(e)` with `e.kind() ==
    /// WouldBlock` or `Interrupted` is the transient "deferred" case the
    /// engine counts and retries next pass.
    fn send_to(&mut self, buf: &[u8], addr: SocketAddrV4) -> io::Result<usize>;

    /// Receive one datagram, non-blocking.
    fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    /// Block for up to `timeout` until the socket is readable. Returns
    /// `true` if readable, `false` on timeout.
    fn wait_readable(&mut self, timeout: Duration) -> io::Result<bool>;
}

/// Real non-blocking UDP socket, bound to an ephemeral local port.
pub struct UdpSocketIo {
    socket: Socket,
}

impl UdpSocketIo {
    pub fn bind_ephemeral() -> io::Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_nonblocking(true)?;
        let any: SocketAddr = "0.0.0.0:0".parse().unwrap();
        socket.bind(&any.into())?;
        Ok(UdpSocketIo { socket })
    }
}

impl SocketIo for UdpSocketIo {
    fn send_to(&mut self, buf: &[u8], addr: SocketAddrV4) -> io::Result<usize> {
        self.socket.send_to(buf, &SocketAddr::V4(addr).into())
    }

    fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let (n, from) = self.socket.recv_from(buf)?;
        let from = from
            .as_socket()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "non-IP peer address"))?;
        Ok((n, from))
    }

    #[cfg(unix)]
    fn wait_readable(&mut self, timeout: Duration) -> io::Result<bool> {
        use std::os::unix::io::AsRawFd;

        let fd = self.socket.as_raw_fd();
        let mut pfd = libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        };
        let millis: i32 = timeout.as_millis().try_into().unwrap_or(i32::MAX);
        // SAFETY: `pfd` is a single well-formed pollfd on the stack, valid
        // for the duration of this call.
        let rc = unsafe { libc::poll(&mut pfd, 1, millis) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            return match err.kind() {
                io::ErrorKind::Interrupted => Ok(false),
                _ => Err(err),
            };
        }
        Ok(rc > 0)
    }

    #[cfg(not(unix))]
    fn wait_readable(&mut self, timeout: Duration) -> io::Result<bool> {
        // Portable fallback: short sleep-poll loop. The engine targets
        // unix hosts; this keeps the crate compiling elsewhere.
        let step = Duration::from_millis(1);
        let mut waited = Duration::ZERO;
        let mut probe = [0u8; 0];
        loop {
            match self.socket.peek(&mut probe) {
                Ok(_) => return Ok(true),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(e),
            }
            if waited >= timeout {
                return Ok(false);
            }
            std::thread::sleep(step);
            waited += step;
        }
    }
}
