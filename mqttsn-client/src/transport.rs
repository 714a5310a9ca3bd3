use std::io;
use std::net::{ToSocketAddrs, UdpSocket};
use std::time::Duration;

/// A datagram transport: bind once, send/receive whole datagrams to a single peer.
///
/// This is the abstraction boundary the spec calls out as an external
/// collaborator (§1); [`UdpTransport`] is the only implementation this crate
/// ships, but tests substitute an in-memory transport to drive the session
/// state machine without a socket.
pub trait Transport {
    /// Sends one datagram to the connected peer.
    fn send(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Waits up to the configured read timeout for one datagram.
    ///
    /// Returns `Ok(None)` on timeout, never blocking past the configured
    /// duration. `buf` must be large enough for the largest datagram
    /// (`mqttsn_core::MAX_PACKET_LEN`).
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>>;

    /// Changes the blocking timeout used by `recv`.
    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()>;
}

/// The default [`Transport`]: a connected UDP socket.
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Binds an ephemeral local port and connects to `addr`, the gateway.
    pub fn open<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect(addr)?;
        socket.set_read_timeout(Some(Duration::from_millis(50)))?;
        Ok(UdpTransport { socket })
    }
}

impl Transport for UdpTransport {
    fn send(&mut self, buf: &[u8]) -> io::Result<()> {
        self.socket.send(buf)?;
        Ok(())
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        match self.socket.recv(buf) {
            Ok(n) => Ok(Some(n)),
            Err(err)
                if err.kind() == io::ErrorKind::WouldBlock
                    || err.kind() == io::ErrorKind::TimedOut =>
            {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.socket.set_read_timeout(Some(timeout))
    }
}
