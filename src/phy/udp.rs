use core::fmt;
use std::io;
use std::net::{self, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

/// Default ceiling for [`UdpSocket::recv_from`], large enough for any UDP
/// payload a peer can legally send.
pub const MAX_DATAGRAM_LEN: usize = 65536;

/// Errors from datagram socket operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UdpError {
    /// The socket could not be created.
    SocketCreation,
    /// The requested local endpoint could not be bound.
    Bind,
    /// Sending a datagram failed.
    Send,
    /// Receiving a datagram failed.
    Receive,
    /// The destination endpoint is not addressable.
    InvalidEndpoint,
    /// The address text does not name an IPv4 host.
    AddressResolution,
    /// The read timeout elapsed with no datagram available.
    TimedOut,
}

impl fmt::Display for UdpError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            UdpError::SocketCreation => write!(f, "failed to create socket"),
            UdpError::Bind => write!(f, "failed to bind socket"),
            UdpError::Send => write!(f, "failed to send datagram"),
            UdpError::Receive => write!(f, "failed to receive datagram"),
            UdpError::InvalidEndpoint => write!(f, "invalid endpoint"),
            UdpError::AddressResolution => write!(f, "failed to resolve address"),
            UdpError::TimedOut => write!(f, "receive timed out"),
        }
    }
}

impl std::error::Error for UdpError {}

/// One UDP peer: an IPv4 address in text form plus a port.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    address: String,
    port: u16,
}

impl Endpoint {
    pub fn new(address: impl Into<String>, port: u16) -> Endpoint {
        Endpoint {
            address: address.into(),
            port,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// An endpoint is addressable iff it names a host and a nonzero port.
    pub fn is_valid(&self) -> bool {
        !self.address.is_empty() && self.port != 0
    }

    fn to_socket_addr(&self) -> Result<SocketAddr, UdpError> {
        let address = self
            .address
            .parse::<Ipv4Addr>()
            .map_err(|_| UdpError::AddressResolution)?;
        Ok(SocketAddr::V4(SocketAddrV4::new(address, self.port)))
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Endpoint {
        Endpoint {
            address: addr.ip().to_string(),
            port: addr.port(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// A bound UDP socket exchanging peer-addressed datagrams.
///
/// This is a thin, typed wrapper over the std socket: every datagram carries
/// its peer [`Endpoint`], sends validate the destination before touching the
/// wire, and receives size their result to the bytes actually delivered. The
/// handle is move-only and the descriptor closes on drop.
#[derive(Debug)]
pub struct UdpSocket {
    lower: net::UdpSocket,
    local: Endpoint,
}

impl UdpSocket {
    /// Open a socket on an ephemeral local port, for callers that only send
    /// first and are identified by whatever the kernel assigned.
    pub fn open() -> Result<UdpSocket, UdpError> {
        let lower = net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .map_err(|_| UdpError::SocketCreation)?;
        Ok(UdpSocket {
            lower,
            local: Endpoint::new("0.0.0.0", 0),
        })
    }

    /// Bind a socket to the given local IPv4 address and port. Port 0 asks
    /// the kernel for an ephemeral port; the request as made is kept for
    /// observability and [`UdpSocket::local_addr`] reports what the kernel
    /// actually chose.
    pub fn bind(address: &str, port: u16) -> Result<UdpSocket, UdpError> {
        let parsed = address
            .parse::<Ipv4Addr>()
            .map_err(|_| UdpError::AddressResolution)?;
        let lower =
            net::UdpSocket::bind(SocketAddrV4::new(parsed, port)).map_err(|_| UdpError::Bind)?;
        Ok(UdpSocket {
            lower,
            local: Endpoint::new(address, port),
        })
    }

    /// The local endpoint this socket was asked to bind.
    pub fn local_endpoint(&self) -> &Endpoint {
        &self.local
    }

    /// The local endpoint the kernel assigned, which differs from
    /// [`UdpSocket::local_endpoint`] when binding port 0.
    pub fn local_addr(&self) -> Result<Endpoint, UdpError> {
        self.lower
            .local_addr()
            .map(Endpoint::from)
            .map_err(|_| UdpError::SocketCreation)
    }

    /// Arm a timeout observed by [`UdpSocket::recv_from`]; `None` blocks
    /// indefinitely. A zero duration is rejected.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<(), UdpError> {
        self.lower
            .set_read_timeout(timeout)
            .map_err(|_| UdpError::Receive)
    }

    /// Send `data` as one datagram to `endpoint`.
    pub fn send_to(&self, data: &[u8], endpoint: &Endpoint) -> Result<usize, UdpError> {
        if !endpoint.is_valid() {
            return Err(UdpError::InvalidEndpoint);
        }
        let addr = endpoint.to_socket_addr()?;
        self.lower.send_to(data, addr).map_err(|_| UdpError::Send)
    }

    /// Receive one datagram of up to `max_len` bytes, returning the bytes
    /// actually delivered and the sender's endpoint.
    pub fn recv_from(&self, max_len: usize) -> Result<(Vec<u8>, Endpoint), UdpError> {
        let mut buffer = vec![0; max_len];
        match self.lower.recv_from(&mut buffer) {
            Ok((len, sender)) => {
                buffer.truncate(len);
                Ok((buffer, Endpoint::from(sender)))
            }
            Err(err) if matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Err(UdpError::TimedOut)
            }
            Err(_) => Err(UdpError::Receive),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_endpoint_validity() {
        assert!(Endpoint::new("127.0.0.1", 8080).is_valid());
        assert!(!Endpoint::new("", 8080).is_valid());
        assert!(!Endpoint::new("127.0.0.1", 0).is_valid());
        assert!(!Endpoint::default().is_valid());
    }

    #[test]
    fn test_endpoint_display() {
        assert_eq!(Endpoint::new("10.0.0.2", 9000).to_string(), "10.0.0.2:9000");
    }

    #[test]
    fn test_send_to_invalid_endpoint() {
        let socket = UdpSocket::open().unwrap();
        assert_eq!(
            socket.send_to(b"x", &Endpoint::new("", 1)),
            Err(UdpError::InvalidEndpoint)
        );
        assert_eq!(
            socket.send_to(b"x", &Endpoint::new("127.0.0.1", 0)),
            Err(UdpError::InvalidEndpoint)
        );
        assert_eq!(
            socket.send_to(b"x", &Endpoint::new("not-an-address", 1)),
            Err(UdpError::AddressResolution)
        );
    }

    #[test]
    fn test_bind_resolution_failure() {
        assert_eq!(
            UdpSocket::bind("example.invalid", 0).unwrap_err(),
            UdpError::AddressResolution
        );
    }

    #[test]
    fn test_datagram_roundtrip() {
        let receiver = UdpSocket::bind("127.0.0.1", 0).unwrap();
        let destination = receiver.local_addr().unwrap();
        let sender = UdpSocket::open().unwrap();

        let sent = sender.send_to(b"one datagram", &destination).unwrap();
        assert_eq!(sent, 12);

        let (data, from) = receiver.recv_from(MAX_DATAGRAM_LEN).unwrap();
        assert_eq!(data, b"one datagram");
        assert_eq!(from.address(), "127.0.0.1");
        assert_eq!(from.port(), sender.local_addr().unwrap().port());
    }

    #[test]
    fn test_recv_timeout() {
        let receiver = UdpSocket::bind("127.0.0.1", 0).unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_millis(20)))
            .unwrap();
        assert_eq!(
            receiver.recv_from(MAX_DATAGRAM_LEN).unwrap_err(),
            UdpError::TimedOut
        );
    }

    #[test]
    fn test_requested_vs_assigned_endpoint() {
        let socket = UdpSocket::bind("127.0.0.1", 0).unwrap();
        assert_eq!(socket.local_endpoint().port(), 0);
        assert_ne!(socket.local_addr().unwrap().port(), 0);
    }
}
