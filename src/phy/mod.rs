//! Access to OS packet interfaces.
//!
//! Two kinds of interface matter here: a kernel tap device, which exchanges
//! whole Ethernet frames with the host network stack, and a UDP socket, which
//! carries those frames across the overlay one datagram apiece. Both are
//! blocking, move-only handles whose descriptors close on drop.
//!
//! The port engine talks to the frame side through the [`Device`] trait
//! rather than [`TapDevice`] directly, so tests can bridge an in-memory
//! channel where production code bridges a kernel interface.

mod tap;
mod udp;

pub use self::tap::{TapDevice, TapError};
pub use self::udp::{Endpoint, UdpError, UdpSocket, MAX_DATAGRAM_LEN};

/// Maximum length of a standard Ethernet frame on the wire: a 14-octet
/// header, a 1500-octet payload and the 4-octet frame check sequence.
pub const MAX_FRAME_LEN: usize = 1518;

/// An OS-level interface that exchanges whole Ethernet frames.
///
/// One successful read yields exactly one frame and one write submits exactly
/// one; there is no partial delivery to resume. Implementations must allow a
/// reader and a writer to operate from different threads at once.
pub trait Device: Send + Sync {
    /// Read one frame, blocking until a frame arrives, the device fails, or
    /// a configured read timeout elapses ([`TapError::TimedOut`]).
    fn read_frame(&self) -> Result<Vec<u8>, TapError>;

    /// Write one frame. A short write is reported as
    /// [`TapError::PartialWrite`], not silently truncated.
    fn write_frame(&self, frame: &[u8]) -> Result<usize, TapError>;

    /// The interface name the kernel knows this device by.
    fn name(&self) -> &str;
}
