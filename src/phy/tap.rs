use core::fmt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::Duration;

use super::{Device, MAX_FRAME_LEN};

const TUNSETIFF: libc::c_ulong = 0x400454ca;
const IFF_TAP: libc::c_short = 0x0002;
const IFF_NO_PI: libc::c_short = 0x1000;

#[repr(C)]
#[derive(Debug)]
struct Ifreq {
    ifr_name: [libc::c_char; libc::IF_NAMESIZE],
    ifr_flags: libc::c_short,
    // Remainder of the ifreq union; TUNSETIFF only consults the flags.
    ifr_pad: [u8; 22],
}

/// Errors from tap device operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapError {
    /// `/dev/net/tun` could not be opened.
    DeviceOpenFailed,
    /// The kernel rejected the interface request.
    IoctlFailed,
    /// Reading from the device failed.
    ReadFailed,
    /// Writing to the device failed.
    WriteFailed,
    /// The kernel accepted fewer bytes than the frame holds.
    PartialWrite,
    /// The read timeout elapsed with no frame available.
    TimedOut,
}

impl fmt::Display for TapError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            TapError::DeviceOpenFailed => write!(f, "failed to open /dev/net/tun"),
            TapError::IoctlFailed => write!(f, "interface request rejected"),
            TapError::ReadFailed => write!(f, "failed to read frame"),
            TapError::WriteFailed => write!(f, "failed to write frame"),
            TapError::PartialWrite => write!(f, "partial write of frame"),
            TapError::TimedOut => write!(f, "read timed out"),
        }
    }
}

impl std::error::Error for TapError {}

/// A handle to a kernel tap interface.
///
/// The device exchanges raw Ethernet frames with the host stack: one `read`
/// returns one frame and one `write` injects one, with no packet-information
/// prefix (`IFF_NO_PI`). The handle owns the descriptor; dropping it closes
/// the descriptor and lets the kernel tear the interface down.
///
/// Reads and writes may come from different threads at the same time, which
/// is how the port engine uses one handle for both directions.
#[derive(Debug)]
pub struct TapDevice {
    lower: libc::c_int,
    name: String,
    read_timeout: Option<Duration>,
}

impl AsRawFd for TapDevice {
    fn as_raw_fd(&self) -> RawFd {
        self.lower
    }
}

impl TapDevice {
    /// Open `/dev/net/tun` and attach to the interface called `name`,
    /// creating it if needed. An empty name lets the kernel pick one
    /// (`tap0`, `tap1`, ...); the assigned name is available through
    /// [`Device::name`]. Requires `CAP_NET_ADMIN`.
    pub fn create(name: &str) -> Result<TapDevice, TapError> {
        let lower = unsafe {
            libc::open(
                "/dev/net/tun\0".as_ptr() as *const libc::c_char,
                libc::O_RDWR,
            )
        };
        if lower == -1 {
            return Err(TapError::DeviceOpenFailed);
        }

        if name.len() >= libc::IF_NAMESIZE {
            unsafe { libc::close(lower) };
            return Err(TapError::IoctlFailed);
        }

        let mut ifreq = Ifreq {
            ifr_name: [0; libc::IF_NAMESIZE],
            ifr_flags: IFF_TAP | IFF_NO_PI,
            ifr_pad: [0; 22],
        };
        for (dst, byte) in ifreq.ifr_name.iter_mut().zip(name.as_bytes()) {
            *dst = *byte as libc::c_char;
        }

        let res = unsafe { libc::ioctl(lower, TUNSETIFF as _, &mut ifreq as *mut Ifreq) };
        if res == -1 {
            unsafe { libc::close(lower) };
            return Err(TapError::IoctlFailed);
        }

        // The kernel writes the assigned name back into the request.
        let name = ifreq
            .ifr_name
            .iter()
            .take_while(|&&c| c != 0)
            .map(|&c| c as u8 as char)
            .collect();

        Ok(TapDevice {
            lower,
            name,
            read_timeout: None,
        })
    }

    /// Arm a timeout observed by [`Device::read_frame`]; `None` blocks
    /// indefinitely. The forwarders use this to notice a stop request while
    /// the device is idle.
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) {
        self.read_timeout = timeout;
    }

    fn wait_readable(&self) -> Result<(), TapError> {
        let timeout = match self.read_timeout {
            Some(timeout) => timeout.as_millis() as libc::c_int,
            None => return Ok(()),
        };
        let mut pollfd = libc::pollfd {
            fd: self.lower,
            events: libc::POLLIN,
            revents: 0,
        };
        match unsafe { libc::poll(&mut pollfd as *mut libc::pollfd, 1, timeout) } {
            -1 => Err(TapError::ReadFailed),
            0 => Err(TapError::TimedOut),
            _ => Ok(()),
        }
    }
}

impl Device for TapDevice {
    fn read_frame(&self) -> Result<Vec<u8>, TapError> {
        self.wait_readable()?;
        let mut buffer = vec![0; MAX_FRAME_LEN];
        let len = unsafe {
            libc::read(
                self.lower,
                buffer.as_mut_ptr() as *mut libc::c_void,
                buffer.len(),
            )
        };
        if len == -1 {
            return Err(TapError::ReadFailed);
        }
        buffer.truncate(len as usize);
        Ok(buffer)
    }

    fn write_frame(&self, frame: &[u8]) -> Result<usize, TapError> {
        let len = unsafe {
            libc::write(
                self.lower,
                frame.as_ptr() as *const libc::c_void,
                frame.len(),
            )
        };
        if len == -1 {
            return Err(TapError::WriteFailed);
        }
        if len as usize != frame.len() {
            return Err(TapError::PartialWrite);
        }
        Ok(len as usize)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for TapDevice {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.lower);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_overlong_name_rejected() {
        // Checked before the ioctl, so this fails the same way with or
        // without CAP_NET_ADMIN.
        let name = "x".repeat(libc::IF_NAMESIZE);
        match TapDevice::create(&name) {
            Err(TapError::IoctlFailed) | Err(TapError::DeviceOpenFailed) => (),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_error_display() {
        assert_eq!(TapError::PartialWrite.to_string(), "partial write of frame");
        assert_eq!(TapError::TimedOut.to_string(), "read timed out");
    }
}
