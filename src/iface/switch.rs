use core::fmt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{debug, info, trace};

use super::MacTable;
use crate::phy::{Endpoint, UdpError, UdpSocket, MAX_DATAGRAM_LEN};
use crate::wire::{EthernetAddress, EthernetFrame};

// How long a blocked receive may hide a stop request.
const RECV_TIMEOUT: Duration = Duration::from_millis(200);

/// Errors from switch lifecycle operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchError {
    /// The UDP socket could not be created.
    SocketCreation,
    /// The listen port could not be bound.
    Bind,
    /// `start` was called while the receive loop is running.
    AlreadyRunning,
}

impl fmt::Display for SwitchError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            SwitchError::SocketCreation => write!(f, "failed to create socket"),
            SwitchError::Bind => write!(f, "failed to bind socket"),
            SwitchError::AlreadyRunning => write!(f, "switch is already running"),
        }
    }
}

impl std::error::Error for SwitchError {}

/// The hub of one overlay segment: a learning switch on a single UDP socket.
///
/// Every received datagram is one Ethernet frame. Its source address is
/// bound to the sending endpoint in the [`MacTable`], then the frame is
/// dispatched by destination: forwarded when the destination is learned,
/// flooded to every learned endpoint except the source's when it is the
/// broadcast address, dropped otherwise.
///
/// The receive loop runs on whatever thread calls [`VSwitch::start`] and
/// exits cooperatively after [`VSwitch::stop`], within one receive timeout.
/// Steady-state I/O errors never terminate the loop.
#[derive(Debug)]
pub struct VSwitch {
    socket: UdpSocket,
    table: MacTable,
    port: u16,
    running: AtomicBool,
}

impl VSwitch {
    /// Bind `0.0.0.0:port` and assemble a switch around it. Port 0 asks the
    /// kernel for an ephemeral port; see [`VSwitch::local_port`].
    pub fn create(port: u16) -> Result<VSwitch, SwitchError> {
        let socket = UdpSocket::bind("0.0.0.0", port).map_err(|err| match err {
            UdpError::Bind => SwitchError::Bind,
            _ => SwitchError::SocketCreation,
        })?;
        socket
            .set_read_timeout(Some(RECV_TIMEOUT))
            .map_err(|_| SwitchError::SocketCreation)?;

        Ok(VSwitch {
            socket,
            table: MacTable::new(),
            port,
            running: AtomicBool::new(false),
        })
    }

    /// Run the receive loop on the calling thread until [`VSwitch::stop`] is
    /// observed. Only one loop may run at a time; a second concurrent call
    /// returns [`SwitchError::AlreadyRunning`].
    pub fn start(&self) -> Result<(), SwitchError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SwitchError::AlreadyRunning);
        }

        info!("switch: listening on 0.0.0.0:{}", self.port);

        while self.running.load(Ordering::SeqCst) {
            match self.socket.recv_from(MAX_DATAGRAM_LEN) {
                Ok((datagram, sender)) => self.process_frame(&datagram, sender),
                Err(UdpError::TimedOut) => continue,
                Err(err) => debug!("switch: receive error: {}", err),
            }
        }

        info!("switch: stopped, {} addresses learned", self.table.len());
        Ok(())
    }

    /// Ask the receive loop to exit. Idempotent; callable from any thread
    /// and from drop. A receive already in progress finishes or times out
    /// first, so the loop exits within [`RECV_TIMEOUT`].
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            debug!("switch: stopping");
        }
    }

    /// The port this switch was asked to bind.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The port the kernel assigned, which differs from [`VSwitch::port`]
    /// when binding port 0.
    pub fn local_port(&self) -> Option<u16> {
        self.socket.local_addr().ok().map(|ep| ep.port())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// The addresses learned so far, in no particular order.
    pub fn learned_macs(&self) -> Vec<EthernetAddress> {
        self.table.macs()
    }

    /// A copy of the learning table, detached from its lock.
    pub fn snapshot_table(&self) -> HashMap<EthernetAddress, Endpoint> {
        self.table.snapshot()
    }

    fn process_frame(&self, datagram: &[u8], sender: Endpoint) {
        let frame = EthernetFrame::parse(datagram);
        trace!("switch: {} bytes from {}: {}", datagram.len(), sender, frame);

        if self.table.insert(frame.src_addr(), sender.clone()) {
            info!("switch: learned {} -> {}", frame.src_addr(), sender);
        }

        let dst_addr = frame.dst_addr();
        if let Some(endpoint) = self.table.lookup(&dst_addr) {
            // Known unicast. A frame addressed to the sender's own source
            // address is echoed back; the switch does not filter that case.
            match self.socket.send_to(datagram, &endpoint) {
                Ok(_) => debug!("switch: forwarded {} -> {}", dst_addr, endpoint),
                Err(err) => debug!("switch: send to {} failed: {}", endpoint, err),
            }
        } else if dst_addr.is_broadcast() {
            // Flood. The exclusion is keyed by source address, not sending
            // endpoint: a sender that has not been learned yet receives its
            // own broadcast back.
            let mut sent = 0;
            for endpoint in self.table.all_endpoints_except(&frame.src_addr()) {
                match self.socket.send_to(datagram, &endpoint) {
                    Ok(_) => sent += 1,
                    Err(err) => debug!("switch: send to {} failed: {}", endpoint, err),
                }
            }
            debug!("switch: broadcasted to {} endpoints", sent);
        } else {
            debug!("switch: discarded: unknown dst {}", dst_addr);
        }
    }
}

impl Drop for VSwitch {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_create_binds_requested_port() {
        let switch = VSwitch::create(0).unwrap();
        assert_eq!(switch.port(), 0);
        assert_ne!(switch.local_port(), Some(0));
        assert!(!switch.is_running());
        assert!(switch.learned_macs().is_empty());
    }

    #[test]
    fn test_bind_conflict() {
        let first = VSwitch::create(0).unwrap();
        let taken = first.local_port().unwrap();
        assert_eq!(VSwitch::create(taken).unwrap_err(), SwitchError::Bind);
    }

    #[test]
    fn test_double_start() {
        let switch = Arc::new(VSwitch::create(0).unwrap());
        let runner = {
            let switch = switch.clone();
            thread::spawn(move || switch.start())
        };
        while !switch.is_running() {
            thread::yield_now();
        }

        assert_eq!(switch.start().unwrap_err(), SwitchError::AlreadyRunning);

        switch.stop();
        runner.join().unwrap().unwrap();
        assert!(!switch.is_running());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let switch = VSwitch::create(0).unwrap();
        switch.stop();
        switch.stop();
        assert!(!switch.is_running());
    }
}
