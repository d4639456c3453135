use core::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info};

use crate::phy::{Device, Endpoint, TapDevice, TapError, UdpError, UdpSocket, MAX_FRAME_LEN};

// How long a blocked read may hide a stop request, on either resource.
const READ_TIMEOUT: Duration = Duration::from_millis(200);

/// Errors from port lifecycle operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortError {
    /// The tap device could not be created.
    TapCreation,
    /// The UDP socket could not be created.
    SocketCreation,
    /// The switch endpoint is not addressable.
    InvalidSwitchEndpoint,
    /// `start` was called while the forwarders are running.
    AlreadyRunning,
}

impl fmt::Display for PortError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            PortError::TapCreation => write!(f, "failed to create tap device"),
            PortError::SocketCreation => write!(f, "failed to create socket"),
            PortError::InvalidSwitchEndpoint => write!(f, "invalid switch endpoint"),
            PortError::AlreadyRunning => write!(f, "port is already running"),
        }
    }
}

impl std::error::Error for PortError {}

/// One edge of the overlay: bridges a single frame device to a switch.
///
/// Two forwarder threads run while the port is started, one per direction.
/// Frames read from the device are sent to the configured switch endpoint,
/// one datagram per frame; datagrams received on the port's socket are
/// written to the device, whoever sent them. Each direction drops individual
/// frames on error and keeps going; nothing in steady state kills a
/// forwarder.
///
/// The forwarders share the device and socket (one reads what the other
/// never touches) plus a single running flag. [`VPort::stop`] flips the flag
/// and joins both threads, and runs on drop, so the threads never outlive
/// the descriptors they poll. A stopped port can be started again.
pub struct VPort<D: Device = TapDevice> {
    device: Arc<D>,
    socket: Arc<UdpSocket>,
    switch_endpoint: Endpoint,
    running: Arc<AtomicBool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl VPort<TapDevice> {
    /// Open the tap device called `tap_name` (empty lets the kernel pick a
    /// name) and an ephemeral UDP socket, targeting the switch at
    /// `switch_addr:switch_port`.
    pub fn create(
        tap_name: &str,
        switch_addr: &str,
        switch_port: u16,
    ) -> Result<VPort<TapDevice>, PortError> {
        if switch_addr.is_empty() || switch_port == 0 {
            return Err(PortError::InvalidSwitchEndpoint);
        }

        let mut device = TapDevice::create(tap_name).map_err(|err| {
            debug!("port: tap setup failed: {}", err);
            PortError::TapCreation
        })?;
        device.set_read_timeout(Some(READ_TIMEOUT));

        VPort::with_device(device, switch_addr, switch_port)
    }
}

impl<D: Device + 'static> VPort<D> {
    /// Bridge an already-open frame device instead of a kernel tap. The
    /// device's read timeout, if it has one, bounds shutdown latency.
    pub fn with_device(
        device: D,
        switch_addr: &str,
        switch_port: u16,
    ) -> Result<VPort<D>, PortError> {
        if switch_addr.is_empty() || switch_port == 0 {
            return Err(PortError::InvalidSwitchEndpoint);
        }

        let socket = UdpSocket::open().map_err(|_| PortError::SocketCreation)?;
        socket
            .set_read_timeout(Some(READ_TIMEOUT))
            .map_err(|_| PortError::SocketCreation)?;

        let switch_endpoint = Endpoint::new(switch_addr, switch_port);
        info!("port: {} attached, switch at {}", device.name(), switch_endpoint);

        Ok(VPort {
            device: Arc::new(device),
            socket: Arc::new(socket),
            switch_endpoint,
            running: Arc::new(AtomicBool::new(false)),
            workers: Mutex::new(Vec::new()),
        })
    }

    /// Spawn the two forwarder threads and return. Fails with
    /// [`PortError::AlreadyRunning`] while the port is started; succeeds
    /// again after [`VPort::stop`].
    pub fn start(&self) -> Result<(), PortError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(PortError::AlreadyRunning);
        }

        let outbound = {
            let device = self.device.clone();
            let socket = self.socket.clone();
            let switch_endpoint = self.switch_endpoint.clone();
            let running = self.running.clone();
            thread::spawn(move || {
                forward_device_to_switch(&*device, &socket, &switch_endpoint, &running)
            })
        };

        let inbound = {
            let device = self.device.clone();
            let socket = self.socket.clone();
            let running = self.running.clone();
            thread::spawn(move || forward_switch_to_device(&*device, &socket, &running))
        };

        let mut workers = self.workers.lock().unwrap();
        workers.push(outbound);
        workers.push(inbound);

        debug!("port: {} forwarders started", self.device.name());
        Ok(())
    }
}

impl<D: Device> VPort<D> {
    /// Signal both forwarders and join them. Idempotent; also runs on drop.
    /// Each forwarder observes the flag within one read timeout.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        let workers: Vec<_> = self.workers.lock().unwrap().drain(..).collect();
        for worker in workers {
            let _ = worker.join();
        }

        info!("port: {} stopped", self.device.name());
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// The kernel-assigned name of the bridged device.
    pub fn device_name(&self) -> &str {
        self.device.name()
    }

    /// Where outbound frames are sent.
    pub fn switch_endpoint(&self) -> &Endpoint {
        &self.switch_endpoint
    }
}

impl<D: Device> Drop for VPort<D> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<D: Device> fmt::Debug for VPort<D> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("VPort")
            .field("device", &self.device.name())
            .field("switch_endpoint", &self.switch_endpoint)
            .field("running", &self.is_running())
            .finish()
    }
}

fn forward_device_to_switch<D: Device>(
    device: &D,
    socket: &UdpSocket,
    switch_endpoint: &Endpoint,
    running: &AtomicBool,
) {
    debug!("port: {} -> switch forwarder running", device.name());

    while running.load(Ordering::SeqCst) {
        let frame = match device.read_frame() {
            Ok(frame) => frame,
            Err(TapError::TimedOut) => continue,
            Err(err) => {
                debug!("port: {} read error: {}", device.name(), err);
                continue;
            }
        };

        if let Err(err) = socket.send_to(&frame, switch_endpoint) {
            debug!("port: send to {} failed: {}", switch_endpoint, err);
        }
    }

    debug!("port: {} -> switch forwarder stopped", device.name());
}

fn forward_switch_to_device<D: Device>(device: &D, socket: &UdpSocket, running: &AtomicBool) {
    debug!("port: switch -> {} forwarder running", device.name());

    while running.load(Ordering::SeqCst) {
        // The sender is not checked: whatever reaches this socket is treated
        // as coming from the configured switch.
        let (frame, _sender) = match socket.recv_from(MAX_FRAME_LEN) {
            Ok(received) => received,
            Err(UdpError::TimedOut) => continue,
            Err(err) => {
                debug!("port: receive error: {}", err);
                continue;
            }
        };

        if let Err(err) = device.write_frame(&frame) {
            debug!("port: {} write error: {}", device.name(), err);
        }
    }

    debug!("port: switch -> {} forwarder stopped", device.name());
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::phy::MAX_DATAGRAM_LEN;
    use crate::wire::{EthernetAddress, EthernetFrame, EthernetProtocol};
    use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};

    // Stands in for a tap device: frames pushed by the test come out of
    // `read_frame`, frames the port delivers go back to the test.
    struct ChannelDevice {
        name: String,
        from_host: Mutex<Receiver<Vec<u8>>>,
        to_host: Mutex<Sender<Vec<u8>>>,
    }

    fn channel_device() -> (ChannelDevice, Sender<Vec<u8>>, Receiver<Vec<u8>>) {
        let (host_tx, from_host) = mpsc::channel();
        let (to_host, host_rx) = mpsc::channel();
        let device = ChannelDevice {
            name: "chan0".to_owned(),
            from_host: Mutex::new(from_host),
            to_host: Mutex::new(to_host),
        };
        (device, host_tx, host_rx)
    }

    impl Device for ChannelDevice {
        fn read_frame(&self) -> Result<Vec<u8>, TapError> {
            let from_host = self.from_host.lock().unwrap();
            match from_host.recv_timeout(Duration::from_millis(20)) {
                Ok(frame) => Ok(frame),
                Err(RecvTimeoutError::Timeout) => Err(TapError::TimedOut),
                Err(RecvTimeoutError::Disconnected) => Err(TapError::ReadFailed),
            }
        }

        fn write_frame(&self, frame: &[u8]) -> Result<usize, TapError> {
            let to_host = self.to_host.lock().unwrap();
            to_host
                .send(frame.to_vec())
                .map_err(|_| TapError::WriteFailed)?;
            Ok(frame.len())
        }

        fn name(&self) -> &str {
            &self.name
        }
    }

    fn test_frame(last: u8) -> Vec<u8> {
        EthernetFrame::new(
            EthernetAddress::BROADCAST,
            EthernetAddress([0x02, 0, 0, 0, 0, last]),
            EthernetProtocol::Ipv4,
            vec![last; 8],
        )
        .serialize()
    }

    #[test]
    fn test_invalid_switch_endpoint() {
        let (device, _tx, _rx) = channel_device();
        assert_eq!(
            VPort::with_device(device, "", 4789).unwrap_err(),
            PortError::InvalidSwitchEndpoint
        );
        let (device, _tx, _rx) = channel_device();
        assert_eq!(
            VPort::with_device(device, "127.0.0.1", 0).unwrap_err(),
            PortError::InvalidSwitchEndpoint
        );
        // Validated before the tap is touched, so no privileges are needed.
        assert_eq!(
            VPort::create("tap-test", "", 0).unwrap_err(),
            PortError::InvalidSwitchEndpoint
        );
    }

    #[test]
    fn test_forwards_both_directions() {
        let fake_switch = UdpSocket::bind("127.0.0.1", 0).unwrap();
        fake_switch
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let switch_port = fake_switch.local_addr().unwrap().port();

        let (device, host_tx, host_rx) = channel_device();
        let port = VPort::with_device(device, "127.0.0.1", switch_port).unwrap();
        port.start().unwrap();
        assert!(port.is_running());
        assert_eq!(port.device_name(), "chan0");
        assert_eq!(
            port.switch_endpoint(),
            &Endpoint::new("127.0.0.1", switch_port)
        );

        // Host -> switch: a frame written to the device comes out of the
        // port's socket, verbatim.
        let outbound = test_frame(0x01);
        host_tx.send(outbound.clone()).unwrap();
        let (received, port_endpoint) = fake_switch.recv_from(MAX_DATAGRAM_LEN).unwrap();
        assert_eq!(received, outbound);

        // Switch -> host: a datagram sent back to the port's endpoint is
        // written to the device, verbatim.
        let inbound = test_frame(0x02);
        fake_switch.send_to(&inbound, &port_endpoint).unwrap();
        let delivered = host_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(delivered, inbound);

        port.stop();
        assert!(!port.is_running());
    }

    #[test]
    fn test_double_start() {
        let (device, _tx, _rx) = channel_device();
        let port = VPort::with_device(device, "127.0.0.1", 4789).unwrap();
        port.start().unwrap();
        assert_eq!(port.start().unwrap_err(), PortError::AlreadyRunning);
        port.stop();
    }

    #[test]
    fn test_stop_and_restart() {
        let (device, host_tx, _rx) = channel_device();
        let port = VPort::with_device(device, "127.0.0.1", 4789).unwrap();

        port.start().unwrap();
        thread::sleep(Duration::from_millis(100));
        port.stop();
        assert!(!port.is_running());

        // Both workers were joined, so a fresh start owns the device again.
        port.start().unwrap();
        assert!(port.is_running());
        host_tx.send(test_frame(0x03)).unwrap();
        port.stop();
        assert!(!port.is_running());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (device, _tx, _rx) = channel_device();
        let port = VPort::with_device(device, "127.0.0.1", 4789).unwrap();
        port.stop();
        port.start().unwrap();
        port.stop();
        port.stop();
    }

    #[test]
    fn test_worker_survives_read_errors() {
        let fake_switch = UdpSocket::bind("127.0.0.1", 0).unwrap();
        fake_switch
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let switch_port = fake_switch.local_addr().unwrap().port();

        let (device, host_tx, _host_rx) = channel_device();
        let port = VPort::with_device(device, "127.0.0.1", switch_port).unwrap();
        port.start().unwrap();

        // Nothing to read for a while: the forwarder sees timeouts, which
        // must not kill it.
        thread::sleep(Duration::from_millis(100));
        host_tx.send(test_frame(0x04)).unwrap();
        let (received, _) = fake_switch.recv_from(MAX_DATAGRAM_LEN).unwrap();
        assert_eq!(received, test_frame(0x04));

        port.stop();
    }
}
