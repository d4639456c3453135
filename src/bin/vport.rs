//! The edge executable: bridges one tap device to a switch over UDP.
//!
//! Creates (or attaches to) a tap interface, then copies frames both ways
//! until `SIGINT`/`SIGTERM`. Needs `CAP_NET_ADMIN` for the tap device.

use std::net::Ipv4Addr;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use log::{error, info};
use structopt::StructOpt;

use tapswitch::iface::{PortError, VPort};

/// A tap-device port for an Ethernet-over-UDP overlay switch.
#[derive(StructOpt, Debug)]
#[structopt(name = "vport")]
struct Opt {
    /// IPv4 address of the switch
    switch_addr: Ipv4Addr,
    /// UDP port of the switch (1-65535)
    switch_port: u16,
    /// Tap device name (empty: the kernel assigns one)
    #[structopt(default_value = "")]
    tap_name: String,
}

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_signal(_signal: libc::c_int) {
    SHUTDOWN.store(true, Ordering::SeqCst);
}

fn install_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGINT, handle_signal as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handle_signal as libc::sighandler_t);
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let opt = Opt::from_args();
    install_signal_handlers();

    if opt.switch_port == 0 {
        error!("vport: switch port must be between 1 and 65535");
        return ExitCode::FAILURE;
    }

    let port = match VPort::create(&opt.tap_name, &opt.switch_addr.to_string(), opt.switch_port) {
        Ok(port) => port,
        Err(err) => {
            error!("vport: {}", err);
            if err == PortError::TapCreation {
                error!("vport: creating tap devices needs CAP_NET_ADMIN; try sudo");
            }
            return ExitCode::FAILURE;
        }
    };

    info!(
        "vport: bridging {} to {}",
        port.device_name(),
        port.switch_endpoint()
    );

    if let Err(err) = port.start() {
        error!("vport: {}", err);
        return ExitCode::FAILURE;
    }

    while !SHUTDOWN.load(Ordering::SeqCst) && port.is_running() {
        thread::sleep(Duration::from_millis(200));
    }

    info!("vport: shutting down");
    port.stop();
    ExitCode::SUCCESS
}
