//! The hub executable: a learning switch for an Ethernet-over-UDP overlay.
//!
//! Binds one UDP port and switches whatever the ports send it: learns source
//! MACs, forwards known unicast, floods broadcast, drops unknown unicast.
//! `SIGINT`/`SIGTERM` shut it down cooperatively.

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{error, info};
use structopt::StructOpt;

use tapswitch::iface::{SwitchError, VSwitch};

/// A userspace learning switch for Ethernet-over-UDP overlays.
#[derive(StructOpt, Debug)]
#[structopt(name = "vswitch")]
struct Opt {
    /// UDP port to listen on (0 for a kernel-assigned port)
    port: u16,
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

    let switch = match VSwitch::create(opt.port) {
        Ok(switch) => Arc::new(switch),
        Err(err) => {
            error!("vswitch: {}", err);
            if err == SwitchError::Bind {
                error!(
                    "vswitch: port {} may be in use; try another or check `ss -lun`",
                    opt.port
                );
            }
            return ExitCode::FAILURE;
        }
    };

    if let Some(port) = switch.local_port() {
        if port != opt.port {
            info!("vswitch: kernel assigned port {}", port);
        }
    }

    let watcher = {
        let switch = switch.clone();
        thread::spawn(move || {
            while !SHUTDOWN.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(100));
            }
            info!("vswitch: shutting down");
            switch.stop();
        })
    };

    if let Err(err) = switch.start() {
        error!("vswitch: {}", err);
        SHUTDOWN.store(true, Ordering::SeqCst);
        let _ = watcher.join();
        return ExitCode::FAILURE;
    }

    SHUTDOWN.store(true, Ordering::SeqCst);
    let _ = watcher.join();
    ExitCode::SUCCESS
}
