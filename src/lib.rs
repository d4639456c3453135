//! A userspace Ethernet switch: tap devices bridged over UDP.
//!
//! Hosts that plug a [`iface::VPort`] into the same [`iface::VSwitch`] appear
//! to share one Ethernet segment. Each port copies frames between one kernel
//! tap device and the switch, one UDP datagram per frame; the switch learns
//! source MAC → sender endpoint bindings from the traffic it sees and
//! forwards accordingly (unicast to a learned endpoint, flood for broadcast,
//! drop for unknown unicast).
//!
//! The crate is split the way the dependencies flow:
//!
//! * [`wire`]: the Ethernet frame codec. Parsing is total, so malformed
//!   input decodes to a well-defined zero frame instead of panicking or
//!   erroring and the forwarding paths carry no failure branches.
//! * [`phy`]: OS-facing frame and datagram I/O. The tap handle, the UDP
//!   socket wrapper, and the [`phy::Device`] seam that lets tests bridge
//!   in-memory devices instead of kernel interfaces.
//! * [`iface`]: the switching logic. The learning table, the switch engine
//!   and the port engine.
//!
//! Lost datagrams are lost frames; nothing here adds reliability, ordering,
//! authentication or fragmentation on top of UDP.

#[macro_use]
mod macros;

pub mod iface;
pub mod phy;
pub mod wire;
