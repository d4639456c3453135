//! Low-level packet access and construction.
//!
//! The `wire` module declares the representation of the one protocol this
//! crate speaks natively: Ethernet II. The types here own their data and
//! decode losslessly back to the exact bytes they were parsed from, so the
//! switching layer can log and re-emit frames without keeping the original
//! buffer around.

mod ethernet;

pub use self::ethernet::{
    Address as EthernetAddress, EtherType as EthernetProtocol, Frame as EthernetFrame,
    HEADER_LEN as ETHERNET_HEADER_LEN,
};
