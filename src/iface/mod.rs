//! The switching logic: the learning table, the switch engine and the port
//! engine.
//!
//! A [`VSwitch`] is the hub of one overlay segment. Each [`VPort`] bridges a
//! local frame device to it over UDP; the switch observes source addresses,
//! records them in its [`MacTable`] and dispatches every frame by destination:
//! unicast to a learned endpoint, flood for broadcast, drop for unknown
//! unicast.

mod fdb;
mod port;
mod switch;

pub use self::fdb::MacTable;
pub use self::port::{PortError, VPort};
pub use self::switch::{SwitchError, VSwitch};
