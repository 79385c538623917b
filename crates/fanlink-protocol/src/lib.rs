//! fanlink Protocol - Datagram formats for device communication
//!
//! Two UDP flows exist:
//! - devices broadcast plaintext beacons to [`BEACON_PORT`]
//! - the service sends one JSON command per datagram to [`COMMAND_PORT`]

pub mod beacon;
pub mod message;

pub use beacon::{Beacon, BeaconError, BEACON_LEN};
pub use message::encode_command;

/// UDP port devices send beacons to.
pub const BEACON_PORT: u16 = 5625;

/// UDP port devices accept commands on.
pub const COMMAND_PORT: u16 = 5600;
