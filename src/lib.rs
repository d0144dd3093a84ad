//! Aura device pairing.
//!
//! Pairing state, lifecycle notifications and a serialized GATT operation
//! queue for the Aura wearable sensor.

pub mod domain;
pub mod error;
pub mod infrastructure;

pub use domain::models::{DeviceAddress, PairedDevice, PairingNotification, PairingState, TransportEvent};
pub use error::{Error, ProtocolViolation, Result, StateError, TransportError};
pub use infrastructure::bluetooth::BluetoothService;
