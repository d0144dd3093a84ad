use crate::error::StateError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 48-bit Bluetooth device address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceAddress([u8; 6]);

impl DeviceAddress {
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> [u8; 6] {
        self.0
    }
}

impl FromStr for DeviceAddress {
    type Err = StateError;

    /// Accepts `AA:BB:CC:DD:EE:FF` or `AA-BB-CC-DD-EE-FF`, any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || StateError::InvalidAddress(s.to_string());
        let parts: Vec<&str> = s.trim().split(&[':', '-'][..]).collect();
        if parts.len() != 6 {
            return Err(invalid());
        }

        let mut bytes = [0u8; 6];
        for (slot, part) in bytes.iter_mut().zip(parts) {
            if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            *slot = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        Ok(Self(bytes))
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl Serialize for DeviceAddress {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DeviceAddress {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Identity of the paired device. Name and address always travel together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairedDevice {
    pub name: String,
    pub address: DeviceAddress,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PairingState {
    #[default]
    Unpaired,
    /// Automatic pairing is looking for, or connecting to, a candidate.
    Pairing,
    Paired(PairedDevice),
}

impl PairingState {
    pub fn device(&self) -> Option<&PairedDevice> {
        match self {
            Self::Paired(device) => Some(device),
            _ => None,
        }
    }
}

/// Published once per pairing transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingNotification {
    Connected { name: String, address: DeviceAddress },
    Disconnected,
}

/// Inbound callback from the radio layer, tagged with the device whose link
/// raised it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The outstanding request finished; `value` is the raw attribute value
    /// for reads and empty for acknowledged writes.
    Completed {
        device: DeviceAddress,
        value: Vec<u8>,
    },
    /// The link dropped.
    Disconnected { device: DeviceAddress },
}

impl TransportEvent {
    pub fn device(&self) -> DeviceAddress {
        match self {
            Self::Completed { device, .. } | Self::Disconnected { device } => *device,
        }
    }
}

/// A device reported by discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub name: String,
    pub address: DeviceAddress,
    pub signal_strength: i16,
}
