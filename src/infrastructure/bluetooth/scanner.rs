//! BLE Discovery Module
//!
//! Discovery itself belongs to the platform; this module only defines the
//! hook automatic pairing drives and the policy for choosing whom to pair
//! with.

use crate::domain::models::DiscoveredDevice;
use crate::domain::settings::PairingSettings;
use crate::error::TransportError;
use crate::infrastructure::bluetooth::connection::GattConnection;
use std::sync::Arc;
use tracing::debug;

/// Platform scanner and connector.
pub trait DeviceDiscovery {
    /// Devices currently visible.
    fn discover(&self) -> Result<Vec<DiscoveredDevice>, TransportError>;

    /// Open a GATT connection to `device`.
    fn connect(&self, device: &DiscoveredDevice) -> Result<Arc<dyn GattConnection>, TransportError>;
}

/// Pick the device to pair with, in order of preference: the last paired
/// device, any previously known device, then the strongest device whose
/// name carries the configured prefix. Devices weaker than `min_rssi` are
/// never chosen.
pub fn select_candidate<'a>(
    devices: &'a [DiscoveredDevice],
    settings: &PairingSettings,
) -> Option<&'a DiscoveredDevice> {
    let min_rssi = settings.min_rssi;
    let in_range = move || {
        devices
            .iter()
            .filter(move |d| d.signal_strength >= min_rssi)
    };

    if let Some(last) = &settings.last_paired_device {
        if let Some(device) = in_range().find(|d| d.address == last.address) {
            debug!("Reconnecting to last paired device {}", device.address);
            return Some(device);
        }
    }

    if let Some(device) = in_range()
        .filter(|d| settings.known_device_addresses.contains(&d.address))
        .max_by_key(|d| d.signal_strength)
    {
        debug!("Found known device {}", device.address);
        return Some(device);
    }

    in_range()
        .filter(|d| d.name.starts_with(&settings.device_name_prefix))
        .max_by_key(|d| d.signal_strength)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::PairedDevice;

    fn device(name: &str, address: &str, rssi: i16) -> DiscoveredDevice {
        DiscoveredDevice {
            name: name.to_string(),
            address: address.parse().unwrap(),
            signal_strength: rssi,
        }
    }

    #[test]
    fn test_prefers_last_paired_device() {
        let devices = vec![
            device("Aura-1", "00:00:00:00:00:01", -40),
            device("Aura-2", "00:00:00:00:00:02", -70),
        ];
        let settings = PairingSettings {
            last_paired_device: Some(PairedDevice {
                name: "Aura-2".to_string(),
                address: "00:00:00:00:00:02".parse().unwrap(),
            }),
            ..Default::default()
        };

        assert_eq!(select_candidate(&devices, &settings).unwrap().name, "Aura-2");
    }

    #[test]
    fn test_prefers_known_over_strongest() {
        let devices = vec![
            device("Aura-1", "00:00:00:00:00:01", -40),
            device("Aura-3", "00:00:00:00:00:03", -80),
        ];
        let settings = PairingSettings {
            known_device_addresses: vec!["00:00:00:00:00:03".parse().unwrap()],
            ..Default::default()
        };

        assert_eq!(select_candidate(&devices, &settings).unwrap().name, "Aura-3");
    }

    #[test]
    fn test_strongest_prefixed_device() {
        let devices = vec![
            device("Headphones", "00:00:00:00:00:09", -20),
            device("Aura-1", "00:00:00:00:00:01", -60),
            device("Aura-2", "00:00:00:00:00:02", -50),
            device("Aura-3", "00:00:00:00:00:03", -95),
        ];

        let settings = PairingSettings::default();
        assert_eq!(select_candidate(&devices, &settings).unwrap().name, "Aura-2");
    }

    #[test]
    fn test_no_candidate_out_of_range() {
        let devices = vec![device("Aura-1", "00:00:00:00:00:01", -99)];
        assert!(select_candidate(&devices, &PairingSettings::default()).is_none());
    }
}
