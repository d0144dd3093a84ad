//! GATT attribute identifiers
//!
//! Well-known 16-bit attributes used by the Aura sensor, expanded onto the
//! Bluetooth base UUID, plus the CCCD values for notification control.

use uuid::Uuid;

/// `0000xxxx-0000-1000-8000-00805F9B34FB`
const BLUETOOTH_BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_0080_5F9B_34FB;

pub const BATTERY_SERVICE: Uuid = short_uuid(0x180F);
pub const BATTERY_LEVEL: Uuid = short_uuid(0x2A19);

pub const DEVICE_INFORMATION_SERVICE: Uuid = short_uuid(0x180A);
pub const MANUFACTURER_NAME: Uuid = short_uuid(0x2A29);
pub const FIRMWARE_REVISION: Uuid = short_uuid(0x2A26);

pub const HEART_RATE_SERVICE: Uuid = short_uuid(0x180D);
pub const HEART_RATE_MEASUREMENT: Uuid = short_uuid(0x2A37);

/// Client Characteristic Configuration Descriptor
pub const CLIENT_CHARACTERISTIC_CONFIG: Uuid = short_uuid(0x2902);
pub const CHARACTERISTIC_USER_DESCRIPTION: Uuid = short_uuid(0x2901);

/// CCCD values (little-endian u16)
pub mod cccd {
    pub const DISABLE: [u8; 2] = [0x00, 0x00];
    pub const ENABLE_NOTIFICATION: [u8; 2] = [0x01, 0x00];
}

/// Expand a 16-bit assigned number onto the Bluetooth base UUID
pub const fn short_uuid(short: u16) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE_UUID | ((short as u128) << 96))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_uuid() {
        assert_eq!(
            BATTERY_LEVEL.to_string(),
            "00002a19-0000-1000-8000-00805f9b34fb"
        );
    }
}
