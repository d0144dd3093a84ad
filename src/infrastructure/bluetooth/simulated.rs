//! Simulated Peripheral
//!
//! In-memory GATT server standing in for the radio. Requests resolve against
//! a local attribute table and completions are posted to a channel, so they
//! reach the queue out-of-band exactly like real radio callbacks.

use crate::domain::models::{DeviceAddress, DiscoveredDevice, TransportEvent};
use crate::error::TransportError;
use crate::infrastructure::bluetooth::connection::{
    CharacteristicPath, DescriptorPath, GattConnection, WriteType,
};
use crate::infrastructure::bluetooth::protocol::{self, cccd};
use crate::infrastructure::bluetooth::scanner::DeviceDiscovery;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Default)]
struct AttributeTable {
    characteristics: HashMap<CharacteristicPath, Vec<u8>>,
    descriptors: HashMap<DescriptorPath, Vec<u8>>,
    connected: bool,
    reject_next: Option<String>,
    /// Attribute addressed by every accepted request, in arrival order.
    requests: Vec<Uuid>,
}

pub struct SimulatedPeripheral {
    address: DeviceAddress,
    table: Mutex<AttributeTable>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl SimulatedPeripheral {
    /// Create a connected peripheral and the receiver its completions are
    /// posted to.
    pub fn new(address: DeviceAddress) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let table = AttributeTable {
            connected: true,
            ..Default::default()
        };
        let peripheral = Self {
            address,
            table: Mutex::new(table),
            events,
        };
        (peripheral, rx)
    }

    /// Register a characteristic together with its CCCD.
    pub fn add_characteristic(&self, path: CharacteristicPath, value: Vec<u8>) {
        let mut table = self.table();
        table.characteristics.insert(path, value);
        table.descriptors.insert(
            path.descriptor(protocol::CLIENT_CHARACTERISTIC_CONFIG),
            cccd::DISABLE.to_vec(),
        );
    }

    pub fn add_descriptor(&self, path: DescriptorPath, value: Vec<u8>) {
        self.table().descriptors.insert(path, value);
    }

    pub fn characteristic_value(&self, path: &CharacteristicPath) -> Option<Vec<u8>> {
        self.table().characteristics.get(path).cloned()
    }

    pub fn descriptor_value(&self, path: &DescriptorPath) -> Option<Vec<u8>> {
        self.table().descriptors.get(path).cloned()
    }

    /// Make the next request fail as if the radio stack refused it.
    pub fn reject_next(&self, reason: impl Into<String>) {
        self.table().reject_next = Some(reason.into());
    }

    /// Drop the link; every later request fails with `Disconnected`.
    pub fn disconnect(&self) {
        self.table().connected = false;
        let _ = self.events.send(TransportEvent::Disconnected {
            device: self.address,
        });
    }

    pub fn requests(&self) -> Vec<Uuid> {
        self.table().requests.clone()
    }

    fn table(&self) -> MutexGuard<'_, AttributeTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn complete(&self, value: Vec<u8>) {
        // Nobody listening means the link owner is gone; drop like the radio would
        let _ = self.events.send(TransportEvent::Completed {
            device: self.address,
            value,
        });
    }
}

impl AttributeTable {
    fn admit(&mut self) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::Disconnected);
        }
        match self.reject_next.take() {
            Some(reason) => Err(TransportError::Rejected(reason)),
            None => Ok(()),
        }
    }

    fn resolve_characteristic(
        &mut self,
        path: &CharacteristicPath,
    ) -> Result<&mut Vec<u8>, TransportError> {
        if !self.characteristics.keys().any(|p| p.service == path.service) {
            return Err(TransportError::ServiceNotFound(path.service));
        }
        self.characteristics
            .get_mut(path)
            .ok_or(TransportError::CharacteristicNotFound {
                service: path.service,
                characteristic: path.characteristic,
            })
    }

    fn resolve_descriptor(&mut self, path: &DescriptorPath) -> Result<&mut Vec<u8>, TransportError> {
        self.resolve_characteristic(&path.characteristic)?;
        self.descriptors
            .get_mut(path)
            .ok_or(TransportError::DescriptorNotFound {
                characteristic: path.characteristic.characteristic,
                descriptor: path.descriptor,
            })
    }
}

impl GattConnection for SimulatedPeripheral {
    fn address(&self) -> DeviceAddress {
        self.address
    }

    fn read_characteristic(&self, path: &CharacteristicPath) -> Result<(), TransportError> {
        let value = {
            let mut table = self.table();
            table.admit()?;
            let value = table.resolve_characteristic(path)?.clone();
            table.requests.push(path.characteristic);
            value
        };
        self.complete(value);
        Ok(())
    }

    fn read_descriptor(&self, path: &DescriptorPath) -> Result<(), TransportError> {
        let value = {
            let mut table = self.table();
            table.admit()?;
            let value = table.resolve_descriptor(path)?.clone();
            table.requests.push(path.descriptor);
            value
        };
        self.complete(value);
        Ok(())
    }

    fn write_characteristic(
        &self,
        path: &CharacteristicPath,
        value: &[u8],
        write_type: WriteType,
    ) -> Result<(), TransportError> {
        {
            let mut table = self.table();
            table.admit()?;
            *table.resolve_characteristic(path)? = value.to_vec();
            table.requests.push(path.characteristic);
        }
        if write_type == WriteType::WithResponse {
            self.complete(Vec::new());
        }
        Ok(())
    }

    fn write_descriptor(&self, path: &DescriptorPath, value: &[u8]) -> Result<(), TransportError> {
        {
            let mut table = self.table();
            table.admit()?;
            *table.resolve_descriptor(path)? = value.to_vec();
            table.requests.push(path.descriptor);
        }
        self.complete(Vec::new());
        Ok(())
    }
}

/// Advertises a fixed set of simulated peripherals.
#[derive(Default)]
pub struct SimulatedDiscovery {
    advertised: Vec<(DiscoveredDevice, Arc<SimulatedPeripheral>)>,
}

impl SimulatedDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advertise(&mut self, name: &str, signal_strength: i16, peripheral: Arc<SimulatedPeripheral>) {
        let device = DiscoveredDevice {
            name: name.to_string(),
            address: peripheral.address,
            signal_strength,
        };
        self.advertised.push((device, peripheral));
    }
}

impl DeviceDiscovery for SimulatedDiscovery {
    fn discover(&self) -> Result<Vec<DiscoveredDevice>, TransportError> {
        Ok(self.advertised.iter().map(|(device, _)| device.clone()).collect())
    }

    fn connect(&self, device: &DiscoveredDevice) -> Result<Arc<dyn GattConnection>, TransportError> {
        self.advertised
            .iter()
            .find(|(advertised, _)| advertised.address == device.address)
            .map(|(_, peripheral)| peripheral.clone() as Arc<dyn GattConnection>)
            .ok_or_else(|| TransportError::Rejected(format!("{} is out of range", device.address)))
    }
}
