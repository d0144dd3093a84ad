//! GATT Connection Module
//!
//! The radio transport as seen by the operation queue: an opaque handle
//! that accepts one request at a time and reports the outcome later through
//! [`TransportEvent`](crate::domain::models::TransportEvent).

use crate::domain::models::DeviceAddress;
use crate::error::TransportError;
use std::fmt;
use uuid::Uuid;

/// Address of a characteristic inside a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CharacteristicPath {
    pub service: Uuid,
    pub characteristic: Uuid,
}

impl CharacteristicPath {
    pub const fn new(service: Uuid, characteristic: Uuid) -> Self {
        Self {
            service,
            characteristic,
        }
    }

    pub const fn descriptor(self, descriptor: Uuid) -> DescriptorPath {
        DescriptorPath {
            characteristic: self,
            descriptor,
        }
    }
}

impl fmt::Display for CharacteristicPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service, self.characteristic)
    }
}

/// Address of a descriptor on a characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorPath {
    pub characteristic: CharacteristicPath,
    pub descriptor: Uuid,
}

impl fmt::Display for DescriptorPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.characteristic, self.descriptor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteType {
    /// The peripheral acknowledges the write; a completion follows.
    WithResponse,
    /// Fire-and-forget; no completion is delivered.
    WithoutResponse,
}

/// A live link to one peripheral.
///
/// Each method only *submits* the request. Results for requests that expect
/// one arrive later on the transport's callback path. Implementations fail
/// synchronously when the addressed attribute cannot be resolved or the link
/// is gone.
///
/// The queue calls these methods while holding its lock. Completions must
/// be delivered asynchronously; a request method must never call back into
/// the queue (or the service's event handler) before it returns.
pub trait GattConnection: Send + Sync {
    fn address(&self) -> DeviceAddress;

    fn read_characteristic(&self, path: &CharacteristicPath) -> Result<(), TransportError>;

    fn read_descriptor(&self, path: &DescriptorPath) -> Result<(), TransportError>;

    fn write_characteristic(
        &self,
        path: &CharacteristicPath,
        value: &[u8],
        write_type: WriteType,
    ) -> Result<(), TransportError>;

    fn write_descriptor(&self, path: &DescriptorPath, value: &[u8]) -> Result<(), TransportError>;
}
