//! GATT Operations
//!
//! One unit of work against a [`GattConnection`]. Reads hand their value to a
//! [`CompletionSink`] once the transport reports it; writes either wait for
//! the peripheral's acknowledgement or complete as soon as they are submitted.

use crate::domain::models::DeviceAddress;
use crate::error::{Error, ProtocolViolation, TransportError};
use crate::infrastructure::bluetooth::connection::{
    CharacteristicPath, DescriptorPath, GattConnection, WriteType,
};
use crate::infrastructure::bluetooth::protocol::{self, cccd};
use std::fmt;
use tokio::sync::oneshot;
use tracing::debug;

/// Receives the raw value of a completed read.
pub struct CompletionSink(Box<dyn FnOnce(Vec<u8>) + Send>);

impl CompletionSink {
    pub fn new(callback: impl FnOnce(Vec<u8>) + Send + 'static) -> Self {
        Self(Box::new(callback))
    }

    /// Sink backed by a oneshot channel, for callers that want to `.await`
    /// the value. The receiver errors if the operation is discarded.
    pub fn oneshot() -> (Self, oneshot::Receiver<Vec<u8>>) {
        let (tx, rx) = oneshot::channel();
        let sink = Self::new(move |value| {
            // Receiver may have given up waiting
            let _ = tx.send(value);
        });
        (sink, rx)
    }

    fn deliver(self, value: Vec<u8>) {
        (self.0)(value)
    }
}

impl fmt::Debug for CompletionSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CompletionSink")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationKind {
    ReadCharacteristic(CharacteristicPath),
    ReadDescriptor(DescriptorPath),
    WriteCharacteristic {
        path: CharacteristicPath,
        value: Vec<u8>,
        write_type: WriteType,
    },
    WriteDescriptor {
        path: DescriptorPath,
        value: Vec<u8>,
    },
}

impl OperationKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ReadCharacteristic(_) => "read-characteristic",
            Self::ReadDescriptor(_) => "read-descriptor",
            Self::WriteCharacteristic { .. } => "write-characteristic",
            Self::WriteDescriptor { .. } => "write-descriptor",
        }
    }
}

#[derive(Debug)]
pub struct GattOperation {
    device: DeviceAddress,
    kind: OperationKind,
    sink: Option<CompletionSink>,
    executed: bool,
    completed: bool,
}

impl GattOperation {
    fn new(device: DeviceAddress, kind: OperationKind, sink: Option<CompletionSink>) -> Self {
        Self {
            device,
            kind,
            sink,
            executed: false,
            completed: false,
        }
    }

    pub fn read_characteristic(
        device: DeviceAddress,
        path: CharacteristicPath,
        sink: CompletionSink,
    ) -> Self {
        Self::new(device, OperationKind::ReadCharacteristic(path), Some(sink))
    }

    pub fn read_descriptor(device: DeviceAddress, path: DescriptorPath, sink: CompletionSink) -> Self {
        Self::new(device, OperationKind::ReadDescriptor(path), Some(sink))
    }

    pub fn write_characteristic(
        device: DeviceAddress,
        path: CharacteristicPath,
        value: impl Into<Vec<u8>>,
        write_type: WriteType,
    ) -> Self {
        let kind = OperationKind::WriteCharacteristic {
            path,
            value: value.into(),
            write_type,
        };
        Self::new(device, kind, None)
    }

    pub fn write_descriptor(
        device: DeviceAddress,
        path: DescriptorPath,
        value: impl Into<Vec<u8>>,
    ) -> Self {
        let kind = OperationKind::WriteDescriptor {
            path,
            value: value.into(),
        };
        Self::new(device, kind, None)
    }

    /// Write the CCCD so the peripheral starts notifying value changes.
    pub fn enable_notifications(device: DeviceAddress, characteristic: CharacteristicPath) -> Self {
        let path = characteristic.descriptor(protocol::CLIENT_CHARACTERISTIC_CONFIG);
        Self::write_descriptor(device, path, cccd::ENABLE_NOTIFICATION)
    }

    pub fn disable_notifications(device: DeviceAddress, characteristic: CharacteristicPath) -> Self {
        let path = characteristic.descriptor(protocol::CLIENT_CHARACTERISTIC_CONFIG);
        Self::write_descriptor(device, path, cccd::DISABLE)
    }

    pub fn device(&self) -> DeviceAddress {
        self.device
    }

    pub fn kind(&self) -> &OperationKind {
        &self.kind
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Submit the request on `connection`. Callable once per operation.
    pub fn execute(&mut self, connection: &dyn GattConnection) -> Result<(), Error> {
        if self.executed {
            return Err(ProtocolViolation::AlreadyExecuted.into());
        }
        self.executed = true;

        let actual = connection.address();
        if actual != self.device {
            return Err(TransportError::DeviceMismatch {
                expected: self.device.to_string(),
                actual: actual.to_string(),
            }
            .into());
        }

        match &self.kind {
            OperationKind::ReadCharacteristic(path) => {
                debug!("Reading characteristic {}", path);
                connection.read_characteristic(path)?;
            }
            OperationKind::ReadDescriptor(path) => {
                debug!("Reading descriptor {}", path);
                connection.read_descriptor(path)?;
            }
            OperationKind::WriteCharacteristic {
                path,
                value,
                write_type,
            } => {
                debug!("Writing {} bytes to characteristic {}", value.len(), path);
                connection.write_characteristic(path, value, *write_type)?;
            }
            OperationKind::WriteDescriptor { path, value } => {
                debug!("Writing {} bytes to descriptor {}", value.len(), path);
                connection.write_descriptor(path, value)?;
            }
        }
        Ok(())
    }

    /// Whether the transport will report a completion for this operation.
    pub fn has_pending_completion(&self) -> bool {
        match &self.kind {
            OperationKind::WriteCharacteristic { write_type, .. } => {
                *write_type == WriteType::WithResponse
            }
            _ => true,
        }
    }

    /// Accept the transport's completion and forward it to the sink.
    pub fn on_result(&mut self, value: Vec<u8>) -> Result<(), ProtocolViolation> {
        if !self.has_pending_completion() {
            return Err(ProtocolViolation::UnexpectedCompletion);
        }
        if self.completed {
            return Err(ProtocolViolation::DuplicateCompletion);
        }
        self.completed = true;

        if let Some(sink) = self.sink.take() {
            sink.deliver(value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::bluetooth::simulated::SimulatedPeripheral;
    use std::sync::{Arc, Mutex};

    fn device() -> DeviceAddress {
        "AA:BB:CC:DD:EE:FF".parse().unwrap()
    }

    fn battery() -> CharacteristicPath {
        CharacteristicPath::new(protocol::BATTERY_SERVICE, protocol::BATTERY_LEVEL)
    }

    #[test]
    fn test_pending_completion_by_kind() {
        let (sink, _rx) = CompletionSink::oneshot();
        assert!(GattOperation::read_characteristic(device(), battery(), sink).has_pending_completion());
        assert!(GattOperation::enable_notifications(device(), battery()).has_pending_completion());
        assert!(
            GattOperation::write_characteristic(device(), battery(), [1], WriteType::WithResponse)
                .has_pending_completion()
        );
        assert!(
            !GattOperation::write_characteristic(device(), battery(), [1], WriteType::WithoutResponse)
                .has_pending_completion()
        );
    }

    #[test]
    fn test_on_result_forwards_once() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink_received = received.clone();
        let sink = CompletionSink::new(move |value| sink_received.lock().unwrap().push(value));
        let mut op = GattOperation::read_characteristic(device(), battery(), sink);

        op.on_result(vec![87]).unwrap();
        assert_eq!(
            op.on_result(vec![88]),
            Err(ProtocolViolation::DuplicateCompletion)
        );
        assert!(op.is_completed());
        assert_eq!(*received.lock().unwrap(), vec![vec![87]]);
    }

    #[test]
    fn test_on_result_without_pending_completion() {
        let mut op =
            GattOperation::write_characteristic(device(), battery(), [1], WriteType::WithoutResponse);
        assert_eq!(
            op.on_result(Vec::new()),
            Err(ProtocolViolation::UnexpectedCompletion)
        );
    }

    #[test]
    fn test_execute_only_once() {
        let (peripheral, _events) = SimulatedPeripheral::new(device());
        peripheral.add_characteristic(battery(), vec![50]);
        let (sink, _rx) = CompletionSink::oneshot();
        let mut op = GattOperation::read_characteristic(device(), battery(), sink);

        op.execute(&peripheral).unwrap();
        assert!(matches!(
            op.execute(&peripheral),
            Err(Error::Protocol(ProtocolViolation::AlreadyExecuted))
        ));
    }

    #[test]
    fn test_execute_unresolvable_characteristic() {
        let (peripheral, _events) = SimulatedPeripheral::new(device());
        let (sink, _rx) = CompletionSink::oneshot();
        let mut op = GattOperation::read_characteristic(device(), battery(), sink);

        assert!(matches!(
            op.execute(&peripheral),
            Err(Error::Transport(TransportError::ServiceNotFound(_)))
        ));
    }

    #[test]
    fn test_execute_on_other_device() {
        let other = "01:02:03:04:05:06".parse().unwrap();
        let (peripheral, _events) = SimulatedPeripheral::new(other);
        peripheral.add_characteristic(battery(), vec![50]);
        let mut op = GattOperation::enable_notifications(device(), battery());

        assert!(matches!(
            op.execute(&peripheral),
            Err(Error::Transport(TransportError::DeviceMismatch { .. }))
        ));
    }

    #[test]
    fn test_notification_toggle_writes_cccd() {
        let (peripheral, _events) = SimulatedPeripheral::new(device());
        peripheral.add_characteristic(battery(), vec![50]);
        let cccd_path = battery().descriptor(protocol::CLIENT_CHARACTERISTIC_CONFIG);

        let mut enable = GattOperation::enable_notifications(device(), battery());
        enable.execute(&peripheral).unwrap();
        assert_eq!(
            peripheral.descriptor_value(&cccd_path),
            Some(cccd::ENABLE_NOTIFICATION.to_vec())
        );

        let mut disable = GattOperation::disable_notifications(device(), battery());
        assert!(disable.has_pending_completion());
        disable.execute(&peripheral).unwrap();
        assert_eq!(peripheral.descriptor_value(&cccd_path), Some(cccd::DISABLE.to_vec()));
    }

    #[tokio::test]
    async fn test_oneshot_sink() {
        let (sink, rx) = CompletionSink::oneshot();
        let mut op = GattOperation::read_characteristic(device(), battery(), sink);
        op.on_result(vec![42]).unwrap();
        assert_eq!(rx.await.unwrap(), vec![42]);
    }

    #[tokio::test]
    async fn test_dropped_operation_closes_oneshot() {
        let (sink, rx) = CompletionSink::oneshot();
        drop(GattOperation::read_characteristic(device(), battery(), sink));
        assert!(rx.await.is_err());
    }
}
