//! Bluetooth Service Module
//!
//! Main service tying the connection lifecycle to the operation queue and
//! the pairing state machine.

use crate::domain::models::{PairedDevice, TransportEvent};
use crate::domain::settings::SettingsService;
use crate::error::{Result, StateError, TransportError};
use crate::infrastructure::bluetooth::{
    connection::GattConnection,
    operation::GattOperation,
    pairing::DevicePairingService,
    queue::{GattOperationQueue, OperationFailure, OperationId},
    scanner::{self, DeviceDiscovery},
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Main Bluetooth service coordinating pairing and GATT traffic
pub struct BluetoothService {
    pairing: Arc<DevicePairingService>,
    queue: Mutex<Option<Arc<GattOperationQueue>>>,
    failure_sender: mpsc::UnboundedSender<OperationFailure>,
    settings: Arc<Mutex<SettingsService>>,
}

impl BluetoothService {
    /// Create the service. Operations that fail to submit are reported on the
    /// returned receiver.
    pub fn new(
        settings: Arc<Mutex<SettingsService>>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<OperationFailure>)> {
        let notify_redundant_disconnect = {
            let settings = settings
                .lock()
                .map_err(|_| anyhow::anyhow!("Lock error"))?;
            settings.get().pairing.notify_redundant_disconnect
        };

        let (failure_sender, failures) = mpsc::unbounded_channel();
        let service = Self {
            pairing: Arc::new(DevicePairingService::new(notify_redundant_disconnect)),
            queue: Mutex::new(None),
            failure_sender,
            settings,
        };
        Ok((service, failures))
    }

    pub fn pairing(&self) -> &Arc<DevicePairingService> {
        &self.pairing
    }

    /// Take ownership of a freshly opened link and pair with the device
    /// behind it. Any previous link's queue is discarded first, and late
    /// events from that link are dropped.
    pub fn connect(&self, connection: Arc<dyn GattConnection>, name: &str) -> Result<PairedDevice> {
        self.attach(connection, name, false)
    }

    /// Tear down the current link: discard queued operations and end
    /// pairing. Returns whether a `Disconnected` notification went out.
    pub fn disconnect(&self) -> bool {
        let queue = self.queue_slot().take();
        if let Some(queue) = queue {
            queue.cancel_all();
            info!("Disconnected from {}", queue.connection().address());
        }
        self.pairing.end_pairing()
    }

    pub fn is_connected(&self) -> bool {
        self.queue_slot().is_some()
    }

    pub fn queue(&self) -> Option<Arc<GattOperationQueue>> {
        self.queue_slot().clone()
    }

    /// Submit an operation on the active link.
    pub fn enqueue(&self, operation: GattOperation) -> Result<OperationId> {
        let queue = self.queue().ok_or(TransportError::NotConnected)?;
        Ok(queue.enqueue(operation))
    }

    /// Single entry point for callbacks from the radio layer. Events raised
    /// by any link other than the active one are dropped.
    pub fn handle_transport_event(&self, event: TransportEvent) {
        let Some(queue) = self.queue() else {
            warn!("Dropping event from {} received while disconnected", event.device());
            return;
        };
        let active = queue.connection().address();
        if event.device() != active {
            warn!(
                "Dropping event from stale link {} (active link is {})",
                event.device(),
                active
            );
            return;
        }

        match event {
            // Violations are logged by the queue
            TransportEvent::Completed { value, .. } => {
                let _ = queue.on_operation_completed(value);
            }
            TransportEvent::Disconnected { .. } => {
                info!("Link to {} lost", active);
                if self.detach(&queue) {
                    self.pairing.end_pairing();
                }
            }
        }
    }

    /// Find, connect to, and pair with a device without user input.
    ///
    /// Leaves the pairing state as it was, and publishes nothing, if no
    /// suitable device is found or the connection fails.
    pub fn automatic_pairing(&self, discovery: &dyn DeviceDiscovery) -> Result<PairedDevice> {
        info!("Start automatic pairing");
        if let Some(device) = self.pairing.paired_device() {
            info!("Already paired with {}", device.address);
            return Ok(device);
        }

        let previous = self.pairing.begin_automatic_pairing()?;
        let result = self.pair_with_candidate(discovery);
        if let Err(e) = &result {
            warn!("Automatic pairing failed: {}", e);
            self.pairing.abort_automatic_pairing(previous);
        }
        result
    }

    fn pair_with_candidate(&self, discovery: &dyn DeviceDiscovery) -> Result<PairedDevice> {
        let devices = discovery.discover()?;
        let pairing_settings = {
            let settings = self
                .settings
                .lock()
                .map_err(|_| anyhow::anyhow!("Lock error"))?;
            settings.get().pairing.clone()
        };

        let candidate = scanner::select_candidate(&devices, &pairing_settings)
            .ok_or(StateError::NoCandidate)?;
        info!(
            "Selected {} ({}, {} dBm)",
            candidate.name, candidate.address, candidate.signal_strength
        );

        let connection = discovery.connect(candidate)?;
        self.attach(connection, &candidate.name, true)
    }

    /// Install a queue for `connection` and pair. Automatic pairing only
    /// commits if nobody ended pairing meanwhile.
    fn attach(
        &self,
        connection: Arc<dyn GattConnection>,
        name: &str,
        automatic: bool,
    ) -> Result<PairedDevice> {
        if name.trim().is_empty() {
            return Err(StateError::EmptyDeviceName.into());
        }
        let device = PairedDevice {
            name: name.to_string(),
            address: connection.address(),
        };

        // Installed before pairing is published so observers can enqueue
        let queue = Arc::new(GattOperationQueue::new(
            connection,
            self.failure_sender.clone(),
        ));
        let previous = self.queue_slot().replace(queue.clone());
        if let Some(previous) = previous {
            previous.cancel_all();
        }

        let paired = if automatic {
            self.pairing.complete_automatic_pairing(device.clone())
        } else {
            self.pairing.start_pairing_with(device.clone())
        };
        if let Err(e) = paired {
            self.detach(&queue);
            return Err(e.into());
        }

        match self.settings.lock() {
            Ok(mut settings) => {
                if let Err(e) = settings.remember_paired_device(&device) {
                    warn!("Could not persist paired device: {}", e);
                }
            }
            Err(_) => warn!("Settings lock poisoned, paired device not persisted"),
        }

        Ok(device)
    }

    /// Remove `queue` if it is still the active one. Returns whether it was.
    fn detach(&self, queue: &Arc<GattOperationQueue>) -> bool {
        let current = {
            let mut slot = self.queue_slot();
            match slot.as_ref() {
                Some(active) if Arc::ptr_eq(active, queue) => slot.take(),
                _ => None,
            }
        };
        match current {
            Some(queue) => {
                queue.cancel_all();
                true
            }
            None => false,
        }
    }

    fn queue_slot(&self) -> MutexGuard<'_, Option<Arc<GattOperationQueue>>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
