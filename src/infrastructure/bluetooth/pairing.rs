//! Device Pairing State Machine
//!
//! Owns the identity of the paired device and publishes a
//! [`PairingNotification`] for every genuine transition.
//!
//! ```text
//!   Unpaired ──(automatic pairing)──▶ Pairing ──start_pairing──▶ Paired
//!      ▲  └──────────────start_pairing───────────────────────────▶ │ ⟲ re-pair
//!      └──────────────────────────end_pairing──────────────────────┘
//! ```

use crate::domain::models::{DeviceAddress, PairedDevice, PairingNotification, PairingState};
use crate::error::StateError;
use crate::infrastructure::bluetooth::notifications::NotificationChannel;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

pub struct DevicePairingService {
    state: Mutex<PairingState>,
    /// Held across mutation and publish so notifications leave in
    /// transition order.
    transition: Mutex<()>,
    notifications: NotificationChannel<PairingNotification>,
    notify_redundant_disconnect: bool,
}

impl Default for DevicePairingService {
    fn default() -> Self {
        Self::new(false)
    }
}

impl DevicePairingService {
    pub fn new(notify_redundant_disconnect: bool) -> Self {
        Self {
            state: Mutex::new(PairingState::Unpaired),
            transition: Mutex::new(()),
            notifications: NotificationChannel::new(),
            notify_redundant_disconnect,
        }
    }

    /// Observers are called synchronously during a transition and must not
    /// start another transition from inside the callback.
    pub fn notifications(&self) -> &NotificationChannel<PairingNotification> {
        &self.notifications
    }

    /// Pair with `name` at `address` (`AA:BB:CC:DD:EE:FF`). Re-pairing while
    /// already paired replaces the device and publishes `Connected` again.
    pub fn start_pairing(&self, name: &str, address: &str) -> Result<PairedDevice, StateError> {
        let address: DeviceAddress = address.parse()?;
        let device = PairedDevice {
            name: name.to_string(),
            address,
        };
        self.start_pairing_with(device.clone())?;
        Ok(device)
    }

    pub fn start_pairing_with(&self, device: PairedDevice) -> Result<(), StateError> {
        if device.name.trim().is_empty() {
            return Err(StateError::EmptyDeviceName);
        }

        let _transition = self.begin_transition();
        self.commit_pairing(device);
        Ok(())
    }

    /// Forget the paired device. Returns whether `Disconnected` was
    /// published; ending while already unpaired publishes nothing unless
    /// redundant notifications were requested.
    pub fn end_pairing(&self) -> bool {
        let _transition = self.begin_transition();
        let previous = std::mem::take(&mut *self.lock_state());

        if previous.device().is_none() && !self.notify_redundant_disconnect {
            debug!("End pairing ignored, no device paired");
            return false;
        }

        info!("End pairing");
        self.notifications.publish(&PairingNotification::Disconnected);
        true
    }

    pub fn is_paired(&self) -> bool {
        matches!(*self.lock_state(), PairingState::Paired(_))
    }

    pub fn state(&self) -> PairingState {
        self.lock_state().clone()
    }

    pub fn paired_device(&self) -> Option<PairedDevice> {
        self.lock_state().device().cloned()
    }

    /// Enter `Pairing` ahead of discovery. Returns the state to restore if
    /// the attempt fails.
    pub(crate) fn begin_automatic_pairing(&self) -> Result<PairingState, StateError> {
        let _transition = self.begin_transition();
        let mut state = self.lock_state();
        if *state == PairingState::Pairing {
            return Err(StateError::PairingInProgress);
        }
        debug!("Entering pairing state");
        Ok(std::mem::replace(&mut *state, PairingState::Pairing))
    }

    /// Finish automatic pairing with `device`. Fails with `PairingCancelled`
    /// if pairing was ended while the candidate was being connected.
    pub(crate) fn complete_automatic_pairing(&self, device: PairedDevice) -> Result<(), StateError> {
        if device.name.trim().is_empty() {
            return Err(StateError::EmptyDeviceName);
        }

        let _transition = self.begin_transition();
        if *self.lock_state() != PairingState::Pairing {
            debug!("Pairing with {} cancelled", device.address);
            return Err(StateError::PairingCancelled);
        }
        self.commit_pairing(device);
        Ok(())
    }

    /// Undo [`begin_automatic_pairing`](Self::begin_automatic_pairing)
    /// without publishing anything.
    pub(crate) fn abort_automatic_pairing(&self, previous: PairingState) {
        let _transition = self.begin_transition();
        let mut state = self.lock_state();
        if *state == PairingState::Pairing {
            debug!("Pairing attempt abandoned");
            *state = previous;
        }
    }

    /// Caller holds the transition lock.
    fn commit_pairing(&self, device: PairedDevice) {
        info!(
            "Start pairing with device: {} - {}",
            device.name, device.address
        );
        let notification = PairingNotification::Connected {
            name: device.name.clone(),
            address: device.address,
        };
        *self.lock_state() = PairingState::Paired(device);

        self.notifications.publish(&notification);
    }

    fn lock_state(&self) -> MutexGuard<'_, PairingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin_transition(&self) -> MutexGuard<'_, ()> {
        self.transition.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
