//! Error types shared by the GATT queue and the pairing state machine.

use thiserror::Error;
use uuid::Uuid;

/// A request could not be issued on the radio link.
///
/// Raised from `GattOperation::execute` and reported to the operation's
/// caller. Never fatal to the queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("service {0} not found on device")]
    ServiceNotFound(Uuid),
    #[error("characteristic {characteristic} not found in service {service}")]
    CharacteristicNotFound { service: Uuid, characteristic: Uuid },
    #[error("descriptor {descriptor} not found on characteristic {characteristic}")]
    DescriptorNotFound {
        characteristic: Uuid,
        descriptor: Uuid,
    },
    #[error("operation targets {expected} but the connection is to {actual}")]
    DeviceMismatch { expected: String, actual: String },
    #[error("connection is no longer valid")]
    Disconnected,
    #[error("no active connection")]
    NotConnected,
    #[error("request rejected by the radio stack: {0}")]
    Rejected(String),
}

/// The transport broke the one-request/one-completion contract.
///
/// Logged and monitored, never propagated as a crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    #[error("completion delivered with no operation in flight")]
    NoOperationInFlight,
    #[error("completion delivered to an operation that does not expect one")]
    UnexpectedCompletion,
    #[error("completion delivered twice")]
    DuplicateCompletion,
    #[error("operation executed more than once")]
    AlreadyExecuted,
}

/// An invalid pairing transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("device name must not be empty")]
    EmptyDeviceName,
    #[error("invalid device address: {0:?}")]
    InvalidAddress(String),
    #[error("pairing already in progress")]
    PairingInProgress,
    #[error("no pairing candidate found")]
    NoCandidate,
    #[error("pairing was ended before the candidate connected")]
    PairingCancelled,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Protocol(#[from] ProtocolViolation),
    #[error(transparent)]
    State(#[from] StateError),
    #[error("settings: {0}")]
    Settings(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
