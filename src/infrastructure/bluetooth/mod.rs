//! Bluetooth Module
//!
//! Device pairing and serialized GATT access for the Aura sensor.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    BluetoothService                      │
//! │  (connection lifecycle, automatic pairing, callbacks)    │
//! └──────────┬──────────────────┬───────────────────┬───────┘
//!            │                  │                   │
//!            ▼                  ▼                   ▼
//! ┌──────────────────┐  ┌──────────────┐  ┌────────────────────┐
//! │ GattOperation-   │  │ DevicePairing│  │ Scanner            │
//! │ Queue            │  │ Service      │  │                    │
//! │ - FIFO           │  │ - state      │  │ - discovery hook   │
//! │ - one in flight  │  │ - notify     │  │ - candidate choice │
//! └────────┬─────────┘  └──────────────┘  └────────────────────┘
//!          │ execute              │ NotificationChannel
//!          ▼                      ▼
//!   GattConnection            observers
//! ```
//!
//! ## Modules
//!
//! - [`connection`] - Transport abstraction and attribute addressing
//! - [`operation`] - Read/write operations and completion sinks
//! - [`queue`] - One-at-a-time operation pipeline
//! - [`pairing`] - Pairing state machine
//! - [`notifications`] - Publish/subscribe channel
//! - [`protocol`] - GATT UUIDs
//! - [`scanner`] - Discovery hook and candidate selection
//! - [`service`] - Main service coordinator
//! - [`simulated`] - In-memory peripheral

pub mod connection;
pub mod notifications;
pub mod operation;
pub mod pairing;
pub mod protocol;
pub mod queue;
pub mod scanner;
pub mod service;
pub mod simulated;

// Re-export main service for convenience
pub use service::BluetoothService;
