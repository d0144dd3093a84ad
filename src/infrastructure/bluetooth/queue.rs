//! GATT Operation Queue
//!
//! Serializes operations over a single connection. At most one operation is
//! in flight; the next one is dispatched only after the current one has
//! completed, either immediately (fire-and-forget writes) or when the
//! transport reports its completion.
//!
//! ```text
//!  enqueue ──▶ [ pending FIFO ] ──▶ in flight ──▶ connection
//!                                       ▲              │
//!                                       └── on_operation_completed ◀── radio callback
//! ```
//!
//! Completion sinks run after the queue lock is released, so a sink may
//! enqueue follow-up operations. Completions must be reported from a single
//! callback context.

use crate::error::{Error, ProtocolViolation};
use crate::infrastructure::bluetooth::connection::GattConnection;
use crate::infrastructure::bluetooth::operation::GattOperation;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Handle returned by [`GattOperationQueue::enqueue`].
pub type OperationId = u64;

/// An operation that could not be submitted and was dropped from the queue.
#[derive(Debug)]
pub struct OperationFailure {
    pub id: OperationId,
    pub operation: &'static str,
    pub error: Error,
}

struct QueuedOperation {
    id: OperationId,
    operation: GattOperation,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<QueuedOperation>,
    in_flight: Option<QueuedOperation>,
    next_id: OperationId,
}

pub struct GattOperationQueue {
    connection: Arc<dyn GattConnection>,
    state: Mutex<QueueState>,
    failures: mpsc::UnboundedSender<OperationFailure>,
}

impl GattOperationQueue {
    /// Create the queue for a freshly established connection. Operations
    /// whose submission fails are reported on `failures`.
    pub fn new(
        connection: Arc<dyn GattConnection>,
        failures: mpsc::UnboundedSender<OperationFailure>,
    ) -> Self {
        Self {
            connection,
            state: Mutex::new(QueueState::default()),
            failures,
        }
    }

    pub fn connection(&self) -> &Arc<dyn GattConnection> {
        &self.connection
    }

    /// Append an operation; dispatches it right away when the queue is idle.
    pub fn enqueue(&self, operation: GattOperation) -> OperationId {
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;

        debug!(
            "Enqueued {} #{} ({} pending)",
            operation.kind().name(),
            id,
            state.pending.len()
        );
        state.pending.push_back(QueuedOperation { id, operation });

        if state.in_flight.is_none() {
            self.dispatch(&mut state);
        }
        id
    }

    /// Report the completion of the in-flight operation.
    ///
    /// A completion with nothing in flight (late callback after
    /// [`cancel_all`](Self::cancel_all)) is ignored and logged.
    pub fn on_operation_completed(&self, value: Vec<u8>) -> Result<OperationId, ProtocolViolation> {
        let mut completed = {
            let mut state = self.lock();
            let Some(completed) = state.in_flight.take() else {
                warn!(
                    "Ignoring completion ({} bytes) with no operation in flight",
                    value.len()
                );
                return Err(ProtocolViolation::NoOperationInFlight);
            };
            self.dispatch(&mut state);
            completed
        };

        debug!(
            "Completed {} #{}",
            completed.operation.kind().name(),
            completed.id
        );
        if let Err(violation) = completed.operation.on_result(value) {
            warn!("Operation #{}: {}", completed.id, violation);
            return Err(violation);
        }
        Ok(completed.id)
    }

    /// Drop every pending and in-flight operation without notifying their
    /// sinks. Late completions for the discarded in-flight operation are
    /// ignored.
    pub fn cancel_all(&self) {
        let (pending, in_flight) = {
            let mut state = self.lock();
            let pending = std::mem::take(&mut state.pending);
            (pending, state.in_flight.take())
        };

        let discarded = pending.len() + usize::from(in_flight.is_some());
        if discarded > 0 {
            info!("Discarded {} queued GATT operations", discarded);
        }
        // Dropped outside the lock; oneshot sinks observe the cancellation
        drop(pending);
        drop(in_flight);
    }

    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    /// Id of the operation awaiting its completion, if any.
    pub fn in_flight(&self) -> Option<OperationId> {
        self.lock().in_flight.as_ref().map(|queued| queued.id)
    }

    pub fn is_idle(&self) -> bool {
        let state = self.lock();
        state.in_flight.is_none() && state.pending.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Execute heads until one is left waiting for a completion or the queue
    /// runs dry. Failed and fire-and-forget operations never block the head.
    fn dispatch(&self, state: &mut QueueState) {
        while state.in_flight.is_none() {
            let Some(mut head) = state.pending.pop_front() else {
                break;
            };

            match head.operation.execute(self.connection.as_ref()) {
                Ok(()) if head.operation.has_pending_completion() => {
                    debug!(
                        "Dispatched {} #{}, awaiting completion",
                        head.operation.kind().name(),
                        head.id
                    );
                    state.in_flight = Some(head);
                }
                Ok(()) => {
                    debug!(
                        "Dispatched {} #{}, no completion expected",
                        head.operation.kind().name(),
                        head.id
                    );
                }
                Err(error) => {
                    warn!(
                        "{} #{} failed: {}",
                        head.operation.kind().name(),
                        head.id,
                        error
                    );
                    let failure = OperationFailure {
                        id: head.id,
                        operation: head.operation.kind().name(),
                        error,
                    };
                    // Caller dropped the receiver; the failure is already logged
                    let _ = self.failures.send(failure);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{DeviceAddress, TransportEvent};
    use crate::error::TransportError;
    use crate::infrastructure::bluetooth::connection::{CharacteristicPath, WriteType};
    use crate::infrastructure::bluetooth::operation::CompletionSink;
    use crate::infrastructure::bluetooth::protocol;
    use crate::infrastructure::bluetooth::simulated::SimulatedPeripheral;

    fn address() -> DeviceAddress {
        "AA:BB:CC:DD:EE:FF".parse().unwrap()
    }

    fn battery() -> CharacteristicPath {
        CharacteristicPath::new(protocol::BATTERY_SERVICE, protocol::BATTERY_LEVEL)
    }

    fn firmware() -> CharacteristicPath {
        CharacteristicPath::new(
            protocol::DEVICE_INFORMATION_SERVICE,
            protocol::FIRMWARE_REVISION,
        )
    }

    struct Harness {
        peripheral: Arc<SimulatedPeripheral>,
        events: mpsc::UnboundedReceiver<TransportEvent>,
        failures: mpsc::UnboundedReceiver<OperationFailure>,
        queue: GattOperationQueue,
    }

    impl Harness {
        fn new() -> Self {
            let (peripheral, events) = SimulatedPeripheral::new(address());
            peripheral.add_characteristic(battery(), vec![90]);
            peripheral.add_characteristic(firmware(), b"1.2.0".to_vec());
            let peripheral = Arc::new(peripheral);
            let (failure_tx, failures) = mpsc::unbounded_channel();
            let queue = GattOperationQueue::new(peripheral.clone(), failure_tx);
            Self {
                peripheral,
                events,
                failures,
                queue,
            }
        }

        /// Forward every posted radio completion to the queue.
        fn pump(&mut self) {
            while let Ok(TransportEvent::Completed { value, .. }) = self.events.try_recv() {
                self.queue.on_operation_completed(value).unwrap();
            }
        }
    }

    #[test]
    fn test_single_operation_in_flight() {
        let mut h = Harness::new();
        let (sink_a, mut rx_a) = CompletionSink::oneshot();
        let (sink_b, mut rx_b) = CompletionSink::oneshot();

        let a = h
            .queue
            .enqueue(GattOperation::read_characteristic(address(), battery(), sink_a));
        let b = h
            .queue
            .enqueue(GattOperation::read_characteristic(address(), firmware(), sink_b));

        assert_eq!(h.queue.in_flight(), Some(a));
        assert_eq!(h.queue.pending_len(), 1);
        assert_eq!(h.peripheral.requests(), vec![protocol::BATTERY_LEVEL]);

        let value = match h.events.try_recv().unwrap() {
            TransportEvent::Completed { value, .. } => value,
            other => panic!("unexpected event {:?}", other),
        };
        assert_eq!(h.queue.on_operation_completed(value), Ok(a));
        assert_eq!(rx_a.try_recv().unwrap(), vec![90]);
        assert!(rx_b.try_recv().is_err());
        assert_eq!(h.queue.in_flight(), Some(b));

        h.pump();
        assert_eq!(rx_b.try_recv().unwrap(), b"1.2.0".to_vec());
        assert!(h.queue.is_idle());
    }

    #[test]
    fn test_fire_and_forget_does_not_block() {
        let h = Harness::new();
        h.queue.enqueue(GattOperation::write_characteristic(
            address(),
            battery(),
            [1],
            WriteType::WithoutResponse,
        ));
        h.queue.enqueue(GattOperation::write_characteristic(
            address(),
            battery(),
            [2],
            WriteType::WithoutResponse,
        ));

        assert!(h.queue.is_idle());
        assert_eq!(h.peripheral.characteristic_value(&battery()), Some(vec![2]));
        assert_eq!(h.peripheral.requests().len(), 2);
    }

    #[test]
    fn test_failed_execute_advances_and_reports() {
        let mut h = Harness::new();
        let missing = CharacteristicPath::new(protocol::HEART_RATE_SERVICE, protocol::HEART_RATE_MEASUREMENT);
        let (sink_bad, mut rx_bad) = CompletionSink::oneshot();
        let (sink_ok, mut rx_ok) = CompletionSink::oneshot();

        let bad = h
            .queue
            .enqueue(GattOperation::read_characteristic(address(), missing, sink_bad));
        let ok = h
            .queue
            .enqueue(GattOperation::read_characteristic(address(), battery(), sink_ok));

        let failure = h.failures.try_recv().unwrap();
        assert_eq!(failure.id, bad);
        assert_eq!(failure.operation, "read-characteristic");
        assert!(matches!(
            failure.error,
            Error::Transport(TransportError::ServiceNotFound(_))
        ));
        // Failure goes to the failure channel, never the completion sink
        assert!(rx_bad.try_recv().is_err());

        assert_eq!(h.queue.in_flight(), Some(ok));
        h.pump();
        assert_eq!(rx_ok.try_recv().unwrap(), vec![90]);
    }

    #[test]
    fn test_spurious_completion_is_ignored() {
        let h = Harness::new();
        assert_eq!(
            h.queue.on_operation_completed(vec![1]),
            Err(ProtocolViolation::NoOperationInFlight)
        );
        assert!(h.queue.is_idle());
    }

    #[test]
    fn test_cancel_all_discards_without_completion() {
        let mut h = Harness::new();
        let (sink_a, mut rx_a) = CompletionSink::oneshot();
        let (sink_b, mut rx_b) = CompletionSink::oneshot();
        h.queue
            .enqueue(GattOperation::read_characteristic(address(), battery(), sink_a));
        h.queue
            .enqueue(GattOperation::read_characteristic(address(), firmware(), sink_b));

        h.queue.cancel_all();
        assert!(h.queue.is_idle());

        // The radio still delivers the stale completion for the first read
        let TransportEvent::Completed { value, .. } = h.events.try_recv().unwrap() else {
            panic!("expected completion");
        };
        assert_eq!(
            h.queue.on_operation_completed(value),
            Err(ProtocolViolation::NoOperationInFlight)
        );
        assert!(matches!(
            rx_a.try_recv(),
            Err(tokio::sync::oneshot::error::TryRecvError::Closed)
        ));
        assert!(matches!(
            rx_b.try_recv(),
            Err(tokio::sync::oneshot::error::TryRecvError::Closed)
        ));
    }

    #[test]
    fn test_sink_can_enqueue_follow_up() {
        let mut h = Harness::new();
        let queue = Arc::new(h.queue);
        let (firmware_sink, mut firmware_rx) = CompletionSink::oneshot();
        let follow_up = Arc::downgrade(&queue);

        let sink = CompletionSink::new(move |_| {
            if let Some(queue) = follow_up.upgrade() {
                queue.enqueue(GattOperation::read_characteristic(
                    address(),
                    firmware(),
                    firmware_sink,
                ));
            }
        });
        queue.enqueue(GattOperation::read_characteristic(address(), battery(), sink));

        while let Ok(TransportEvent::Completed { value, .. }) = h.events.try_recv() {
            queue.on_operation_completed(value).unwrap();
        }
        assert_eq!(firmware_rx.try_recv().unwrap(), b"1.2.0".to_vec());
        assert_eq!(
            h.peripheral.requests(),
            vec![protocol::BATTERY_LEVEL, protocol::FIRMWARE_REVISION]
        );
    }
}
