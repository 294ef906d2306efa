//! Single-flight GATT operation queue.
//!
//! The underlying transport permits at most one outstanding GATT call
//! at a time. Everything that talks to the peripheral, bootstrap reads
//! and user-triggered writes alike, funnels through this queue so the
//! session holds exactly one "operation in flight" flag.

use std::collections::VecDeque;

use log::{debug, warn};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::core::bluetooth::transport::Transport;
use crate::core::bluetooth::types::CharacteristicId;
use crate::error::Error;

/// One pending GATT call. Immutable once enqueued; consumed exactly
/// once by the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GattOperation {
    Read(CharacteristicId),
    WriteCharacteristic {
        characteristic: CharacteristicId,
        payload: Vec<u8>,
        ack_required: bool,
    },
    WriteDescriptor {
        characteristic: CharacteristicId,
        descriptor: Uuid,
        payload: Vec<u8>,
    },
    SubscribeNotify {
        characteristic: CharacteristicId,
        use_indication: bool,
    },
}

impl GattOperation {
    pub fn characteristic(&self) -> CharacteristicId {
        match self {
            Self::Read(characteristic) => *characteristic,
            Self::WriteCharacteristic { characteristic, .. } => *characteristic,
            Self::WriteDescriptor { characteristic, .. } => *characteristic,
            Self::SubscribeNotify { characteristic, .. } => *characteristic,
        }
    }
}

/// Resolves the command that enqueued an operation once it completes.
pub type CompletionSender = oneshot::Sender<Result<(), Error>>;

/// An operation together with its optional completion channel.
pub struct PendingOperation {
    pub op: GattOperation,
    pub done: Option<CompletionSender>,
}

/// Ordered, strictly FIFO sequencer of pending GATT operations.
///
/// A new operation is never issued while one is outstanding. Failed
/// operations are dropped, never retried; the failure is surfaced to
/// whoever enqueued them.
#[derive(Default)]
pub struct OperationQueue {
    pending: VecDeque<PendingOperation>,
    in_flight: Option<PendingOperation>,
}

impl OperationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the tail. Never issues immediately.
    pub fn enqueue(&mut self, op: GattOperation, done: Option<CompletionSender>) {
        self.pending.push_back(PendingOperation { op, done });
    }

    /// Issue the head operation unless one is already in flight. An
    /// operation the transport refuses to start is failed and skipped
    /// so the queue keeps draining.
    pub async fn try_advance(&mut self, transport: &dyn Transport) {
        if self.in_flight.is_some() {
            return;
        }
        while let Some(next) = self.pending.pop_front() {
            debug!("issuing GATT operation: {:?}", next.op);
            match transport.issue(&next.op).await {
                Ok(()) => {
                    self.in_flight = Some(next);
                    return;
                }
                Err(e) => {
                    warn!("could not issue {:?}: {e}", next.op);
                    if let Some(done) = next.done {
                        let _ = done.send(Err(e.into()));
                    }
                }
            }
        }
    }

    /// Clear the flight flag and hand the finished operation back to
    /// the caller for result routing. Returns `None` when no operation
    /// was outstanding, e.g. after a disconnect cleared the queue.
    pub fn on_operation_complete(&mut self) -> Option<PendingOperation> {
        self.in_flight.take()
    }

    /// Drop all pending operations and reset the flight flag. Called
    /// exactly on transition into Disconnected; operations issued
    /// before that point get no delivery guarantee.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.in_flight = None;
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
