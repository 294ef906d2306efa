//! The transport capability consumed by the session.
//!
//! Every method initiates work and returns; completions, unsolicited
//! notifications and connection changes are delivered as
//! [`TransportEvent`] messages on the channel handed to the transport
//! at construction. That channel is drained by the session's single
//! consumer loop, so transport callbacks never touch session state
//! from an arbitrary thread.

use async_trait::async_trait;

use crate::core::bluetooth::operation::GattOperation;
use crate::core::bluetooth::types::{CharacteristicId, CharacteristicInfo};
use crate::error::TransportError;

/// Asynchronous completions and unsolicited events from the radio.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Connected,
    ConnectFailed(TransportError),
    Disconnected,
    ServicesDiscovered(Vec<CharacteristicInfo>),
    DiscoveryFailed(TransportError),
    /// Completion of the single in-flight GATT operation. Reads carry
    /// the characteristic value; writes and subscriptions carry `None`.
    OperationComplete {
        characteristic: CharacteristicId,
        result: Result<Option<Vec<u8>>, TransportError>,
    },
    /// Unsolicited characteristic-changed push, independent of any
    /// queued operation.
    Notification {
        characteristic: CharacteristicId,
        value: Vec<u8>,
    },
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Begin connecting to the peripheral with the given address.
    /// Completes as `Connected` or `ConnectFailed`.
    async fn connect(&self, address: &str);

    /// Tear down the link. Always followed by a `Disconnected` event.
    async fn disconnect(&self);

    /// Begin service discovery on the connected peripheral. Completes
    /// as `ServicesDiscovered` or `DiscoveryFailed`.
    async fn discover_services(&self);

    /// Issue one GATT operation. `Err` means the operation could not
    /// be started at all; otherwise completion arrives later as an
    /// `OperationComplete` event.
    async fn issue(&self, op: &GattOperation) -> Result<(), TransportError>;
}

#[cfg(test)]
pub(crate) mod mock {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;

    /// Records every transport call without touching a radio.
    #[derive(Default)]
    pub struct MockTransport {
        pub connects: Mutex<Vec<String>>,
        pub disconnects: AtomicUsize,
        pub discover_calls: AtomicUsize,
        pub issued: Mutex<Vec<GattOperation>>,
        pub fail_issue: AtomicBool,
    }

    impl MockTransport {
        pub fn issued(&self) -> Vec<GattOperation> {
            self.issued.lock().unwrap().clone()
        }

        pub fn issued_count(&self) -> usize {
            self.issued.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn connect(&self, address: &str) {
            self.connects.lock().unwrap().push(address.to_string());
        }

        async fn disconnect(&self) {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
        }

        async fn discover_services(&self) {
            self.discover_calls.fetch_add(1, Ordering::SeqCst);
        }

        async fn issue(&self, op: &GattOperation) -> Result<(), TransportError> {
            if self.fail_issue.load(Ordering::SeqCst) {
                return Err(TransportError::Operation("mock issue failure".to_string()));
            }
            self.issued.lock().unwrap().push(op.clone());
            Ok(())
        }
    }
}
