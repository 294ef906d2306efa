//! Error taxonomy for the microphone control client.
//!
//! Transport and protocol errors surface to the command issuer as
//! result values. Decode errors are absorbed close to where they occur
//! and degrade to "value unknown"; a malformed notification never
//! aborts a live session.

use thiserror::Error;

use crate::core::bluetooth::{CharacteristicId, SessionState};

/// Failures reported by the BLE transport. Never retried automatically
/// once a GATT operation has been issued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("no Bluetooth adapter available")]
    AdapterUnavailable,

    #[error("device not found: {0}")]
    DeviceNotFound(String),

    #[error("peripheral disconnected")]
    Disconnected,

    #[error("GATT operation failed: {0}")]
    Operation(String),

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
}

impl From<bluest::Error> for TransportError {
    fn from(e: bluest::Error) -> Self {
        TransportError::Operation(e.to_string())
    }
}

/// Structural failures while decoding a characteristic payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("payload for {characteristic:?} too short: need {expected} bytes, got {actual}")]
    TooShort {
        characteristic: CharacteristicId,
        expected: usize,
        actual: usize,
    },

    #[error("invalid {field} value {value:#04x} for {characteristic:?}")]
    InvalidValue {
        characteristic: CharacteristicId,
        field: &'static str,
        value: u8,
    },
}

/// Violations of the session protocol by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("command not accepted in session state {state:?}")]
    NotReady { state: SessionState },

    #[error("peripheral does not expose {0:?}")]
    CharacteristicMissing(CharacteristicId),
}

/// Top-level error returned to API callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("session closed")]
    SessionClosed,
}
