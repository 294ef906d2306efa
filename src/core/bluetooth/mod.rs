//! Bluetooth functionality for the microphone control client.
//! This module handles the GATT session against AICS and MICP
//! peripherals: connecting, service bootstrap, characteristic codec,
//! operation sequencing and notification dispatch.

pub mod codec;
mod connection;
pub mod constants;
mod dispatcher;
mod manager;
mod operation;
mod planner;
mod session;
mod transport;
mod types;

// Re-export types that should be publicly accessible
pub use connection::BluestTransport;
pub use dispatcher::Dispatcher;
pub use manager::MicControlManager;
pub use operation::{GattOperation, OperationQueue};
pub use planner::plan_bootstrap;
pub use session::{Session, SessionHandle};
pub use transport::{Transport, TransportEvent};
pub use types::{
    AicsState, AudioInputStatus, AudioInputType, CharacteristicId, CharacteristicInfo,
    CharacteristicProps, GainMode, GainSettingsProperties, MicMute, Mute, SessionState, StateEvent,
};
