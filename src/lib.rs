//! Microphone control client library.
//! Drives Bluetooth LE microphone peripherals that expose the Audio
//! Input Control Service and the Microphone Control service.

// Module declarations
pub mod config;
pub mod core;
pub mod error;
pub mod logging;

pub use config::ProfileConfig;
pub use core::bluetooth::{
    AicsState, AudioInputStatus, AudioInputType, GainMode, GainSettingsProperties, MicMute,
    MicControlManager, Mute, SessionState, StateEvent,
};
pub use error::{DecodeError, Error, ProtocolError, TransportError};
