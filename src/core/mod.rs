//! Core functionality for the microphone control client.

pub mod bluetooth;

// Re-export commonly used types
pub use bluetooth::MicControlManager;
