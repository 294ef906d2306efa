//! Configuration for the microphone control client.

mod profile_config;

pub use profile_config::ProfileConfig;
