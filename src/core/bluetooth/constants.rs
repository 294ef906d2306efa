//! Constants used throughout the crate: the AICS/MICP service and
//! characteristic UUIDs from the Bluetooth assigned numbers, plus
//! timing defaults for connection handling.

use uuid::Uuid;

/// Audio Input Control Service
pub const UUID_AICS_SERVICE: Uuid = Uuid::from_u128(0x00001843_0000_1000_8000_00805f9b34fb);

/// Microphone Control Service (MICP)
pub const UUID_MICP_SERVICE: Uuid = Uuid::from_u128(0x0000184d_0000_1000_8000_00805f9b34fb);

/// AICS characteristics
pub const UUID_AUDIO_INPUT_STATE: Uuid = Uuid::from_u128(0x00002b77_0000_1000_8000_00805f9b34fb);
pub const UUID_GAIN_SETTING_PROPERTIES: Uuid =
    Uuid::from_u128(0x00002b78_0000_1000_8000_00805f9b34fb);
pub const UUID_AUDIO_INPUT_TYPE: Uuid = Uuid::from_u128(0x00002b79_0000_1000_8000_00805f9b34fb);
pub const UUID_AUDIO_INPUT_STATUS: Uuid = Uuid::from_u128(0x00002b7a_0000_1000_8000_00805f9b34fb);
pub const UUID_AUDIO_INPUT_CONTROL_POINT: Uuid =
    Uuid::from_u128(0x00002b7b_0000_1000_8000_00805f9b34fb);
pub const UUID_AUDIO_INPUT_DESCRIPTION: Uuid =
    Uuid::from_u128(0x00002b7c_0000_1000_8000_00805f9b34fb);

/// MICP Mute characteristic
pub const UUID_MIC_MUTE: Uuid = Uuid::from_u128(0x00002bc3_0000_1000_8000_00805f9b34fb);

/// Client Characteristic Configuration Descriptor
pub const UUID_CCCD: Uuid = Uuid::from_u128(0x00002902_0000_1000_8000_00805f9b34fb);

/// CCCD payload enabling notifications
pub const ENABLE_NOTIFICATION_VALUE: [u8; 2] = [0x01, 0x00];

/// Maximum number of connection retries
pub const MAX_CONNECT_RETRIES: u32 = 5;

/// Delay between connection retries in milliseconds
pub const CONNECT_RETRY_DELAY_MS: u64 = 1000;

/// Delay between the connection callback and the service discovery
/// request. Issuing discovery straight from the connection callback is
/// unreliable on some stacks, so the session waits this long first.
pub const DISCOVERY_DELAY_MS: u64 = 600;

/// Scan duration when resolving a device by address, in seconds
pub const DEFAULT_SCAN_TIMEOUT_SECS: u64 = 10;
