//! Defines shared data structures for the Bluetooth module.

use serde::Serialize;
use uuid::Uuid;

use crate::core::bluetooth::constants::{
    UUID_AUDIO_INPUT_CONTROL_POINT, UUID_AUDIO_INPUT_DESCRIPTION, UUID_AUDIO_INPUT_STATE,
    UUID_AUDIO_INPUT_STATUS, UUID_AUDIO_INPUT_TYPE, UUID_GAIN_SETTING_PROPERTIES, UUID_MIC_MUTE,
};

/// The AICS/MICP characteristics this client knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CharacteristicId {
    AudioInputState,
    GainSettingProperties,
    AudioInputType,
    AudioInputStatus,
    AudioInputControlPoint,
    AudioInputDescription,
    MicMute,
}

impl CharacteristicId {
    pub fn uuid(&self) -> Uuid {
        match self {
            Self::AudioInputState => UUID_AUDIO_INPUT_STATE,
            Self::GainSettingProperties => UUID_GAIN_SETTING_PROPERTIES,
            Self::AudioInputType => UUID_AUDIO_INPUT_TYPE,
            Self::AudioInputStatus => UUID_AUDIO_INPUT_STATUS,
            Self::AudioInputControlPoint => UUID_AUDIO_INPUT_CONTROL_POINT,
            Self::AudioInputDescription => UUID_AUDIO_INPUT_DESCRIPTION,
            Self::MicMute => UUID_MIC_MUTE,
        }
    }

    pub fn from_uuid(uuid: Uuid) -> Option<Self> {
        [
            Self::AudioInputState,
            Self::GainSettingProperties,
            Self::AudioInputType,
            Self::AudioInputStatus,
            Self::AudioInputControlPoint,
            Self::AudioInputDescription,
            Self::MicMute,
        ]
        .into_iter()
        .find(|id| id.uuid() == uuid)
    }
}

/// Advertised properties of a discovered characteristic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CharacteristicProps {
    pub read: bool,
    pub write: bool,
    pub write_without_response: bool,
    pub notify: bool,
    pub indicate: bool,
}

/// One characteristic found during service discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacteristicInfo {
    pub id: CharacteristicId,
    pub props: CharacteristicProps,
}

/// AICS mute field of the Audio Input State characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Mute {
    NotMuted,
    Muted,
    Disabled,
}

/// AICS gain mode field of the Audio Input State characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GainMode {
    Manual,
    Automatic,
}

/// Decoded Audio Input State. Derived from the peripheral's broadcast;
/// the peripheral remains the source of truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AicsState {
    /// Gain in dB
    pub gain: i8,
    pub mute: Mute,
    pub gain_mode: GainMode,
    /// Present only on peripherals whose state broadcast carries the
    /// AICS change counter as a fourth byte.
    pub change_counter: Option<u8>,
}

/// Decoded Gain Setting Properties, read once per connection and used
/// to bound gain controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GainSettingsProperties {
    pub units: u8,
    pub min: i8,
    pub max: i8,
}

/// Audio Input Type codes from the Bluetooth assigned numbers.
/// Unknown codes are expected from newer peripherals and must not
/// abort parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AudioInputType {
    Unspecified,
    Bluetooth,
    Microphone,
    Analog,
    Digital,
    Radio,
    Streaming,
    Ambient,
    Other(u8),
}

impl AudioInputType {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0x00 => Self::Unspecified,
            0x01 => Self::Bluetooth,
            0x02 => Self::Microphone,
            0x03 => Self::Analog,
            0x04 => Self::Digital,
            0x05 => Self::Radio,
            0x06 => Self::Streaming,
            0x07 => Self::Ambient,
            other => Self::Other(other),
        }
    }
}

/// Audio Input Status characteristic value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AudioInputStatus {
    Inactive,
    Active,
    Unknown(u8),
}

/// MICP Mute characteristic value. Independent of [`Mute`]; the two
/// characteristics belong to different services and must not be
/// conflated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MicMute {
    NotMuted,
    Muted,
    DisableNotAllowed,
}

/// Connection lifecycle of one peripheral session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    DiscoveringServices,
    Ready,
    Disconnecting,
}

/// Decoded values and lifecycle changes published to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StateEvent {
    InputState(AicsState),
    GainProperties(GainSettingsProperties),
    InputType(AudioInputType),
    InputStatus(AudioInputStatus),
    InputDescription(String),
    MicMute(MicMute),
    Session(SessionState),
    /// All derived state is stale; emitted on disconnect.
    StateInvalidated,
}
