//! Characteristic codec for AICS and MICP payloads.
//!
//! Pure byte-level encode/decode with no I/O and no state. Wire
//! layouts follow the Audio Input Control Service and Microphone
//! Control Profile specifications:
//!
//! ```text
//! Audio Input State (>= 3 bytes):
//!   [0] gain, sint8, dB
//!   [1] mute, uint8 {0 not muted, 1 muted, 2 disabled}
//!   [2] gain mode, uint8 {0 manual, 1 automatic}
//!   [3] change counter, uint8 (only on counter-framed peripherals)
//!
//! Gain Setting Properties (3 bytes):
//!   [0] units, uint8   [1] min, sint8   [2] max, sint8
//!
//! Audio Input Type / Status / Mic Mute: single uint8
//! Audio Input Description: UTF-8 text
//! ```

use crate::core::bluetooth::types::{
    AicsState, AudioInputStatus, AudioInputType, CharacteristicId, GainMode,
    GainSettingsProperties, MicMute, Mute,
};
use crate::error::DecodeError;

/// A decoded characteristic value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedValue {
    InputState(AicsState),
    GainProperties(GainSettingsProperties),
    InputType(AudioInputType),
    InputStatus(AudioInputStatus),
    InputDescription(String),
    MicMute(MicMute),
    ControlPoint(ControlPointCommand),
}

/// Commands accepted by the AICS Audio Input Control Point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlPointCommand {
    /// Set absolute gain in dB (opcode 0x01)
    SetGain(i8),
    /// Unmute (opcode 0x02)
    Unmute,
    /// Mute (opcode 0x03)
    Mute,
}

impl ControlPointCommand {
    pub fn opcode(&self) -> u8 {
        match self {
            Self::SetGain(_) => 0x01,
            Self::Unmute => 0x02,
            Self::Mute => 0x03,
        }
    }

    /// Encode the command frame. Whether a change counter byte is
    /// included is a capability of the target peripheral, not of the
    /// command; pass `None` for peripherals that expect bare opcodes.
    pub fn encode(&self, change_counter: Option<u8>) -> Vec<u8> {
        let mut frame = vec![self.opcode()];
        if let Some(counter) = change_counter {
            frame.push(counter);
        }
        if let Self::SetGain(gain) = self {
            frame.push(*gain as u8);
        }
        frame
    }
}

/// Decode a control point frame produced by [`ControlPointCommand::encode`].
/// `counter_framed` must match the framing the frame was encoded with.
pub fn decode_control_point(
    data: &[u8],
    counter_framed: bool,
) -> Result<(ControlPointCommand, Option<u8>), DecodeError> {
    let characteristic = CharacteristicId::AudioInputControlPoint;
    let header = if counter_framed { 2 } else { 1 };
    if data.len() < header {
        return Err(DecodeError::TooShort {
            characteristic,
            expected: header,
            actual: data.len(),
        });
    }
    let counter = counter_framed.then(|| data[1]);
    let command = match data[0] {
        0x01 => {
            let gain = *data.get(header).ok_or(DecodeError::TooShort {
                characteristic,
                expected: header + 1,
                actual: data.len(),
            })?;
            ControlPointCommand::SetGain(gain as i8)
        }
        0x02 => ControlPointCommand::Unmute,
        0x03 => ControlPointCommand::Mute,
        other => {
            return Err(DecodeError::InvalidValue {
                characteristic,
                field: "opcode",
                value: other,
            });
        }
    };
    Ok((command, counter))
}

/// Payload for a direct write of the MICP Mute characteristic, used on
/// peripherals that expose no AICS control point.
pub fn encode_mic_mute(muted: bool) -> Vec<u8> {
    vec![u8::from(muted)]
}

/// Decode the payload of a known characteristic.
pub fn decode(characteristic: CharacteristicId, data: &[u8]) -> Result<DecodedValue, DecodeError> {
    match characteristic {
        CharacteristicId::AudioInputState => decode_input_state(data).map(DecodedValue::InputState),
        CharacteristicId::GainSettingProperties => {
            decode_gain_properties(data).map(DecodedValue::GainProperties)
        }
        CharacteristicId::AudioInputType => {
            let raw = first_byte(characteristic, data)?;
            Ok(DecodedValue::InputType(AudioInputType::from_raw(raw)))
        }
        CharacteristicId::AudioInputStatus => {
            let status = match first_byte(characteristic, data)? {
                0 => AudioInputStatus::Inactive,
                1 => AudioInputStatus::Active,
                other => AudioInputStatus::Unknown(other),
            };
            Ok(DecodedValue::InputStatus(status))
        }
        CharacteristicId::AudioInputDescription => {
            Ok(DecodedValue::InputDescription(decode_description(data)))
        }
        CharacteristicId::MicMute => {
            let mute = match first_byte(characteristic, data)? {
                0 => MicMute::NotMuted,
                1 => MicMute::Muted,
                2 => MicMute::DisableNotAllowed,
                other => {
                    return Err(DecodeError::InvalidValue {
                        characteristic,
                        field: "mute",
                        value: other,
                    });
                }
            };
            Ok(DecodedValue::MicMute(mute))
        }
        CharacteristicId::AudioInputControlPoint => {
            decode_control_point(data, false).map(|(command, _)| DecodedValue::ControlPoint(command))
        }
    }
}

fn decode_input_state(data: &[u8]) -> Result<AicsState, DecodeError> {
    let characteristic = CharacteristicId::AudioInputState;
    if data.len() < 3 {
        return Err(DecodeError::TooShort {
            characteristic,
            expected: 3,
            actual: data.len(),
        });
    }
    let mute = match data[1] {
        0 => Mute::NotMuted,
        1 => Mute::Muted,
        2 => Mute::Disabled,
        other => {
            return Err(DecodeError::InvalidValue {
                characteristic,
                field: "mute",
                value: other,
            });
        }
    };
    let gain_mode = match data[2] {
        0 => GainMode::Manual,
        1 => GainMode::Automatic,
        other => {
            return Err(DecodeError::InvalidValue {
                characteristic,
                field: "gain mode",
                value: other,
            });
        }
    };
    Ok(AicsState {
        gain: data[0] as i8,
        mute,
        gain_mode,
        change_counter: data.get(3).copied(),
    })
}

fn decode_gain_properties(data: &[u8]) -> Result<GainSettingsProperties, DecodeError> {
    if data.len() < 3 {
        return Err(DecodeError::TooShort {
            characteristic: CharacteristicId::GainSettingProperties,
            expected: 3,
            actual: data.len(),
        });
    }
    Ok(GainSettingsProperties {
        units: data[0],
        min: data[1] as i8,
        max: data[2] as i8,
    })
}

/// A hostile or buggy peripheral may send a non-UTF-8 description;
/// degrade to a hex rendering rather than failing the read pipeline.
fn decode_description(data: &[u8]) -> String {
    match std::str::from_utf8(data) {
        Ok(text) => text.to_string(),
        Err(_) => data
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<Vec<_>>()
            .join(" "),
    }
}

fn first_byte(characteristic: CharacteristicId, data: &[u8]) -> Result<u8, DecodeError> {
    data.first().copied().ok_or(DecodeError::TooShort {
        characteristic,
        expected: 1,
        actual: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_state_too_short() {
        let err = decode(CharacteristicId::AudioInputState, &[10, 1]).unwrap_err();
        assert!(matches!(err, DecodeError::TooShort { expected: 3, actual: 2, .. }));
    }

    #[test]
    fn input_state_exact() {
        let value = decode(CharacteristicId::AudioInputState, &[10, 1, 0]).unwrap();
        assert_eq!(
            value,
            DecodedValue::InputState(AicsState {
                gain: 10,
                mute: Mute::Muted,
                gain_mode: GainMode::Manual,
                change_counter: None,
            })
        );
    }

    #[test]
    fn input_state_negative_gain_and_counter() {
        let value = decode(CharacteristicId::AudioInputState, &[0xF6, 0, 1, 7]).unwrap();
        assert_eq!(
            value,
            DecodedValue::InputState(AicsState {
                gain: -10,
                mute: Mute::NotMuted,
                gain_mode: GainMode::Automatic,
                change_counter: Some(7),
            })
        );
    }

    #[test]
    fn input_state_bad_mute_code() {
        let err = decode(CharacteristicId::AudioInputState, &[0, 9, 0]).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::InvalidValue { field: "mute", value: 9, .. }
        ));
    }

    #[test]
    fn gain_properties_signed_bounds() {
        let value = decode(CharacteristicId::GainSettingProperties, &[1, 0x80, 0x7F]).unwrap();
        assert_eq!(
            value,
            DecodedValue::GainProperties(GainSettingsProperties {
                units: 1,
                min: -128,
                max: 127,
            })
        );
    }

    #[test]
    fn input_type_known_and_other() {
        assert_eq!(
            decode(CharacteristicId::AudioInputType, &[0x02]).unwrap(),
            DecodedValue::InputType(AudioInputType::Microphone)
        );
        assert_eq!(
            decode(CharacteristicId::AudioInputType, &[0x42]).unwrap(),
            DecodedValue::InputType(AudioInputType::Other(0x42))
        );
    }

    #[test]
    fn input_status_unknown_is_not_an_error() {
        assert_eq!(
            decode(CharacteristicId::AudioInputStatus, &[5]).unwrap(),
            DecodedValue::InputStatus(AudioInputStatus::Unknown(5))
        );
    }

    #[test]
    fn mic_mute_disable_not_allowed() {
        assert_eq!(
            decode(CharacteristicId::MicMute, &[2]).unwrap(),
            DecodedValue::MicMute(MicMute::DisableNotAllowed)
        );
    }

    #[test]
    fn description_utf8_and_fallback() {
        assert_eq!(
            decode(CharacteristicId::AudioInputDescription, b"Headset mic").unwrap(),
            DecodedValue::InputDescription("Headset mic".to_string())
        );
        assert_eq!(
            decode(CharacteristicId::AudioInputDescription, &[0xFF, 0xFE]).unwrap(),
            DecodedValue::InputDescription("ff fe".to_string())
        );
    }

    #[test]
    fn control_point_encoding() {
        assert_eq!(ControlPointCommand::SetGain(5).encode(Some(3)), vec![0x01, 3, 5]);
        assert_eq!(ControlPointCommand::SetGain(-5).encode(None), vec![0x01, 0xFB]);
        assert_eq!(ControlPointCommand::Mute.encode(Some(0)), vec![0x03, 0]);
        assert_eq!(ControlPointCommand::Unmute.encode(None), vec![0x02]);
    }

    #[test]
    fn control_point_round_trip() {
        for command in [
            ControlPointCommand::SetGain(-12),
            ControlPointCommand::Unmute,
            ControlPointCommand::Mute,
        ] {
            let (decoded, counter) = decode_control_point(&command.encode(Some(9)), true).unwrap();
            assert_eq!(decoded, command);
            assert_eq!(counter, Some(9));

            let (decoded, counter) = decode_control_point(&command.encode(None), false).unwrap();
            assert_eq!(decoded, command);
            assert_eq!(counter, None);
        }
    }

    #[test]
    fn control_point_unknown_opcode() {
        let err = decode_control_point(&[0x7F], false).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::InvalidValue { field: "opcode", value: 0x7F, .. }
        ));
    }

    #[test]
    fn mic_mute_write_payload() {
        assert_eq!(encode_mic_mute(true), vec![1]);
        assert_eq!(encode_mic_mute(false), vec![0]);
    }
}
