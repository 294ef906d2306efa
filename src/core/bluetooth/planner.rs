//! Service bootstrap planner.
//!
//! After service discovery the UI-visible state must be brought to a
//! known value. State characteristics are subscribed before the
//! one-shot reads of static properties are issued: state arrives by
//! push, properties are read once. Peripherals implementing a subset
//! of AICS/MICP are normal; absent characteristics are skipped.

use crate::core::bluetooth::operation::GattOperation;
use crate::core::bluetooth::types::{CharacteristicId, CharacteristicInfo};

/// Produce the ordered operations required after service discovery.
///
/// Order: subscribe Audio Input State, subscribe Mic Mute, read the
/// static AICS properties, then fallback reads. Audio Input State is
/// read one-shot only when it supports neither notify nor indicate;
/// Mic Mute is always read after subscribing because notifications
/// only report changes, not the initial value.
pub fn plan_bootstrap(characteristics: &[CharacteristicInfo]) -> Vec<GattOperation> {
    let find = |id: CharacteristicId| characteristics.iter().find(|c| c.id == id);

    let mut plan = Vec::new();

    let input_state = find(CharacteristicId::AudioInputState);
    let state_subscribed = push_subscribe(&mut plan, input_state);
    push_subscribe(&mut plan, find(CharacteristicId::MicMute));

    for id in [
        CharacteristicId::GainSettingProperties,
        CharacteristicId::AudioInputType,
        CharacteristicId::AudioInputStatus,
        CharacteristicId::AudioInputDescription,
    ] {
        if find(id).is_some_and(|c| c.props.read) {
            plan.push(GattOperation::Read(id));
        }
    }

    if !state_subscribed && input_state.is_some_and(|c| c.props.read) {
        plan.push(GattOperation::Read(CharacteristicId::AudioInputState));
    }
    if find(CharacteristicId::MicMute).is_some_and(|c| c.props.read) {
        plan.push(GattOperation::Read(CharacteristicId::MicMute));
    }

    plan
}

/// Subscribe using the characteristic's advertised properties;
/// indication is selected only when notify is unsupported.
fn push_subscribe(plan: &mut Vec<GattOperation>, info: Option<&CharacteristicInfo>) -> bool {
    let Some(info) = info else { return false };
    if !info.props.notify && !info.props.indicate {
        return false;
    }
    plan.push(GattOperation::SubscribeNotify {
        characteristic: info.id,
        use_indication: info.props.indicate && !info.props.notify,
    });
    true
}
