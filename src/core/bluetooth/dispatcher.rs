//! Notification dispatcher.
//!
//! Routes characteristic values, whether read completions or
//! unsolicited notifications, through the codec and fans the decoded
//! result out to every subscriber. Runs independently of the operation
//! queue: a notification arriving between two queued operations is
//! processed without perturbing the flight flag.

use log::{debug, warn};
use tokio::sync::broadcast;

use crate::core::bluetooth::codec::{self, DecodedValue};
use crate::core::bluetooth::types::{CharacteristicId, StateEvent};

#[derive(Clone)]
pub struct Dispatcher {
    events: broadcast::Sender<StateEvent>,
}

impl Dispatcher {
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity);
        Self { events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.events.subscribe()
    }

    /// Publish a lifecycle or decoded-state event. Send errors only
    /// mean nobody is listening right now.
    pub fn publish(&self, event: StateEvent) {
        let _ = self.events.send(event);
    }

    /// Decode and publish one characteristic value. Returns the
    /// decoded value so the session can observe it too. Decode
    /// failures degrade to "value unknown": logged and skipped, never
    /// propagated, since one malformed payload must not abort an
    /// otherwise-live session.
    pub fn dispatch_value(
        &self,
        characteristic: CharacteristicId,
        data: &[u8],
    ) -> Option<DecodedValue> {
        if data.is_empty() {
            debug!("ignoring empty payload for {characteristic:?}");
            return None;
        }
        match codec::decode(characteristic, data) {
            Ok(value) => {
                debug!("decoded {characteristic:?}: {value:?}");
                if let Some(event) = Self::to_event(&value) {
                    self.publish(event);
                }
                Some(value)
            }
            Err(e) => {
                warn!("dropping undecodable value for {characteristic:?}: {e}");
                None
            }
        }
    }

    fn to_event(value: &DecodedValue) -> Option<StateEvent> {
        match value {
            DecodedValue::InputState(state) => Some(StateEvent::InputState(*state)),
            DecodedValue::GainProperties(props) => Some(StateEvent::GainProperties(*props)),
            DecodedValue::InputType(input_type) => Some(StateEvent::InputType(*input_type)),
            DecodedValue::InputStatus(status) => Some(StateEvent::InputStatus(*status)),
            DecodedValue::InputDescription(text) => {
                Some(StateEvent::InputDescription(text.clone()))
            }
            DecodedValue::MicMute(mute) => Some(StateEvent::MicMute(*mute)),
            // The control point is write-only; the peripheral never
            // pushes it back at us.
            DecodedValue::ControlPoint(_) => None,
        }
    }
}
