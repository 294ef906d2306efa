//! GATT session state machine.
//!
//! One owned `Session` per peripheral, driven as an actor: user
//! commands and transport events are channel messages consumed by a
//! single `select!` loop, so no callback ever mutates session state
//! from another thread. The session owns the operation queue, the
//! discovered characteristic set and the control-point change counter.
//!
//! Lifecycle: Disconnected -> Connecting -> Connected ->
//! DiscoveringServices -> Ready -> Disconnecting -> Disconnected. A
//! transport disconnect from any state drops straight to Disconnected,
//! clears the queue and invalidates all derived state.

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio::sync::{mpsc, oneshot};

use crate::config::ProfileConfig;
use crate::core::bluetooth::codec::{ControlPointCommand, DecodedValue, encode_mic_mute};
use crate::core::bluetooth::dispatcher::Dispatcher;
use crate::core::bluetooth::operation::{CompletionSender, GattOperation, OperationQueue};
use crate::core::bluetooth::planner::plan_bootstrap;
use crate::core::bluetooth::transport::{Transport, TransportEvent};
use crate::core::bluetooth::types::{
    CharacteristicId, CharacteristicInfo, SessionState, StateEvent,
};
use crate::error::{Error, ProtocolError, TransportError};

/// Messages accepted by the session actor.
pub enum SessionCommand {
    Connect {
        address: String,
        reply: CompletionSender,
    },
    Disconnect {
        reply: CompletionSender,
    },
    SetMute {
        muted: bool,
        reply: CompletionSender,
    },
    SetGain {
        gain: i8,
        reply: CompletionSender,
    },
    GetState {
        reply: oneshot::Sender<SessionState>,
    },
    /// Internal: fires once the post-connect settle delay has elapsed.
    RunDiscovery,
}

/// Cheap handle for submitting commands to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub async fn connect(&self, address: &str) -> Result<(), Error> {
        let address = address.to_string();
        self.request(|reply| SessionCommand::Connect { address, reply })
            .await
    }

    pub async fn disconnect(&self) -> Result<(), Error> {
        self.request(|reply| SessionCommand::Disconnect { reply })
            .await
    }

    pub async fn set_mute(&self, muted: bool) -> Result<(), Error> {
        self.request(|reply| SessionCommand::SetMute { muted, reply })
            .await
    }

    pub async fn set_gain(&self, gain: i8) -> Result<(), Error> {
        self.request(|reply| SessionCommand::SetGain { gain, reply })
            .await
    }

    pub async fn state(&self) -> Result<SessionState, Error> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::GetState { reply })
            .await
            .map_err(|_| Error::SessionClosed)?;
        rx.await.map_err(|_| Error::SessionClosed)
    }

    async fn request(
        &self,
        make: impl FnOnce(CompletionSender) -> SessionCommand,
    ) -> Result<(), Error> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| Error::SessionClosed)?;
        rx.await.map_err(|_| Error::SessionClosed)?
    }
}

pub struct Session {
    state: SessionState,
    queue: OperationQueue,
    transport: Arc<dyn Transport>,
    dispatcher: Dispatcher,
    config: ProfileConfig,
    characteristics: Vec<CharacteristicInfo>,
    change_counter: u8,
    connect_reply: Option<CompletionSender>,
    internal: mpsc::Sender<SessionCommand>,
}

impl Session {
    pub fn new(
        transport: Arc<dyn Transport>,
        dispatcher: Dispatcher,
        config: ProfileConfig,
        internal: mpsc::Sender<SessionCommand>,
    ) -> Self {
        Self {
            state: SessionState::Disconnected,
            queue: OperationQueue::new(),
            transport,
            dispatcher,
            config,
            characteristics: Vec::new(),
            change_counter: 0,
            connect_reply: None,
            internal,
        }
    }

    /// Spawn the session actor over the given transport event stream.
    pub fn spawn(
        transport: Arc<dyn Transport>,
        dispatcher: Dispatcher,
        config: ProfileConfig,
        events: mpsc::Receiver<TransportEvent>,
    ) -> SessionHandle {
        let (commands_tx, commands_rx) = mpsc::channel(32);
        let session = Session::new(transport, dispatcher, config, commands_tx.clone());
        tokio::spawn(session.run(commands_rx, events));
        SessionHandle {
            commands: commands_tx,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
        mut events: mpsc::Receiver<TransportEvent>,
    ) {
        loop {
            tokio::select! {
                Some(command) = commands.recv() => self.handle_command(command).await,
                Some(event) = events.recv() => self.handle_event(event).await,
                else => break,
            }
        }
        info!("session actor stopped");
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Connect { address, reply } => {
                if self.state != SessionState::Disconnected {
                    let _ = reply.send(Err(ProtocolError::NotReady { state: self.state }.into()));
                    return;
                }
                self.set_state(SessionState::Connecting);
                self.connect_reply = Some(reply);
                self.transport.connect(&address).await;
            }
            SessionCommand::Disconnect { reply } => {
                if self.state == SessionState::Disconnected {
                    let _ = reply.send(Ok(()));
                    return;
                }
                self.set_state(SessionState::Disconnecting);
                self.transport.disconnect().await;
                let _ = reply.send(Ok(()));
            }
            SessionCommand::SetMute { muted, reply } => {
                if self.state != SessionState::Ready {
                    let _ = reply.send(Err(ProtocolError::NotReady { state: self.state }.into()));
                    return;
                }
                self.submit_mute(muted, reply).await;
            }
            SessionCommand::SetGain { gain, reply } => {
                if self.state != SessionState::Ready {
                    let _ = reply.send(Err(ProtocolError::NotReady { state: self.state }.into()));
                    return;
                }
                if self.writable(CharacteristicId::AudioInputControlPoint) {
                    self.submit_control_point(ControlPointCommand::SetGain(gain), reply)
                        .await;
                } else {
                    let _ = reply.send(Err(ProtocolError::CharacteristicMissing(
                        CharacteristicId::AudioInputControlPoint,
                    )
                    .into()));
                }
            }
            SessionCommand::GetState { reply } => {
                let _ = reply.send(self.state);
            }
            SessionCommand::RunDiscovery => {
                if self.state == SessionState::Connected {
                    self.set_state(SessionState::DiscoveringServices);
                    self.transport.discover_services().await;
                }
            }
        }
    }

    async fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => {
                if self.state != SessionState::Connecting {
                    warn!("ignoring connect completion in state {:?}", self.state);
                    return;
                }
                self.set_state(SessionState::Connected);
                let delay = self.config.discovery_delay_ms;
                if delay == 0 {
                    self.set_state(SessionState::DiscoveringServices);
                    self.transport.discover_services().await;
                } else {
                    let internal = self.internal.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                        let _ = internal.send(SessionCommand::RunDiscovery).await;
                    });
                }
            }
            TransportEvent::ConnectFailed(e) => {
                warn!("connection failed: {e}");
                if let Some(reply) = self.connect_reply.take() {
                    let _ = reply.send(Err(e.into()));
                }
                self.set_state(SessionState::Disconnected);
            }
            TransportEvent::Disconnected => {
                self.queue.clear();
                self.characteristics.clear();
                if let Some(reply) = self.connect_reply.take() {
                    let _ = reply.send(Err(TransportError::Disconnected.into()));
                }
                self.set_state(SessionState::Disconnected);
                self.dispatcher.publish(StateEvent::StateInvalidated);
            }
            TransportEvent::ServicesDiscovered(found) => {
                if self.state != SessionState::DiscoveringServices {
                    warn!("ignoring discovery result in state {:?}", self.state);
                    return;
                }
                if found.is_empty() {
                    warn!("peripheral exposes no AICS or MICP characteristics");
                }
                self.characteristics = found;
                self.set_state(SessionState::Ready);
                let plan = plan_bootstrap(&self.characteristics);
                info!("bootstrap plan: {} operations", plan.len());
                for op in plan {
                    self.queue.enqueue(op, None);
                }
                self.queue.try_advance(&*self.transport).await;
                if let Some(reply) = self.connect_reply.take() {
                    let _ = reply.send(Ok(()));
                }
            }
            TransportEvent::DiscoveryFailed(e) => {
                // Terminal for the session; there is no retry.
                warn!("service discovery failed: {e}");
                if let Some(reply) = self.connect_reply.take() {
                    let _ = reply.send(Err(e.into()));
                }
                self.set_state(SessionState::Disconnecting);
                self.transport.disconnect().await;
            }
            TransportEvent::OperationComplete {
                characteristic,
                result,
            } => {
                let finished = self.queue.on_operation_complete();
                match result {
                    Ok(value) => {
                        if let Some(finished) = finished
                            && let Some(done) = finished.done
                        {
                            let _ = done.send(Ok(()));
                        }
                        if let Some(value) = value {
                            self.handle_value(characteristic, &value);
                        }
                    }
                    Err(e) => {
                        // The failed operation is dropped, never
                        // retried; the queue still drains.
                        warn!("GATT operation on {characteristic:?} failed: {e}");
                        if let Some(finished) = finished
                            && let Some(done) = finished.done
                        {
                            let _ = done.send(Err(e.into()));
                        }
                    }
                }
                self.queue.try_advance(&*self.transport).await;
            }
            TransportEvent::Notification {
                characteristic,
                value,
            } => {
                self.handle_value(characteristic, &value);
            }
        }
    }

    /// Mute commands prefer the AICS control point; peripherals
    /// without one but with a writable MICP Mute characteristic get a
    /// direct one-byte write instead.
    async fn submit_mute(&mut self, muted: bool, reply: CompletionSender) {
        if self.writable(CharacteristicId::AudioInputControlPoint) {
            let command = if muted {
                ControlPointCommand::Mute
            } else {
                ControlPointCommand::Unmute
            };
            self.submit_control_point(command, reply).await;
        } else if self.writable(CharacteristicId::MicMute) {
            let op = GattOperation::WriteCharacteristic {
                characteristic: CharacteristicId::MicMute,
                payload: encode_mic_mute(muted),
                ack_required: self.config.write_with_response,
            };
            self.queue.enqueue(op, Some(reply));
            self.queue.try_advance(&*self.transport).await;
        } else {
            let _ = reply.send(Err(ProtocolError::CharacteristicMissing(
                CharacteristicId::MicMute,
            )
            .into()));
        }
    }

    async fn submit_control_point(&mut self, command: ControlPointCommand, reply: CompletionSender) {
        let counter = self.next_change_counter();
        let op = GattOperation::WriteCharacteristic {
            characteristic: CharacteristicId::AudioInputControlPoint,
            payload: command.encode(counter),
            ack_required: self.config.write_with_response,
        };
        self.queue.enqueue(op, Some(reply));
        self.queue.try_advance(&*self.transport).await;
    }

    fn handle_value(&mut self, characteristic: CharacteristicId, data: &[u8]) {
        let decoded = self.dispatcher.dispatch_value(characteristic, data);
        if let Some(DecodedValue::InputState(state)) = decoded
            && let Some(counter) = state.change_counter
        {
            // Resynchronize to the peripheral's broadcast counter so
            // the next command is not rejected as stale.
            self.change_counter = counter;
        }
    }

    fn next_change_counter(&mut self) -> Option<u8> {
        if !self.config.control_point_change_counter {
            return None;
        }
        let counter = self.change_counter;
        self.change_counter = counter.wrapping_add(1);
        Some(counter)
    }

    fn writable(&self, id: CharacteristicId) -> bool {
        self.characteristics
            .iter()
            .any(|c| c.id == id && (c.props.write || c.props.write_without_response))
    }

    fn set_state(&mut self, next: SessionState) {
        if self.state != next {
            info!("session state: {:?} -> {:?}", self.state, next);
            self.state = next;
            self.dispatcher.publish(StateEvent::Session(next));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use tokio::sync::broadcast;

    use super::*;
    use crate::core::bluetooth::transport::mock::MockTransport;
    use crate::core::bluetooth::types::CharacteristicProps;

    fn characteristic(id: CharacteristicId, props: CharacteristicProps) -> CharacteristicInfo {
        CharacteristicInfo { id, props }
    }

    fn full_aics() -> Vec<CharacteristicInfo> {
        let readable = CharacteristicProps {
            read: true,
            ..Default::default()
        };
        vec![
            characteristic(
                CharacteristicId::AudioInputState,
                CharacteristicProps {
                    read: true,
                    notify: true,
                    ..Default::default()
                },
            ),
            characteristic(CharacteristicId::GainSettingProperties, readable),
            characteristic(CharacteristicId::AudioInputType, readable),
            characteristic(CharacteristicId::AudioInputStatus, readable),
            characteristic(CharacteristicId::AudioInputDescription, readable),
            characteristic(
                CharacteristicId::AudioInputControlPoint,
                CharacteristicProps {
                    write: true,
                    ..Default::default()
                },
            ),
        ]
    }

    fn writable_mic_mute_only() -> Vec<CharacteristicInfo> {
        vec![characteristic(
            CharacteristicId::MicMute,
            CharacteristicProps {
                write: true,
                ..Default::default()
            },
        )]
    }

    fn make_session(
        config: ProfileConfig,
    ) -> (
        Session,
        Arc<MockTransport>,
        broadcast::Receiver<StateEvent>,
    ) {
        let transport = Arc::new(MockTransport::default());
        let dispatcher = Dispatcher::new(32);
        let events = dispatcher.subscribe();
        // The internal channel is only used for the delayed-discovery
        // timer, which these tests disable via discovery_delay_ms = 0.
        let (internal, _internal_rx) = mpsc::channel(8);
        let session = Session::new(transport.clone(), dispatcher, config, internal);
        (session, transport, events)
    }

    fn test_config() -> ProfileConfig {
        ProfileConfig {
            discovery_delay_ms: 0,
            ..ProfileConfig::default()
        }
    }

    async fn drive_to_ready(
        session: &mut Session,
        characteristics: Vec<CharacteristicInfo>,
    ) -> oneshot::Receiver<Result<(), Error>> {
        let (reply, rx) = oneshot::channel();
        session
            .handle_command(SessionCommand::Connect {
                address: "AA:BB:CC:DD:EE:FF".to_string(),
                reply,
            })
            .await;
        session.handle_event(TransportEvent::Connected).await;
        session
            .handle_event(TransportEvent::ServicesDiscovered(characteristics))
            .await;
        rx
    }

    fn drain(rx: &mut broadcast::Receiver<StateEvent>) -> Vec<StateEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test]
    async fn command_outside_ready_is_rejected_without_enqueue() {
        let (mut session, transport, _events) = make_session(test_config());
        let (reply, _rx) = oneshot::channel();
        session
            .handle_command(SessionCommand::Connect {
                address: "AA:BB:CC:DD:EE:FF".to_string(),
                reply,
            })
            .await;
        assert_eq!(session.state, SessionState::Connecting);

        let (reply, rx) = oneshot::channel();
        session
            .handle_command(SessionCommand::SetGain { gain: 5, reply })
            .await;

        assert_eq!(
            rx.await.unwrap(),
            Err(ProtocolError::NotReady {
                state: SessionState::Connecting
            }
            .into())
        );
        assert!(session.queue.is_empty());
        assert!(!session.queue.is_in_flight());
        assert_eq!(transport.issued_count(), 0);
    }

    #[tokio::test]
    async fn actor_serves_commands_while_connect_is_outstanding() {
        let transport = Arc::new(MockTransport::default());
        let dispatcher = Dispatcher::new(32);
        let (_events_tx, events_rx) = mpsc::channel(8);
        let handle = Session::spawn(
            transport.clone() as Arc<dyn Transport>,
            dispatcher,
            test_config(),
            events_rx,
        );

        let (reply, mut connect_rx) = oneshot::channel();
        handle
            .commands
            .send(SessionCommand::Connect {
                address: "AA:BB:CC:DD:EE:FF".to_string(),
                reply,
            })
            .await
            .unwrap();

        // commands are FIFO, so this state query proves the actor got
        // past Connect without waiting on the radio
        assert_eq!(handle.state().await.unwrap(), SessionState::Connecting);
        assert_eq!(transport.connects.lock().unwrap().len(), 1);
        assert!(connect_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn connect_flow_reaches_ready_and_issues_bootstrap() {
        let (mut session, transport, _events) = make_session(test_config());
        let reply = drive_to_ready(&mut session, full_aics()).await;

        assert!(reply.await.unwrap().is_ok());
        assert_eq!(session.state, SessionState::Ready);
        assert_eq!(transport.discover_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            transport.issued(),
            vec![GattOperation::SubscribeNotify {
                characteristic: CharacteristicId::AudioInputState,
                use_indication: false,
            }]
        );
        // subscribe in flight, four reads still queued
        assert!(session.queue.is_in_flight());
        assert_eq!(session.queue.len(), 4);
    }

    #[tokio::test]
    async fn completion_advances_to_next_bootstrap_read() {
        let (mut session, transport, _events) = make_session(test_config());
        drive_to_ready(&mut session, full_aics()).await;

        session
            .handle_event(TransportEvent::OperationComplete {
                characteristic: CharacteristicId::AudioInputState,
                result: Ok(None),
            })
            .await;

        assert_eq!(
            transport.issued().last(),
            Some(&GattOperation::Read(CharacteristicId::GainSettingProperties))
        );
        assert_eq!(transport.issued_count(), 2);
    }

    #[tokio::test]
    async fn failed_operation_is_dropped_and_queue_drains() {
        let (mut session, transport, _events) = make_session(test_config());
        drive_to_ready(&mut session, full_aics()).await;

        session
            .handle_event(TransportEvent::OperationComplete {
                characteristic: CharacteristicId::AudioInputState,
                result: Err(TransportError::Operation("write rejected".to_string())),
            })
            .await;

        // the next queued read was still issued
        assert_eq!(transport.issued_count(), 2);
        assert!(session.queue.is_in_flight());
    }

    #[tokio::test]
    async fn disconnect_clears_queue_and_invalidates_state() {
        let (mut session, transport, mut events) = make_session(test_config());
        drive_to_ready(&mut session, full_aics()).await;
        let issued_before = transport.issued_count();
        assert!(session.queue.len() > 0);

        session.handle_event(TransportEvent::Disconnected).await;

        assert_eq!(session.state, SessionState::Disconnected);
        assert!(session.queue.is_empty());
        assert!(!session.queue.is_in_flight());
        assert_eq!(transport.issued_count(), issued_before);
        assert!(drain(&mut events).contains(&StateEvent::StateInvalidated));

        // a straggling completion for a cleared operation is harmless
        session
            .handle_event(TransportEvent::OperationComplete {
                characteristic: CharacteristicId::AudioInputState,
                result: Ok(None),
            })
            .await;
        assert_eq!(transport.issued_count(), issued_before);
    }

    #[tokio::test]
    async fn discovery_failure_tears_down_the_session() {
        let (mut session, transport, _events) = make_session(test_config());
        let (reply, rx) = oneshot::channel();
        session
            .handle_command(SessionCommand::Connect {
                address: "AA:BB:CC:DD:EE:FF".to_string(),
                reply,
            })
            .await;
        session.handle_event(TransportEvent::Connected).await;
        session
            .handle_event(TransportEvent::DiscoveryFailed(TransportError::Operation(
                "gatt error 129".to_string(),
            )))
            .await;

        assert_eq!(session.state, SessionState::Disconnecting);
        assert_eq!(transport.disconnects.load(Ordering::SeqCst), 1);
        assert!(rx.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn mute_falls_back_to_direct_micp_write() {
        let (mut session, transport, _events) = make_session(test_config());
        drive_to_ready(&mut session, writable_mic_mute_only()).await;

        let (reply, _rx) = oneshot::channel();
        session
            .handle_command(SessionCommand::SetMute { muted: true, reply })
            .await;

        assert_eq!(
            transport.issued(),
            vec![GattOperation::WriteCharacteristic {
                characteristic: CharacteristicId::MicMute,
                payload: vec![1],
                ack_required: true,
            }]
        );
    }

    #[tokio::test]
    async fn set_gain_requires_the_control_point() {
        let (mut session, _transport, _events) = make_session(test_config());
        drive_to_ready(&mut session, writable_mic_mute_only()).await;

        let (reply, rx) = oneshot::channel();
        session
            .handle_command(SessionCommand::SetGain { gain: 3, reply })
            .await;

        assert_eq!(
            rx.await.unwrap(),
            Err(ProtocolError::CharacteristicMissing(
                CharacteristicId::AudioInputControlPoint
            )
            .into())
        );
    }

    #[tokio::test]
    async fn user_writes_respect_single_flight() {
        let (mut session, transport, _events) = make_session(test_config());
        drive_to_ready(&mut session, full_aics()).await;
        let issued_before = transport.issued_count();

        let (reply, _rx1) = oneshot::channel();
        session
            .handle_command(SessionCommand::SetGain { gain: 1, reply })
            .await;
        let (reply, _rx2) = oneshot::channel();
        session
            .handle_command(SessionCommand::SetGain { gain: 2, reply })
            .await;

        // the bootstrap subscribe is still in flight; nothing new issued
        assert_eq!(transport.issued_count(), issued_before);
        assert_eq!(session.queue.len(), 4 + 2);
    }

    #[tokio::test]
    async fn change_counter_increments_and_resyncs() {
        let config = ProfileConfig {
            control_point_change_counter: true,
            ..test_config()
        };
        let (mut session, transport, _events) = make_session(config);
        drive_to_ready(&mut session, full_aics()).await;

        // drain the bootstrap plan so user writes issue immediately
        while session.queue.is_in_flight() {
            session
                .handle_event(TransportEvent::OperationComplete {
                    characteristic: CharacteristicId::AudioInputState,
                    result: Ok(None),
                })
                .await;
        }

        let (reply, _rx) = oneshot::channel();
        session
            .handle_command(SessionCommand::SetGain { gain: 5, reply })
            .await;
        assert_eq!(
            transport.issued().last(),
            Some(&GattOperation::WriteCharacteristic {
                characteristic: CharacteristicId::AudioInputControlPoint,
                payload: vec![0x01, 0, 5],
                ack_required: true,
            })
        );

        // peripheral broadcasts a counter-framed state; resync to it
        session
            .handle_event(TransportEvent::Notification {
                characteristic: CharacteristicId::AudioInputState,
                value: vec![5, 0, 0, 9],
            })
            .await;
        session
            .handle_event(TransportEvent::OperationComplete {
                characteristic: CharacteristicId::AudioInputControlPoint,
                result: Ok(None),
            })
            .await;

        let (reply, _rx) = oneshot::channel();
        session
            .handle_command(SessionCommand::SetMute { muted: true, reply })
            .await;
        assert_eq!(
            transport.issued().last(),
            Some(&GattOperation::WriteCharacteristic {
                characteristic: CharacteristicId::AudioInputControlPoint,
                payload: vec![0x03, 9],
                ack_required: true,
            })
        );
    }

    #[tokio::test]
    async fn notification_does_not_perturb_flight_flag() {
        let (mut session, transport, mut events) = make_session(test_config());
        drive_to_ready(&mut session, full_aics()).await;
        drain(&mut events);
        let issued_before = transport.issued_count();

        session
            .handle_event(TransportEvent::Notification {
                characteristic: CharacteristicId::AudioInputState,
                value: vec![10, 1, 0],
            })
            .await;

        assert!(session.queue.is_in_flight());
        assert_eq!(transport.issued_count(), issued_before);
        assert_eq!(drain(&mut events).len(), 1);
    }
}
