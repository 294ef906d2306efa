//! Top-level facade over the microphone control client.
//! Wires the bluest transport, the notification dispatcher and the
//! session actor together and exposes the public async API.

use std::sync::Arc;

use anyhow::Result;
use log::info;
use tokio::sync::{broadcast, mpsc};

use crate::config::ProfileConfig;
use crate::core::bluetooth::connection::BluestTransport;
use crate::core::bluetooth::dispatcher::Dispatcher;
use crate::core::bluetooth::session::{Session, SessionHandle};
use crate::core::bluetooth::types::{SessionState, StateEvent};
use crate::error::Error;

const TRANSPORT_EVENT_CAPACITY: usize = 64;
const STATE_EVENT_CAPACITY: usize = 64;

/// Manages one microphone peripheral session.
pub struct MicControlManager {
    session: SessionHandle,
    dispatcher: Dispatcher,
}

impl MicControlManager {
    /// Creates a manager bound to the default Bluetooth adapter.
    pub async fn new(config: ProfileConfig) -> Result<Self> {
        let (events_tx, events_rx) = mpsc::channel(TRANSPORT_EVENT_CAPACITY);
        let transport = BluestTransport::new(events_tx, config.clone()).await?;
        let dispatcher = Dispatcher::new(STATE_EVENT_CAPACITY);
        let session = Session::spawn(
            Arc::new(transport),
            dispatcher.clone(),
            config,
            events_rx,
        );
        info!("Microphone control manager initialized.");
        Ok(Self {
            session,
            dispatcher,
        })
    }

    /// Connects to the peripheral at `address` and runs the session up
    /// to Ready, including service bootstrap.
    pub async fn connect(&self, address: &str) -> Result<(), Error> {
        self.session.connect(address).await
    }

    pub async fn disconnect(&self) -> Result<(), Error> {
        self.session.disconnect().await
    }

    /// Mutes or unmutes the audio input.
    pub async fn set_mute(&self, muted: bool) -> Result<(), Error> {
        self.session.set_mute(muted).await
    }

    /// Sets the input gain in decibels via the AICS control point.
    pub async fn set_gain(&self, gain: i8) -> Result<(), Error> {
        self.session.set_gain(gain).await
    }

    pub async fn session_state(&self) -> Result<SessionState, Error> {
        self.session.state().await
    }

    /// Subscribes to decoded state and lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.dispatcher.subscribe()
    }
}
