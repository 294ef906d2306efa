//! Command-line front end for the microphone control client.

use std::path::PathBuf;

use anyhow::{Result, bail};
use log::info;
use tokio::sync::broadcast::error::RecvError;

use mic_control::logging::init_logging;
use mic_control::{MicControlManager, ProfileConfig, StateEvent};

const USAGE: &str = "usage: micctl <address> <watch|mute|unmute|gain <dB>>";

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let mut args = std::env::args().skip(1);
    let Some(address) = args.next() else {
        bail!(USAGE);
    };
    let Some(command) = args.next() else {
        bail!(USAGE);
    };

    let config_dir = std::env::var_os("MICCTL_CONFIG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let config = ProfileConfig::load_config(&config_dir).await?;

    let manager = MicControlManager::new(config).await?;
    let mut events = manager.subscribe();
    manager.connect(&address).await?;
    info!("Connected to {address}");

    match command.as_str() {
        "watch" => watch(&manager, &mut events).await?,
        "mute" => manager.set_mute(true).await?,
        "unmute" => manager.set_mute(false).await?,
        "gain" => {
            let Some(value) = args.next() else {
                bail!(USAGE);
            };
            let gain: i8 = value.parse()?;
            manager.set_gain(gain).await?;
        }
        other => bail!("unknown command {other:?}\n{USAGE}"),
    }

    manager.disconnect().await?;
    Ok(())
}

/// Prints every state event as one JSON line until interrupted.
async fn watch(
    manager: &MicControlManager,
    events: &mut tokio::sync::broadcast::Receiver<StateEvent>,
) -> Result<()> {
    info!("Watching {:?}; press Ctrl-C to stop", manager.session_state().await?);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            event = events.recv() => match event {
                Ok(event) => println!("{}", serde_json::to_string(&event)?),
                Err(RecvError::Lagged(missed)) => {
                    log::warn!("Skipped {missed} events");
                }
                Err(RecvError::Closed) => return Ok(()),
            },
        }
    }
}
