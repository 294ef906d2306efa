//! bluest-backed implementation of the transport capability.
//!
//! Every trait method initiates the radio work on a spawned task and
//! returns immediately; the outcome arrives later as a
//! [`TransportEvent`]. Connecting can take many seconds (scan plus
//! retries), so none of it may run inline on the session's loop.
//! Exactly one GATT call is started per `issue` invocation; sequencing
//! is the operation queue's job, not ours.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bluest::{Adapter, Characteristic, Device};
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use regex::Regex;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::config::ProfileConfig;
use crate::core::bluetooth::constants::{UUID_AICS_SERVICE, UUID_MICP_SERVICE};
use crate::core::bluetooth::operation::GattOperation;
use crate::core::bluetooth::transport::{Transport, TransportEvent};
use crate::core::bluetooth::types::{CharacteristicId, CharacteristicInfo, CharacteristicProps};
use crate::error::TransportError;

/// How often the link watcher polls the connection state.
const LINK_WATCH_INTERVAL_MS: u64 = 500;

struct Inner {
    device: Option<Device>,
    characteristics: HashMap<CharacteristicId, Characteristic>,
    /// Cancels the link watcher and all notification pumps of the
    /// current connection.
    teardown: CancellationToken,
}

/// State shared with the tasks spawned for connect, discovery and
/// teardown.
struct Shared {
    adapter: Adapter,
    events: mpsc::Sender<TransportEvent>,
    config: ProfileConfig,
    inner: Mutex<Inner>,
}

pub struct BluestTransport {
    shared: Arc<Shared>,
}

impl BluestTransport {
    pub async fn new(
        events: mpsc::Sender<TransportEvent>,
        config: ProfileConfig,
    ) -> Result<Self, TransportError> {
        let adapter = Adapter::default()
            .await
            .ok_or(TransportError::AdapterUnavailable)?;
        adapter.wait_available().await?;
        info!("Bluetooth adapter is available.");
        Ok(Self {
            shared: Arc::new(Shared {
                adapter,
                events,
                config,
                inner: Mutex::new(Inner {
                    device: None,
                    characteristics: HashMap::new(),
                    teardown: CancellationToken::new(),
                }),
            }),
        })
    }
}

impl Shared {
    async fn connect_inner(&self, address: &str) -> Result<(), TransportError> {
        let device = self.resolve_device(address).await?;
        info!(
            "Device details - ID: {}, Name: {:?}",
            device.id(),
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        let mut attempt = 0;
        while !device.is_connected().await {
            match self.adapter.connect_device(&device).await {
                Ok(()) => break,
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.config.connect_max_retries {
                        return Err(e.into());
                    }
                    warn!("Connection attempt {attempt} failed: {e}");
                    tokio::time::sleep(Duration::from_millis(self.config.connect_retry_delay_ms))
                        .await;
                }
            }
        }
        info!("Connection successful");

        let teardown = CancellationToken::new();
        {
            let mut inner = self.inner.lock().await;
            inner.teardown.cancel();
            inner.teardown = teardown.clone();
            inner.characteristics.clear();
            inner.device = Some(device.clone());
        }
        self.spawn_link_watch(device, teardown);
        Ok(())
    }

    /// Resolve a peripheral by address: already-connected devices
    /// first, then a filtered scan bounded by the configured timeout.
    async fn resolve_device(&self, address: &str) -> Result<Device, TransportError> {
        for device in self.adapter.connected_devices().await? {
            if Self::matches_address(&device, address) {
                info!("Peripheral {address} is already connected");
                return Ok(device);
            }
        }

        info!("Scanning for peripheral {address}");
        let mut scan = self.adapter.scan(&[]).await?;
        let deadline = tokio::time::sleep(Duration::from_secs(self.config.scan_timeout_secs));
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                discovered = scan.next() => {
                    match discovered {
                        Some(discovered) => {
                            debug!("Found device: {:?}", discovered.device);
                            if Self::matches_address(&discovered.device, address) {
                                return Ok(discovered.device);
                            }
                        }
                        None => return Err(TransportError::DeviceNotFound(address.to_string())),
                    }
                }
                _ = &mut deadline => {
                    return Err(TransportError::Timeout("device scan"));
                }
            }
        }
    }

    fn matches_address(device: &Device, wanted: &str) -> bool {
        let id = device.id().to_string();
        match (Self::extract_mac_address(&id), Self::extract_mac_address(wanted)) {
            (Some(device_mac), Some(wanted_mac)) => device_mac == wanted_mac,
            // macOS hides the MAC behind an opaque identifier
            _ => id.eq_ignore_ascii_case(wanted),
        }
    }

    /// Pull a MAC address out of a platform device id and normalize it
    /// to colon-separated uppercase. BlueZ renders the MAC with
    /// underscores (`/org/bluez/hci0/dev_12_34_56_AB_CD_EF`), other
    /// backends and user input use colons or hyphens.
    fn extract_mac_address(device_id: &str) -> Option<String> {
        let re = Regex::new(r"([0-9A-Fa-f]{2}[:_-]){5}([0-9A-Fa-f]{2})").unwrap();
        re.find_iter(device_id)
            .last()
            .map(|m| m.as_str().to_uppercase().replace(['-', '_'], ":"))
    }

    /// Watch the link and report an unsolicited disconnect. Polling is
    /// the portable option; not every backend exposes connection
    /// events.
    fn spawn_link_watch(&self, device: Device, teardown: CancellationToken) {
        let events = self.events.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = teardown.cancelled() => return,
                    _ = tokio::time::sleep(Duration::from_millis(LINK_WATCH_INTERVAL_MS)) => {
                        if !device.is_connected().await {
                            warn!("Peripheral {} lost connection", device.id());
                            let _ = events.send(TransportEvent::Disconnected).await;
                            return;
                        }
                    }
                }
            }
        });
    }

    async fn disconnect_inner(&self) {
        let device = {
            let mut inner = self.inner.lock().await;
            inner.teardown.cancel();
            inner.characteristics.clear();
            inner.device.take()
        };
        if let Some(device) = device {
            if device.is_connected().await {
                info!("Disconnecting from device {}", device.id());
                if let Err(e) = self.adapter.disconnect_device(&device).await {
                    warn!("Disconnect request failed: {e}");
                }
            }
        }
        let _ = self.events.send(TransportEvent::Disconnected).await;
    }

    async fn discover_inner(&self) -> Result<Vec<CharacteristicInfo>, TransportError> {
        let device = {
            let inner = self.inner.lock().await;
            inner.device.clone().ok_or(TransportError::Disconnected)?
        };

        let mut found = Vec::new();
        let mut handles = HashMap::new();
        for service_uuid in [UUID_AICS_SERVICE, UUID_MICP_SERVICE] {
            let services = device.discover_services_with_uuid(service_uuid).await?;
            let Some(service) = services.first() else {
                debug!("Service {service_uuid} not present");
                continue;
            };
            info!("Found service: {}", service.uuid());
            for characteristic in service.characteristics().await? {
                let Some(id) = CharacteristicId::from_uuid(characteristic.uuid()) else {
                    debug!("Skipping unknown characteristic {}", characteristic.uuid());
                    continue;
                };
                let props = characteristic.properties().await?;
                found.push(CharacteristicInfo {
                    id,
                    props: CharacteristicProps {
                        read: props.read,
                        write: props.write,
                        write_without_response: props.write_without_response,
                        notify: props.notify,
                        indicate: props.indicate,
                    },
                });
                handles.insert(id, characteristic);
            }
        }

        let mut inner = self.inner.lock().await;
        inner.characteristics = handles;
        info!("Discovered {} known characteristics", found.len());
        Ok(found)
    }

    async fn characteristic_handle(
        &self,
        id: CharacteristicId,
    ) -> Result<Characteristic, TransportError> {
        let inner = self.inner.lock().await;
        inner
            .characteristics
            .get(&id)
            .cloned()
            .ok_or_else(|| TransportError::Operation(format!("{id:?} was not discovered")))
    }

    /// Open the notification stream and pump pushes into the event
    /// channel until the subscription is torn down. bluest writes the
    /// CCCD itself when the stream is opened; `use_indication` is a
    /// hint the backend resolves from the characteristic's properties.
    fn spawn_notification_pump(
        &self,
        id: CharacteristicId,
        characteristic: Characteristic,
        teardown: CancellationToken,
    ) {
        let events = self.events.clone();
        tokio::spawn(async move {
            let stream = match characteristic.notify().await {
                Ok(stream) => {
                    let _ = events
                        .send(TransportEvent::OperationComplete {
                            characteristic: id,
                            result: Ok(None),
                        })
                        .await;
                    stream
                }
                Err(e) => {
                    let _ = events
                        .send(TransportEvent::OperationComplete {
                            characteristic: id,
                            result: Err(e.into()),
                        })
                        .await;
                    return;
                }
            };
            tokio::pin!(stream);
            loop {
                tokio::select! {
                    _ = teardown.cancelled() => break,
                    next = stream.next() => match next {
                        Some(Ok(value)) => {
                            let _ = events
                                .send(TransportEvent::Notification {
                                    characteristic: id,
                                    value,
                                })
                                .await;
                        }
                        Some(Err(e)) => {
                            error!("Error in notification stream for {id:?}: {e}");
                            break;
                        }
                        None => break,
                    },
                }
            }
            debug!("Notification stream for {id:?} ended");
        });
    }

    async fn issue_inner(&self, op: &GattOperation) -> Result<(), TransportError> {
        let id = op.characteristic();
        let characteristic = self.characteristic_handle(id).await?;
        let events = self.events.clone();
        match op {
            GattOperation::Read(_) => {
                tokio::spawn(async move {
                    let result = characteristic.read().await.map(Some).map_err(Into::into);
                    let _ = events
                        .send(TransportEvent::OperationComplete {
                            characteristic: id,
                            result,
                        })
                        .await;
                });
            }
            GattOperation::WriteCharacteristic {
                payload,
                ack_required,
                ..
            } => {
                let payload = payload.clone();
                let ack_required = *ack_required;
                tokio::spawn(async move {
                    let write = if ack_required {
                        characteristic.write(&payload).await
                    } else {
                        characteristic.write_without_response(&payload).await
                    };
                    let _ = events
                        .send(TransportEvent::OperationComplete {
                            characteristic: id,
                            result: write.map(|_| None).map_err(Into::into),
                        })
                        .await;
                });
            }
            GattOperation::WriteDescriptor {
                descriptor,
                payload,
                ..
            } => {
                let descriptor = *descriptor;
                let payload = payload.clone();
                tokio::spawn(async move {
                    let result = async {
                        let descriptors = characteristic.descriptors().await?;
                        let target = descriptors
                            .iter()
                            .find(|d| d.uuid() == descriptor)
                            .ok_or_else(|| {
                                TransportError::Operation(format!(
                                    "descriptor {descriptor} not found on {id:?}"
                                ))
                            })?;
                        target.write(&payload).await?;
                        Ok(None)
                    }
                    .await;
                    let _ = events
                        .send(TransportEvent::OperationComplete {
                            characteristic: id,
                            result,
                        })
                        .await;
                });
            }
            GattOperation::SubscribeNotify { use_indication, .. } => {
                if *use_indication {
                    debug!("{id:?} subscribes via indication");
                }
                let teardown = self.inner.lock().await.teardown.child_token();
                self.spawn_notification_pump(id, characteristic, teardown);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for BluestTransport {
    async fn connect(&self, address: &str) {
        let shared = self.shared.clone();
        let address = address.to_string();
        tokio::spawn(async move {
            let event = match shared.connect_inner(&address).await {
                Ok(()) => TransportEvent::Connected,
                Err(e) => TransportEvent::ConnectFailed(e),
            };
            let _ = shared.events.send(event).await;
        });
    }

    async fn disconnect(&self) {
        let shared = self.shared.clone();
        tokio::spawn(async move {
            shared.disconnect_inner().await;
        });
    }

    async fn discover_services(&self) {
        let shared = self.shared.clone();
        tokio::spawn(async move {
            let event = match shared.discover_inner().await {
                Ok(found) => TransportEvent::ServicesDiscovered(found),
                Err(e) => TransportEvent::DiscoveryFailed(e),
            };
            let _ = shared.events.send(event).await;
        });
    }

    async fn issue(&self, op: &GattOperation) -> Result<(), TransportError> {
        self.shared.issue_inner(op).await
    }
}
