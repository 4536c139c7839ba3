//! In-process transport simulation.
//!
//! Stands in for a real Bluetooth stack so the binary can run end to end on
//! a development machine: one virtual HID host that accepts connections
//! after a short delay, broadcasts a battery reading and pulls the gamepad
//! report once, exercising every callback path of the engine.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{
    ConnectionState, DeviceId, HandshakeCode, HidTransport, ReportRequestHandler, ReportType,
    TransportError, TransportEvent,
};
use crate::config::{QosConfig, SdpConfig};
use crate::report::REPORT_ID_GAMEPAD;

const CONNECT_DELAY: Duration = Duration::from_millis(150);

#[derive(Default)]
struct LoopbackState {
    events: Option<mpsc::UnboundedSender<TransportEvent>>,
    handler: Option<Arc<dyn ReportRequestHandler>>,
    registered: bool,
    devices: HashMap<DeviceId, ConnectionState>,
}

impl LoopbackState {
    fn emit(&self, event: TransportEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

/// Simulated [`HidTransport`] with a single virtual host.
pub struct LoopbackTransport {
    host: DeviceId,
    state: Arc<Mutex<LoopbackState>>,
}

impl LoopbackTransport {
    pub fn new(host_address: impl Into<String>) -> Self {
        Self {
            host: DeviceId::new(host_address),
            state: Arc::new(Mutex::new(LoopbackState::default())),
        }
    }

    /// Address of the simulated host.
    pub fn host(&self) -> DeviceId {
        self.host.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LoopbackState> {
        // Nothing in here can poison the state meaningfully.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl HidTransport for LoopbackTransport {
    fn subscribe_events(&self, events: mpsc::UnboundedSender<TransportEvent>) {
        let mut state = self.lock();
        state.events = Some(events);
        // The profile proxy of the simulated stack is always ready.
        state.emit(TransportEvent::ServiceAvailability { available: true });
    }

    fn unsubscribe_events(&self) {
        self.lock().events = None;
    }

    fn register_app(
        &self,
        sdp: &SdpConfig,
        qos: &QosConfig,
        handler: Arc<dyn ReportRequestHandler>,
    ) -> Result<(), TransportError> {
        let mut state = self.lock();
        if state.events.is_none() {
            return Err(TransportError::ServiceUnavailable);
        }
        info!(
            service = %sdp.service_name,
            token_rate = qos.token_rate,
            latency_us = qos.latency,
            "registering HID service on loopback transport"
        );
        state.handler = Some(handler);
        state.registered = true;
        state.emit(TransportEvent::AppRegistration { registered: true });
        Ok(())
    }

    fn unregister_app(&self) -> Result<(), TransportError> {
        let mut state = self.lock();
        state.handler = None;
        if state.registered {
            state.registered = false;
            state.emit(TransportEvent::AppRegistration { registered: false });
        }
        Ok(())
    }

    fn connect(&self, device: &DeviceId) -> Result<(), TransportError> {
        if *device != self.host {
            return Err(TransportError::NotAHidHost(device.clone()));
        }
        let mut state = self.lock();
        state.devices.insert(device.clone(), ConnectionState::Connecting);
        state.emit(TransportEvent::DeviceState {
            device: device.clone(),
            state: ConnectionState::Connecting,
        });
        drop(state);

        let shared = Arc::clone(&self.state);
        let device = device.clone();
        tokio::spawn(async move {
            tokio::time::sleep(CONNECT_DELAY).await;
            let mut state = shared.lock().unwrap_or_else(|e| e.into_inner());
            if state.devices.get(&device) != Some(&ConnectionState::Connecting) {
                return; // superseded by a disconnect in the meantime
            }
            state.devices.insert(device.clone(), ConnectionState::Connected);
            state.emit(TransportEvent::DeviceState {
                device: device.clone(),
                state: ConnectionState::Connected,
            });
            state.emit(TransportEvent::BatteryBroadcast {
                level: 82,
                scale: 100,
            });
            // A freshly connected host typically pulls the current state.
            let handler = state.handler.clone();
            drop(state);
            if let Some(handler) = handler {
                handler.on_get_report(&device, ReportType::Input, REPORT_ID_GAMEPAD, 8);
            }
        });
        Ok(())
    }

    fn disconnect(&self, device: &DeviceId) -> Result<(), TransportError> {
        let mut state = self.lock();
        if state.devices.contains_key(device) {
            state.devices.insert(device.clone(), ConnectionState::Disconnected);
            state.emit(TransportEvent::DeviceState {
                device: device.clone(),
                state: ConnectionState::Disconnected,
            });
        }
        Ok(())
    }

    fn connected_devices(&self) -> Vec<DeviceId> {
        self.devices_matching(&[ConnectionState::Connected])
    }

    fn devices_matching(&self, states: &[ConnectionState]) -> Vec<DeviceId> {
        self.lock()
            .devices
            .iter()
            .filter(|(_, state)| states.contains(state))
            .map(|(device, _)| device.clone())
            .collect()
    }

    fn send_report(
        &self,
        device: &DeviceId,
        report_id: u8,
        data: &[u8],
    ) -> Result<(), TransportError> {
        let state = self.lock();
        if !state.registered {
            return Err(TransportError::ServiceUnavailable);
        }
        if state.devices.get(device) != Some(&ConnectionState::Connected) {
            return Err(TransportError::SendRejected(format!(
                "{device} is not connected"
            )));
        }
        debug!(%device, report_id, ?data, "input report");
        Ok(())
    }

    fn reply_report(
        &self,
        device: &DeviceId,
        report_type: ReportType,
        report_id: u8,
        data: &[u8],
    ) -> Result<(), TransportError> {
        if !self.lock().registered {
            return Err(TransportError::ServiceUnavailable);
        }
        debug!(%device, ?report_type, report_id, ?data, "report reply");
        Ok(())
    }

    fn report_error(&self, device: &DeviceId, code: HandshakeCode) -> Result<(), TransportError> {
        if !self.lock().registered {
            return Err(TransportError::ServiceUnavailable);
        }
        if code != HandshakeCode::Success {
            warn!(%device, ?code, "handshake error sent to host");
        }
        Ok(())
    }

    fn is_hid_host(&self, device: &DeviceId) -> bool {
        *device == self.host
    }
}
