//! HID service registration and report routing.
//!
//! [`HidDeviceApp`] owns the two report codecs and the routing gate: it
//! always re-encodes into the cached buffers (so a late GET_REPORT can be
//! answered from memory) and pushes to the transport only while a host is
//! routed. It also implements the synchronous [`ReportRequestHandler`]
//! surface invoked by the transport on host-initiated report requests.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::{debug, error, warn};

use super::error::SessionError;
use crate::config::{QosConfig, SdpConfig};
use crate::report::{BatteryReport, GamepadReport, GamepadState, REPORT_ID_BATTERY, REPORT_ID_GAMEPAD};
use crate::transport::{DeviceId, HandshakeCode, HidTransport, ReportRequestHandler, ReportType};

struct AppState {
    gamepad: GamepadReport,
    battery: BatteryReport,
    /// Host that input reports are currently routed to. `None` means
    /// encode-and-cache only.
    device: Option<DeviceId>,
    registered: bool,
}

/// The HID device application: service record, report caches, send gate.
pub struct HidDeviceApp {
    transport: Arc<dyn HidTransport>,
    /// Back-reference to the owning [`Arc`], handed to the transport as the
    /// report request handler on registration.
    weak: Weak<Self>,
    state: Mutex<AppState>,
}

impl HidDeviceApp {
    pub fn new(transport: Arc<dyn HidTransport>) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            transport,
            weak: weak.clone(),
            state: Mutex::new(AppState {
                gamepad: GamepadReport::new(),
                battery: BatteryReport::new(),
                device: None,
                registered: false,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, AppState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register the HID service record with the transport. The transport
    /// confirms asynchronously through an app-registration event.
    pub fn register_app(&self, sdp: &SdpConfig, qos: &QosConfig) -> Result<(), SessionError> {
        let handler: Arc<dyn ReportRequestHandler> = match self.weak.upgrade() {
            Some(app) => app,
            None => return Err(SessionError::NotRegistered),
        };
        self.transport.register_app(sdp, qos, handler)?;
        Ok(())
    }

    /// Tear down the HID service record if one is registered.
    pub fn unregister_app(&self) -> Result<(), SessionError> {
        let registered = self.lock().registered;
        if registered {
            self.transport.unregister_app()?;
        }
        Ok(())
    }

    /// Record the registration state reported by the transport.
    pub fn set_registered(&self, registered: bool) {
        self.lock().registered = registered;
    }

    /// Route input reports to `device`, or stop sending with `None`.
    pub fn set_device(&self, device: Option<DeviceId>) {
        self.lock().device = device;
    }

    /// Currently routed host, if any.
    pub fn device(&self) -> Option<DeviceId> {
        self.lock().device.clone()
    }

    /// Encode the gamepad state into the cache and push it to the routed
    /// host. With no host routed this only refreshes the cache.
    pub fn send_gamepad(&self, state: &GamepadState) {
        let mut app = self.lock();
        app.gamepad.encode(state);
        let Some(device) = app.device.clone() else {
            debug!("no host routed, gamepad report cached only");
            return;
        };
        let mut report = [0u8; 8];
        report.copy_from_slice(app.gamepad.current());
        drop(app);
        if let Err(e) = self
            .transport
            .send_report(&device, REPORT_ID_GAMEPAD, &report)
        {
            warn!(%device, "failed to send gamepad report: {e}");
        }
    }

    /// Encode the battery level into the cache and push it to the routed
    /// host. Same gating as [`send_gamepad`](Self::send_gamepad).
    pub fn send_battery_level(&self, level: f32) {
        let mut app = self.lock();
        app.battery.encode(level);
        let Some(device) = app.device.clone() else {
            debug!("no host routed, battery report cached only");
            return;
        };
        let report = [app.battery.current()[0]];
        drop(app);
        if let Err(e) = self
            .transport
            .send_report(&device, REPORT_ID_BATTERY, &report)
        {
            warn!(%device, "failed to send battery report: {e}");
        }
    }
}

impl ReportRequestHandler for HidDeviceApp {
    fn on_get_report(
        &self,
        device: &DeviceId,
        report_type: ReportType,
        report_id: u8,
        _buffer_size: usize,
    ) {
        if report_type != ReportType::Input {
            self.reply_handshake(device, HandshakeCode::UnsupportedRequest);
            return;
        }
        let app = self.lock();
        let reply = match report_id {
            REPORT_ID_GAMEPAD => app.gamepad.current().to_vec(),
            REPORT_ID_BATTERY => app.battery.current().to_vec(),
            _ => {
                drop(app);
                error!(%device, report_id, "invalid report id requested");
                self.reply_handshake(device, HandshakeCode::InvalidReportId);
                return;
            }
        };
        drop(app);
        if let Err(e) = self
            .transport
            .reply_report(device, report_type, report_id, &reply)
        {
            warn!(%device, report_id, "failed to reply to GET_REPORT: {e}");
        }
    }

    fn on_set_report(
        &self,
        device: &DeviceId,
        _report_type: ReportType,
        report_id: u8,
        _data: &[u8],
    ) {
        // This device takes no input from the host; acknowledge and
        // discard for protocol compliance.
        debug!(%device, report_id, "SET_REPORT acknowledged and discarded");
        self.reply_handshake(device, HandshakeCode::Success);
    }
}

impl HidDeviceApp {
    fn reply_handshake(&self, device: &DeviceId, code: HandshakeCode) {
        if let Err(e) = self.transport.report_error(device, code) {
            warn!(%device, ?code, "failed to send handshake: {e}");
        }
    }
}
