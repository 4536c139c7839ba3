//! Boundary to the platform HID transport.
//!
//! The engine never talks to a Bluetooth stack directly. Everything it needs
//! from the platform is captured by [`HidTransport`]:
//!
//! - register/unregister the HID service record (descriptor + QoS),
//! - connect/disconnect/enumerate remote HID hosts,
//! - push input reports and answer host-initiated report requests.
//!
//! Asynchronous transport callbacks are delivered as [`TransportEvent`]
//! values over a channel the engine subscribes with, mirroring the
//! channel-based composition used everywhere else in this crate. The one
//! exception is GET_REPORT/SET_REPORT: those must be answered within the
//! delivering call, so they arrive synchronously through
//! [`ReportRequestHandler`].

pub mod loopback;

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::{QosConfig, SdpConfig};

/// Opaque handle for a paired remote device.
///
/// The engine only ever compares these for equality and asks the transport
/// whether the device can act as a HID host.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(address: &str) -> Self {
        Self(address.to_string())
    }
}

/// Per-device connection state as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// HID report type in GET_REPORT/SET_REPORT requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportType {
    Input,
    Output,
    Feature,
}

/// Handshake result codes sent back to the host in reply to a report
/// request, including the success acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeCode {
    Success,
    NotReady,
    InvalidReportId,
    UnsupportedRequest,
    InvalidParameter,
    Unknown,
}

impl HandshakeCode {
    /// Code as transmitted in the HANDSHAKE message.
    pub fn wire_code(self) -> u8 {
        match self {
            HandshakeCode::Success => 0,
            HandshakeCode::NotReady => 1,
            HandshakeCode::InvalidReportId => 2,
            HandshakeCode::UnsupportedRequest => 3,
            HandshakeCode::InvalidParameter => 4,
            HandshakeCode::Unknown => 14,
        }
    }
}

/// Asynchronous transport callbacks, delivered on the subscription channel.
///
/// These may originate on any transport thread; the engine serializes them
/// before touching connection state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The profile proxy came up (`available == true`) or went away.
    ServiceAvailability { available: bool },
    /// A remote device changed connection state.
    DeviceState {
        device: DeviceId,
        state: ConnectionState,
    },
    /// The HID service registration itself was added or torn down,
    /// possibly by the platform rather than by us.
    AppRegistration { registered: bool },
    /// Raw battery reading from the platform: `level` out of `scale` units.
    BatteryBroadcast { level: i32, scale: i32 },
}

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("HID service is not available")]
    ServiceUnavailable,

    #[error("device {0} is not a HID host")]
    NotAHidHost(DeviceId),

    #[error("service registration failed: {0}")]
    RegistrationFailed(String),

    #[error("report rejected by transport: {0}")]
    SendRejected(String),
}

/// Synchronous host-initiated report requests.
///
/// Implementations must reply (or report an error) to the transport before
/// returning; the transport does not support deferred responses.
pub trait ReportRequestHandler: Send + Sync {
    /// Host pulled the current value of a report with GET_REPORT.
    fn on_get_report(
        &self,
        device: &DeviceId,
        report_type: ReportType,
        report_id: u8,
        buffer_size: usize,
    );

    /// Host pushed report data with SET_REPORT.
    fn on_set_report(&self, device: &DeviceId, report_type: ReportType, report_id: u8, data: &[u8]);
}

/// Capability surface of the platform HID transport.
///
/// All mutating calls are fire-and-forget from the engine's point of view:
/// their outcomes surface later as [`TransportEvent`]s.
pub trait HidTransport: Send + Sync {
    /// Start delivering [`TransportEvent`]s on `events`. A transport carries
    /// at most one subscription; subscribing again replaces it.
    fn subscribe_events(&self, events: mpsc::UnboundedSender<TransportEvent>);

    /// Stop delivering events.
    fn unsubscribe_events(&self);

    /// Register the HID service record and the synchronous report-request
    /// handler. Valid once the service is available.
    fn register_app(
        &self,
        sdp: &SdpConfig,
        qos: &QosConfig,
        handler: Arc<dyn ReportRequestHandler>,
    ) -> Result<(), TransportError>;

    /// Tear down the HID service record.
    fn unregister_app(&self) -> Result<(), TransportError>;

    fn connect(&self, device: &DeviceId) -> Result<(), TransportError>;

    fn disconnect(&self, device: &DeviceId) -> Result<(), TransportError>;

    /// All devices currently in [`ConnectionState::Connected`].
    fn connected_devices(&self) -> Vec<DeviceId>;

    /// All devices in any of the given states.
    fn devices_matching(&self, states: &[ConnectionState]) -> Vec<DeviceId>;

    /// Push an input report to a connected host.
    fn send_report(
        &self,
        device: &DeviceId,
        report_id: u8,
        data: &[u8],
    ) -> Result<(), TransportError>;

    /// Answer a GET_REPORT request with report data.
    fn reply_report(
        &self,
        device: &DeviceId,
        report_type: ReportType,
        report_id: u8,
        data: &[u8],
    ) -> Result<(), TransportError>;

    /// Answer a report request with a handshake code.
    fn report_error(&self, device: &DeviceId, code: HandshakeCode) -> Result<(), TransportError>;

    /// Whether the device can take the HID host role. A device that itself
    /// reports as a HID peripheral is not a host.
    fn is_hid_host(&self, device: &DeviceId) -> bool;
}
