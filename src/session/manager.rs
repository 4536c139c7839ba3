//! Connection arbitration and profile event fan-out.
//!
//! [`HidConnectionManager`] is the single point that decides which remote
//! host holds the one allowed HID connection. Local connect requests and
//! asynchronous transport callbacks both funnel into one lock domain, so
//! the arbitration state is never observed half-written. It also carries
//! the ref-counted listener registry: any number of local observers share
//! one underlying transport subscription, torn down only when the last
//! observer leaves.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::device_app::HidDeviceApp;
use crate::config::{QosConfig, SdpConfig};
use crate::report::GamepadState;
use crate::transport::{ConnectionState, DeviceId, HidTransport, TransportEvent};

/// Handle identifying one registered observer.
pub type ListenerId = u64;

/// Lifecycle events fanned out to registered observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileEvent {
    /// The transport's profile proxy came up or went away.
    ServiceStateChanged { available: bool },
    /// A remote device changed connection state.
    DeviceStateChanged {
        device: DeviceId,
        state: ConnectionState,
    },
    /// The HID service registration was added or torn down, possibly by
    /// the platform. Observers typically close any active input UI when
    /// `registered` turns false.
    AppStatusChanged { registered: bool },
}

/// Which host the local user wants to be connected to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
enum ConnectTarget {
    /// Disconnect everything and stay idle.
    #[default]
    NoTarget,
    Target(DeviceId),
}

impl ConnectTarget {
    fn device(&self) -> Option<&DeviceId> {
        match self {
            ConnectTarget::NoTarget => None,
            ConnectTarget::Target(device) => Some(device),
        }
    }

    fn matches(&self, device: &DeviceId) -> bool {
        self.device() == Some(device)
    }
}

/// Which host currently holds the single active connection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
enum ActiveLink {
    #[default]
    NotConnected,
    ConnectedTo(DeviceId),
}

impl ActiveLink {
    fn device(&self) -> Option<&DeviceId> {
        match self {
            ActiveLink::NotConnected => None,
            ActiveLink::ConnectedTo(device) => Some(device),
        }
    }

    fn matches(&self, device: &DeviceId) -> bool {
        self.device() == Some(device)
    }
}

struct ManagerState {
    listeners: HashMap<ListenerId, mpsc::UnboundedSender<ProfileEvent>>,
    next_listener_id: ListenerId,
    target: ConnectTarget,
    link: ActiveLink,
    service_available: bool,
    pump: Option<JoinHandle<()>>,
}

impl ManagerState {
    fn fan_out(&mut self, event: ProfileEvent) {
        self.listeners.retain(|id, listener| {
            if listener.send(event.clone()).is_ok() {
                true
            } else {
                debug!(listener = id, "dropping closed profile listener");
                false
            }
        });
    }
}

/// Arbiter for the single active HID connection.
///
/// Construct one per process at the composition root and hand out the `Arc`
/// to whatever needs to send reports or observe the connection.
pub struct HidConnectionManager {
    transport: Arc<dyn HidTransport>,
    device_app: Arc<HidDeviceApp>,
    sdp: SdpConfig,
    qos: QosConfig,
    /// Back-reference to the owning [`Arc`], held by the event pump so the
    /// pump never keeps the manager alive on its own.
    weak: Weak<Self>,
    state: Mutex<ManagerState>,
}

impl HidConnectionManager {
    pub fn new(
        transport: Arc<dyn HidTransport>,
        device_app: Arc<HidDeviceApp>,
        sdp: SdpConfig,
        qos: QosConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            transport,
            device_app,
            sdp,
            qos,
            weak: weak.clone(),
            state: Mutex::new(ManagerState {
                listeners: HashMap::new(),
                next_listener_id: 0,
                target: ConnectTarget::NoTarget,
                link: ActiveLink::NotConnected,
                service_available: false,
                pump: None,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register an observer for profile events.
    ///
    /// The first registration subscribes to the transport and starts the
    /// event pump; later ones only join the fan-out. Returns the id to
    /// unregister with.
    pub fn register(&self, listener: mpsc::UnboundedSender<ProfileEvent>) -> ListenerId {
        let mut state = self.lock();
        let id = state.next_listener_id;
        state.next_listener_id += 1;
        state.listeners.insert(id, listener);

        if state.listeners.len() == 1 {
            info!("first profile listener, subscribing to transport events");
            let (events_tx, events_rx) = mpsc::unbounded_channel();
            self.transport.subscribe_events(events_tx);
            state.pump = Some(tokio::spawn(Self::pump_events(self.weak.clone(), events_rx)));
        }
        id
    }

    /// Remove an observer. Unknown or stale ids are ignored. When the last
    /// observer leaves, the whole session is torn down: every connected
    /// host is disconnected and the service registration is removed.
    pub fn unregister(&self, id: ListenerId) {
        let mut state = self.lock();
        if state.listeners.remove(&id).is_none() {
            return;
        }
        if !state.listeners.is_empty() {
            return;
        }

        info!("last profile listener left, tearing down HID session");
        for device in self.transport.connected_devices() {
            if let Err(e) = self.transport.disconnect(&device) {
                warn!(%device, "disconnect during teardown failed: {e}");
            }
        }
        self.device_app.set_device(None);
        if let Err(e) = self.device_app.unregister_app() {
            warn!("unregistering HID service failed: {e}");
        }
        self.transport.unsubscribe_events();
        if let Some(pump) = state.pump.take() {
            pump.abort();
        }
        state.target = ConnectTarget::NoTarget;
        state.link = ActiveLink::NotConnected;
        state.service_available = false;
    }

    /// Ask to connect to `device`, preempting whatever is connected now.
    /// `None` means "tear down any existing connection".
    pub fn request_connect(&self, device: Option<DeviceId>) {
        let mut state = self.lock();
        state.target = match device.clone() {
            Some(device) => ConnectTarget::Target(device),
            None => ConnectTarget::NoTarget,
        };
        // Forget the incumbent on purpose: reconciliation then evicts it
        // unless it is the requested device itself.
        state.link = ActiveLink::NotConnected;

        self.reconcile(&mut state);

        // If the requested host was already connected, observers still get
        // told, so a UI can settle immediately.
        if let Some(device) = device {
            if state.link.matches(&device) {
                state.fan_out(ProfileEvent::DeviceStateChanged {
                    device,
                    state: ConnectionState::Connected,
                });
            }
        }
    }

    /// Encode and, when a host is connected, send the gamepad state.
    pub fn send_gamepad(&self, state: &GamepadState) {
        self.device_app.send_gamepad(state);
    }

    /// Encode and, when a host is connected, send the battery level.
    pub fn send_battery_level(&self, level: f32) {
        self.device_app.send_battery_level(level);
    }

    /// Host we currently believe holds the active connection.
    pub fn connected_device(&self) -> Option<DeviceId> {
        self.lock().link.device().cloned()
    }

    /// Host the local user most recently asked for, while the handover is
    /// still in flight.
    pub fn requested_device(&self) -> Option<DeviceId> {
        self.lock().target.device().cloned()
    }

    /// All hosts the transport reports as connected.
    pub fn connected_devices(&self) -> Vec<DeviceId> {
        self.transport.connected_devices()
    }

    /// Whether `device` can act as a HID host at all.
    pub fn is_hid_host(&self, device: &DeviceId) -> bool {
        self.transport.is_hid_host(device)
    }

    async fn pump_events(
        manager: Weak<Self>,
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        while let Some(event) = events.recv().await {
            let Some(manager) = manager.upgrade() else {
                return;
            };
            debug!(?event, "transport event");
            match event {
                TransportEvent::ServiceAvailability { available } => {
                    manager.on_service_state_changed(available);
                }
                TransportEvent::DeviceState { device, state } => {
                    manager.on_device_state_changed(device, state);
                }
                TransportEvent::AppRegistration { registered } => {
                    manager.on_app_status_changed(registered);
                }
                TransportEvent::BatteryBroadcast { level, scale } => {
                    manager.on_battery_broadcast(level, scale);
                }
            }
        }
    }

    fn on_service_state_changed(&self, available: bool) {
        let mut state = self.lock();
        state.service_available = available;
        if available {
            if let Err(e) = self.device_app.register_app(&self.sdp, &self.qos) {
                warn!("HID service registration failed: {e}");
            }
        }
        self.reconcile(&mut state);
        state.fan_out(ProfileEvent::ServiceStateChanged { available });
    }

    fn on_device_state_changed(&self, device: DeviceId, new_state: ConnectionState) {
        let mut state = self.lock();
        if new_state == ConnectionState::Connected && !state.target.matches(&device) {
            // A connection we did not ask for is an unsolicited inbound
            // host. Adopt it instead of fighting it.
            debug!(%device, "adopting unsolicited inbound connection");
            state.target = ConnectTarget::Target(device.clone());
        }
        self.reconcile(&mut state);
        state.fan_out(ProfileEvent::DeviceStateChanged {
            device,
            state: new_state,
        });
    }

    fn on_app_status_changed(&self, registered: bool) {
        self.device_app.set_registered(registered);
        let mut state = self.lock();
        if !registered {
            info!("HID service registration was torn down");
        }
        state.fan_out(ProfileEvent::AppStatusChanged { registered });
    }

    fn on_battery_broadcast(&self, level: i32, scale: i32) {
        if level >= 0 && scale > 0 {
            self.device_app.send_battery_level(level as f32 / scale as f32);
        } else {
            error!(level, scale, "bad battery broadcast data, dropping");
        }
    }

    /// Recompute the single allowed connection from transport state and
    /// local intent. Runs whenever either of them may have changed.
    fn reconcile(&self, state: &mut ManagerState) {
        // Keep the device we want (or already have); evict every other
        // connected device. User intent outranks the incumbent when both
        // are still up.
        let mut kept: Option<DeviceId> = None;
        for device in self.transport.connected_devices() {
            if state.target.matches(&device) || state.link.matches(&device) {
                if kept.is_none() || state.target.matches(&device) {
                    kept = Some(device);
                }
            } else if let Err(e) = self.transport.disconnect(&device) {
                warn!(%device, "failed to evict extra connection: {e}");
            }
        }

        // Nothing in flight and a target pending: start connecting.
        let busy = !self
            .transport
            .devices_matching(&[
                ConnectionState::Connected,
                ConnectionState::Connecting,
                ConnectionState::Disconnecting,
            ])
            .is_empty();
        if !busy {
            if let Some(device) = state.target.device() {
                if let Err(e) = self.transport.connect(device) {
                    warn!(%device, "connect request failed: {e}");
                }
            }
        }

        match (state.link.device().cloned(), kept) {
            (None, Some(device)) => {
                info!(%device, "HID host connected");
                state.link = ActiveLink::ConnectedTo(device);
                state.target = ConnectTarget::NoTarget;
            }
            (Some(device), None) => {
                info!(%device, "HID host disconnected");
                state.link = ActiveLink::NotConnected;
            }
            _ => {}
        }

        // Keep report routing in sync with the arbitration outcome.
        self.device_app.set_device(state.link.device().cloned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{REPORT_ID_BATTERY, REPORT_ID_GAMEPAD};
    use crate::transport::{
        HandshakeCode, ReportRequestHandler, ReportType, TransportError,
    };

    #[derive(Default)]
    struct MockInner {
        device_states: HashMap<DeviceId, ConnectionState>,
        connect_calls: Vec<DeviceId>,
        disconnect_calls: Vec<DeviceId>,
        sent_reports: Vec<(DeviceId, u8, Vec<u8>)>,
        replies: Vec<(DeviceId, ReportType, u8, Vec<u8>)>,
        handshakes: Vec<(DeviceId, HandshakeCode)>,
        register_app_calls: usize,
        unregister_app_calls: usize,
        subscribe_calls: usize,
        unsubscribe_calls: usize,
    }

    /// Records every transport call; connection state only changes when the
    /// test says so.
    #[derive(Default)]
    struct MockTransport {
        inner: Mutex<MockInner>,
    }

    impl MockTransport {
        fn set_state(&self, device: &DeviceId, state: ConnectionState) {
            self.inner
                .lock()
                .unwrap()
                .device_states
                .insert(device.clone(), state);
        }

        fn with<R>(&self, f: impl FnOnce(&mut MockInner) -> R) -> R {
            f(&mut self.inner.lock().unwrap())
        }
    }

    impl HidTransport for MockTransport {
        fn subscribe_events(&self, _events: mpsc::UnboundedSender<TransportEvent>) {
            self.with(|m| m.subscribe_calls += 1);
        }

        fn unsubscribe_events(&self) {
            self.with(|m| m.unsubscribe_calls += 1);
        }

        fn register_app(
            &self,
            _sdp: &SdpConfig,
            _qos: &QosConfig,
            _handler: Arc<dyn ReportRequestHandler>,
        ) -> Result<(), TransportError> {
            self.with(|m| m.register_app_calls += 1);
            Ok(())
        }

        fn unregister_app(&self) -> Result<(), TransportError> {
            self.with(|m| m.unregister_app_calls += 1);
            Ok(())
        }

        fn connect(&self, device: &DeviceId) -> Result<(), TransportError> {
            self.with(|m| m.connect_calls.push(device.clone()));
            Ok(())
        }

        fn disconnect(&self, device: &DeviceId) -> Result<(), TransportError> {
            self.with(|m| m.disconnect_calls.push(device.clone()));
            Ok(())
        }

        fn connected_devices(&self) -> Vec<DeviceId> {
            self.devices_matching(&[ConnectionState::Connected])
        }

        fn devices_matching(&self, states: &[ConnectionState]) -> Vec<DeviceId> {
            let mut devices: Vec<DeviceId> = self.with(|m| {
                m.device_states
                    .iter()
                    .filter(|(_, s)| states.contains(s))
                    .map(|(d, _)| d.clone())
                    .collect()
            });
            devices.sort_by(|a, b| a.as_str().cmp(b.as_str()));
            devices
        }

        fn send_report(
            &self,
            device: &DeviceId,
            report_id: u8,
            data: &[u8],
        ) -> Result<(), TransportError> {
            self.with(|m| m.sent_reports.push((device.clone(), report_id, data.to_vec())));
            Ok(())
        }

        fn reply_report(
            &self,
            device: &DeviceId,
            report_type: ReportType,
            report_id: u8,
            data: &[u8],
        ) -> Result<(), TransportError> {
            self.with(|m| {
                m.replies
                    .push((device.clone(), report_type, report_id, data.to_vec()))
            });
            Ok(())
        }

        fn report_error(
            &self,
            device: &DeviceId,
            code: HandshakeCode,
        ) -> Result<(), TransportError> {
            self.with(|m| m.handshakes.push((device.clone(), code)));
            Ok(())
        }

        fn is_hid_host(&self, _device: &DeviceId) -> bool {
            true
        }
    }

    fn setup() -> (Arc<MockTransport>, Arc<HidDeviceApp>, Arc<HidConnectionManager>) {
        let transport = Arc::new(MockTransport::default());
        let device_app = HidDeviceApp::new(transport.clone());
        let manager = HidConnectionManager::new(
            transport.clone(),
            device_app.clone(),
            SdpConfig::default(),
            QosConfig::default(),
        );
        (transport, device_app, manager)
    }

    fn dev(name: &str) -> DeviceId {
        DeviceId::from(name)
    }

    #[tokio::test]
    async fn stray_second_connection_is_evicted() {
        let (transport, _app, manager) = setup();
        let (a, b) = (dev("host-a"), dev("host-b"));
        transport.set_state(&a, ConnectionState::Connected);
        transport.set_state(&b, ConnectionState::Connected);

        manager.request_connect(Some(a.clone()));

        assert_eq!(transport.with(|m| m.disconnect_calls.clone()), vec![b]);
        assert_eq!(manager.connected_device(), Some(a));
        assert_eq!(manager.requested_device(), None);
    }

    #[tokio::test]
    async fn handover_preempts_the_incumbent() {
        let (transport, _app, manager) = setup();
        let (a, b) = (dev("host-a"), dev("host-b"));
        transport.set_state(&a, ConnectionState::Connected);
        manager.request_connect(Some(a.clone()));
        assert_eq!(manager.connected_device(), Some(a.clone()));

        manager.request_connect(Some(b.clone()));

        // The old host is evicted, and no connect is issued while it is
        // still lingering in the Connected state.
        assert!(transport.with(|m| m.disconnect_calls.contains(&a)));
        assert!(transport.with(|m| m.connect_calls.is_empty()));
        assert_eq!(manager.connected_device(), None);
        assert_eq!(manager.requested_device(), Some(b.clone()));

        // Once the transport reports the old host gone, the connect to the
        // new target goes out.
        transport.set_state(&a, ConnectionState::Disconnected);
        manager.on_device_state_changed(a, ConnectionState::Disconnected);
        assert_eq!(transport.with(|m| m.connect_calls.clone()), vec![b.clone()]);

        transport.set_state(&b, ConnectionState::Connected);
        manager.on_device_state_changed(b.clone(), ConnectionState::Connected);
        assert_eq!(manager.connected_device(), Some(b));
        assert_eq!(manager.requested_device(), None);
    }

    #[tokio::test]
    async fn unsolicited_inbound_connection_is_adopted() {
        let (transport, _app, manager) = setup();
        let c = dev("host-c");
        transport.set_state(&c, ConnectionState::Connected);

        manager.on_device_state_changed(c.clone(), ConnectionState::Connected);

        assert_eq!(manager.connected_device(), Some(c.clone()));
        assert!(transport.with(|m| m.disconnect_calls.is_empty()));
        assert_eq!(manager.requested_device(), None);
    }

    #[tokio::test]
    async fn request_connect_none_disconnects_everything() {
        let (transport, app, manager) = setup();
        let a = dev("host-a");
        transport.set_state(&a, ConnectionState::Connected);
        manager.request_connect(Some(a.clone()));
        assert_eq!(manager.connected_device(), Some(a.clone()));

        manager.request_connect(None);

        assert!(transport.with(|m| m.disconnect_calls.contains(&a)));
        assert_eq!(manager.connected_device(), None);
        assert_eq!(app.device(), None);
    }

    #[tokio::test]
    async fn listener_registry_ref_counts_the_subscription() {
        let (transport, _app, manager) = setup();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();

        let first = manager.register(tx1);
        let second = manager.register(tx2);
        assert_eq!(transport.with(|m| m.subscribe_calls), 1);

        // Simulate the service and registration coming up.
        manager.on_service_state_changed(true);
        manager.on_app_status_changed(true);
        assert_eq!(transport.with(|m| m.register_app_calls), 1);

        manager.unregister(first);
        assert_eq!(transport.with(|m| m.unsubscribe_calls), 0);
        assert_eq!(transport.with(|m| m.unregister_app_calls), 0);

        manager.unregister(second);
        assert_eq!(transport.with(|m| m.unsubscribe_calls), 1);
        assert_eq!(transport.with(|m| m.unregister_app_calls), 1);

        // Stale ids are a tolerated no-op.
        manager.unregister(second);
        assert_eq!(transport.with(|m| m.unsubscribe_calls), 1);
    }

    #[tokio::test]
    async fn observers_receive_device_events() {
        let (transport, _app, manager) = setup();
        let (tx, mut rx) = mpsc::unbounded_channel();
        manager.register(tx);

        let a = dev("host-a");
        transport.set_state(&a, ConnectionState::Connected);
        manager.on_device_state_changed(a.clone(), ConnectionState::Connected);

        assert_eq!(
            rx.try_recv().unwrap(),
            ProfileEvent::DeviceStateChanged {
                device: a,
                state: ConnectionState::Connected,
            }
        );
    }

    #[tokio::test]
    async fn send_without_connection_caches_but_does_not_transmit() {
        let (transport, app, manager) = setup();
        let state = GamepadState {
            a: true,
            ..GamepadState::default()
        };

        manager.send_gamepad(&state);
        assert!(transport.with(|m| m.sent_reports.is_empty()));

        // The cached value is still what GET_REPORT replays.
        let host = dev("host-a");
        app.on_get_report(&host, ReportType::Input, REPORT_ID_GAMEPAD, 8);
        let replies = transport.with(|m| m.replies.clone());
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].2, REPORT_ID_GAMEPAD);
        assert_eq!(replies[0].3[0] & 0x01, 0x01);
    }

    #[tokio::test]
    async fn send_with_connection_transmits_the_report() {
        let (transport, _app, manager) = setup();
        let a = dev("host-a");
        transport.set_state(&a, ConnectionState::Connected);
        manager.request_connect(Some(a.clone()));

        manager.send_gamepad(&GamepadState::default());

        let sent = transport.with(|m| m.sent_reports.clone());
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, a);
        assert_eq!(sent[0].1, REPORT_ID_GAMEPAD);
        assert_eq!(sent[0].2.len(), 8);
    }

    #[tokio::test]
    async fn get_report_for_unknown_id_is_rejected() {
        let (transport, app, _manager) = setup();
        let host = dev("host-a");

        app.on_get_report(&host, ReportType::Input, 7, 8);

        assert!(transport.with(|m| m.replies.is_empty()));
        assert_eq!(
            transport.with(|m| m.handshakes.clone()),
            vec![(host, HandshakeCode::InvalidReportId)]
        );
    }

    #[tokio::test]
    async fn get_report_for_non_input_type_is_unsupported() {
        let (transport, app, _manager) = setup();
        let host = dev("host-a");

        app.on_get_report(&host, ReportType::Feature, REPORT_ID_GAMEPAD, 8);

        assert!(transport.with(|m| m.replies.is_empty()));
        assert_eq!(
            transport.with(|m| m.handshakes.clone()),
            vec![(host, HandshakeCode::UnsupportedRequest)]
        );
    }

    #[tokio::test]
    async fn set_report_is_acknowledged_without_state_change() {
        let (transport, app, _manager) = setup();
        let host = dev("host-a");

        app.on_set_report(&host, ReportType::Output, REPORT_ID_GAMEPAD, &[0xFF; 8]);
        app.on_get_report(&host, ReportType::Input, REPORT_ID_GAMEPAD, 8);

        assert_eq!(
            transport.with(|m| m.handshakes.clone()),
            vec![(host, HandshakeCode::Success)]
        );
        // The pushed bytes did not land in the cache.
        let replies = transport.with(|m| m.replies.clone());
        assert_eq!(replies[0].3, vec![0u8; 8]);
    }

    #[tokio::test]
    async fn battery_broadcast_is_validated() {
        let (transport, _app, manager) = setup();
        let a = dev("host-a");
        transport.set_state(&a, ConnectionState::Connected);
        manager.request_connect(Some(a.clone()));

        manager.on_battery_broadcast(-1, 100);
        manager.on_battery_broadcast(50, 0);
        assert!(transport.with(|m| m.sent_reports.is_empty()));

        manager.on_battery_broadcast(50, 100);
        let sent = transport.with(|m| m.sent_reports.clone());
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, REPORT_ID_BATTERY);
        assert_eq!(sent[0].2, vec![0x80]); // ceil(0.5 * 255)
    }

    #[tokio::test]
    async fn service_loss_degrades_without_panicking() {
        let (transport, _app, manager) = setup();
        let a = dev("host-a");
        transport.set_state(&a, ConnectionState::Connected);
        manager.request_connect(Some(a.clone()));

        transport.set_state(&a, ConnectionState::Disconnected);
        manager.on_service_state_changed(false);

        assert_eq!(manager.connected_device(), None);
        manager.send_gamepad(&GamepadState::default());
        assert!(transport.with(|m| m.sent_reports.is_empty()));
    }
}
