use std::sync::Arc;

use color_eyre::Result;
use tokio::sync::mpsc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use hidpad::config::HidpadConfig;
use hidpad::input::{CollectorHandle, CollectorSettings};
use hidpad::session::{HidConnectionManager, HidDeviceApp, ProfileEvent};
use hidpad::transport::loopback::LoopbackTransport;
use hidpad::transport::HidTransport;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config = HidpadConfig::load_or_default();

    // The loopback transport stands in for a platform Bluetooth stack so
    // the whole pipeline can run on a development machine.
    let loopback = Arc::new(LoopbackTransport::new("virtual-host"));
    let host = loopback.host();
    let transport: Arc<dyn HidTransport> = loopback;

    let device_app = HidDeviceApp::new(transport.clone());
    let manager = HidConnectionManager::new(
        transport,
        device_app,
        config.sdp.clone(),
        config.qos.clone(),
    );

    let (profile_tx, mut profile_rx) = mpsc::unbounded_channel();
    let listener = manager.register(profile_tx);
    tokio::spawn(async move {
        while let Some(event) = profile_rx.recv().await {
            match event {
                ProfileEvent::AppStatusChanged { registered: false } => {
                    warn!("HID service registration lost");
                }
                other => info!(?other, "profile event"),
            }
        }
    });

    info!(%host, "requesting connection to the simulated host");
    manager.request_connect(Some(host));

    let (snapshot_tx, mut snapshot_rx) = mpsc::channel(64);
    let collector = match CollectorHandle::spawn(
        CollectorSettings::from(&config.input),
        snapshot_tx.clone(),
    ) {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("running without local gamepad input: {e}");
            None
        }
    };

    info!("hidpad running, press Ctrl-C to exit");
    loop {
        tokio::select! {
            Some(state) = snapshot_rx.recv() => manager.send_gamepad(&state),
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    info!("shutting down");
    if let Some(collector) = collector {
        collector.abort();
    }
    manager.unregister(listener);
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
    Ok(())
}
