//! HID session engine: service lifecycle, report routing, connection
//! arbitration.
//!
//! 1. [`device_app`] - service registration, report caches, GET/SET_REPORT
//! 2. [`manager`] - the single-connection reconciler and listener registry
//!
//! # Architecture
//!
//! ```text
//! Input ──► HidConnectionManager ──► HidDeviceApp ──► HidTransport
//!                    ▲                                     │
//!                    └───────── transport events ──────────┘
//! ```
//!
//! Transport callbacks can arrive on any thread; the manager funnels them
//! through one serialization domain before they touch connection state.

pub mod device_app;
pub mod error;
pub mod manager;

pub use device_app::HidDeviceApp;
pub use error::SessionError;
pub use manager::{HidConnectionManager, ListenerId, ProfileEvent};
