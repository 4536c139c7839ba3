//! Local gamepad input.
//!
//! [`collector`] polls a physical gamepad through gilrs and folds its events
//! into [`crate::report::GamepadState`] snapshots for the HID session.

pub mod collector;

pub use collector::{CollectorError, CollectorHandle, CollectorSettings, StateCollector};
