//! hidpad - emulate a Bluetooth HID gamepad peripheral.
//!
//! The crate turns the machine it runs on into the *accessory* side of a
//! HID link: a remote host (console, PC) connects to us and consumes
//! gamepad input reports and battery levels.
//!
//! # Architecture
//!
//! ```text
//! gilrs ──► input ──► session ──► transport ──► HID Host
//!           (state)   (arbiter)   (platform)
//! ```
//!
//! - [`report`] - binary report codecs and the HID report descriptor
//! - [`transport`] - the platform boundary trait plus a loopback simulation
//! - [`session`] - connection arbitration, report routing, observer fan-out
//! - [`input`] - physical gamepad polling
//! - [`config`] - toml configuration with defaults

pub mod config;
pub mod input;
pub mod report;
pub mod session;
pub mod transport;
