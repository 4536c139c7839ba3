//! Binary report encoding for the emulated HID gamepad.
//!
//! Two reports cross the wire, tagged by report id:
//!
//! 1. [`gamepad`] - 8-byte input report with buttons, D-pad, sticks and triggers
//! 2. [`battery`] - 1-byte battery strength report
//!
//! [`descriptor`] holds the static HID report descriptor that declares both
//! layouts to the host. The descriptor and the encoders must agree bit for
//! bit; the host parses one against the other.

pub mod battery;
pub mod descriptor;
pub mod gamepad;

pub use battery::BatteryReport;
pub use descriptor::{REPORT_DESCRIPTOR, REPORT_ID_BATTERY, REPORT_ID_GAMEPAD};
pub use gamepad::{DpadDirection, GamepadReport, GamepadState};
