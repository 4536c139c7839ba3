use gilrs::{Axis, Button, Event, EventType, Gamepad, GamepadId, Gilrs};
use tokio::sync::mpsc;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::InputConfig;
use crate::report::{DpadDirection, GamepadState};

// Collector settings
#[derive(Clone, Debug)]
pub struct CollectorSettings {
    pub deadzone: f32,
    pub poll_interval_ms: u64,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            deadzone: 0.05,
            poll_interval_ms: 10,
        }
    }
}

impl From<&InputConfig> for CollectorSettings {
    fn from(config: &InputConfig) -> Self {
        Self {
            deadzone: config.deadzone,
            poll_interval_ms: config.poll_interval_ms,
        }
    }
}

// Collector errors
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("Failed to initialize gamepad interface: {0}")]
    InitializationError(String),

    #[error("Snapshot channel closed")]
    ChannelClosed,
}

// Pressed D-pad buttons; up/down and left/right cancel each other out.
#[derive(Debug, Clone, Copy, Default)]
struct DpadChord {
    up: bool,
    down: bool,
    left: bool,
    right: bool,
}

impl DpadChord {
    fn direction(self) -> DpadDirection {
        let vertical = match (self.up, self.down) {
            (true, false) => -1,
            (false, true) => 1,
            _ => 0,
        };
        let horizontal = match (self.left, self.right) {
            (true, false) => -1,
            (false, true) => 1,
            _ => 0,
        };
        match (vertical, horizontal) {
            (-1, 0) => DpadDirection::North,
            (-1, 1) => DpadDirection::NorthEast,
            (0, 1) => DpadDirection::East,
            (1, 1) => DpadDirection::SouthEast,
            (1, 0) => DpadDirection::South,
            (1, -1) => DpadDirection::SouthWest,
            (0, -1) => DpadDirection::West,
            (-1, -1) => DpadDirection::NorthWest,
            _ => DpadDirection::Released,
        }
    }
}

/// Folds raw gamepad events into one [`GamepadState`] snapshot stream.
pub struct StateCollector {
    gilrs: Gilrs,
    active_gamepad: Option<GamepadId>,
    settings: CollectorSettings,
    state: GamepadState,
    chord: DpadChord,
}

impl StateCollector {
    pub fn new(settings: CollectorSettings) -> Result<Self, CollectorError> {
        info!("Initializing gilrs controller interface");
        let gilrs = match Gilrs::new() {
            Ok(g) => g,
            Err(e) => {
                error!("Failed to initialize gilrs: {}", e);
                return Err(CollectorError::InitializationError(e.to_string()));
            }
        };

        let gamepads: Vec<(GamepadId, Gamepad<'_>)> = gilrs.gamepads().collect();
        let active_gamepad = if gamepads.is_empty() {
            warn!("No gamepad connected, continuing in idle mode");
            None
        } else {
            info!("Found {} gamepads:", gamepads.len());
            for (idx, (id, gamepad)) in gamepads.iter().enumerate() {
                info!("  [{}] ID: {}, Name: {}", idx, id, gamepad.name());
            }
            let (id, gamepad) = &gamepads[0];
            info!("Selected gamepad: {} ({})", gamepad.name(), id);
            Some(*id)
        };

        Ok(Self {
            gilrs,
            active_gamepad,
            settings,
            state: GamepadState::default(),
            chord: DpadChord::default(),
        })
    }

    /// Drain all pending gilrs events. Returns true if the snapshot changed.
    fn drain_events(&mut self) -> bool {
        let before = self.state;
        while let Some(Event { id, event, .. }) = self.gilrs.next_event() {
            match event {
                EventType::Connected => {
                    if self.active_gamepad.is_none() {
                        info!("Gamepad connected, selecting it: {}", id);
                        self.active_gamepad = Some(id);
                    }
                    continue;
                }
                EventType::Disconnected => {
                    if self.active_gamepad == Some(id) {
                        warn!("Active gamepad disconnected, releasing all input");
                        self.active_gamepad = None;
                        self.state = GamepadState::default();
                        self.chord = DpadChord::default();
                    }
                    continue;
                }
                _ => {}
            }
            if self.active_gamepad != Some(id) {
                debug!("Skipping event from non-active gamepad: {:?}", id);
                continue;
            }
            self.apply_event(event);
        }
        self.state != before
    }

    fn apply_event(&mut self, event: EventType) {
        match event {
            EventType::ButtonPressed(button, _) => self.apply_button(button, true),
            EventType::ButtonReleased(button, _) => self.apply_button(button, false),
            EventType::ButtonChanged(Button::LeftTrigger2, value, _) => {
                self.state.left_trigger = trigger_to_byte(value);
            }
            EventType::ButtonChanged(Button::RightTrigger2, value, _) => {
                self.state.right_trigger = trigger_to_byte(value);
            }
            EventType::AxisChanged(axis, value, _) => {
                let value = apply_deadzone(value, self.settings.deadzone);
                match axis {
                    Axis::LeftStickX => self.state.left_x = axis_to_byte(value),
                    // HID stick Y grows downward, gilrs Y grows upward
                    Axis::LeftStickY => self.state.left_y = axis_to_byte(-value),
                    Axis::RightStickX => self.state.right_x = axis_to_byte(value),
                    Axis::RightStickY => self.state.right_y = axis_to_byte(-value),
                    Axis::LeftZ => self.state.left_trigger = trigger_to_byte(value),
                    Axis::RightZ => self.state.right_trigger = trigger_to_byte(value),
                    _ => debug!("Ignoring unsupported axis: {:?}", axis),
                }
            }
            _ => debug!("Unhandled event type: {:?}", event),
        }
    }

    fn apply_button(&mut self, button: Button, pressed: bool) {
        match button {
            Button::South => self.state.a = pressed,
            Button::East => self.state.b = pressed,
            Button::West => self.state.x = pressed,
            Button::North => self.state.y = pressed,
            Button::LeftTrigger => self.state.l1 = pressed,
            Button::RightTrigger => self.state.r1 = pressed,
            Button::LeftThumb => self.state.l3 = pressed,
            Button::RightThumb => self.state.r3 = pressed,
            Button::Start => self.state.start = pressed,
            Button::Select => self.state.back = pressed,
            Button::Mode => self.state.home = pressed,
            Button::DPadUp => {
                self.chord.up = pressed;
                self.state.dpad = self.chord.direction();
            }
            Button::DPadDown => {
                self.chord.down = pressed;
                self.state.dpad = self.chord.direction();
            }
            Button::DPadLeft => {
                self.chord.left = pressed;
                self.state.dpad = self.chord.direction();
            }
            Button::DPadRight => {
                self.chord.right = pressed;
                self.state.dpad = self.chord.direction();
            }
            _ => debug!("Ignoring unmapped button: {:?}", button),
        }
    }

    /// Poll for gamepad events and emit a snapshot whenever the state
    /// changed. Runs until the receiving side goes away.
    pub async fn run(mut self, snapshots: mpsc::Sender<GamepadState>) -> Result<(), CollectorError> {
        info!(
            "Starting state collector loop (interval {}ms, deadzone {})",
            self.settings.poll_interval_ms, self.settings.deadzone
        );
        let mut interval =
            tokio::time::interval(Duration::from_millis(self.settings.poll_interval_ms.max(1)));
        loop {
            interval.tick().await;
            if self.drain_events() {
                snapshots
                    .send(self.state)
                    .await
                    .map_err(|_| CollectorError::ChannelClosed)?;
            }
        }
    }
}

// Public interface for spawning and running the collector
pub struct CollectorHandle {
    task: tokio::task::JoinHandle<()>,
}

impl CollectorHandle {
    /// Create a collector and run it on a tokio task.
    pub fn spawn(
        settings: CollectorSettings,
        snapshots: mpsc::Sender<GamepadState>,
    ) -> Result<Self, CollectorError> {
        let collector = StateCollector::new(settings)?;
        let task = tokio::spawn(async move {
            if let Err(e) = collector.run(snapshots).await {
                error!("State collector terminated: {}", e);
            }
        });
        Ok(Self { task })
    }

    pub fn abort(&self) {
        self.task.abort();
    }
}

// Helper function to apply deadzone to analog stick values
fn apply_deadzone(value: f32, deadzone: f32) -> f32 {
    if value.abs() < deadzone {
        0.0
    } else {
        // Rescale the value to the range outside the deadzone
        let sign = if value < 0.0 { -1.0 } else { 1.0 };
        sign * (value.abs() - deadzone) / (1.0 - deadzone)
    }
}

// Map a [-1.0, 1.0] axis to the 0-255 wire range, center 128
fn axis_to_byte(value: f32) -> u8 {
    ((value.clamp(-1.0, 1.0) + 1.0) * 127.5).round() as u8
}

// Map a [0.0, 1.0] trigger to the 0-255 wire range
fn trigger_to_byte(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadzone_zeroes_small_deflections_and_rescales_the_rest() {
        assert_eq!(apply_deadzone(0.03, 0.05), 0.0);
        assert_eq!(apply_deadzone(-0.04, 0.05), 0.0);
        assert_eq!(apply_deadzone(1.0, 0.05), 1.0);
        assert_eq!(apply_deadzone(-1.0, 0.05), -1.0);
        let mid = apply_deadzone(0.5, 0.05);
        assert!((mid - (0.45 / 0.95)).abs() < 1e-6);
    }

    #[test]
    fn axis_conversion_hits_the_wire_endpoints() {
        assert_eq!(axis_to_byte(-1.0), 0);
        assert_eq!(axis_to_byte(0.0), 128);
        assert_eq!(axis_to_byte(1.0), 255);
        assert_eq!(axis_to_byte(-2.0), 0);
        assert_eq!(axis_to_byte(2.0), 255);
    }

    #[test]
    fn trigger_conversion_hits_the_wire_endpoints() {
        assert_eq!(trigger_to_byte(0.0), 0);
        assert_eq!(trigger_to_byte(1.0), 255);
        assert_eq!(trigger_to_byte(-0.5), 0);
        assert_eq!(trigger_to_byte(0.5), 128);
    }

    #[test]
    fn dpad_chords_map_to_compass_directions() {
        let chord = |up, down, left, right| DpadChord {
            up,
            down,
            left,
            right,
        };
        assert_eq!(chord(true, false, false, false).direction(), DpadDirection::North);
        assert_eq!(chord(true, false, false, true).direction(), DpadDirection::NorthEast);
        assert_eq!(chord(false, false, false, true).direction(), DpadDirection::East);
        assert_eq!(chord(false, true, false, true).direction(), DpadDirection::SouthEast);
        assert_eq!(chord(false, true, false, false).direction(), DpadDirection::South);
        assert_eq!(chord(false, true, true, false).direction(), DpadDirection::SouthWest);
        assert_eq!(chord(false, false, true, false).direction(), DpadDirection::West);
        assert_eq!(chord(true, false, true, false).direction(), DpadDirection::NorthWest);
        assert_eq!(chord(false, false, false, false).direction(), DpadDirection::Released);
        // opposing buttons cancel out
        assert_eq!(chord(true, true, false, false).direction(), DpadDirection::Released);
        assert_eq!(chord(true, true, true, false).direction(), DpadDirection::West);
    }
}
