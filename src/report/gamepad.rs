//! Gamepad state snapshot and its 8-byte wire encoding.

/// D-pad position as reported through the 4-bit hat switch field.
///
/// The wire codes are eighths of a turn clockwise from north
/// (0 = up, 2 = right, 4 = down, 6 = left), with 8 meaning released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DpadDirection {
    North = 0,
    NorthEast = 1,
    East = 2,
    SouthEast = 3,
    South = 4,
    SouthWest = 5,
    West = 6,
    NorthWest = 7,
    #[default]
    Released = 8,
}

impl DpadDirection {
    /// Wire code for the hat switch nibble.
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Snapshot of the full controller state.
///
/// Axes use the raw HID range: sticks run 0-255 with 128 at center
/// (Y grows downward), triggers run 0 (released) to 255 (fully pressed).
/// The fields being `u8` is what keeps the codec free of clamping logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GamepadState {
    pub a: bool,
    pub b: bool,
    pub x: bool,
    pub y: bool,
    pub l1: bool,
    pub r1: bool,
    pub l3: bool,
    pub r3: bool,
    pub start: bool,
    pub back: bool,
    pub home: bool,
    pub dpad: DpadDirection,
    pub left_x: u8,
    pub left_y: u8,
    pub right_x: u8,
    pub right_y: u8,
    pub left_trigger: u8,
    pub right_trigger: u8,
}

impl Default for GamepadState {
    /// Everything released, sticks centered.
    fn default() -> Self {
        Self {
            a: false,
            b: false,
            x: false,
            y: false,
            l1: false,
            r1: false,
            l3: false,
            r3: false,
            start: false,
            back: false,
            home: false,
            dpad: DpadDirection::Released,
            left_x: 0x80,
            left_y: 0x80,
            right_x: 0x80,
            right_y: 0x80,
            left_trigger: 0,
            right_trigger: 0,
        }
    }
}

/// Length of the gamepad input report in bytes.
pub const GAMEPAD_REPORT_LEN: usize = 8;

/// Owns the encoded gamepad report buffer.
///
/// The buffer doubles as the last-known-value cache: the host may pull it at
/// any time with GET_REPORT, so it is re-encoded in place on every state
/// change and never cleared.
///
/// Layout (bit 0 = LSB):
///
/// ```text
/// byte 0: A B X Y L1 R1 L3 R3        (one bit each)
/// byte 1: Start Back Home pad D-pad  (3 bits, 1 pad bit, 4-bit hat code)
/// byte 2-5: LX LY RX RY
/// byte 6-7: L2 R2
/// ```
#[derive(Debug, Clone, Default)]
pub struct GamepadReport {
    data: [u8; GAMEPAD_REPORT_LEN],
}

impl GamepadReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize `state` into the owned buffer and return it.
    ///
    /// Deterministic: the same state always yields the same bytes.
    pub fn encode(&mut self, state: &GamepadState) -> &[u8] {
        let mut buttons = 0u8;
        buttons |= u8::from(state.a);
        buttons |= u8::from(state.b) << 1;
        buttons |= u8::from(state.x) << 2;
        buttons |= u8::from(state.y) << 3;
        buttons |= u8::from(state.l1) << 4;
        buttons |= u8::from(state.r1) << 5;
        buttons |= u8::from(state.l3) << 6;
        buttons |= u8::from(state.r3) << 7;
        self.data[0] = buttons;

        let mut misc = 0u8;
        misc |= u8::from(state.start);
        misc |= u8::from(state.back) << 1;
        misc |= u8::from(state.home) << 2;
        // bit 3 is the padding bit declared in the descriptor
        misc |= state.dpad.code() << 4;
        self.data[1] = misc;

        self.data[2] = state.left_x;
        self.data[3] = state.left_y;
        self.data[4] = state.right_x;
        self.data[5] = state.right_y;
        self.data[6] = state.left_trigger;
        self.data[7] = state.right_trigger;
        &self.data
    }

    /// Last encoded report, for replaying to GET_REPORT queries.
    pub fn current(&self) -> &[u8] {
        &self.data
    }
}
