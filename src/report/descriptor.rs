//! Static HID report descriptor.
//!
//! This table is a wire-format contract: it is handed to the transport once
//! at service registration and remote hosts parse every report against it.
//! Any change here must be mirrored in the encoders and vice versa.

/// Report id of the 8-byte gamepad input report.
pub const REPORT_ID_GAMEPAD: u8 = 1;

/// Report id of the 1-byte battery strength report.
pub const REPORT_ID_BATTERY: u8 = 2;

/// Two application collections: a "Game Pad" exposing 11 buttons, a hat
/// switch and six 8-bit axes under report id 1, and a second collection
/// exposing battery strength under report id 2.
#[rustfmt::skip]
pub const REPORT_DESCRIPTOR: &[u8] = &[
    0x05, 0x01,                 // Usage Page (Generic Desktop)
    0x09, 0x05,                 // Usage (Game Pad)
    0xA1, 0x01,                 // Collection (Application)
    0x85, REPORT_ID_GAMEPAD,    //   Report ID (1)

    // 11 buttons, one bit each: A, B, X, Y, L1, R1, L3, R3, Start, Back, Home
    0x05, 0x09,                 //   Usage Page (Button)
    0x09, 0x01,                 //   Usage (Button 1 - A)
    0x09, 0x02,                 //   Usage (Button 2 - B)
    0x09, 0x04,                 //   Usage (Button 4 - X)
    0x09, 0x05,                 //   Usage (Button 5 - Y)
    0x09, 0x07,                 //   Usage (Button 7 - L1)
    0x09, 0x08,                 //   Usage (Button 8 - R1)
    0x09, 0x0E,                 //   Usage (Button 14 - L3)
    0x09, 0x0F,                 //   Usage (Button 15 - R3)
    0x09, 0x0C,                 //   Usage (Button 12 - Start)
    0x05, 0x0C,                 //   Usage Page (Consumer)
    0x0A, 0x24, 0x02,           //   Usage (AC Back)
    0x0A, 0x23, 0x02,           //   Usage (AC Home)
    0x15, 0x00,                 //   Logical Minimum (0)
    0x25, 0x01,                 //   Logical Maximum (1)
    0x75, 0x01,                 //   Report Size (1)
    0x95, 0x0B,                 //   Report Count (11)
    0x81, 0x02,                 //   Input (Data,Var,Abs)

    // 1 bit padding
    0x75, 0x01,                 //   Report Size (1)
    0x95, 0x01,                 //   Report Count (1)
    0x81, 0x03,                 //   Input (Const,Var,Abs)

    // Hat switch: 4 bits, values 0-7 mapped to 0-315 degrees, null state 8
    0x05, 0x01,                 //   Usage Page (Generic Desktop)
    0x75, 0x04,                 //   Report Size (4)
    0x95, 0x01,                 //   Report Count (1)
    0x25, 0x07,                 //   Logical Maximum (7)
    0x46, 0x3B, 0x01,           //   Physical Maximum (315)
    0x66, 0x14, 0x00,           //   Unit (English Rotation: Degrees)
    0x09, 0x39,                 //   Usage (Hat switch)
    0x81, 0x42,                 //   Input (Data,Var,Abs,Null State)

    // Six 8-bit axes: LX, LY, RX, RY, L2, R2
    0x66, 0x00, 0x00,           //   Unit (None)
    0xA1, 0x00,                 //   Collection (Physical)
    0x09, 0x30,                 //     Usage (X)
    0x09, 0x31,                 //     Usage (Y)
    0x09, 0x32,                 //     Usage (Z)
    0x09, 0x35,                 //     Usage (Rz)
    0x05, 0x02,                 //     Usage Page (Simulation Controls)
    0x09, 0xC5,                 //     Usage (Brake)
    0x09, 0xC4,                 //     Usage (Accelerator)
    0x15, 0x00,                 //     Logical Minimum (0)
    0x26, 0xFF, 0x00,           //     Logical Maximum (255)
    0x35, 0x00,                 //     Physical Minimum (0)
    0x46, 0xFF, 0x00,           //     Physical Maximum (255)
    0x75, 0x08,                 //     Report Size (8)
    0x95, 0x06,                 //     Report Count (6)
    0x81, 0x02,                 //     Input (Data,Var,Abs)
    0xC0,                       //   End Collection
    0xC0,                       // End Collection

    // Battery strength, one byte, 0-255
    0x05, 0x01,                 // Usage Page (Generic Desktop)
    0x09, 0x05,                 // Usage (Game Pad)
    0xA1, 0x01,                 // Collection (Application)
    0x85, REPORT_ID_BATTERY,    //   Report ID (2)
    0x05, 0x06,                 //   Usage Page (Generic Device Controls)
    0x09, 0x20,                 //   Usage (Battery Strength)
    0x15, 0x00,                 //   Logical Minimum (0)
    0x26, 0xFF, 0x00,           //   Logical Maximum (255)
    0x75, 0x08,                 //   Report Size (8)
    0x95, 0x01,                 //   Report Count (1)
    0x81, 0x02,                 //   Input (Data,Var,Abs)
    0xC0,                       // End Collection
];
