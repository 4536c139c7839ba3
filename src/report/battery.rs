//! Battery strength report.

/// Owns the encoded 1-byte battery report.
///
/// Same caching contract as the gamepad report: the buffer holds the last
/// encoded value so late GET_REPORT queries can be answered from memory.
#[derive(Debug, Clone, Default)]
pub struct BatteryReport {
    data: [u8; 1],
}

impl BatteryReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Quantize `level` (fraction of full charge) into the report byte.
    ///
    /// Out-of-range and NaN inputs saturate into `[0.0, 1.0]`. The quantizer
    /// rounds up on purpose: reporting "full" slightly early beats reporting
    /// "empty" slightly early.
    pub fn encode(&mut self, level: f32) -> &[u8] {
        let level = if level.is_nan() {
            0.0
        } else {
            level.clamp(0.0, 1.0)
        };
        self.data[0] = (level * 255.0).ceil() as u8;
        &self.data
    }

    /// Last encoded report byte.
    pub fn current(&self) -> &[u8] {
        &self.data
    }
}
