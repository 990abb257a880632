// Absolute angle sensor interface.
//
// The absolute encoder is the ground truth for steering heading: unlike the
// motor's relative encoder it cannot desynchronize from the physical wheel at
// power-on. Closed-loop steering still runs off the relative encoder, which
// is seeded from this sensor once at startup.

use super::controller::MotorError;
use super::conversion::normalize_angle;
use super::signal::TimestampedSignal;

pub trait AbsoluteEncoder {
    /// Absolute angle in radians, offset applied, normalized to `[0, 2π)`.
    fn get_absolute_angle(&mut self) -> Result<TimestampedSignal<f64>, MotorError>;

    /// Calibration offset subtracted from the raw reading, in radians.
    fn set_absolute_offset(&mut self, offset_rad: f64);
}

/// Apply an offset to a raw absolute reading and normalize.
pub(crate) fn offset_angle(raw_rad: f64, offset_rad: f64) -> f64 {
    normalize_angle(raw_rad - offset_rad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn offset_wraps_into_range() {
        let angle = offset_angle(0.5, 1.0);
        assert!((angle - (2.0 * PI - 0.5)).abs() < 1e-12);
        assert!((0.0..2.0 * PI).contains(&angle));
    }
}
