// Unit conversion between a controller's native units (NU) and physical units.
//
// Every smart controller reports encoder counts and velocity in its own
// native units. A ConversionProfile captures the multiplicative factors
// (gear ratio, wheel diameter, vendor conversion constants) needed to move
// between NU and meters / radians / m/s in either direction.

use std::f64::consts::PI;

/// Error for configuration values that would break the conversion math.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be positive, got {value}")]
    NonPositive { name: &'static str, value: f64 },
}

/// Wrap an angle into `[0, 2π)`.
pub fn normalize_angle(angle: f64) -> f64 {
    let mut a = angle % (2.0 * PI);
    if a < 0.0 {
        a += 2.0 * PI;
    }
    a
}

/// Conversion factors for one motor controller.
///
/// - `gear_ratio`: motor rotations per output-shaft rotation. A 16:1 gearbox
///   means 16.0. Divide motor rotations by this to get output rotations.
/// - `wheel_diameter_m`: diameter of the wheel (or drum) on the output shaft.
/// - `velocity_constant`: NU per RPM. Divide native velocity by this to get
///   motor RPM (1.0 for controllers whose NU already are RPM).
/// - `position_constant`: NU per rotation. Divide native position by this to
///   get motor rotations (1.0 for controllers whose NU already are rotations).
///
/// All conversions are pure; the profile is owned by its controller and is
/// never shared between controllers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConversionProfile {
    gear_ratio: f64,
    wheel_diameter_m: f64,
    velocity_constant: f64,
    position_constant: f64,
}

impl ConversionProfile {
    pub fn new(
        gear_ratio: f64,
        wheel_diameter_m: f64,
        velocity_constant: f64,
        position_constant: f64,
    ) -> Result<Self, ConfigError> {
        for (name, value) in [
            ("gear_ratio", gear_ratio),
            ("wheel_diameter_m", wheel_diameter_m),
            ("velocity_constant", velocity_constant),
            ("position_constant", position_constant),
        ] {
            if value <= 0.0 {
                return Err(ConfigError::NonPositive { name, value });
            }
        }

        Ok(Self {
            gear_ratio,
            wheel_diameter_m,
            velocity_constant,
            position_constant,
        })
    }

    /// Profile for a direct-drive controller whose NU are RPM and rotations.
    pub fn direct(wheel_diameter_m: f64) -> Result<Self, ConfigError> {
        Self::new(1.0, wheel_diameter_m, 1.0, 1.0)
    }

    /// Same vendor constants, different mechanism. Used at module setup to
    /// apply the configured gear ratio and wheel diameter without clobbering
    /// the controller's native-unit constants.
    pub fn with_mechanism(
        &self,
        gear_ratio: f64,
        wheel_diameter_m: f64,
    ) -> Result<Self, ConfigError> {
        Self::new(
            gear_ratio,
            wheel_diameter_m,
            self.velocity_constant,
            self.position_constant,
        )
    }

    pub fn gear_ratio(&self) -> f64 {
        self.gear_ratio
    }

    pub fn wheel_diameter_m(&self) -> f64 {
        self.wheel_diameter_m
    }

    pub fn velocity_constant(&self) -> f64 {
        self.velocity_constant
    }

    pub fn position_constant(&self) -> f64 {
        self.position_constant
    }

    fn wheel_circumference_m(&self) -> f64 {
        self.wheel_diameter_m * PI
    }

    /// Linear velocity in m/s to native velocity units.
    pub fn to_native_velocity(&self, mps: f64) -> f64 {
        mps / self.wheel_circumference_m() * 60.0 * self.gear_ratio * self.velocity_constant
    }

    /// Native velocity units to linear velocity in m/s.
    pub fn from_native_velocity(&self, nu: f64) -> f64 {
        nu * self.wheel_circumference_m() / self.velocity_constant / self.gear_ratio / 60.0
    }

    /// Angular velocity in RPM (of the output shaft) to native velocity units.
    pub fn to_native_angular_velocity(&self, rpm: f64) -> f64 {
        rpm * self.velocity_constant * self.gear_ratio
    }

    /// Native velocity units to output-shaft RPM.
    pub fn from_native_angular_velocity(&self, nu: f64) -> f64 {
        nu / self.velocity_constant / self.gear_ratio
    }

    /// Linear distance in meters to native position units.
    pub fn to_native_position(&self, meters: f64) -> f64 {
        meters * self.position_constant * self.gear_ratio / self.wheel_circumference_m()
    }

    /// Native position units to linear distance in meters.
    pub fn from_native_position(&self, nu: f64) -> f64 {
        nu * self.wheel_circumference_m() / self.position_constant / self.gear_ratio
    }

    /// Output-shaft angle in radians to native position units.
    pub fn to_native_angle(&self, radians: f64) -> f64 {
        self.to_native_rotations(radians / (2.0 * PI))
    }

    /// Native position units to output-shaft angle, normalized to `[0, 2π)`.
    pub fn from_native_angle(&self, nu: f64) -> f64 {
        normalize_angle(nu / self.position_constant / self.gear_ratio * 2.0 * PI)
    }

    /// Output-shaft rotations to native position units.
    pub fn to_native_rotations(&self, rotations: f64) -> f64 {
        rotations * self.position_constant * self.gear_ratio
    }

    /// Native position units to output-shaft rotations (not normalized).
    pub fn from_native_rotations(&self, nu: f64) -> f64 {
        nu / self.position_constant / self.gear_ratio
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-9;

    fn relative_eq(a: f64, b: f64) -> bool {
        if b == 0.0 {
            a.abs() < TOL
        } else {
            ((a - b) / b).abs() < TOL
        }
    }

    // SDS MK4i L2-ish drive: 6.75:1, 4in wheel, NU already RPM/rotations
    fn mk4_drive() -> ConversionProfile {
        ConversionProfile::new(6.75, 0.1016, 1.0, 1.0).unwrap()
    }

    // Legacy controller: 2048 counts/rotation, velocity in counts per 100ms
    fn legacy() -> ConversionProfile {
        ConversionProfile::new(6.75, 0.1016, 600.0 / 2048.0, 2048.0).unwrap()
    }

    #[test]
    fn rejects_bad_config() {
        assert!(ConversionProfile::new(0.0, 0.1, 1.0, 1.0).is_err());
        assert!(ConversionProfile::new(-6.75, 0.1, 1.0, 1.0).is_err());
        assert!(ConversionProfile::new(6.75, -0.1, 1.0, 1.0).is_err());
        assert!(ConversionProfile::new(6.75, 0.1, 0.0, 1.0).is_err());
    }

    #[test]
    fn velocity_round_trip() {
        for profile in [mk4_drive(), legacy()] {
            for mps in [-4.5, -0.2, 0.0, 0.001, 1.0, 4.2] {
                let nu = profile.to_native_velocity(mps);
                assert!(relative_eq(profile.from_native_velocity(nu), mps));
            }
        }
    }

    #[test]
    fn position_round_trip() {
        for profile in [mk4_drive(), legacy()] {
            for meters in [-12.0, 0.0, 0.5, 3.25, 100.0] {
                let nu = profile.to_native_position(meters);
                assert!(relative_eq(profile.from_native_position(nu), meters));
            }
        }
    }

    #[test]
    fn angular_velocity_round_trip() {
        let profile = legacy();
        for rpm in [-600.0, 0.0, 42.0, 5000.0] {
            let nu = profile.to_native_angular_velocity(rpm);
            assert!(relative_eq(profile.from_native_angular_velocity(nu), rpm));
        }
    }

    #[test]
    fn known_velocity_value() {
        // 1 m/s on a 4in wheel through 6.75:1 with NU = RPM:
        // 1 / (0.1016π) rotations per second * 60 * 6.75 motor RPM
        let profile = mk4_drive();
        let expected = 1.0 / (0.1016 * PI) * 60.0 * 6.75;
        assert!(relative_eq(profile.to_native_velocity(1.0), expected));
    }

    #[test]
    fn angle_to_native_uses_rotations() {
        let profile = ConversionProfile::new(12.8, 0.1016, 1.0, 1.0).unwrap();
        // Quarter turn of the output shaft = 0.25 * 12.8 motor rotations
        assert!(relative_eq(profile.to_native_angle(PI / 2.0), 0.25 * 12.8));
    }

    #[test]
    fn angle_from_native_is_normalized() {
        let profile = ConversionProfile::new(12.8, 0.1016, 1.0, 1.0).unwrap();
        for nu in [-40.0, -12.8, 0.0, 6.4, 12.8, 300.0] {
            let angle = profile.from_native_angle(nu);
            assert!((0.0..2.0 * PI).contains(&angle), "angle {} out of range", angle);
        }
        // One and a quarter output rotations lands at π/2
        let angle = profile.from_native_angle(1.25 * 12.8);
        assert!(relative_eq(angle, PI / 2.0));
    }

    #[test]
    fn normalize_angle_range_and_congruence() {
        for raw in [-7.0 * PI, -PI, -0.1, 0.0, 0.1, PI, 2.0 * PI, 9.5 * PI] {
            let normalized = normalize_angle(raw);
            assert!((0.0..2.0 * PI).contains(&normalized));
            // normalized ≡ raw (mod 2π)
            let delta = (normalized - raw) / (2.0 * PI);
            assert!((delta - delta.round()).abs() < TOL);
        }
    }
}
