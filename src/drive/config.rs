// Per-module configuration, validated before any hardware setup.

use serde::{Deserialize, Serialize};

use crate::motor::conversion::ConfigError;
use crate::motor::pid::PidConstants;

/// Gains, ratios and limits for one module's motor pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DriveConfig {
    pub drive_pid: PidConstants,
    pub steer_pid: PidConstants,
    /// Motor rotations per wheel rotation.
    pub drive_ratio: f64,
    /// Motor rotations per steering rotation.
    pub steer_ratio: f64,
    pub wheel_diameter_m: f64,
    /// Attainable wheel speed, used for voltage scaling and desaturation.
    pub max_speed_mps: f64,
    pub drive_stator_limit_a: f64,
    pub drive_supply_limit_a: f64,
    pub steer_supply_limit_a: f64,
}

/// Everything needed to construct one swerve module.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SwerveModuleConfiguration {
    /// Module offset from robot center, meters (+x forward, +y left).
    pub location_m: (f64, f64),
    /// Calibration offset of the absolute steering encoder, radians.
    pub angle_offset_rad: f64,
    pub drive_inverted: bool,
    pub steer_inverted: bool,
    pub drive: DriveConfig,
}

impl SwerveModuleConfiguration {
    /// Reject configurations that would break the conversion math or the
    /// kinematics. Must pass before `setup()` is allowed to touch hardware.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("drive_ratio", self.drive.drive_ratio),
            ("steer_ratio", self.drive.steer_ratio),
            ("wheel_diameter_m", self.drive.wheel_diameter_m),
            ("max_speed_mps", self.drive.max_speed_mps),
        ] {
            if value <= 0.0 {
                return Err(ConfigError::NonPositive { name, value });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> SwerveModuleConfiguration {
        SwerveModuleConfiguration {
            location_m: (0.29, 0.29),
            angle_offset_rad: 0.0,
            drive_inverted: false,
            steer_inverted: false,
            drive: DriveConfig {
                drive_pid: PidConstants::p(0.1),
                steer_pid: PidConstants::p(4.0),
                drive_ratio: 6.75,
                steer_ratio: 12.8,
                wheel_diameter_m: 0.1016,
                max_speed_mps: 4.5,
                drive_stator_limit_a: 80.0,
                drive_supply_limit_a: 40.0,
                steer_supply_limit_a: 20.0,
            },
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn zero_gear_ratio_is_fatal() {
        let mut config = test_config();
        config.drive.drive_ratio = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn negative_wheel_diameter_is_fatal() {
        let mut config = test_config();
        config.drive.wheel_diameter_m = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_max_speed_is_fatal() {
        let mut config = test_config();
        config.drive.max_speed_mps = 0.0;
        assert!(config.validate().is_err());
    }
}
