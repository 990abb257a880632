// Timeouts, topics, robot geometry and per-module configuration.
use std::time::Duration;

use crate::drive::config::{DriveConfig, SwerveModuleConfiguration};
use crate::drive::kinematics::{square_layout, MODULE_COUNT};
use crate::motor::pid::PidConstants;

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;

// Command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh topics
pub const TOPIC_CMD_CHASSIS: &str = "swerve/cmd/chassis"; // commands
pub const TOPIC_TELEMETRY: &str = "swerve/rt/telemetry"; // module states
pub const TOPIC_HEALTH: &str = "swerve/state/health"; // health status

// Serial port for the servo bus
pub const DEFAULT_MOTOR_PORT: &str = "/dev/ttyUSB0";

// Servo bus ids, module order: front-left, front-right, back-left, back-right
pub const DRIVE_IDS: [u8; MODULE_COUNT] = [1, 2, 3, 4];
pub const STEER_IDS: [u8; MODULE_COUNT] = [5, 6, 7, 8];
pub const ENCODER_IDS: [u8; MODULE_COUNT] = [9, 10, 11, 12];

// Chassis geometry: module offsets from robot center, meters
pub const HALF_WHEELBASE_M: f64 = 0.29;
pub const HALF_TRACK_M: f64 = 0.29;

// Drive mechanism (SDS MK4i L2 ratios)
pub const DRIVE_RATIO: f64 = 6.75;
pub const STEER_RATIO: f64 = 150.0 / 7.0;
pub const WHEEL_DIAMETER_M: f64 = 0.1016;
pub const MAX_SPEED_MPS: f64 = 4.5;

/// Absolute-encoder calibration offsets, radians, measured per robot.
pub const ANGLE_OFFSETS_RAD: [f64; MODULE_COUNT] = [0.0, 0.0, 0.0, 0.0];

pub fn module_locations() -> [(f64, f64); MODULE_COUNT] {
    square_layout(HALF_WHEELBASE_M, HALF_TRACK_M)
}

/// Configuration for all four modules. Inversion alternates left/right so
/// forward chassis motion spins every wheel the same physical direction.
pub fn module_configurations() -> [SwerveModuleConfiguration; MODULE_COUNT] {
    let locations = module_locations();
    std::array::from_fn(|i| SwerveModuleConfiguration {
        location_m: locations[i],
        angle_offset_rad: ANGLE_OFFSETS_RAD[i],
        drive_inverted: i % 2 == 1,
        steer_inverted: false,
        drive: DriveConfig {
            drive_pid: PidConstants {
                kp: 0.1,
                ki: 0.0,
                kd: 0.0,
                kv: 0.12,
                ks: 0.05,
            },
            steer_pid: PidConstants::p(4.0),
            drive_ratio: DRIVE_RATIO,
            steer_ratio: STEER_RATIO,
            wheel_diameter_m: WHEEL_DIAMETER_M,
            max_speed_mps: MAX_SPEED_MPS,
            drive_stator_limit_a: 80.0,
            drive_supply_limit_a: 40.0,
            steer_supply_limit_a: 20.0,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_configurations_are_valid() {
        for config in module_configurations() {
            config.validate().unwrap();
        }
    }
}
