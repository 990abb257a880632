// Value types exchanged with a swerve module, plus the angle-optimization
// and cosine-compensation math that keeps commanded motion physical.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::motor::conversion::normalize_angle;

/// Chassis-frame velocity command: +x forward, +y left, +ω counter-clockwise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChassisSpeeds {
    pub vx_mps: f64,
    pub vy_mps: f64,
    pub omega_rad_per_s: f64,
}

impl ChassisSpeeds {
    pub fn new(vx_mps: f64, vy_mps: f64, omega_rad_per_s: f64) -> Self {
        Self {
            vx_mps,
            vy_mps,
            omega_rad_per_s,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.vx_mps == 0.0 && self.vy_mps == 0.0 && self.omega_rad_per_s == 0.0
    }
}

/// Target or measured state of one module: wheel speed and heading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleState {
    pub speed_mps: f64,
    pub angle_rad: f64,
}

/// Accumulated state of one module, for odometry integration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModulePosition {
    pub distance_m: f64,
    pub angle_rad: f64,
}

/// Signed shortest angular distance from `from` to `to`, in `(-π, π]`.
pub fn angular_distance(from_rad: f64, to_rad: f64) -> f64 {
    let mut delta = normalize_angle(to_rad) - normalize_angle(from_rad);
    if delta > PI {
        delta -= 2.0 * PI;
    } else if delta <= -PI {
        delta += 2.0 * PI;
    }
    delta
}

impl ModuleState {
    pub fn new(speed_mps: f64, angle_rad: f64) -> Self {
        Self {
            speed_mps,
            angle_rad,
        }
    }

    /// Keep the commanded steer rotation within 90°.
    ///
    /// If the target heading is more than 90° from the current heading
    /// (strictly — a tie at exactly 90° does not flip), steer to the
    /// opposite heading and negate the speed instead. The wheel's physical
    /// motion is identical, the mechanical travel is minimal.
    pub fn optimize(&self, current_angle_rad: f64) -> Self {
        let delta = angular_distance(current_angle_rad, self.angle_rad);
        if delta.abs() > PI / 2.0 {
            Self {
                speed_mps: -self.speed_mps,
                angle_rad: normalize_angle(self.angle_rad + PI),
            }
        } else {
            Self {
                speed_mps: self.speed_mps,
                angle_rad: normalize_angle(self.angle_rad),
            }
        }
    }
}

/// Drive-power scale for the remaining steer error (the FRC-900 skew
/// compensator): cos of the error, floored at zero so an unreached steer
/// target never drives the wheel backward.
pub fn cosine_scale(steer_error_rad: f64) -> f64 {
    steer_error_rad.cos().clamp(0.0, 1.0)
}
