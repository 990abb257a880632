// Swerve inverse kinematics: one chassis-speed command to four module
// states. Each module's velocity vector is the chassis translation plus the
// rotational contribution ω × r at the module's mounting location.

use crate::drive::state::{ChassisSpeeds, ModuleState};
use crate::motor::conversion::normalize_angle;

pub const MODULE_COUNT: usize = 4;

pub struct SwerveKinematics {
    /// Module offsets from robot center, meters (+x forward, +y left).
    locations: [(f64, f64); MODULE_COUNT],
}

impl SwerveKinematics {
    pub fn new(locations: [(f64, f64); MODULE_COUNT]) -> Self {
        Self { locations }
    }

    pub fn locations(&self) -> &[(f64, f64); MODULE_COUNT] {
        &self.locations
    }

    /// Per-module target states for a chassis-speed command.
    ///
    /// Stateless: a zero command yields zero-speed states with heading 0;
    /// the module holds its previous heading when speed is zero.
    pub fn to_module_states(&self, speeds: ChassisSpeeds) -> [ModuleState; MODULE_COUNT] {
        self.locations.map(|(x, y)| {
            // ω × r in 2D: (-ω·y, ω·x)
            let vx = speeds.vx_mps - speeds.omega_rad_per_s * y;
            let vy = speeds.vy_mps + speeds.omega_rad_per_s * x;
            let speed = vx.hypot(vy);
            let angle = if speed == 0.0 {
                0.0
            } else {
                normalize_angle(vy.atan2(vx))
            };
            ModuleState::new(speed, angle)
        })
    }

    /// Rescale all speeds when any module exceeds the attainable maximum,
    /// preserving the direction of travel.
    pub fn desaturate(states: &mut [ModuleState; MODULE_COUNT], max_speed_mps: f64) {
        let top = states
            .iter()
            .map(|s| s.speed_mps.abs())
            .fold(0.0_f64, f64::max);
        if top > max_speed_mps {
            let scale = max_speed_mps / top;
            for state in states.iter_mut() {
                state.speed_mps *= scale;
            }
        }
    }

    /// Measured chassis speeds from the modules' measured states
    /// (least-squares for symmetric module placement), for telemetry.
    pub fn to_chassis_speeds(&self, states: &[ModuleState; MODULE_COUNT]) -> ChassisSpeeds {
        let mut vx_sum = 0.0;
        let mut vy_sum = 0.0;
        let mut torque_sum = 0.0;
        let mut radius_sq_sum = 0.0;

        for ((x, y), state) in self.locations.iter().zip(states.iter()) {
            let vx = state.speed_mps * state.angle_rad.cos();
            let vy = state.speed_mps * state.angle_rad.sin();
            vx_sum += vx;
            vy_sum += vy;
            torque_sum += x * vy - y * vx;
            radius_sq_sum += x * x + y * y;
        }

        let n = MODULE_COUNT as f64;
        ChassisSpeeds {
            vx_mps: vx_sum / n,
            vy_mps: vy_sum / n,
            omega_rad_per_s: if radius_sq_sum > 0.0 {
                torque_sum / radius_sq_sum
            } else {
                0.0
            },
        }
    }
}

/// Square chassis layout: front-left, front-right, back-left, back-right.
pub fn square_layout(half_length_m: f64, half_width_m: f64) -> [(f64, f64); MODULE_COUNT] {
    [
        (half_length_m, half_width_m),
        (half_length_m, -half_width_m),
        (-half_length_m, half_width_m),
        (-half_length_m, -half_width_m),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn kinematics() -> SwerveKinematics {
        SwerveKinematics::new(square_layout(0.29, 0.29))
    }

    #[test]
    fn straight_drive_points_all_modules_forward() {
        let states = kinematics().to_module_states(ChassisSpeeds::new(2.0, 0.0, 0.0));
        for state in states {
            assert!((state.speed_mps - 2.0).abs() < 1e-9);
            assert!(state.angle_rad.abs() < 1e-9);
        }
    }

    #[test]
    fn strafe_left_points_all_modules_left() {
        let states = kinematics().to_module_states(ChassisSpeeds::new(0.0, 1.5, 0.0));
        for state in states {
            assert!((state.speed_mps - 1.5).abs() < 1e-9);
            assert!((state.angle_rad - FRAC_PI_2).abs() < 1e-9);
        }
    }

    #[test]
    fn pure_rotation_is_tangential_and_equal_speed() {
        let kin = kinematics();
        let omega = 2.0;
        let states = kin.to_module_states(ChassisSpeeds::new(0.0, 0.0, omega));

        let radius = (0.29_f64 * 0.29 * 2.0).sqrt();
        for ((x, y), state) in kin.locations().iter().zip(states.iter()) {
            assert!((state.speed_mps - omega * radius).abs() < 1e-9);
            // Velocity must be perpendicular to the module's radius vector
            let dot = x * state.angle_rad.cos() * state.speed_mps
                + y * state.angle_rad.sin() * state.speed_mps;
            assert!(dot.abs() < 1e-9);
        }
    }

    #[test]
    fn zero_command_gives_zero_states() {
        let states = kinematics().to_module_states(ChassisSpeeds::default());
        for state in states {
            assert_eq!(state.speed_mps, 0.0);
        }
    }

    #[test]
    fn desaturation_preserves_ratios() {
        let kin = kinematics();
        let mut states = kin.to_module_states(ChassisSpeeds::new(5.0, 0.0, 4.0));
        let before: Vec<f64> = states.iter().map(|s| s.speed_mps).collect();
        SwerveKinematics::desaturate(&mut states, 4.5);

        let top = states
            .iter()
            .map(|s| s.speed_mps.abs())
            .fold(0.0_f64, f64::max);
        assert!((top - 4.5).abs() < 1e-9);

        let scale = states[0].speed_mps / before[0];
        for (after, before) in states.iter().zip(before.iter()) {
            assert!((after.speed_mps - before * scale).abs() < 1e-9);
        }
    }

    #[test]
    fn desaturation_leaves_attainable_speeds_alone() {
        let mut states = kinematics().to_module_states(ChassisSpeeds::new(1.0, 0.0, 0.0));
        let original = states;
        SwerveKinematics::desaturate(&mut states, 4.5);
        assert_eq!(states, original);
    }

    #[test]
    fn forward_kinematics_inverts_inverse() {
        let kin = kinematics();
        for speeds in [
            ChassisSpeeds::new(1.2, -0.4, 0.8),
            ChassisSpeeds::new(0.0, 0.0, PI),
            ChassisSpeeds::new(-2.0, 1.0, 0.0),
        ] {
            let states = kin.to_module_states(speeds);
            let recovered = kin.to_chassis_speeds(&states);
            assert!((recovered.vx_mps - speeds.vx_mps).abs() < 1e-9);
            assert!((recovered.vy_mps - speeds.vy_mps).abs() < 1e-9);
            assert!((recovered.omega_rad_per_s - speeds.omega_rad_per_s).abs() < 1e-9);
        }
    }
}
