// One independently steered and driven wheel assembly.
//
// The module owns its drive controller, steer controller and absolute angle
// sensor. Construction takes only the configuration; setup() binds hardware
// and pushes configuration exactly once. After that, every control cycle
// reads sensors and issues apply() — the module keeps no state between
// cycles beyond the last commanded heading (held while the wheel is
// stopped, to avoid steering jitter at zero speed).

use tracing::{info, warn};

use crate::motor::controller::{MotorController, MotorError};
use crate::motor::conversion::ConfigError;
use crate::motor::encoder::AbsoluteEncoder;
use crate::motor::request::ControlRequest;
use crate::drive::config::SwerveModuleConfiguration;
use crate::drive::state::{angular_distance, cosine_scale, ModulePosition, ModuleState};

const NOMINAL_VOLTAGE: f64 = 12.0;

/// How the drive motor follows the commanded speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveRequestType {
    Voltage,
    VoltageFoc,
    Velocity,
    VelocityFoc,
}

/// How the steer motor follows the commanded heading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SteerRequestType {
    Position,
    PositionFoc,
    MotionProfile,
    MotionProfileFoc,
}

#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    #[error("module has not been set up")]
    NotSetup,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Motor(#[from] MotorError),
}

struct Hardware<D, S, E> {
    drive: D,
    steer: S,
    encoder: E,
}

pub struct SwerveModule<D, S, E> {
    config: SwerveModuleConfiguration,
    hardware: Option<Hardware<D, S, E>>,
    last_target_rad: f64,
}

impl<D, S, E> SwerveModule<D, S, E>
where
    D: MotorController,
    S: MotorController,
    E: AbsoluteEncoder,
{
    pub fn new(config: SwerveModuleConfiguration) -> Self {
        Self {
            config,
            hardware: None,
            last_target_rad: 0.0,
        }
    }

    pub fn config(&self) -> &SwerveModuleConfiguration {
        &self.config
    }

    /// Bind hardware and push the configuration, exactly once.
    ///
    /// Invalid configuration is fatal here and never reaches the per-cycle
    /// conversion math.
    pub fn setup(&mut self, drive: D, steer: S, encoder: E) -> Result<(), ModuleError> {
        self.config.validate()?;

        let mut hw = Hardware {
            drive,
            steer,
            encoder,
        };

        hw.encoder.set_absolute_offset(self.config.angle_offset_rad);

        // Steer: brake so the wheel holds heading, seed the relative encoder
        // from the absolute sensor before closed-loop steering runs. The
        // mechanism's ratios go into the controller's conversion profile;
        // the vendor's native-unit constants stay untouched.
        let steer_profile = hw
            .steer
            .conversion()
            .with_mechanism(self.config.drive.steer_ratio, self.config.drive.wheel_diameter_m)?;
        hw.steer.set_conversion(steer_profile);
        hw.steer.set_brake(true)?;
        hw.steer.set_inverted(self.config.steer_inverted)?;
        hw.steer
            .set_supply_current_limit(self.config.drive.steer_supply_limit_a)?;
        hw.steer.set_pid(self.config.drive.steer_pid)?;
        Self::seed_steer_encoder(&mut hw)?;

        // Drive: current limits keep stalls from browning out the robot.
        let drive_profile = hw
            .drive
            .conversion()
            .with_mechanism(self.config.drive.drive_ratio, self.config.drive.wheel_diameter_m)?;
        hw.drive.set_conversion(drive_profile);
        hw.drive.set_brake(true)?;
        hw.drive.set_inverted(self.config.drive_inverted)?;
        hw.drive
            .set_stator_current_limit(self.config.drive.drive_stator_limit_a)?;
        hw.drive
            .set_supply_current_limit(self.config.drive.drive_supply_limit_a)?;
        hw.drive.set_pid(self.config.drive.drive_pid)?;

        info!(
            location = ?self.config.location_m,
            "swerve module configured"
        );

        self.hardware = Some(hw);
        Ok(())
    }

    fn hw(&mut self) -> Result<&mut Hardware<D, S, E>, ModuleError> {
        self.hardware.as_mut().ok_or(ModuleError::NotSetup)
    }

    /// Apply a desired state: optimize the heading, compensate drive power
    /// for the remaining steer error, then dispatch both control requests.
    pub fn apply(
        &mut self,
        desired: ModuleState,
        drive_request: DriveRequestType,
        steer_request: SteerRequestType,
    ) -> Result<(), ModuleError> {
        // Hold the previous heading while stopped; a zero-speed state
        // carries no meaningful direction.
        let desired = if desired.speed_mps == 0.0 {
            ModuleState::new(0.0, self.last_target_rad)
        } else {
            desired
        };

        let max_speed = self.config.drive.max_speed_mps;
        let hw = self.hw()?;

        // Closed-loop steering runs on the motor's relative encoder
        let current_rad = hw.steer.get_angle(true)?.get();
        let optimized = desired.optimize(current_rad);

        let steer_nu = hw.steer.conversion().to_native_angle(optimized.angle_rad);
        let steer_cmd = match steer_request {
            SteerRequestType::Position => ControlRequest::position(steer_nu),
            SteerRequestType::PositionFoc => ControlRequest::position(steer_nu).with_foc(true),
            SteerRequestType::MotionProfile => ControlRequest::motion_profile(steer_nu),
            SteerRequestType::MotionProfileFoc => {
                ControlRequest::motion_profile(steer_nu).with_foc(true)
            }
        };
        steer_cmd.apply(&mut hw.steer)?;

        // Scale drive output by the cosine of the remaining steer error so
        // an unreached heading doesn't drag the robot sideways.
        let steer_error = angular_distance(current_rad, optimized.angle_rad);
        let speed = optimized.speed_mps * cosine_scale(steer_error);

        let drive_cmd = match drive_request {
            DriveRequestType::Voltage | DriveRequestType::VoltageFoc => {
                let volts = speed / max_speed * NOMINAL_VOLTAGE;
                ControlRequest::voltage(volts)
                    .with_foc(drive_request == DriveRequestType::VoltageFoc)
            }
            DriveRequestType::Velocity | DriveRequestType::VelocityFoc => {
                let nu = hw.drive.conversion().to_native_velocity(speed);
                ControlRequest::velocity(nu)
                    .with_foc(drive_request == DriveRequestType::VelocityFoc)
            }
        };
        drive_cmd.apply(&mut hw.drive)?;

        self.last_target_rad = optimized.angle_rad;
        Ok(())
    }

    /// Current speed and heading. Heading comes from the absolute sensor,
    /// which cannot desynchronize from the physical wheel at power-on.
    pub fn get_state(&mut self) -> Result<ModuleState, ModuleError> {
        let hw = self.hw()?;
        let speed = hw.drive.get_velocity_mps()?.get();
        let angle = hw.encoder.get_absolute_angle()?.get();
        Ok(ModuleState::new(speed, angle))
    }

    /// Accumulated drive distance and absolute heading, for odometry.
    pub fn get_position(&mut self) -> Result<ModulePosition, ModuleError> {
        let hw = self.hw()?;
        let distance = hw.drive.get_distance_meters(true)?.get();
        let angle = hw.encoder.get_absolute_angle()?.get();
        Ok(ModulePosition {
            distance_m: distance,
            angle_rad: angle,
        })
    }

    /// Seed the steer motor's relative encoder from the absolute sensor, in
    /// motor rotations. Required at startup and after relative-encoder slip.
    pub fn reset_steer_motor(&mut self) -> Result<(), ModuleError> {
        let hw = self.hw()?;
        Self::seed_steer_encoder(hw)
    }

    fn seed_steer_encoder(hw: &mut Hardware<D, S, E>) -> Result<(), ModuleError> {
        let absolute_rad = hw.encoder.get_absolute_angle()?.get();
        let rotations = absolute_rad / (2.0 * std::f64::consts::PI);
        hw.steer.set_encoder_position_rotations(rotations)?;
        Ok(())
    }

    /// Zero both relative encoders, in case things have gone bad.
    pub fn reset_encoders(&mut self) -> Result<(), ModuleError> {
        let hw = self.hw()?;
        hw.drive.set_encoder_position_nu(0.0)?;
        hw.steer.set_encoder_position_nu(0.0)?;
        Ok(())
    }

    /// Stop the drive motor, leaving the heading untouched.
    pub fn stop(&mut self) -> Result<(), ModuleError> {
        let hw = self.hw()?;
        if let Err(e) = hw.drive.stop() {
            warn!(error = %e, "failed to stop drive motor");
            return Err(e.into());
        }
        Ok(())
    }

    pub fn drive_motor(&mut self) -> Result<&mut D, ModuleError> {
        Ok(&mut self.hw()?.drive)
    }

    pub fn steer_motor(&mut self) -> Result<&mut S, ModuleError> {
        Ok(&mut self.hw()?.steer)
    }
}
