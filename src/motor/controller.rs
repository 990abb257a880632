// The capability surface every actuator implementation must satisfy.
//
// Concrete controllers only supply the NU-domain primitives and the
// configuration hooks; all physical-unit methods are provided on top of the
// controller's ConversionProfile. Vendor adapters hold their SDK/bus handles
// privately and never leak them through this trait.

use super::conversion::ConversionProfile;
use super::pid::PidConstants;
use super::request::{ControlRequest, OutputType};
use super::signal::TimestampedSignal;
use super::sts::BusError;

/// Failure applying a command or reading telemetry.
///
/// Capability gaps (unsupported FOC, slot out of range) are not errors; they
/// degrade with a log at the controller boundary. This enum carries only
/// transport failures, which the next control cycle recovers from by
/// re-issuing a fresh request.
#[derive(Debug, thiserror::Error)]
pub enum MotorError {
    #[error("bus error: {0}")]
    Bus(#[from] BusError),
}

/// Common interface for all motor controllers.
///
/// The pending-state mutators ([`set_next_arb_feedforward`],
/// [`set_slot`], [`use_foc`], [`set_next_output_type`]) configure the *next*
/// setpoint call and persist until overwritten. Callers must set them before
/// issuing the request that should use them; [`ControlRequest::apply`] does
/// this in the right order.
///
/// [`set_next_arb_feedforward`]: MotorController::set_next_arb_feedforward
/// [`set_slot`]: MotorController::set_slot
/// [`use_foc`]: MotorController::use_foc
/// [`set_next_output_type`]: MotorController::set_next_output_type
pub trait MotorController {
    // --- NU-domain primitives ---

    /// Open-loop duty cycle output, -1.0 to 1.0.
    fn set_duty_cycle(&mut self, fraction: f64) -> Result<(), MotorError>;

    /// Open-loop voltage output.
    fn set_voltage(&mut self, volts: f64) -> Result<(), MotorError>;

    /// Closed-loop velocity, in NU.
    fn set_velocity_nu(&mut self, nu: f64) -> Result<(), MotorError>;

    /// Closed-loop position, in NU.
    fn set_position_nu(&mut self, nu: f64) -> Result<(), MotorError>;

    /// Motion-profiled position, in NU.
    fn set_motion_profile_nu(&mut self, nu: f64) -> Result<(), MotorError>;

    /// Seed the relative encoder, in NU. Does not move the motor.
    fn set_encoder_position_nu(&mut self, nu: f64) -> Result<(), MotorError>;

    // --- Telemetry ---

    /// Velocity in NU with the sample timestamp.
    fn get_velocity_nu(&mut self) -> Result<TimestampedSignal<f64>, MotorError>;

    /// Position in NU with the sample timestamp.
    ///
    /// With `latency_compensated` the implementation extrapolates the sample
    /// by onboard velocity × elapsed time where supported; otherwise the raw
    /// sample is returned unchanged.
    fn get_position_nu(&mut self, latency_compensated: bool)
        -> Result<TimestampedSignal<f64>, MotorError>;

    /// Bus voltage supplied to the controller.
    fn get_supplied_voltage(&mut self) -> Result<TimestampedSignal<f64>, MotorError>;

    /// Output fraction currently applied to the motor, -1.0 to 1.0.
    fn get_applied_duty_cycle(&mut self) -> Result<TimestampedSignal<f64>, MotorError>;

    // --- Configuration ---

    /// Store gains in the active PID slot.
    fn set_pid(&mut self, constants: PidConstants) -> Result<(), MotorError>;

    /// Gains of the active PID slot.
    fn get_pid(&self) -> PidConstants;

    /// True = brake, false = coast.
    fn set_brake(&mut self, brake: bool) -> Result<(), MotorError>;

    fn set_inverted(&mut self, inverted: bool) -> Result<(), MotorError>;

    /// Supply-side (bus to controller) current limit in amps.
    fn set_supply_current_limit(&mut self, amps: f64) -> Result<(), MotorError>;

    /// Stator-side (controller to motor) current limit in amps.
    fn set_stator_current_limit(&mut self, amps: f64) -> Result<(), MotorError>;

    fn set_forward_limit_switch_normally_closed(&mut self, closed: bool)
        -> Result<(), MotorError>;

    fn set_reverse_limit_switch_normally_closed(&mut self, closed: bool)
        -> Result<(), MotorError>;

    fn get_forward_limit_switch(&mut self) -> Result<TimestampedSignal<bool>, MotorError>;

    fn get_reverse_limit_switch(&mut self) -> Result<TimestampedSignal<bool>, MotorError>;

    /// Cruise velocity for motion-profiled moves, in NU per second.
    fn set_motion_profile_cruise_velocity(&mut self, nu_per_s: f64) -> Result<(), MotorError>;

    /// Acceleration for motion-profiled moves, in NU per second squared.
    fn set_motion_profile_acceleration(&mut self, nu_per_s2: f64) -> Result<(), MotorError>;

    // --- Pending request state ---

    /// Feedforward in volts applied to the next closed-loop setpoint.
    fn set_next_arb_feedforward(&mut self, volts: f64);

    /// PID slot used by subsequent setpoint calls and gain accesses.
    /// Slots outside 0-2 are ignored with a warning.
    fn set_slot(&mut self, slot: usize);

    /// FOC commutation for subsequent setpoints, where supported.
    fn use_foc(&mut self, foc: bool);

    /// Output domain for subsequent closed-loop setpoints.
    fn set_next_output_type(&mut self, output: OutputType);

    // --- Conversion profile ---

    fn conversion(&self) -> &ConversionProfile;

    fn set_conversion(&mut self, profile: ConversionProfile);

    // --- Physical-unit convenience layer ---

    /// Closed-loop linear velocity in m/s.
    fn set_velocity_mps(&mut self, mps: f64) -> Result<(), MotorError> {
        let nu = self.conversion().to_native_velocity(mps);
        self.set_velocity_nu(nu)
    }

    /// Closed-loop angular velocity of the output shaft, in RPM.
    fn set_angular_velocity_rpm(&mut self, rpm: f64) -> Result<(), MotorError> {
        let nu = self.conversion().to_native_angular_velocity(rpm);
        self.set_velocity_nu(nu)
    }

    /// Closed-loop linear position in meters.
    fn set_position_meters(&mut self, meters: f64) -> Result<(), MotorError> {
        let nu = self.conversion().to_native_position(meters);
        self.set_position_nu(nu)
    }

    /// Closed-loop output-shaft angle in radians.
    fn set_angle(&mut self, radians: f64) -> Result<(), MotorError> {
        let nu = self.conversion().to_native_angle(radians);
        self.set_position_nu(nu)
    }

    /// Motion-profiled linear position in meters.
    fn set_motion_profile_meters(&mut self, meters: f64) -> Result<(), MotorError> {
        let nu = self.conversion().to_native_position(meters);
        self.set_motion_profile_nu(nu)
    }

    /// Motion-profiled output-shaft angle in radians.
    fn set_motion_profile_angle(&mut self, radians: f64) -> Result<(), MotorError> {
        let nu = self.conversion().to_native_angle(radians);
        self.set_motion_profile_nu(nu)
    }

    /// Seed the relative encoder from a linear distance in meters.
    fn set_encoder_position_meters(&mut self, meters: f64) -> Result<(), MotorError> {
        let nu = self.conversion().to_native_position(meters);
        self.set_encoder_position_nu(nu)
    }

    /// Seed the relative encoder from output-shaft rotations.
    fn set_encoder_position_rotations(&mut self, rotations: f64) -> Result<(), MotorError> {
        let nu = self.conversion().to_native_rotations(rotations);
        self.set_encoder_position_nu(nu)
    }

    fn reset_encoder(&mut self) -> Result<(), MotorError> {
        self.set_encoder_position_nu(0.0)
    }

    /// Linear velocity in m/s.
    fn get_velocity_mps(&mut self) -> Result<TimestampedSignal<f64>, MotorError> {
        let conversion = *self.conversion();
        Ok(self
            .get_velocity_nu()?
            .map(|nu| conversion.from_native_velocity(nu)))
    }

    /// Output-shaft angular velocity in RPM.
    fn get_angular_velocity_rpm(&mut self) -> Result<TimestampedSignal<f64>, MotorError> {
        let conversion = *self.conversion();
        Ok(self
            .get_velocity_nu()?
            .map(|nu| conversion.from_native_angular_velocity(nu)))
    }

    /// Distance travelled in meters.
    fn get_distance_meters(
        &mut self,
        latency_compensated: bool,
    ) -> Result<TimestampedSignal<f64>, MotorError> {
        let conversion = *self.conversion();
        Ok(self
            .get_position_nu(latency_compensated)?
            .map(|nu| conversion.from_native_position(nu)))
    }

    /// Output-shaft angle in radians, normalized to `[0, 2π)`.
    fn get_angle(
        &mut self,
        latency_compensated: bool,
    ) -> Result<TimestampedSignal<f64>, MotorError> {
        let conversion = *self.conversion();
        Ok(self
            .get_position_nu(latency_compensated)?
            .map(|nu| conversion.from_native_angle(nu)))
    }

    /// Voltage currently applied to the motor (supplied voltage × applied
    /// output fraction).
    fn get_output_voltage(&mut self) -> Result<TimestampedSignal<f64>, MotorError> {
        let duty = self.get_applied_duty_cycle()?.get();
        Ok(self.get_supplied_voltage()?.map(|volts| volts * duty))
    }

    /// Apply a [`ControlRequest`] to this controller.
    fn set_control(&mut self, request: &ControlRequest) -> Result<(), MotorError>
    where
        Self: Sized,
    {
        request.apply(self)
    }

    fn stop(&mut self) -> Result<(), MotorError> {
        self.set_duty_cycle(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::super::sim::SimController;
    use super::*;
    use std::f64::consts::PI;

    fn controller() -> SimController {
        let profile = ConversionProfile::new(6.75, 0.1016, 1.0, 1.0).unwrap();
        SimController::new(profile)
    }

    #[test]
    fn physical_setters_delegate_through_conversion() {
        let mut motor = controller();
        motor.set_velocity_mps(2.0).unwrap();
        let expected = motor.conversion().to_native_velocity(2.0);
        assert_eq!(motor.last_velocity_nu(), Some(expected));

        motor.set_angle(PI).unwrap();
        let expected = motor.conversion().to_native_angle(PI);
        assert_eq!(motor.last_position_nu(), Some(expected));
    }

    #[test]
    fn telemetry_round_trips_through_conversion() {
        let mut motor = controller();
        motor.set_velocity_mps(1.5).unwrap();
        let mps = motor.get_velocity_mps().unwrap().get();
        assert!((mps - 1.5).abs() < 1e-9);
    }

    #[test]
    fn output_voltage_scales_supplied_by_duty() {
        let mut motor = controller();
        motor.set_duty_cycle(0.5).unwrap();
        let volts = motor.get_output_voltage().unwrap().get();
        assert!((volts - 6.0).abs() < 1e-9);
    }

    #[test]
    fn control_request_sets_pending_state_before_setpoint() {
        let mut motor = controller();
        motor
            .set_control(
                &ControlRequest::velocity(100.0)
                    .with_slot(1)
                    .with_feedforward(0.25)
                    .with_output_type(OutputType::Voltage),
            )
            .unwrap();

        assert_eq!(motor.last_velocity_nu(), Some(100.0));
        assert_eq!(motor.pending_slot(), 1);
        assert_eq!(motor.pending_feedforward(), 0.25);
        assert_eq!(motor.pending_output_type(), OutputType::Voltage);
    }
}
