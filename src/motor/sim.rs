// Simulated motor controller and absolute encoder.
//
// A perfect-response model: closed-loop setpoints are reached immediately,
// open-loop outputs spin the motor at a fraction of free speed. The
// controller records every native command it receives so tests can assert on
// the exact requests a caller dispatches. Also used by the runtime's --sim
// mode, where no serial bus is available.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use super::controller::{MotorController, MotorError};
use super::conversion::ConversionProfile;
use super::encoder::{offset_angle, AbsoluteEncoder};
use super::pid::{PidConstants, PidSlots};
use super::request::OutputType;
use super::signal::TimestampedSignal;

const SUPPLIED_VOLTAGE: f64 = 12.0;

/// Free speed of the simulated motor in NU, used for open-loop outputs.
const FREE_SPEED_NU: f64 = 6000.0;

/// One native command received by the simulated controller, with the pending
/// state it was issued under.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordedCommand {
    pub command: NativeCommand,
    pub slot: usize,
    pub arb_feedforward_v: f64,
    pub use_foc: bool,
    pub output: OutputType,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NativeCommand {
    DutyCycle(f64),
    Voltage(f64),
    VelocityNu(f64),
    PositionNu(f64),
    MotionProfileNu(f64),
}

pub struct SimController {
    conversion: ConversionProfile,
    pid: PidSlots,

    // Pending request state, persists until overwritten
    slot: usize,
    arb_feedforward_v: f64,
    foc: bool,
    output: OutputType,

    inverted: bool,
    brake: bool,
    velocity_nu: f64,
    position_nu: f64,
    duty: f64,
    position_sampled_at: Instant,
    forward_limit: bool,
    reverse_limit: bool,

    commands: Vec<RecordedCommand>,
}

impl SimController {
    pub fn new(conversion: ConversionProfile) -> Self {
        Self {
            conversion,
            pid: PidSlots::default(),
            slot: 0,
            arb_feedforward_v: 0.0,
            foc: false,
            output: OutputType::default(),
            inverted: false,
            brake: false,
            velocity_nu: 0.0,
            position_nu: 0.0,
            duty: 0.0,
            position_sampled_at: Instant::now(),
            forward_limit: false,
            reverse_limit: false,
            commands: Vec::new(),
        }
    }

    fn record(&mut self, command: NativeCommand) {
        self.commands.push(RecordedCommand {
            command,
            slot: self.slot,
            arb_feedforward_v: self.arb_feedforward_v,
            use_foc: self.foc,
            output: self.output,
        });
    }

    fn signed(&self, value: f64) -> f64 {
        if self.inverted { -value } else { value }
    }

    // --- test/sim accessors ---

    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<RecordedCommand> {
        std::mem::take(&mut self.commands)
    }

    pub fn last_velocity_nu(&self) -> Option<f64> {
        self.commands.iter().rev().find_map(|c| match c.command {
            NativeCommand::VelocityNu(nu) => Some(nu),
            _ => None,
        })
    }

    pub fn last_position_nu(&self) -> Option<f64> {
        self.commands.iter().rev().find_map(|c| match c.command {
            NativeCommand::PositionNu(nu) | NativeCommand::MotionProfileNu(nu) => Some(nu),
            _ => None,
        })
    }

    pub fn last_voltage(&self) -> Option<f64> {
        self.commands.iter().rev().find_map(|c| match c.command {
            NativeCommand::Voltage(v) => Some(v),
            _ => None,
        })
    }

    pub fn pending_slot(&self) -> usize {
        self.slot
    }

    pub fn pending_feedforward(&self) -> f64 {
        self.arb_feedforward_v
    }

    pub fn pending_output_type(&self) -> OutputType {
        self.output
    }

    pub fn is_brake(&self) -> bool {
        self.brake
    }

    pub fn is_inverted(&self) -> bool {
        self.inverted
    }

    pub fn set_forward_limit(&mut self, closed: bool) {
        self.forward_limit = closed;
    }

    pub fn set_reverse_limit(&mut self, closed: bool) {
        self.reverse_limit = closed;
    }

    /// Overwrite the encoder state directly, bypassing command recording.
    pub fn force_position_nu(&mut self, nu: f64) {
        self.position_nu = nu;
        self.position_sampled_at = Instant::now();
    }
}

impl MotorController for SimController {
    fn set_duty_cycle(&mut self, fraction: f64) -> Result<(), MotorError> {
        self.record(NativeCommand::DutyCycle(fraction));
        self.duty = fraction;
        self.velocity_nu = self.signed(fraction * FREE_SPEED_NU);
        Ok(())
    }

    fn set_voltage(&mut self, volts: f64) -> Result<(), MotorError> {
        self.record(NativeCommand::Voltage(volts));
        self.duty = volts / SUPPLIED_VOLTAGE;
        self.velocity_nu = self.signed(self.duty * FREE_SPEED_NU);
        Ok(())
    }

    fn set_velocity_nu(&mut self, nu: f64) -> Result<(), MotorError> {
        self.record(NativeCommand::VelocityNu(nu));
        self.velocity_nu = self.signed(nu);
        Ok(())
    }

    fn set_position_nu(&mut self, nu: f64) -> Result<(), MotorError> {
        self.record(NativeCommand::PositionNu(nu));
        self.position_nu = self.signed(nu);
        self.velocity_nu = 0.0;
        self.position_sampled_at = Instant::now();
        Ok(())
    }

    fn set_motion_profile_nu(&mut self, nu: f64) -> Result<(), MotorError> {
        self.record(NativeCommand::MotionProfileNu(nu));
        self.position_nu = self.signed(nu);
        self.velocity_nu = 0.0;
        self.position_sampled_at = Instant::now();
        Ok(())
    }

    fn set_encoder_position_nu(&mut self, nu: f64) -> Result<(), MotorError> {
        self.position_nu = nu;
        self.position_sampled_at = Instant::now();
        Ok(())
    }

    fn get_velocity_nu(&mut self) -> Result<TimestampedSignal<f64>, MotorError> {
        Ok(TimestampedSignal::now(self.velocity_nu))
    }

    fn get_position_nu(
        &mut self,
        latency_compensated: bool,
    ) -> Result<TimestampedSignal<f64>, MotorError> {
        let mut nu = self.position_nu;
        if latency_compensated {
            // Velocity NU / velocity_constant = motor RPM; convert to
            // position NU per second through the profile before extrapolating
            let elapsed = self.position_sampled_at.elapsed().as_secs_f64();
            let rate = self.velocity_nu * self.conversion.position_constant()
                / (self.conversion.velocity_constant() * 60.0);
            nu += rate * elapsed;
        }
        Ok(TimestampedSignal::now(nu))
    }

    fn get_supplied_voltage(&mut self) -> Result<TimestampedSignal<f64>, MotorError> {
        Ok(TimestampedSignal::now(SUPPLIED_VOLTAGE))
    }

    fn get_applied_duty_cycle(&mut self) -> Result<TimestampedSignal<f64>, MotorError> {
        Ok(TimestampedSignal::now(self.duty))
    }

    fn set_pid(&mut self, constants: PidConstants) -> Result<(), MotorError> {
        self.pid.set(constants);
        Ok(())
    }

    fn get_pid(&self) -> PidConstants {
        self.pid.get()
    }

    fn set_brake(&mut self, brake: bool) -> Result<(), MotorError> {
        self.brake = brake;
        Ok(())
    }

    fn set_inverted(&mut self, inverted: bool) -> Result<(), MotorError> {
        self.inverted = inverted;
        Ok(())
    }

    fn set_supply_current_limit(&mut self, _amps: f64) -> Result<(), MotorError> {
        Ok(())
    }

    fn set_stator_current_limit(&mut self, _amps: f64) -> Result<(), MotorError> {
        Ok(())
    }

    fn set_forward_limit_switch_normally_closed(&mut self, _closed: bool) -> Result<(), MotorError> {
        Ok(())
    }

    fn set_reverse_limit_switch_normally_closed(&mut self, _closed: bool) -> Result<(), MotorError> {
        Ok(())
    }

    fn get_forward_limit_switch(&mut self) -> Result<TimestampedSignal<bool>, MotorError> {
        Ok(TimestampedSignal::now(self.forward_limit))
    }

    fn get_reverse_limit_switch(&mut self) -> Result<TimestampedSignal<bool>, MotorError> {
        Ok(TimestampedSignal::now(self.reverse_limit))
    }

    fn set_motion_profile_cruise_velocity(&mut self, _nu_per_s: f64) -> Result<(), MotorError> {
        Ok(())
    }

    fn set_motion_profile_acceleration(&mut self, _nu_per_s2: f64) -> Result<(), MotorError> {
        Ok(())
    }

    fn set_next_arb_feedforward(&mut self, volts: f64) {
        self.arb_feedforward_v = volts;
    }

    fn set_slot(&mut self, slot: usize) {
        self.pid.select(slot);
        self.slot = self.pid.active_slot();
    }

    fn use_foc(&mut self, foc: bool) {
        self.foc = foc;
    }

    fn set_next_output_type(&mut self, output: OutputType) {
        self.output = output;
    }

    fn conversion(&self) -> &ConversionProfile {
        &self.conversion
    }

    fn set_conversion(&mut self, profile: ConversionProfile) {
        self.conversion = profile;
    }
}

/// Simulated absolute encoder backed by a shared angle cell, so tests and the
/// sim runtime can move the "wheel" from outside the module.
pub struct SimAbsoluteEncoder {
    angle: Arc<Mutex<f64>>,
    offset_rad: f64,
}

/// Writer side of a [`SimAbsoluteEncoder`].
#[derive(Clone)]
pub struct SimEncoderHandle {
    angle: Arc<Mutex<f64>>,
}

impl SimEncoderHandle {
    /// Set the raw (pre-offset) angle in radians.
    pub fn set_angle(&self, radians: f64) {
        *self.angle.lock().unwrap() = radians;
    }
}

impl SimAbsoluteEncoder {
    pub fn new() -> Self {
        Self {
            angle: Arc::new(Mutex::new(0.0)),
            offset_rad: 0.0,
        }
    }

    pub fn handle(&self) -> SimEncoderHandle {
        SimEncoderHandle {
            angle: Arc::clone(&self.angle),
        }
    }
}

impl Default for SimAbsoluteEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl AbsoluteEncoder for SimAbsoluteEncoder {
    fn get_absolute_angle(&mut self) -> Result<TimestampedSignal<f64>, MotorError> {
        let raw = *self.angle.lock().unwrap();
        Ok(TimestampedSignal::now(offset_angle(raw, self.offset_rad)))
    }

    fn set_absolute_offset(&mut self, offset_rad: f64) {
        self.offset_rad = offset_rad;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn sim() -> SimController {
        SimController::new(ConversionProfile::new(6.75, 0.1016, 1.0, 1.0).unwrap())
    }

    #[test]
    fn velocity_setpoint_tracks_immediately() {
        let mut motor = sim();
        motor.set_velocity_nu(1200.0).unwrap();
        assert_eq!(motor.get_velocity_nu().unwrap().get(), 1200.0);
    }

    #[test]
    fn inversion_flips_commanded_direction() {
        let mut motor = sim();
        motor.set_inverted(true).unwrap();
        motor.set_velocity_nu(500.0).unwrap();
        assert_eq!(motor.get_velocity_nu().unwrap().get(), -500.0);
        // Recorded command keeps the caller's value
        assert_eq!(motor.last_velocity_nu(), Some(500.0));
    }

    #[test]
    fn raw_position_ignores_latency_compensation_request() {
        let mut motor = sim();
        motor.set_encoder_position_nu(42.0).unwrap();
        motor.velocity_nu = 0.0;
        assert_eq!(motor.get_position_nu(true).unwrap().get(), 42.0);
        assert_eq!(motor.get_position_nu(false).unwrap().get(), 42.0);
    }

    #[test]
    fn latency_compensation_uses_profile_rate() {
        use std::time::Duration;

        // Counts-based profile: velocity NU are counts/s, position NU counts
        let profile = ConversionProfile::new(1.0, 0.1016, 4096.0 / 60.0, 4096.0).unwrap();
        let mut motor = SimController::new(profile);
        motor.set_velocity_mps(1.0).unwrap();

        // 1 m/s for 200 ms of sample age extrapolates to ~0.2 m
        motor.position_sampled_at = Instant::now() - Duration::from_millis(200);
        let meters = motor.get_distance_meters(true).unwrap().get();
        assert!((meters - 0.2).abs() < 0.01, "extrapolated {} m", meters);
    }

    #[test]
    fn encoder_offset_is_applied() {
        let mut encoder = SimAbsoluteEncoder::new();
        let handle = encoder.handle();
        handle.set_angle(PI);
        encoder.set_absolute_offset(PI / 2.0);
        let angle = encoder.get_absolute_angle().unwrap().get();
        assert!((angle - PI / 2.0).abs() < 1e-12);
    }
}
