// Serial smart-servo adapter (Feetech STS-class controllers).
//
// Wire protocol is Dynamixel-1.0-shaped:
//   [0xFF, 0xFF, id, length, instruction, params..., checksum]
// with a ones'-complement checksum over everything after the header and
// sign-magnitude encoding for signed 16-bit registers.
//
// Capability gaps of this controller class, handled per the interface
// contract (degrade + log, never error):
//   - no FOC commutation: requests with FOC drive without it
//   - no torque-current output domain: falls back to duty cycle
//   - no arbitrary feedforward input: ignored
//   - one hardware gain bank: slots 0-2 are stored host-side and the active
//     slot's gains are written to the bank on selection
//   - no supply-side current limit: only the stator (torque) limit maps to
//     hardware
// Limit switches are synthesized host-side from the configured min/max angle
// limits against present position.

use serialport::SerialPort;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

use super::controller::{MotorController, MotorError};
use super::conversion::ConversionProfile;
use super::pid::{PidConstants, PidSlots};
use super::request::OutputType;
use super::signal::TimestampedSignal;

pub const DEFAULT_BAUDRATE: u32 = 1_000_000;
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Encoder counts per output rotation of the servo magnet.
pub const COUNTS_PER_ROTATION: f64 = 4096.0;

/// Stall current of the STS-class power stage, used to scale the torque
/// limit register (per-mille of stall).
const STALL_CURRENT_A: f64 = 3.5;

const HEADER: [u8; 2] = [0xFF, 0xFF];
const BROADCAST_ID: u8 = 0xFE;

#[repr(u8)]
#[derive(Debug, Clone, Copy)]
enum Instruction {
    Ping = 0x01,
    Read = 0x02,
    Write = 0x03,
    SyncWrite = 0x83,
}

/// Register map for the STS controller class.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    // EEPROM
    ModelNumber = 3,
    Id = 5,
    BaudRate = 6,
    MinAngleLimit = 9,
    MaxAngleLimit = 11,
    PCoefficient = 21,
    DCoefficient = 22,
    ICoefficient = 23,

    // RAM
    OperatingMode = 33,
    TorqueEnable = 40,
    Acceleration = 41,
    GoalPosition = 42,
    GoalPwm = 44,
    GoalVelocity = 46,
    TorqueLimit = 48,
    Lock = 55,
    PresentPosition = 56,
    PresentVelocity = 58,
    PresentLoad = 60,
    PresentVoltage = 62,
    Moving = 66,
}

impl Register {
    /// Width of the register in bytes.
    fn width(self) -> u8 {
        match self {
            Register::Id
            | Register::BaudRate
            | Register::PCoefficient
            | Register::DCoefficient
            | Register::ICoefficient
            | Register::OperatingMode
            | Register::TorqueEnable
            | Register::Acceleration
            | Register::Lock
            | Register::PresentVoltage
            | Register::Moving => 1,
            _ => 2,
        }
    }

    /// True for registers holding sign-magnitude signed values.
    fn signed(self) -> bool {
        matches!(
            self,
            Register::GoalPwm
                | Register::GoalVelocity
                | Register::PresentVelocity
                | Register::PresentLoad
        )
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingMode {
    Position = 0,
    Velocity = 1,
    Pwm = 2,
}

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid response from servo {id}: {reason}")]
    InvalidResponse { id: u8, reason: String },

    #[error("checksum mismatch in response from servo {id}")]
    ChecksumMismatch { id: u8 },

    #[error("servo {id} reported error status 0x{status:02X}")]
    ServoError { id: u8, status: u8 },

    #[error("timeout waiting for response from servo {id}")]
    Timeout { id: u8 },
}

fn checksum(data: &[u8]) -> u8 {
    let sum: u16 = data.iter().map(|&b| b as u16).sum();
    (!sum & 0xFF) as u8
}

/// Sign-magnitude: bit 15 = negative, bits 0-14 = magnitude.
fn encode_sign_magnitude(value: i16) -> u16 {
    if value >= 0 {
        value as u16
    } else {
        0x8000 | (-(value as i32)) as u16
    }
}

fn decode_sign_magnitude(raw: u16) -> i16 {
    let magnitude = (raw & 0x7FFF) as i16;
    if raw & 0x8000 != 0 { -magnitude } else { magnitude }
}

/// The serial bus servicing one or more servos.
pub struct StsBus {
    port: Box<dyn SerialPort>,
}

impl StsBus {
    pub fn open(port_name: &str) -> Result<Self, BusError> {
        Self::open_with_baudrate(port_name, DEFAULT_BAUDRATE)
    }

    pub fn open_with_baudrate(port_name: &str, baudrate: u32) -> Result<Self, BusError> {
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;
        Ok(Self { port })
    }

    /// Wrap an already-open port (or an in-memory one, in tests).
    pub fn from_port(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }

    fn build_packet(id: u8, instruction: Instruction, params: &[u8]) -> Vec<u8> {
        let length = (params.len() + 2) as u8;
        let mut packet = Vec::with_capacity(6 + params.len());
        packet.extend_from_slice(&HEADER);
        packet.push(id);
        packet.push(length);
        packet.push(instruction as u8);
        packet.extend_from_slice(params);
        packet.push(checksum(&packet[2..]));
        packet
    }

    fn send(&mut self, packet: &[u8]) -> Result<(), BusError> {
        self.port.write_all(packet)?;
        self.port.flush()?;
        Ok(())
    }

    fn read_response(&mut self, expected_id: u8) -> Result<Vec<u8>, BusError> {
        let mut header = [0u8; 2];
        self.port.read_exact(&mut header).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                BusError::Timeout { id: expected_id }
            } else {
                BusError::Io(e)
            }
        })?;

        if header != HEADER {
            return Err(BusError::InvalidResponse {
                id: expected_id,
                reason: format!("bad header {:02X?}", header),
            });
        }

        let mut id_length = [0u8; 2];
        self.port.read_exact(&mut id_length)?;
        let [id, length] = id_length;

        if id != expected_id {
            return Err(BusError::InvalidResponse {
                id: expected_id,
                reason: format!("id mismatch (got {})", id),
            });
        }

        let mut body = vec![0u8; length as usize];
        self.port.read_exact(&mut body)?;

        let mut covered = vec![id, length];
        covered.extend_from_slice(&body[..body.len() - 1]);
        if checksum(&covered) != body[body.len() - 1] {
            return Err(BusError::ChecksumMismatch { id });
        }

        let status = body[0];
        if status != 0 {
            return Err(BusError::ServoError { id, status });
        }

        Ok(body[1..body.len() - 1].to_vec())
    }

    /// Check whether a servo answers on the bus.
    pub fn ping(&mut self, id: u8) -> Result<bool, BusError> {
        let packet = Self::build_packet(id, Instruction::Ping, &[]);
        self.send(&packet)?;
        match self.read_response(id) {
            Ok(_) => Ok(true),
            Err(BusError::Timeout { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Read a register, decoding width and signedness from the map.
    pub fn read(&mut self, id: u8, register: Register) -> Result<i32, BusError> {
        let params = [register as u8, register.width()];
        let packet = Self::build_packet(id, Instruction::Read, &params);
        self.send(&packet)?;

        let response = self.read_response(id)?;
        if response.len() < register.width() as usize {
            return Err(BusError::InvalidResponse {
                id,
                reason: format!(
                    "expected {} bytes for {:?}, got {}",
                    register.width(),
                    register,
                    response.len()
                ),
            });
        }

        let raw = if register.width() == 1 {
            response[0] as u16
        } else {
            u16::from_le_bytes([response[0], response[1]])
        };

        Ok(if register.signed() {
            decode_sign_magnitude(raw) as i32
        } else {
            raw as i32
        })
    }

    /// Write a register, encoding width and signedness from the map.
    pub fn write(&mut self, id: u8, register: Register, value: i32) -> Result<(), BusError> {
        debug!(id, ?register, value, "register write");
        let raw = if register.signed() {
            encode_sign_magnitude(value.clamp(i16::MIN as i32, i16::MAX as i32) as i16)
        } else {
            value.clamp(0, u16::MAX as i32) as u16
        };

        let params: Vec<u8> = if register.width() == 1 {
            vec![register as u8, (raw & 0xFF) as u8]
        } else {
            vec![register as u8, (raw & 0xFF) as u8, (raw >> 8) as u8]
        };

        let packet = Self::build_packet(id, Instruction::Write, &params);
        self.send(&packet)?;
        self.read_response(id)?;
        Ok(())
    }

    /// Write the same 2-byte register on several servos in one packet.
    /// Sync writes get no response.
    pub fn sync_write(&mut self, register: Register, data: &[(u8, i16)]) -> Result<(), BusError> {
        if data.is_empty() {
            return Ok(());
        }

        let mut params = vec![register as u8, 2];
        for &(id, value) in data {
            let raw = if register.signed() {
                encode_sign_magnitude(value)
            } else {
                value as u16
            };
            params.push(id);
            params.push((raw & 0xFF) as u8);
            params.push((raw >> 8) as u8);
        }

        let packet = Self::build_packet(BROADCAST_ID, Instruction::SyncWrite, &params);
        debug!(count = data.len(), ?register, "sync write");
        self.send(&packet)
    }

    pub fn enable_torque(&mut self, id: u8) -> Result<(), BusError> {
        self.write(id, Register::TorqueEnable, 1)?;
        self.write(id, Register::Lock, 1)
    }

    pub fn disable_torque(&mut self, id: u8) -> Result<(), BusError> {
        self.write(id, Register::TorqueEnable, 0)?;
        self.write(id, Register::Lock, 0)
    }

    pub fn set_operating_mode(&mut self, id: u8, mode: OperatingMode) -> Result<(), BusError> {
        self.write(id, Register::OperatingMode, mode as i32)
    }
}

/// A bus shared by the controllers attached to it.
pub type SharedBus = Arc<Mutex<StsBus>>;

pub fn shared_bus(bus: StsBus) -> SharedBus {
    Arc::new(Mutex::new(bus))
}

/// One STS-class servo as a [`MotorController`].
pub struct StsController {
    bus: SharedBus,
    id: u8,
    conversion: ConversionProfile,
    pid: PidSlots,

    mode: Option<OperatingMode>,
    inverted: bool,
    // Host-side encoder seed: reported NU = raw NU + offset
    encoder_offset_nu: f64,
    // Cruise velocity for motion-profiled moves, NU/s
    profile_cruise_nu: f64,
    last_velocity: Option<TimestampedSignal<f64>>,

    // Synthesized limit switches, thresholds in hardware-frame counts
    min_limit_counts: Option<f64>,
    max_limit_counts: Option<f64>,
    forward_normally_closed: bool,
    reverse_normally_closed: bool,

    arb_feedforward_v: f64,
    warned_foc: bool,
    warned_feedforward: bool,
    warned_current_output: bool,
}

impl StsController {
    /// Native units of this controller class: position NU are encoder counts
    /// (4096 per rotation), velocity NU are counts per second. Default wheel
    /// diameter is 4 inches; module setup overrides the mechanism.
    pub fn default_conversion() -> ConversionProfile {
        ConversionProfile::new(
            1.0,
            0.1016,
            COUNTS_PER_ROTATION / 60.0,
            COUNTS_PER_ROTATION,
        )
        .expect("constants are positive")
    }

    pub fn new(bus: SharedBus, id: u8) -> Self {
        Self {
            bus,
            id,
            conversion: Self::default_conversion(),
            pid: PidSlots::default(),
            mode: None,
            inverted: false,
            encoder_offset_nu: 0.0,
            profile_cruise_nu: 0.0,
            last_velocity: None,
            min_limit_counts: None,
            max_limit_counts: None,
            forward_normally_closed: false,
            reverse_normally_closed: false,
            arb_feedforward_v: 0.0,
            warned_foc: false,
            warned_feedforward: false,
            warned_current_output: false,
        }
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    fn with_bus<T>(
        &self,
        f: impl FnOnce(&mut StsBus) -> Result<T, BusError>,
    ) -> Result<T, MotorError> {
        let mut bus = self.bus.lock().expect("sts bus poisoned");
        f(&mut bus).map_err(MotorError::from)
    }

    /// Switch operating mode if needed; mode changes require torque off.
    fn ensure_mode(&mut self, mode: OperatingMode) -> Result<(), MotorError> {
        if self.mode == Some(mode) {
            return Ok(());
        }
        let id = self.id;
        self.with_bus(|bus| {
            bus.disable_torque(id)?;
            bus.set_operating_mode(id, mode)?;
            bus.enable_torque(id)
        })?;
        self.mode = Some(mode);
        Ok(())
    }

    fn signed(&self, value: f64) -> f64 {
        if self.inverted { -value } else { value }
    }

    /// Present position in the hardware frame: raw counts, no inversion,
    /// no host-side seed. The angle-limit registers live in this frame.
    fn hardware_position(&self) -> Result<f64, MotorError> {
        let id = self.id;
        let raw = self.with_bus(|bus| bus.read(id, Register::PresentPosition))?;
        Ok(raw as f64)
    }

    /// Present position in the caller's frame, before the seed offset.
    fn raw_position_nu(&self) -> Result<f64, MotorError> {
        Ok(self.signed(self.hardware_position()?))
    }

    /// Write the active slot's gains to the single hardware gain bank.
    fn push_gains(&mut self) -> Result<(), MotorError> {
        let gains = self.pid.get();
        let id = self.id;
        let p = (gains.kp.clamp(0.0, 254.0)) as i32;
        let i = (gains.ki.clamp(0.0, 254.0)) as i32;
        let d = (gains.kd.clamp(0.0, 254.0)) as i32;
        self.with_bus(|bus| {
            bus.write(id, Register::PCoefficient, p)?;
            bus.write(id, Register::ICoefficient, i)?;
            bus.write(id, Register::DCoefficient, d)
        })
    }
}

impl MotorController for StsController {
    fn set_duty_cycle(&mut self, fraction: f64) -> Result<(), MotorError> {
        self.ensure_mode(OperatingMode::Pwm)?;
        let id = self.id;
        let pwm = (self.signed(fraction).clamp(-1.0, 1.0) * 1000.0).round() as i32;
        self.with_bus(|bus| bus.write(id, Register::GoalPwm, pwm))
    }

    fn set_voltage(&mut self, volts: f64) -> Result<(), MotorError> {
        let supplied = self.get_supplied_voltage()?.get();
        self.set_duty_cycle(volts / supplied)
    }

    fn set_velocity_nu(&mut self, nu: f64) -> Result<(), MotorError> {
        self.ensure_mode(OperatingMode::Velocity)?;
        let id = self.id;
        let counts = self.signed(nu).round() as i32;
        self.with_bus(|bus| bus.write(id, Register::GoalVelocity, counts))
    }

    fn set_position_nu(&mut self, nu: f64) -> Result<(), MotorError> {
        self.ensure_mode(OperatingMode::Position)?;
        let id = self.id;
        // Reads report signed(counts) + offset; invert that mapping so the
        // reported position lands exactly on the setpoint
        let counts = self.signed(nu - self.encoder_offset_nu).round() as i32;
        self.with_bus(|bus| {
            // Zero goal velocity means "as fast as the profile allows"
            bus.write(id, Register::GoalVelocity, 0)?;
            bus.write(id, Register::GoalPosition, counts)
        })
    }

    fn set_motion_profile_nu(&mut self, nu: f64) -> Result<(), MotorError> {
        self.ensure_mode(OperatingMode::Position)?;
        let id = self.id;
        let counts = self.signed(nu - self.encoder_offset_nu).round() as i32;
        let cruise = self.profile_cruise_nu.round() as i32;
        self.with_bus(|bus| {
            bus.write(id, Register::GoalVelocity, cruise)?;
            bus.write(id, Register::GoalPosition, counts)
        })
    }

    fn set_encoder_position_nu(&mut self, nu: f64) -> Result<(), MotorError> {
        // The servo cannot seed its magnet position; keep the seed host-side.
        // raw_position_nu is offset-free, so the new offset replaces the old
        // one instead of stacking on it.
        self.encoder_offset_nu = nu - self.raw_position_nu()?;
        Ok(())
    }

    fn get_velocity_nu(&mut self) -> Result<TimestampedSignal<f64>, MotorError> {
        let id = self.id;
        let counts = self.with_bus(|bus| bus.read(id, Register::PresentVelocity))?;
        let signal = TimestampedSignal::now(self.signed(counts as f64));
        self.last_velocity = Some(signal);
        Ok(signal)
    }

    fn get_position_nu(
        &mut self,
        latency_compensated: bool,
    ) -> Result<TimestampedSignal<f64>, MotorError> {
        let nu = self.raw_position_nu()? + self.encoder_offset_nu;
        let signal = TimestampedSignal::now(nu);

        if !latency_compensated {
            return Ok(signal);
        }

        // No onboard compensation on this controller; extrapolate from the
        // last velocity sample. Velocity NU are counts per second.
        match self.last_velocity {
            Some(velocity) => {
                let elapsed = velocity.timestamp().elapsed().as_secs_f64();
                Ok(signal.map(|nu| nu + velocity.get() * elapsed))
            }
            None => Ok(signal),
        }
    }

    fn get_supplied_voltage(&mut self) -> Result<TimestampedSignal<f64>, MotorError> {
        let id = self.id;
        // Register unit is 0.1 V
        let raw = self.with_bus(|bus| bus.read(id, Register::PresentVoltage))?;
        Ok(TimestampedSignal::now(raw as f64 / 10.0))
    }

    fn get_applied_duty_cycle(&mut self) -> Result<TimestampedSignal<f64>, MotorError> {
        let id = self.id;
        // Load register is signed per-mille of full output
        let raw = self.with_bus(|bus| bus.read(id, Register::PresentLoad))?;
        Ok(TimestampedSignal::now(self.signed(raw as f64 / 1000.0)))
    }

    fn set_pid(&mut self, constants: PidConstants) -> Result<(), MotorError> {
        self.pid.set(constants);
        self.push_gains()
    }

    fn get_pid(&self) -> PidConstants {
        self.pid.get()
    }

    fn set_brake(&mut self, brake: bool) -> Result<(), MotorError> {
        // Coast = torque off; brake = hold with torque on
        let id = self.id;
        self.with_bus(|bus| {
            if brake {
                bus.enable_torque(id)
            } else {
                bus.disable_torque(id)
            }
        })
    }

    fn set_inverted(&mut self, inverted: bool) -> Result<(), MotorError> {
        self.inverted = inverted;
        Ok(())
    }

    fn set_supply_current_limit(&mut self, amps: f64) -> Result<(), MotorError> {
        debug!(id = self.id, amps, "supply current limit not supported on STS, ignoring");
        Ok(())
    }

    fn set_stator_current_limit(&mut self, amps: f64) -> Result<(), MotorError> {
        let id = self.id;
        let per_mille = ((amps / STALL_CURRENT_A) * 1000.0).clamp(0.0, 1000.0) as i32;
        self.with_bus(|bus| bus.write(id, Register::TorqueLimit, per_mille))
    }

    fn set_forward_limit_switch_normally_closed(&mut self, closed: bool) -> Result<(), MotorError> {
        self.forward_normally_closed = closed;
        let id = self.id;
        let max = self.with_bus(|bus| bus.read(id, Register::MaxAngleLimit))?;
        self.max_limit_counts = Some(max as f64);
        Ok(())
    }

    fn set_reverse_limit_switch_normally_closed(&mut self, closed: bool) -> Result<(), MotorError> {
        self.reverse_normally_closed = closed;
        let id = self.id;
        let min = self.with_bus(|bus| bus.read(id, Register::MinAngleLimit))?;
        self.min_limit_counts = Some(min as f64);
        Ok(())
    }

    fn get_forward_limit_switch(&mut self) -> Result<TimestampedSignal<bool>, MotorError> {
        // Limits and present position compare in the hardware frame; the
        // host-side seed and inversion never shift the thresholds
        let position = self.hardware_position()?;
        let at_limit = self.max_limit_counts.is_some_and(|max| position >= max);
        Ok(TimestampedSignal::now(
            at_limit != self.forward_normally_closed,
        ))
    }

    fn get_reverse_limit_switch(&mut self) -> Result<TimestampedSignal<bool>, MotorError> {
        let position = self.hardware_position()?;
        let at_limit = self.min_limit_counts.is_some_and(|min| position <= min);
        Ok(TimestampedSignal::now(
            at_limit != self.reverse_normally_closed,
        ))
    }

    fn set_motion_profile_cruise_velocity(&mut self, nu_per_s: f64) -> Result<(), MotorError> {
        self.profile_cruise_nu = nu_per_s;
        Ok(())
    }

    fn set_motion_profile_acceleration(&mut self, nu_per_s2: f64) -> Result<(), MotorError> {
        let id = self.id;
        // Acceleration register unit is 100 counts/s²
        let value = (nu_per_s2 / 100.0).round().clamp(0.0, 254.0) as i32;
        self.with_bus(|bus| bus.write(id, Register::Acceleration, value))
    }

    fn set_next_arb_feedforward(&mut self, volts: f64) {
        if volts != 0.0 && !self.warned_feedforward {
            warn!(id = self.id, "STS has no feedforward input, ignoring");
            self.warned_feedforward = true;
        }
        self.arb_feedforward_v = volts;
    }

    fn set_slot(&mut self, slot: usize) {
        let previous = self.pid.active_slot();
        self.pid.select(slot);
        if self.pid.active_slot() != previous {
            // New slot's gains go into the single hardware bank
            if let Err(e) = self.push_gains() {
                warn!(id = self.id, error = %e, "failed to push gains for new slot");
            }
        }
    }

    fn use_foc(&mut self, foc: bool) {
        if foc && !self.warned_foc {
            warn!(id = self.id, "STS does not support FOC, driving without it");
            self.warned_foc = true;
        }
    }

    fn set_next_output_type(&mut self, output: OutputType) {
        // The servo's internal loop owns the power stage; the output domain
        // distinction does not reach the hardware.
        if output == OutputType::Current && !self.warned_current_output {
            warn!(id = self.id, "torque-current output not supported on STS, using duty cycle");
            self.warned_current_output = true;
        }
    }

    fn conversion(&self) -> &ConversionProfile {
        &self.conversion
    }

    fn set_conversion(&mut self, profile: ConversionProfile) {
        self.conversion = profile;
    }
}

/// Magnetic absolute encoder on the same bus (a gearless STS servo used as
/// an angle sensor, torque never enabled).
pub struct StsAbsoluteEncoder {
    bus: SharedBus,
    id: u8,
    offset_rad: f64,
}

impl StsAbsoluteEncoder {
    pub fn new(bus: SharedBus, id: u8) -> Self {
        Self {
            bus,
            id,
            offset_rad: 0.0,
        }
    }
}

impl super::encoder::AbsoluteEncoder for StsAbsoluteEncoder {
    fn get_absolute_angle(&mut self) -> Result<TimestampedSignal<f64>, MotorError> {
        let raw = {
            let mut bus = self.bus.lock().expect("sts bus poisoned");
            bus.read(self.id, Register::PresentPosition)
                .map_err(MotorError::from)?
        };
        let radians = raw as f64 / COUNTS_PER_ROTATION * 2.0 * std::f64::consts::PI;
        Ok(TimestampedSignal::now(super::encoder::offset_angle(
            radians,
            self.offset_rad,
        )))
    }

    fn set_absolute_offset(&mut self, offset_rad: f64) {
        self.offset_rad = offset_rad;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serialport::{ClearBuffer, DataBits, FlowControl, Parity, StopBits};
    use std::collections::VecDeque;
    use std::io;

    /// In-memory servo behind a fake serial port: parses instruction packets
    /// written to it and answers from a shared register file.
    struct MockServo {
        id: u8,
        registers: Arc<Mutex<[u8; 70]>>,
        rx: Vec<u8>,
        tx: VecDeque<u8>,
    }

    /// Test-side access to a [`MockServo`]'s register file.
    #[derive(Clone)]
    struct ServoHandle(Arc<Mutex<[u8; 70]>>);

    impl ServoHandle {
        fn set_u16(&self, register: Register, value: u16) {
            let mut registers = self.0.lock().unwrap();
            let addr = register as usize;
            registers[addr] = (value & 0xFF) as u8;
            registers[addr + 1] = (value >> 8) as u8;
        }

        fn get_u16(&self, register: Register) -> u16 {
            let registers = self.0.lock().unwrap();
            let addr = register as usize;
            u16::from_le_bytes([registers[addr], registers[addr + 1]])
        }
    }

    impl MockServo {
        fn new(id: u8) -> Self {
            Self {
                id,
                registers: Arc::new(Mutex::new([0; 70])),
                rx: Vec::new(),
                tx: VecDeque::new(),
            }
        }

        fn handle(&self) -> ServoHandle {
            ServoHandle(Arc::clone(&self.registers))
        }

        fn reply(&mut self, params: &[u8]) {
            let mut covered = vec![self.id, (params.len() + 2) as u8, 0];
            covered.extend_from_slice(params);
            let check = checksum(&covered);
            self.tx.extend(HEADER);
            self.tx.extend(covered);
            self.tx.push_back(check);
        }

        fn process(&mut self) {
            while self.rx.len() >= 6 {
                let length = self.rx[3] as usize;
                let total = 4 + length;
                if self.rx.len() < total {
                    break;
                }
                let packet: Vec<u8> = self.rx.drain(..total).collect();
                if packet[2] != self.id && packet[2] != BROADCAST_ID {
                    continue;
                }
                let instruction = packet[4];
                let params = packet[5..total - 1].to_vec();
                match instruction {
                    0x01 => self.reply(&[]),
                    0x02 => {
                        let addr = params[0] as usize;
                        let count = params[1] as usize;
                        let data: Vec<u8> =
                            self.registers.lock().unwrap()[addr..addr + count].to_vec();
                        self.reply(&data);
                    }
                    0x03 => {
                        let addr = params[0] as usize;
                        let mut registers = self.registers.lock().unwrap();
                        for (i, &byte) in params[1..].iter().enumerate() {
                            registers[addr + i] = byte;
                        }
                        drop(registers);
                        self.reply(&[]);
                    }
                    _ => {}
                }
            }
        }
    }

    impl io::Read for MockServo {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.tx.is_empty() {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
            }
            let n = buf.len().min(self.tx.len());
            for slot in buf.iter_mut().take(n) {
                *slot = self.tx.pop_front().unwrap();
            }
            Ok(n)
        }
    }

    impl io::Write for MockServo {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.rx.extend_from_slice(buf);
            self.process();
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SerialPort for MockServo {
        fn name(&self) -> Option<String> {
            None
        }
        fn baud_rate(&self) -> serialport::Result<u32> {
            Ok(DEFAULT_BAUDRATE)
        }
        fn data_bits(&self) -> serialport::Result<DataBits> {
            Ok(DataBits::Eight)
        }
        fn flow_control(&self) -> serialport::Result<FlowControl> {
            Ok(FlowControl::None)
        }
        fn parity(&self) -> serialport::Result<Parity> {
            Ok(Parity::None)
        }
        fn stop_bits(&self) -> serialport::Result<StopBits> {
            Ok(StopBits::One)
        }
        fn timeout(&self) -> Duration {
            Duration::from_millis(DEFAULT_TIMEOUT_MS)
        }
        fn set_baud_rate(&mut self, _: u32) -> serialport::Result<()> {
            Ok(())
        }
        fn set_data_bits(&mut self, _: DataBits) -> serialport::Result<()> {
            Ok(())
        }
        fn set_flow_control(&mut self, _: FlowControl) -> serialport::Result<()> {
            Ok(())
        }
        fn set_parity(&mut self, _: Parity) -> serialport::Result<()> {
            Ok(())
        }
        fn set_stop_bits(&mut self, _: StopBits) -> serialport::Result<()> {
            Ok(())
        }
        fn set_timeout(&mut self, _: Duration) -> serialport::Result<()> {
            Ok(())
        }
        fn write_request_to_send(&mut self, _: bool) -> serialport::Result<()> {
            Ok(())
        }
        fn write_data_terminal_ready(&mut self, _: bool) -> serialport::Result<()> {
            Ok(())
        }
        fn read_clear_to_send(&mut self) -> serialport::Result<bool> {
            Ok(false)
        }
        fn read_data_set_ready(&mut self) -> serialport::Result<bool> {
            Ok(false)
        }
        fn read_ring_indicator(&mut self) -> serialport::Result<bool> {
            Ok(false)
        }
        fn read_carrier_detect(&mut self) -> serialport::Result<bool> {
            Ok(false)
        }
        fn bytes_to_read(&self) -> serialport::Result<u32> {
            Ok(self.tx.len() as u32)
        }
        fn bytes_to_write(&self) -> serialport::Result<u32> {
            Ok(0)
        }
        fn clear(&self, _: ClearBuffer) -> serialport::Result<()> {
            Ok(())
        }
        fn try_clone(&self) -> serialport::Result<Box<dyn SerialPort>> {
            Err(serialport::Error::new(
                serialport::ErrorKind::Unknown,
                "mock port cannot be cloned",
            ))
        }
        fn set_break(&self) -> serialport::Result<()> {
            Ok(())
        }
        fn clear_break(&self) -> serialport::Result<()> {
            Ok(())
        }
    }

    fn mock_controller(id: u8) -> (StsController, ServoHandle) {
        let servo = MockServo::new(id);
        let handle = servo.handle();
        let bus = shared_bus(StsBus::from_port(Box::new(servo)));
        (StsController::new(bus, id), handle)
    }

    #[test]
    fn checksum_matches_protocol() {
        // id=1, length=4, WRITE, addr=30, data 0,2 -> ~(1+4+3+30+0+2) = 215
        assert_eq!(checksum(&[1, 4, 0x03, 30, 0, 2]), 215);
    }

    #[test]
    fn sign_magnitude_round_trip() {
        for value in [0i16, 1, 100, 3000, -1, -100, -3000] {
            assert_eq!(decode_sign_magnitude(encode_sign_magnitude(value)), value);
        }
        assert_eq!(encode_sign_magnitude(-100), 0x8064);
        assert_eq!(decode_sign_magnitude(0x8001), -1);
    }

    #[test]
    fn ping_packet_layout() {
        let packet = StsBus::build_packet(1, Instruction::Ping, &[]);
        assert_eq!(packet.len(), 6);
        assert_eq!(&packet[..2], &HEADER);
        assert_eq!(packet[2], 1); // id
        assert_eq!(packet[3], 2); // length: instruction + checksum
        assert_eq!(packet[4], 0x01);
        assert_eq!(packet[5], checksum(&packet[2..5]));
    }

    #[test]
    fn write_packet_encodes_two_byte_register_little_endian() {
        let raw = encode_sign_magnitude(-300);
        let params = [
            Register::GoalVelocity as u8,
            (raw & 0xFF) as u8,
            (raw >> 8) as u8,
        ];
        let packet = StsBus::build_packet(7, Instruction::Write, &params);
        assert_eq!(packet[2], 7);
        assert_eq!(packet[4], 0x03);
        assert_eq!(packet[5], Register::GoalVelocity as u8);
        assert_eq!(
            u16::from_le_bytes([packet[6], packet[7]]),
            0x8000 | 300
        );
    }

    #[test]
    fn register_widths() {
        assert_eq!(Register::TorqueEnable.width(), 1);
        assert_eq!(Register::GoalPosition.width(), 2);
        assert!(Register::PresentVelocity.signed());
        assert!(!Register::PresentPosition.signed());
    }

    #[test]
    fn ping_and_register_round_trip_over_mock_bus() {
        let (motor, servo) = mock_controller(5);
        servo.set_u16(Register::PresentPosition, 1234);

        let mut bus = motor.bus.lock().unwrap();
        assert!(bus.ping(5).unwrap());
        assert_eq!(bus.read(5, Register::PresentPosition).unwrap(), 1234);
        bus.write(5, Register::GoalVelocity, -300).unwrap();
        drop(bus);
        assert_eq!(servo.get_u16(Register::GoalVelocity), 0x8000 | 300);
    }

    #[test]
    fn encoder_seed_survives_reseeding() {
        let (mut motor, servo) = mock_controller(5);
        servo.set_u16(Register::PresentPosition, 40);
        motor.set_encoder_position_nu(100.0).unwrap();
        assert_eq!(motor.get_position_nu(false).unwrap().get(), 100.0);

        // The relative frame slipped; a fresh seed must land exactly on the
        // target, not stack onto the previous offset
        servo.set_u16(Register::PresentPosition, 70);
        motor.set_encoder_position_nu(100.0).unwrap();
        assert_eq!(motor.get_position_nu(false).unwrap().get(), 100.0);
    }

    #[test]
    fn inverted_goal_accounts_for_seed_frame() {
        let (mut motor, servo) = mock_controller(5);
        motor.set_inverted(true).unwrap();
        servo.set_u16(Register::PresentPosition, 4000);
        motor.set_encoder_position_nu(100.0).unwrap();

        // Reaching the written goal must put the reported position on the
        // setpoint: goal = signed(nu - offset) = -(120 - 4100) = 3980
        motor.set_position_nu(120.0).unwrap();
        assert_eq!(servo.get_u16(Register::GoalPosition), 3980);

        servo.set_u16(Register::PresentPosition, 3980);
        assert_eq!(motor.get_position_nu(false).unwrap().get(), 120.0);
    }

    #[test]
    fn limit_switches_compare_in_hardware_frame() {
        let (mut motor, servo) = mock_controller(5);
        servo.set_u16(Register::MinAngleLimit, 100);
        servo.set_u16(Register::MaxAngleLimit, 4000);
        motor.set_forward_limit_switch_normally_closed(false).unwrap();
        motor.set_reverse_limit_switch_normally_closed(false).unwrap();

        // A host-side seed must not shift the limit comparison
        servo.set_u16(Register::PresentPosition, 2000);
        motor.set_encoder_position_nu(0.0).unwrap();
        assert!(!motor.get_forward_limit_switch().unwrap().get());
        assert!(!motor.get_reverse_limit_switch().unwrap().get());

        servo.set_u16(Register::PresentPosition, 4050);
        assert!(motor.get_forward_limit_switch().unwrap().get());

        servo.set_u16(Register::PresentPosition, 50);
        assert!(motor.get_reverse_limit_switch().unwrap().get());
    }
}
