// Control requests: the commands a caller can issue to any motor controller.
//
// A request is a plain value built fresh per command. Applying it first
// pushes the pending output mode (output type, FOC, slot, feedforward) to the
// controller, then issues the matching NU-domain setpoint call. The set of
// variants is closed; adding one is a deliberate extension of the interface.

use super::controller::{MotorController, MotorError};

/// Which output domain a closed-loop request drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputType {
    #[default]
    DutyCycle,
    Voltage,
    Current,
}

/// Pending fields shared by the closed-loop variants.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClosedLoopOutput {
    pub use_foc: bool,
    pub slot: usize,
    pub arb_feedforward_v: f64,
    pub output: OutputType,
}

/// A single command for a motor controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlRequest {
    /// Open-loop voltage output.
    Voltage { volts: f64, use_foc: bool },
    /// Open-loop duty-cycle output, -1.0 to 1.0.
    DutyCycle { fraction: f64, use_foc: bool },
    /// Closed-loop velocity, setpoint in NU.
    Velocity { native: f64, output: ClosedLoopOutput },
    /// Closed-loop position, setpoint in NU.
    Position { native: f64, output: ClosedLoopOutput },
    /// Controller-internal trapezoidal profile to a position setpoint in NU.
    MotionProfile { native: f64, output: ClosedLoopOutput },
}

impl ControlRequest {
    pub fn voltage(volts: f64) -> Self {
        Self::Voltage {
            volts,
            use_foc: false,
        }
    }

    pub fn duty_cycle(fraction: f64) -> Self {
        Self::DutyCycle {
            fraction,
            use_foc: false,
        }
    }

    pub fn velocity(native: f64) -> Self {
        Self::Velocity {
            native,
            output: ClosedLoopOutput::default(),
        }
    }

    pub fn position(native: f64) -> Self {
        Self::Position {
            native,
            output: ClosedLoopOutput::default(),
        }
    }

    pub fn motion_profile(native: f64) -> Self {
        Self::MotionProfile {
            native,
            output: ClosedLoopOutput::default(),
        }
    }

    /// Enable or disable FOC commutation for this request.
    ///
    /// On hardware without FOC this is a capability gap: the controller
    /// drives without FOC and logs, the request still applies.
    pub fn with_foc(mut self, foc: bool) -> Self {
        match &mut self {
            Self::Voltage { use_foc, .. } | Self::DutyCycle { use_foc, .. } => *use_foc = foc,
            Self::Velocity { output, .. }
            | Self::Position { output, .. }
            | Self::MotionProfile { output, .. } => output.use_foc = foc,
        }
        self
    }

    /// Select the PID slot for a closed-loop request. No effect on the
    /// open-loop variants.
    pub fn with_slot(mut self, slot: usize) -> Self {
        if let Self::Velocity { output, .. }
        | Self::Position { output, .. }
        | Self::MotionProfile { output, .. } = &mut self
        {
            output.slot = slot;
        }
        self
    }

    /// Arbitrary feedforward in volts, added by the controller on top of the
    /// closed-loop output. No effect on the open-loop variants.
    pub fn with_feedforward(mut self, volts: f64) -> Self {
        if let Self::Velocity { output, .. }
        | Self::Position { output, .. }
        | Self::MotionProfile { output, .. } = &mut self
        {
            output.arb_feedforward_v = volts;
        }
        self
    }

    /// Output domain for a closed-loop request. No effect on the open-loop
    /// variants.
    pub fn with_output_type(mut self, output_type: OutputType) -> Self {
        if let Self::Velocity { output, .. }
        | Self::Position { output, .. }
        | Self::MotionProfile { output, .. } = &mut self
        {
            output.output = output_type;
        }
        self
    }

    /// Apply this request to a controller.
    ///
    /// The pending-state calls must happen before the setpoint call; the
    /// controller consumes them when it builds the native command.
    pub fn apply(&self, controller: &mut dyn MotorController) -> Result<(), MotorError> {
        match *self {
            Self::Voltage { volts, use_foc } => {
                controller.use_foc(use_foc);
                controller.set_voltage(volts)
            }
            Self::DutyCycle { fraction, use_foc } => {
                controller.use_foc(use_foc);
                controller.set_duty_cycle(fraction)
            }
            Self::Velocity { native, output } => {
                Self::push_output(controller, &output);
                controller.set_velocity_nu(native)
            }
            Self::Position { native, output } => {
                Self::push_output(controller, &output);
                controller.set_position_nu(native)
            }
            Self::MotionProfile { native, output } => {
                Self::push_output(controller, &output);
                controller.set_motion_profile_nu(native)
            }
        }
    }

    fn push_output(controller: &mut dyn MotorController, output: &ClosedLoopOutput) {
        controller.set_next_output_type(output.output);
        controller.use_foc(output.use_foc);
        controller.set_slot(output.slot);
        controller.set_next_arb_feedforward(output.arb_feedforward_v);
    }
}
