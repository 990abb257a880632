// Motor hardware-abstraction layer
//
// Provides:
// - Native-unit <-> physical-unit conversion profiles
// - The vendor-neutral MotorController trait and control requests
// - STS-class serial servo implementation of the trait
// - A recording simulator for tests and bench runs

pub mod controller;
pub mod conversion;
pub mod encoder;
pub mod pid;
pub mod request;
pub mod signal;
pub mod sim;
pub mod sts;

pub use controller::{MotorController, MotorError};
pub use conversion::{ConfigError, ConversionProfile};
pub use encoder::AbsoluteEncoder;
pub use pid::PidConstants;
pub use request::{ControlRequest, OutputType};
pub use signal::TimestampedSignal;
pub use sts::{BusError, SharedBus, StsBus, StsController};
