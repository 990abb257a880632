// Swerve drivetrain layer
//
// Provides:
// - Chassis and module state types, angle optimization, cosine compensation
// - Per-module hardware configuration
// - The swerve module itself (steer + drive + absolute encoder)
// - Inverse/forward kinematics for the four-module chassis

pub mod config;
pub mod kinematics;
pub mod module;
pub mod state;

pub use config::{DriveConfig, SwerveModuleConfiguration};
pub use kinematics::{SwerveKinematics, MODULE_COUNT};
pub use module::{DriveRequestType, ModuleError, SteerRequestType, SwerveModule};
pub use state::{ChassisSpeeds, ModulePosition, ModuleState};
