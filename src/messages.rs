// Message types crossing the zenoh boundary.

use serde::{Deserialize, Serialize};

use crate::drive::state::{ChassisSpeeds, ModuleState};

// Command from teleop/scripts -> runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChassisCommand {
    pub vx_mps: f64,
    pub vy_mps: f64,
    pub omega_rad_per_s: f64,
}

impl From<&ChassisCommand> for ChassisSpeeds {
    fn from(cmd: &ChassisCommand) -> Self {
        ChassisSpeeds::new(cmd.vx_mps, cmd.vy_mps, cmd.omega_rad_per_s)
    }
}

/// Health status published by the runtime.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
}

/// Measured module states published every cycle for external dashboards.
/// The runtime places no requirement on how these are displayed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrivetrainTelemetry {
    pub modules: [ModuleState; 4],
    pub measured: ChassisSpeeds,
    pub health: RuntimeHealth,
}
