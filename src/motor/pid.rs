// PID gain storage, per controller slot.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Number of gain slots every controller exposes through the interface.
pub const PID_SLOT_COUNT: usize = 3;

/// Closed-loop gains for one slot.
///
/// `kv` is the velocity feedforward and `ks` the static-friction
/// feedforward, both in output units per setpoint unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PidConstants {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub kv: f64,
    pub ks: f64,
}

impl PidConstants {
    pub fn p(kp: f64) -> Self {
        Self {
            kp,
            ..Default::default()
        }
    }
}

/// Gains for slots 0-2 plus the active slot index.
///
/// Selecting a slot outside 0-2 is a capability gap, not an error: the
/// request is logged and ignored so a bad slot index can never take down a
/// control cycle.
#[derive(Debug, Clone, Default)]
pub struct PidSlots {
    slots: [PidConstants; PID_SLOT_COUNT],
    active: usize,
}

impl PidSlots {
    pub fn active_slot(&self) -> usize {
        self.active
    }

    pub fn select(&mut self, slot: usize) {
        if slot >= PID_SLOT_COUNT {
            warn!(slot, "only PID slots 0-2 are supported, keeping slot {}", self.active);
            return;
        }
        self.active = slot;
    }

    /// Store gains in the active slot.
    pub fn set(&mut self, constants: PidConstants) {
        self.slots[self.active] = constants;
    }

    /// Gains of the active slot.
    pub fn get(&self) -> PidConstants {
        self.slots[self.active]
    }
}
