//! Rental lifecycle state: phases, usage/operation enums, helmet debouncing.
//!
//! The rental orchestrator is spread over the systems in [crate::systems]
//! (QR intake, helmet transitions, alerts) and the validate/terminate tasks;
//! this module holds the shared state they all mutate and the guards that
//! keep transitions legal.

use bevy_ecs::prelude::Resource;

/// Minimum time a helmet-switch level must persist before it takes effect.
pub const HELMET_DEBOUNCE_MS: u64 = 50;

/// Process-level rental phase. Distinct from [UsageState]: `usage` is what the
/// vehicle reports to the server, the phase also tracks in-flight requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RentalPhase {
    #[default]
    Idle,
    Validating,
    Reserved,
    InUse,
    Terminating,
}

/// Usage state as reported in telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UsageState {
    #[default]
    Idle = 0,
    Reserved = 1,
    InUse = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperationState {
    #[default]
    Normal = 0,
    OutOfBound = 1,
    LowBattery = 2,
}

/// Helmet dock switch. `true` means the helmet is connected (docked).
pub trait HelmetSwitch: Send + Sync {
    fn is_connected(&mut self) -> bool;
}

/// QR scanner seam: yields a complete scanned payload at most once per scan.
pub trait QrScanner: Send + Sync {
    fn take_scan(&mut self) -> Option<String>;
}

#[derive(Resource)]
pub struct HelmetDevice(pub Box<dyn HelmetSwitch>);

#[derive(Resource)]
pub struct QrDevice(pub Box<dyn QrScanner>);

/// Debounced helmet level plus the per-tick edges derived from it.
///
/// `rose`/`fell` are valid for exactly one tick; the debounce system rewrites
/// them every iteration before the transition system reads them.
#[derive(Debug, Resource)]
pub struct HelmetState {
    pub debounced: bool,
    pub rose: bool,
    pub fell: bool,
    candidate: bool,
    candidate_since_ms: u64,
}

impl Default for HelmetState {
    fn default() -> Self {
        // A parked vehicle has its helmet docked.
        Self {
            debounced: true,
            rose: false,
            fell: false,
            candidate: true,
            candidate_since_ms: 0,
        }
    }
}

impl HelmetState {
    /// Feed one raw sample; updates the debounced level and edge flags.
    pub fn observe(&mut self, raw: bool, now_ms: u64) {
        if raw != self.candidate {
            self.candidate = raw;
            self.candidate_since_ms = now_ms;
        }

        self.rose = false;
        self.fell = false;
        if self.candidate != self.debounced
            && now_ms.saturating_sub(self.candidate_since_ms) >= HELMET_DEBOUNCE_MS
        {
            self.debounced = self.candidate;
            if self.candidate {
                self.rose = true;
            } else {
                self.fell = true;
            }
        }
    }
}

/// Shared rental-orchestrator state. Mutated only from the loop thread: by the
/// rental systems directly, and by validate/terminate tasks through the
/// [crate::tasks::TaskCtx] handed to the scheduler head.
#[derive(Debug, Default, Resource)]
pub struct RentalState {
    pub phase: RentalPhase,
    pub usage: UsageState,
    pub operation: OperationState,
    /// Active trip id; empty string means none.
    pub trip_id: String,
    /// Response topic of the single request/response task currently awaiting
    /// an MQTT reply. At most one validate/terminate may be in flight.
    pub awaiting_reply: Option<String>,
    /// Set while a topple alert episode is in flight; cleared when the
    /// posture returns to upright.
    pub topple_alert_inflight: bool,
    /// Set when the low-battery alert fired; cleared when SOC recovers above
    /// the threshold so re-entry raises a fresh alert.
    pub low_battery_alerted: bool,
    /// Same, for geofence exit episodes.
    pub boundary_alerted: bool,
}

impl RentalState {
    pub fn has_trip(&self) -> bool {
        !self.trip_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helmet_debounce_ignores_short_glitches() {
        let mut helmet = HelmetState::default();
        assert!(helmet.debounced);

        // 30 ms glitch: candidate flips but never survives the window.
        helmet.observe(false, 100);
        assert!(helmet.debounced);
        helmet.observe(true, 130);
        helmet.observe(true, 200);
        assert!(helmet.debounced);
        assert!(!helmet.fell);
    }

    #[test]
    fn helmet_debounce_promotes_stable_level_with_edge() {
        let mut helmet = HelmetState::default();

        helmet.observe(false, 100);
        assert!(helmet.debounced);
        helmet.observe(false, 160);
        assert!(!helmet.debounced);
        assert!(helmet.fell);
        assert!(!helmet.rose);

        // Edge flags last a single observation.
        helmet.observe(false, 170);
        assert!(!helmet.fell);

        helmet.observe(true, 300);
        helmet.observe(true, 360);
        assert!(helmet.debounced);
        assert!(helmet.rose);
    }
}
