//! Telemetry and alert records published to the backend.

use bevy_ecs::prelude::Resource;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::rental::UsageState;

/// Periodic state report, one per telemetry cadence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Telemetry {
    pub id: String,
    pub bike_id: String,
    pub longitude: f32,
    pub latitude: f32,
    pub battery: i32,
    /// Wall-clock ms since epoch.
    pub time: i64,
    pub last_gps_long: f32,
    pub last_gps_lat: f32,
    pub last_gps_contact_time: i64,
    pub battery_is_low: bool,
    pub is_toppled: bool,
    pub is_crashed: bool,
    pub is_out_of_bound: bool,
    pub usage_state: UsageState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertType {
    Crash = 0,
    LowBattery = 1,
    BoundaryCross = 2,
    Topple = 3,
}

impl AlertType {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertType::Crash => "crash",
            AlertType::LowBattery => "low_battery",
            AlertType::BoundaryCross => "boundary_cross",
            AlertType::Topple => "topple",
        }
    }
}

/// Event report raised by the orchestrator (topple, low battery, geofence).
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub id: String,
    pub bike_id: String,
    pub content: String,
    pub alert_type: AlertType,
    pub longitude: f32,
    pub latitude: f32,
    pub time: i64,
}

/// Generates opaque record ids (uuid-shaped hex). Seedable so test runs and
/// simulations are reproducible.
#[derive(Debug, Resource)]
pub struct TelemetryIdGen {
    rng: StdRng,
}

impl TelemetryIdGen {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    /// Next id in 8-4-4-4-12 hex form.
    pub fn next_id(&mut self) -> String {
        let sections = [8usize, 4, 4, 4, 12];
        let mut out = String::with_capacity(36);
        for (i, len) in sections.into_iter().enumerate() {
            if i > 0 {
                out.push('-');
            }
            for _ in 0..len {
                let nibble = self.rng.gen_range(0..16u8);
                out.push(char::from_digit(nibble as u32, 16).unwrap_or('0'));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_gen_is_deterministic_under_seed() {
        let mut a = TelemetryIdGen::new(Some(7));
        let mut b = TelemetryIdGen::new(Some(7));
        assert_eq!(a.next_id(), b.next_id());
        assert_ne!(a.next_id(), a.next_id());
    }

    #[test]
    fn ids_are_uuid_shaped() {
        let mut gen = TelemetryIdGen::new(Some(1));
        let id = gen.next_id();
        assert_eq!(id.len(), 36);
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(
            parts.iter().map(|p| p.len()).collect::<Vec<_>>(),
            vec![8, 4, 4, 4, 12]
        );
        assert!(id.chars().all(|c| c == '-' || c.is_ascii_hexdigit()));
    }
}
