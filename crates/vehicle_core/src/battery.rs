//! Battery state of charge: coulomb counting with voltage re-anchoring.
//!
//! The running estimate integrates gauge current over time (`mah_used`).
//! Across power cycles the counter is restored from non-volatile storage,
//! but only when the pack voltage at boot is close to the highest voltage
//! ever recorded. A large gap means the pack was swapped or charged
//! externally, in which case the counter is re-seeded from an open-circuit
//! voltage lookup.

use bevy_ecs::prelude::Resource;
use tracing::{debug, warn};

/// Pack capacity in mAh (2S Li-ion).
pub const MAX_MAH: f32 = 3200.0;
/// Battery percentage at or below which the low-battery alert fires.
pub const LOW_BATTERY_PERCENT: i32 = 49;
/// Voltage gap that invalidates the persisted coulomb counter.
const VOLT_DIFF_THRESHOLD: f32 = 0.20;
/// How often the counter is persisted while running.
const SAVE_INTERVAL_MS: u64 = 120_000;
/// Magic word marking a valid persisted record.
pub const STORE_MAGIC: u16 = 0xBEEF;

const VOLT_TABLE: [f32; 11] = [
    6.40, 6.70, 6.90, 7.10, 7.30, 7.50, 7.70, 7.90, 8.10, 8.30, 8.40,
];
const SOC_TABLE: [f32; 11] = [
    0.0, 10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 95.0, 100.0,
];

/// Voltage and current readings from the external gauge. `None` means the
/// sensor did not answer; the estimator keeps its last state.
pub trait BatteryGauge: Send + Sync {
    fn bus_voltage(&mut self) -> Option<f32>;
    /// Signed pack current in mA; positive is discharge.
    fn current_ma(&mut self) -> Option<f32>;
}

/// Byte-level non-volatile store for the battery record.
pub trait BatteryStore: Send + Sync {
    fn load(&mut self) -> Option<Vec<u8>>;
    fn save(&mut self, bytes: &[u8]) -> bool;
}

/// Persisted battery state: magic, highest recorded voltage, mAh used.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryRecord {
    pub highest_voltage: f32,
    pub mah_used: f32,
}

impl BatteryRecord {
    pub const WIRE_LEN: usize = 10;

    pub fn to_bytes(&self) -> [u8; Self::WIRE_LEN] {
        let mut out = [0u8; Self::WIRE_LEN];
        out[0..2].copy_from_slice(&STORE_MAGIC.to_le_bytes());
        out[2..6].copy_from_slice(&self.highest_voltage.to_le_bytes());
        out[6..10].copy_from_slice(&self.mah_used.to_le_bytes());
        out
    }

    /// `None` if the magic does not match or the fields are implausible.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::WIRE_LEN {
            return None;
        }
        let magic = u16::from_le_bytes(bytes[0..2].try_into().ok()?);
        if magic != STORE_MAGIC {
            return None;
        }
        let highest_voltage = f32::from_le_bytes(bytes[2..6].try_into().ok()?);
        let mah_used = f32::from_le_bytes(bytes[6..10].try_into().ok()?);
        if !(0.0..=20.0).contains(&highest_voltage) || !(0.0..=MAX_MAH).contains(&mah_used) {
            return None;
        }
        Some(Self {
            highest_voltage,
            mah_used,
        })
    }
}

/// Open-circuit voltage → SOC percent, piecewise linear over the 11-point
/// table. Used only at boot to seed the coulomb counter.
pub fn estimate_soc_from_voltage(v_pack: f32) -> f32 {
    if v_pack <= VOLT_TABLE[0] {
        return 0.0;
    }
    if v_pack >= VOLT_TABLE[VOLT_TABLE.len() - 1] {
        return 100.0;
    }
    for i in 0..VOLT_TABLE.len() - 1 {
        if v_pack >= VOLT_TABLE[i] && v_pack <= VOLT_TABLE[i + 1] {
            let t = (v_pack - VOLT_TABLE[i]) / (VOLT_TABLE[i + 1] - VOLT_TABLE[i]);
            return SOC_TABLE[i] + t * (SOC_TABLE[i + 1] - SOC_TABLE[i]);
        }
    }
    0.0
}

fn percent_from_mah(mah_used: f32) -> i32 {
    let soc = (MAX_MAH - mah_used) / MAX_MAH * 100.0;
    soc.clamp(0.0, 100.0).round() as i32
}

/// Coulomb-counting SOC estimator. Owns the gauge and the persistence seam.
#[derive(Resource)]
pub struct BatteryMonitor {
    gauge: Box<dyn BatteryGauge>,
    store: Box<dyn BatteryStore>,
    highest_voltage: f32,
    mah_used: f32,
    level_percent: i32,
    last_update_ms: Option<u64>,
    last_save_ms: u64,
}

impl BatteryMonitor {
    pub fn new(gauge: Box<dyn BatteryGauge>, store: Box<dyn BatteryStore>) -> Self {
        Self {
            gauge,
            store,
            highest_voltage: 0.0,
            mah_used: 0.0,
            level_percent: 100,
            last_update_ms: None,
            last_save_ms: 0,
        }
    }

    /// Startup: restore or re-anchor the coulomb counter.
    pub fn begin(&mut self, now_ms: u64) {
        let Some(v_now) = self.gauge.bus_voltage() else {
            warn!("battery gauge not answering at boot, keeping defaults");
            self.last_update_ms = Some(now_ms);
            self.last_save_ms = now_ms;
            return;
        };

        let restored = self.store.load().and_then(|b| BatteryRecord::from_bytes(&b));
        match restored {
            Some(rec) if (v_now - rec.highest_voltage).abs() < VOLT_DIFF_THRESHOLD => {
                self.highest_voltage = rec.highest_voltage;
                self.mah_used = rec.mah_used;
                debug!("restored battery state, mah_used={}", rec.mah_used);
            }
            Some(_) | None => {
                // Swapped or externally charged pack, or corrupted store.
                self.reset_from_voltage(v_now);
                self.persist();
            }
        }
        self.level_percent = percent_from_mah(self.mah_used);
        self.last_update_ms = Some(now_ms);
        self.last_save_ms = now_ms;
    }

    /// Per-tick coulomb counting update.
    pub fn update(&mut self, now_ms: u64) {
        let (Some(voltage), Some(current_ma)) = (self.gauge.bus_voltage(), self.gauge.current_ma())
        else {
            // Sensor unavailable: keep the last known state.
            return;
        };

        let delta_hours = match self.last_update_ms {
            Some(last) => now_ms.saturating_sub(last) as f32 / 3_600_000.0,
            None => 0.0,
        };
        self.last_update_ms = Some(now_ms);

        self.mah_used = (self.mah_used + current_ma * delta_hours).clamp(0.0, MAX_MAH);
        self.level_percent = percent_from_mah(self.mah_used);

        if voltage > self.highest_voltage {
            self.highest_voltage = voltage;
        }

        if now_ms.saturating_sub(self.last_save_ms) >= SAVE_INTERVAL_MS {
            self.persist();
            self.last_save_ms = now_ms;
        }
    }

    pub fn level_percent(&self) -> i32 {
        self.level_percent
    }

    pub fn is_low(&self) -> bool {
        self.level_percent <= LOW_BATTERY_PERCENT
    }

    pub fn mah_used(&self) -> f32 {
        self.mah_used
    }

    pub fn highest_voltage(&self) -> f32 {
        self.highest_voltage
    }

    fn reset_from_voltage(&mut self, v_now: f32) {
        let soc = estimate_soc_from_voltage(v_now);
        self.mah_used = MAX_MAH - soc / 100.0 * MAX_MAH;
        self.highest_voltage = v_now;
        debug!("re-anchored battery state from {v_now:.2} V to {soc:.0}%");
    }

    fn persist(&mut self) {
        let rec = BatteryRecord {
            highest_voltage: self.highest_voltage,
            mah_used: self.mah_used,
        };
        if !self.store.save(&rec.to_bytes()) {
            warn!("battery state save failed");
        }
    }
}
