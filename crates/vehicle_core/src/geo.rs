//! Geographic state: GPS fixes, geofence, speed over ground.
//!
//! The geofence is a set of H3 cells at a fixed resolution; a position is
//! inside when its containing cell is in the set. An empty set means the
//! fence is unbounded (no boundary alerts), which is the default until the
//! backend provisions an operating area.

use std::collections::HashSet;

use bevy_ecs::prelude::Resource;
use h3o::{CellIndex, LatLng, Resolution};

use crate::modem::CellInfo;

/// Fixes faster than this are GPS jumps, not a scooter.
pub const MAX_PLAUSIBLE_SPEED_KMH: f64 = 60.0;

/// One GPS position report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsFix {
    pub latitude: f32,
    pub longitude: f32,
}

/// GPS receiver seam: returns the current fix while one is held.
pub trait GpsReceiver: Send + Sync {
    fn poll_fix(&mut self) -> Option<GpsFix>;
}

#[derive(Resource)]
pub struct GpsDevice(pub Box<dyn GpsReceiver>);

/// Haversine distance between two positions in degrees, in km.
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let (lat1, lng1) = (lat1.to_radians(), lng1.to_radians());
    let (lat2, lng2) = (lat2.to_radians(), lng2.to_radians());
    let dlat = lat2 - lat1;
    let dlng = lng2 - lng1;
    let sin_dlat = (dlat * 0.5).sin();
    let sin_dlng = (dlng * 0.5).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlng * sin_dlng;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    6371.0 * c
}

/// Allowed operating area as H3 cells.
#[derive(Debug, Clone, Resource)]
pub struct GeoFence {
    resolution: Resolution,
    allowed: HashSet<CellIndex>,
}

impl GeoFence {
    /// Fence that allows everything.
    pub fn unbounded() -> Self {
        Self {
            resolution: Resolution::Nine,
            allowed: HashSet::new(),
        }
    }

    pub fn from_cells(resolution: Resolution, cells: impl IntoIterator<Item = CellIndex>) -> Self {
        Self {
            resolution,
            allowed: cells.into_iter().collect(),
        }
    }

    /// Disk of cells of grid radius `k` around a center point.
    pub fn around(lat: f64, lng: f64, resolution: Resolution, k: u32) -> Option<Self> {
        let center = LatLng::new(lat, lng).ok()?.to_cell(resolution);
        Some(Self::from_cells(resolution, center.grid_disk::<Vec<_>>(k)))
    }

    pub fn is_unbounded(&self) -> bool {
        self.allowed.is_empty()
    }

    /// Geofence predicate. Positions that fail to map to a cell (off-earth
    /// coordinates) count as inside: garbage input must not raise alerts.
    pub fn inside(&self, lat: f64, lng: f64) -> bool {
        if self.allowed.is_empty() {
            return true;
        }
        match LatLng::new(lat, lng) {
            Ok(point) => self.allowed.contains(&point.to_cell(self.resolution)),
            Err(_) => true,
        }
    }
}

/// Navigation state: current best position, last confirmed GPS fix, speed,
/// and the cell-tower fallback bookkeeping.
#[derive(Debug, Resource)]
pub struct NavState {
    /// Current best latitude/longitude (GPS fix, or cell-derived estimate).
    pub latitude: f32,
    pub longitude: f32,
    /// True while the receiver is delivering fixes.
    pub has_fix: bool,
    pub last_gps_lat: f32,
    pub last_gps_long: f32,
    /// Wall-clock ms of the last confirmed fix.
    pub last_gps_contact_ms: i64,
    pub speed_kmh: f32,
    /// Serving-cell info for the geolocation fallback.
    pub cell: CellInfo,
    pub cell_query_in_flight: bool,
    pub geo_lookup_in_flight: bool,
    /// Previous fix and its tick time, for speed estimation.
    pub prev_fix: Option<(GpsFix, u64)>,
}

impl Default for NavState {
    fn default() -> Self {
        Self {
            latitude: 0.0,
            longitude: 0.0,
            has_fix: false,
            last_gps_lat: 0.0,
            last_gps_long: 0.0,
            last_gps_contact_ms: 0,
            speed_kmh: 0.0,
            cell: CellInfo::default(),
            cell_query_in_flight: false,
            geo_lookup_in_flight: false,
            prev_fix: None,
        }
    }
}

impl NavState {
    /// Register a fix; updates position, last-fix fields, and the speed
    /// estimate. Speed is measured between *distinct* fixes (the receiver
    /// holds a fix between updates, and polling the same one again says
    /// nothing about motion); implausible jumps keep the previous speed.
    pub fn apply_fix(&mut self, fix: GpsFix, tick_ms: u64, unix_ms: i64) {
        match self.prev_fix {
            Some((prev, prev_tick)) if fix != prev => {
                let dt_ms = tick_ms.saturating_sub(prev_tick);
                if dt_ms > 0 {
                    let km = haversine_km(
                        prev.latitude as f64,
                        prev.longitude as f64,
                        fix.latitude as f64,
                        fix.longitude as f64,
                    );
                    let kmh = km / (dt_ms as f64 / 3_600_000.0);
                    if kmh <= MAX_PLAUSIBLE_SPEED_KMH {
                        self.speed_kmh = kmh as f32;
                    }
                }
                self.prev_fix = Some((fix, tick_ms));
            }
            None => self.prev_fix = Some((fix, tick_ms)),
            Some(_) => {}
        }
        self.latitude = fix.latitude;
        self.longitude = fix.longitude;
        self.has_fix = true;
        self.last_gps_lat = fix.latitude;
        self.last_gps_long = fix.longitude;
        self.last_gps_contact_ms = unix_ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_known_distance() {
        // Ho Chi Minh City center to ~1.11 km north (0.01 deg latitude).
        let d = haversine_km(10.7769, 106.7009, 10.7869, 106.7009);
        assert!((d - 1.112).abs() < 0.01, "got {d}");
        assert_eq!(haversine_km(10.0, 106.0, 10.0, 106.0), 0.0);
    }

    #[test]
    fn unbounded_fence_allows_everything() {
        let fence = GeoFence::unbounded();
        assert!(fence.inside(10.78, 106.70));
        assert!(fence.inside(0.0, 0.0));
    }

    #[test]
    fn fence_disk_contains_center_and_rejects_far_points() {
        let fence = GeoFence::around(10.78, 106.70, Resolution::Nine, 2).expect("fence");
        assert!(fence.inside(10.78, 106.70));
        // ~100 km away is far outside a k=2 disk of ~240 m cells.
        assert!(!fence.inside(11.5, 107.5));
        // Unmappable coordinates never alert.
        assert!(fence.inside(f64::NAN, 106.70));
    }

    #[test]
    fn apply_fix_tracks_speed_and_last_contact() {
        let mut nav = NavState::default();
        nav.apply_fix(
            GpsFix {
                latitude: 10.7769,
                longitude: 106.7009,
            },
            0,
            1_000,
        );
        assert!(nav.has_fix);
        assert_eq!(nav.speed_kmh, 0.0);
        assert_eq!(nav.last_gps_contact_ms, 1_000);

        // 0.01 deg (~1.11 km) in 5 minutes ≈ 13.3 km/h.
        nav.apply_fix(
            GpsFix {
                latitude: 10.7869,
                longitude: 106.7009,
            },
            300_000,
            301_000,
        );
        assert!((nav.speed_kmh - 13.3).abs() < 0.5, "got {}", nav.speed_kmh);
        assert_eq!(nav.last_gps_lat, 10.7869);

        // Re-polling the held fix does not rewrite the speed reference.
        let speed = nav.speed_kmh;
        nav.apply_fix(
            GpsFix {
                latitude: 10.7869,
                longitude: 106.7009,
            },
            310_000,
            311_000,
        );
        assert_eq!(nav.speed_kmh, speed);
        assert_eq!(nav.last_gps_contact_ms, 311_000);
    }

    #[test]
    fn implausible_jump_keeps_previous_speed() {
        let mut nav = NavState::default();
        nav.apply_fix(
            GpsFix {
                latitude: 10.0,
                longitude: 106.0,
            },
            0,
            0,
        );
        // A degree of latitude in one second is a GPS glitch.
        nav.apply_fix(
            GpsFix {
                latitude: 11.0,
                longitude: 106.0,
            },
            1_000,
            1_000,
        );
        assert_eq!(nav.speed_kmh, 0.0);
        // Position still follows the fix; only the speed estimate is guarded.
        assert_eq!(nav.latitude, 11.0);
    }
}
