use bevy_ecs::prelude::{Res, ResMut};
use tracing::debug;

use crate::clock::VehicleClock;
use crate::geo::{GpsDevice, NavState};
use crate::scheduler::{Priority, TaskQueue};
use crate::tasks::{CellTowerQueryTask, GeolocationLookupTask};
use crate::ui::UiState;

/// GPS sample plus the cell-tower fallback policy.
///
/// With a fix: position, last-fix fields, and the speed estimate update.
/// Without one: the serving-cell query and geolocation lookup are enqueued,
/// one pair at a time. The lookup marks the cell outdated on completion, so
/// the pair is re-issued for as long as the receiver stays dark.
pub fn gps_update_system(
    clock: Res<VehicleClock>,
    mut device: ResMut<GpsDevice>,
    mut nav: ResMut<NavState>,
    mut queue: ResMut<TaskQueue>,
    mut ui: ResMut<UiState>,
) {
    if let Some(fix) = device.0.poll_fix() {
        let unix_ms = clock.now_unix_ms().unwrap_or(0);
        nav.apply_fix(fix, clock.tick_ms(), unix_ms);
        ui.speed_kmh = nav.speed_kmh;
        return;
    }

    if nav.has_fix {
        debug!("gps fix lost");
        nav.has_fix = false;
        nav.speed_kmh = 0.0;
        nav.prev_fix = None;
        ui.speed_kmh = 0.0;
    }

    if nav.cell.is_outdated && !nav.cell_query_in_flight {
        if queue.enqueue(Box::new(CellTowerQueryTask::default()), Priority::Normal) {
            nav.cell_query_in_flight = true;
        }
    } else if nav.cell.is_usable() && !nav.cell.is_outdated && !nav.geo_lookup_in_flight {
        if queue.enqueue(Box::new(GeolocationLookupTask::default()), Priority::Normal) {
            nav.geo_lookup_in_flight = true;
        }
    }
}
