use bevy_ecs::prelude::{Res, ResMut};

use crate::battery::BatteryMonitor;
use crate::clock::VehicleClock;
use crate::ui::UiState;

/// Coulomb-counting update plus the battery field the display shows.
pub fn battery_sample_system(
    clock: Res<VehicleClock>,
    mut battery: ResMut<BatteryMonitor>,
    mut ui: ResMut<UiState>,
) {
    battery.update(clock.tick_ms());
    ui.battery_percent = battery.level_percent();
}
