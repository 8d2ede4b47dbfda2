use bevy_ecs::prelude::{Res, ResMut};

use crate::clock::VehicleClock;
use crate::ui::{DisplayDevice, UiState, TRANSIENT_PAGE_MS};

/// Transient-page timing and the edge-triggered redraw.
pub fn display_refresh_system(
    clock: Res<VehicleClock>,
    mut ui: ResMut<UiState>,
    mut device: ResMut<DisplayDevice>,
) {
    let now = clock.tick_ms();

    if ui.page.is_transient() {
        match ui.transient_since_ms {
            None => ui.transient_since_ms = Some(now),
            Some(since) if now.saturating_sub(since) >= TRANSIENT_PAGE_MS => {
                let target = ui.page.revert_target();
                ui.set_page(target);
            }
            Some(_) => {}
        }
    } else {
        ui.transient_since_ms = None;
    }

    if ui.to_be_updated {
        device.0.draw(ui.page, ui.speed_kmh, ui.battery_percent);
        ui.to_be_updated = false;
    }
}
