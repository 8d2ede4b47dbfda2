use bevy_ecs::prelude::{Res, ResMut};
use tracing::{info, warn};

use crate::boot::VehicleConfig;
use crate::clock::VehicleClock;
use crate::geo::NavState;
use crate::rental::{HelmetDevice, HelmetState, RentalPhase, RentalState, UsageState};
use crate::scheduler::{Priority, TaskQueue};
use crate::tasks::TerminateReservationTask;
use crate::trip::TripTerminationPayload;
use crate::ui::{DisplayPage, UiState};

/// Raw helmet switch sample through the 50 ms debouncer.
pub fn helmet_debounce_system(
    clock: Res<VehicleClock>,
    mut device: ResMut<HelmetDevice>,
    mut helmet: ResMut<HelmetState>,
) {
    let raw = device.0.is_connected();
    helmet.observe(raw, clock.tick_ms());
}

/// Helmet-edge rental transitions.
///
/// Undocking the helmet starts the ride (`Reserved → InUse`); docking it
/// back ends it (`InUse → Terminating`, with the termination request sent to
/// the server and `usage` dropped to idle optimistically).
pub fn helmet_transition_system(
    config: Res<VehicleConfig>,
    helmet: Res<HelmetState>,
    nav: Res<NavState>,
    mut rental: ResMut<RentalState>,
    mut queue: ResMut<TaskQueue>,
    mut ui: ResMut<UiState>,
) {
    if helmet.fell && rental.phase == RentalPhase::Reserved && rental.has_trip() {
        info!(trip_id = %rental.trip_id, "helmet undocked, ride started");
        rental.phase = RentalPhase::InUse;
        rental.usage = UsageState::InUse;
        ui.set_page(DisplayPage::Welcome);
        return;
    }

    if helmet.rose && rental.phase == RentalPhase::InUse && rental.has_trip() {
        if rental.awaiting_reply.is_some() {
            warn!("helmet docked but a server reply is still awaited");
            return;
        }
        info!(trip_id = %rental.trip_id, "helmet docked, terminating trip");
        let payload = TripTerminationPayload {
            end_lng: nav.longitude,
            end_lat: nav.latitude,
        };
        let task = TerminateReservationTask::new(
            payload,
            config.termination_topic(&rental.trip_id),
            config.update_topic(&rental.trip_id),
        );
        if queue.enqueue(Box::new(task), Priority::Critical) {
            rental.phase = RentalPhase::Terminating;
            // Optimistic: the vehicle is no longer in customer hands even if
            // the server round-trip fails.
            rental.usage = UsageState::Idle;
        } else {
            warn!("termination task rejected by full queue");
        }
    }
}
