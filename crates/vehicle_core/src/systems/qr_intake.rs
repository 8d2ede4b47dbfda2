use bevy_ecs::prelude::{Res, ResMut};
use tracing::{info, warn};

use crate::boot::VehicleConfig;
use crate::rental::{QrDevice, RentalPhase, RentalState, UsageState};
use crate::scheduler::{Priority, TaskQueue};
use crate::tasks::ValidateReservationTask;
use crate::trip::parse_trip_json;
use crate::ui::{DisplayPage, UiState};

/// QR ingestion: parse the trip payload and kick off validation.
///
/// A scan while the vehicle is not idle is a logic error: logged and
/// ignored, no page change, no enqueue.
pub fn qr_intake_system(
    config: Res<VehicleConfig>,
    mut device: ResMut<QrDevice>,
    mut rental: ResMut<RentalState>,
    mut queue: ResMut<TaskQueue>,
    mut ui: ResMut<UiState>,
) {
    let Some(payload) = device.0.take_scan() else {
        return;
    };

    if rental.phase != RentalPhase::Idle || rental.usage != UsageState::Idle {
        info!(phase = ?rental.phase, "qr scan ignored while not idle");
        return;
    }

    let trip = match parse_trip_json(&payload) {
        Ok(trip) => trip,
        Err(err) => {
            warn!(%err, len = payload.len(), "qr payload rejected");
            ui.set_page(DisplayPage::IncorrectQrScan);
            return;
        }
    };

    if rental.awaiting_reply.is_some() {
        warn!("qr scan while a server reply is already awaited");
        return;
    }

    info!(trip_id = %trip.id, "qr trip accepted, validating");
    let task = ValidateReservationTask::new(
        trip.clone(),
        config.validate_request_topic(),
        config.update_topic(&trip.id),
    );
    if queue.enqueue(Box::new(task), Priority::Critical) {
        rental.phase = RentalPhase::Validating;
        ui.set_page(DisplayPage::PleaseWait);
    } else {
        warn!("validation task rejected by full queue");
        ui.set_page(DisplayPage::GenericAlert);
    }
}
