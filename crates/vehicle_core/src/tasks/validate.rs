//! Reservation validation round-trip over MQTT.

use tracing::{info, warn};

use super::{NetTask, TaskCtx, TaskOutcome, TaskState};
use crate::codec::{decode_validation_response, encode_trip};
use crate::rental::{RentalPhase, UsageState};
use crate::trip::Trip;
use crate::ui::DisplayPage;

const VALIDATION_TIMEOUT_MS: u64 = 15_000;

/// Publishes the trip to the validation request topic, subscribes to the
/// trip's update topic, and waits for the one-byte verdict. Mandatory.
///
/// First tick: subscribe, register as the awaiting task, encode (stamping
/// the vehicle's current position into the trip), publish. Later ticks:
/// pump MQTT and watch the inbox; a verdict or the 15 s timeout ends it.
pub struct ValidateReservationTask {
    trip: Trip,
    request_topic: String,
    response_topic: String,
    awaiting: bool,
    outcome: TaskOutcome,
    state: TaskState,
}

impl ValidateReservationTask {
    pub fn new(trip: Trip, request_topic: String, response_topic: String) -> Self {
        Self {
            trip,
            request_topic,
            response_topic,
            awaiting: false,
            outcome: TaskOutcome::Ok,
            state: TaskState::default(),
        }
    }

    pub fn outcome(&self) -> TaskOutcome {
        self.outcome
    }

    /// Unsubscribe, release the awaiter slot, mark completed. Only touches
    /// the subscription this task itself registered.
    fn cleanup(&mut self, ctx: &mut TaskCtx<'_>) {
        if self.awaiting {
            ctx.transport.unsubscribe(&self.response_topic);
            ctx.rental.awaiting_reply = None;
            self.awaiting = false;
        }
        self.state.mark_completed();
    }

    fn fail(&mut self, ctx: &mut TaskCtx<'_>, outcome: TaskOutcome) {
        self.outcome = outcome;
        ctx.rental.trip_id.clear();
        ctx.rental.phase = RentalPhase::Idle;
        ctx.rental.usage = UsageState::Idle;
        ctx.ui.set_page(DisplayPage::GenericAlert);
        self.cleanup(ctx);
    }
}

impl NetTask for ValidateReservationTask {
    fn label(&self) -> &'static str {
        "validate-reservation"
    }

    fn is_mandatory(&self) -> bool {
        true
    }

    fn execute(&mut self, ctx: &mut TaskCtx<'_>) {
        if self.state.is_completed() {
            return;
        }

        if !self.state.is_started() {
            self.state.mark_started(ctx.now_ms);

            if ctx.rental.awaiting_reply.is_some() {
                // Another request/response task holds the reply slot; the
                // orchestrator should never let this happen.
                warn!("validation started while another reply is awaited");
                self.fail(ctx, TaskOutcome::TransportError);
                return;
            }
            if !ctx.transport.subscribe(&self.response_topic) {
                warn!(topic = %self.response_topic, "validation subscribe failed");
                self.fail(ctx, TaskOutcome::TransportError);
                return;
            }
            ctx.rental.awaiting_reply = Some(self.response_topic.clone());
            self.awaiting = true;

            self.trip.current_lng = ctx.nav.longitude;
            self.trip.current_lat = ctx.nav.latitude;
            let payload = encode_trip(&self.trip);
            if !ctx.transport.publish(&self.request_topic, &payload) {
                warn!(topic = %self.request_topic, "validation publish failed");
                self.fail(ctx, TaskOutcome::TransportError);
                return;
            }
            info!(trip_id = %self.trip.id, "validation request sent");
            return;
        }

        ctx.transport.pump_mqtt();

        if let Some(payload) = ctx.transport.take_inbound(&self.response_topic) {
            match decode_validation_response(&payload) {
                Ok(true) => {
                    info!(trip_id = %self.trip.id, "reservation valid");
                    ctx.rental.trip_id = self.trip.id.clone();
                    ctx.rental.phase = RentalPhase::Reserved;
                    ctx.rental.usage = UsageState::Reserved;
                    ctx.ui.set_page(DisplayPage::Welcome);
                    self.outcome = TaskOutcome::Ok;
                    self.cleanup(ctx);
                }
                Ok(false) => {
                    info!(trip_id = %self.trip.id, "reservation rejected by server");
                    self.fail(ctx, TaskOutcome::Ok);
                }
                Err(err) => {
                    warn!(%err, "validation response decode failed");
                    self.fail(ctx, TaskOutcome::DecodeError);
                }
            }
            return;
        }

        if self.state.elapsed_ms(ctx.now_ms) > VALIDATION_TIMEOUT_MS {
            warn!(trip_id = %self.trip.id, "validation timed out");
            self.fail(ctx, TaskOutcome::Timeout);
        }
    }

    fn is_started(&self) -> bool {
        self.state.is_started()
    }

    fn is_completed(&self) -> bool {
        self.state.is_completed()
    }

    fn start_ms(&self) -> u64 {
        self.state.start_ms()
    }
}
