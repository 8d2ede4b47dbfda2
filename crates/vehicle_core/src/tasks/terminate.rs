//! Trip termination round-trip over MQTT.

use tracing::{info, warn};

use super::{NetTask, TaskCtx, TaskOutcome, TaskState};
use crate::codec::{decode_status_update, encode_termination};
use crate::rental::RentalPhase;
use crate::trip::{TripStatus, TripTerminationPayload};
use crate::ui::DisplayPage;

const TERMINATION_TIMEOUT_MS: u64 = 15_000;

/// Publishes the end-of-ride payload and waits for the one-byte trip status.
/// Status 2 (complete) concludes the trip; anything else, a decode failure,
/// or the timeout shows the failure page. The trip binding is cleared either
/// way, since the server side of the trip is over. Mandatory.
pub struct TerminateReservationTask {
    payload: TripTerminationPayload,
    request_topic: String,
    response_topic: String,
    awaiting: bool,
    outcome: TaskOutcome,
    state: TaskState,
}

impl TerminateReservationTask {
    pub fn new(
        payload: TripTerminationPayload,
        request_topic: String,
        response_topic: String,
    ) -> Self {
        Self {
            payload,
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

    fn cleanup(&mut self, ctx: &mut TaskCtx<'_>) {
        if self.awaiting {
            ctx.transport.unsubscribe(&self.response_topic);
            ctx.rental.awaiting_reply = None;
            self.awaiting = false;
        }
        self.state.mark_completed();
    }

    fn conclude(&mut self, ctx: &mut TaskCtx<'_>, succeeded: bool, outcome: TaskOutcome) {
        self.outcome = outcome;
        ctx.rental.trip_id.clear();
        ctx.rental.phase = RentalPhase::Idle;
        ctx.ui.set_page(if succeeded {
            DisplayPage::TripConclusion
        } else {
            DisplayPage::TripConclusionFailed
        });
        self.cleanup(ctx);
    }
}

impl NetTask for TerminateReservationTask {
    fn label(&self) -> &'static str {
        "terminate-reservation"
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
                warn!("termination started while another reply is awaited");
                self.conclude(ctx, false, TaskOutcome::TransportError);
                return;
            }
            if !ctx.transport.subscribe(&self.response_topic) {
                warn!(topic = %self.response_topic, "termination subscribe failed");
                self.conclude(ctx, false, TaskOutcome::TransportError);
                return;
            }
            ctx.rental.awaiting_reply = Some(self.response_topic.clone());
            self.awaiting = true;

            let payload = encode_termination(&self.payload);
            if !ctx.transport.publish(&self.request_topic, &payload) {
                warn!(topic = %self.request_topic, "termination publish failed");
                self.conclude(ctx, false, TaskOutcome::TransportError);
                return;
            }
            info!("termination request sent");
            return;
        }

        ctx.transport.pump_mqtt();

        if let Some(payload) = ctx.transport.take_inbound(&self.response_topic) {
            match decode_status_update(&payload) {
                Ok(TripStatus::Complete) => {
                    info!("trip terminated by server");
                    self.conclude(ctx, true, TaskOutcome::Ok);
                }
                Ok(status) => {
                    warn!(?status, "termination not completed by server");
                    self.conclude(ctx, false, TaskOutcome::Ok);
                }
                Err(err) => {
                    warn!(%err, "termination status decode failed");
                    self.conclude(ctx, false, TaskOutcome::DecodeError);
                }
            }
            return;
        }

        if self.state.elapsed_ms(ctx.now_ms) > TERMINATION_TIMEOUT_MS {
            warn!("termination timed out");
            self.conclude(ctx, false, TaskOutcome::Timeout);
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
