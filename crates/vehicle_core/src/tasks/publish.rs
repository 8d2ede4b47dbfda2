//! One-shot MQTT publish of an already-encoded payload.

use tracing::warn;

use super::{NetTask, TaskCtx, TaskOutcome, TaskState};

/// Publishes `payload` to `topic` on its first tick and completes. Owns a
/// copy of the payload; droppable under queue pressure.
pub struct MqttPublishTask {
    topic: String,
    payload: Vec<u8>,
    outcome: TaskOutcome,
    state: TaskState,
}

impl MqttPublishTask {
    pub fn new(topic: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            payload,
            outcome: TaskOutcome::Ok,
            state: TaskState::default(),
        }
    }

    pub fn outcome(&self) -> TaskOutcome {
        self.outcome
    }
}

impl NetTask for MqttPublishTask {
    fn label(&self) -> &'static str {
        "mqtt-publish"
    }

    fn execute(&mut self, ctx: &mut TaskCtx<'_>) {
        if self.state.is_completed() {
            return;
        }
        self.state.mark_started(ctx.now_ms);

        if self.topic.is_empty() || self.payload.is_empty() {
            warn!("publish task with empty topic or payload");
            self.outcome = TaskOutcome::TransportError;
            self.state.mark_completed();
            return;
        }

        if !ctx.transport.publish(&self.topic, &self.payload) {
            self.outcome = TaskOutcome::TransportError;
        }
        self.state.mark_completed();
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
