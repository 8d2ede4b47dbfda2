//! MQTT keep-alive filler task.

use super::{NetTask, TaskCtx, TaskState};

/// One non-blocking transport maintenance tick: pump inbound traffic and
/// reconnect if the session dropped (rate-limited by the transport). The
/// loop re-enqueues this every maintenance interval, so it is droppable.
#[derive(Default)]
pub struct MqttKeepAliveTask {
    state: TaskState,
}

impl MqttKeepAliveTask {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NetTask for MqttKeepAliveTask {
    fn label(&self) -> &'static str {
        "mqtt-keep-alive"
    }

    fn execute(&mut self, ctx: &mut TaskCtx<'_>) {
        if self.state.is_completed() {
            return;
        }
        self.state.mark_started(ctx.now_ms);
        ctx.transport.maintain_mqtt(ctx.now_ms);
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
