//! HTTP pump filler task.

use super::{NetTask, TaskCtx, TaskState};

/// Advances the non-blocking HTTP state machine by one step and completes.
#[derive(Default)]
pub struct HttpPumpTask {
    state: TaskState,
}

impl HttpPumpTask {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NetTask for HttpPumpTask {
    fn label(&self) -> &'static str {
        "http-pump"
    }

    fn execute(&mut self, ctx: &mut TaskCtx<'_>) {
        if self.state.is_completed() {
            return;
        }
        self.state.mark_started(ctx.now_ms);
        ctx.transport.http_step(ctx.now_ms);
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
