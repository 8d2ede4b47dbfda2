//! Serving-cell query over the modem's AT channel.

use tracing::{debug, warn};

use super::{NetTask, TaskCtx, TaskOutcome, TaskState};
use crate::modem::CellInfo;

const DEFAULT_CELL_QUERY_TIMEOUT_MS: u64 = 5_000;

/// Asks the modem for its serving cell (`AT+CPSI?`) and parses the report
/// into [crate::geo::NavState::cell]. First tick sends the command; later
/// ticks drain the response line by line until `OK`, `ERROR`, or timeout.
pub struct CellTowerQueryTask {
    timeout_ms: u64,
    cpsi_line: Option<String>,
    outcome: TaskOutcome,
    state: TaskState,
}

impl Default for CellTowerQueryTask {
    fn default() -> Self {
        Self::new(DEFAULT_CELL_QUERY_TIMEOUT_MS)
    }
}

impl CellTowerQueryTask {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            timeout_ms,
            cpsi_line: None,
            outcome: TaskOutcome::Ok,
            state: TaskState::default(),
        }
    }

    pub fn outcome(&self) -> TaskOutcome {
        self.outcome
    }

    fn finalize(&mut self, ctx: &mut TaskCtx<'_>) {
        match self
            .cpsi_line
            .as_deref()
            .and_then(CellInfo::parse_cpsi_line)
        {
            Some(cell) => {
                debug!(mcc = cell.mcc, lac = cell.lac, cid = cell.cid, "serving cell parsed");
                ctx.nav.cell = cell;
                self.outcome = TaskOutcome::Ok;
            }
            None => {
                warn!(line = ?self.cpsi_line, "no usable serving-cell report");
                if self.outcome == TaskOutcome::Ok {
                    self.outcome = TaskOutcome::DecodeError;
                }
            }
        }
        ctx.nav.cell_query_in_flight = false;
        self.state.mark_completed();
    }
}

impl NetTask for CellTowerQueryTask {
    fn label(&self) -> &'static str {
        "cell-query"
    }

    fn execute(&mut self, ctx: &mut TaskCtx<'_>) {
        if self.state.is_completed() {
            return;
        }

        if !self.state.is_started() {
            self.state.mark_started(ctx.now_ms);
            ctx.transport.modem_drain();
            if !ctx.transport.modem_send("AT+CPSI?") {
                warn!("serving-cell command failed");
                self.outcome = TaskOutcome::TransportError;
                ctx.nav.cell_query_in_flight = false;
                self.state.mark_completed();
            }
            return;
        }

        while let Some(line) = ctx.transport.modem_poll_line() {
            let line = line.trim().to_string();
            if line.is_empty() {
                continue;
            }
            if line.starts_with("+CPSI") {
                self.cpsi_line = Some(line);
                continue;
            }
            if line == "OK" {
                self.finalize(ctx);
                return;
            }
            if line.contains("ERROR") {
                warn!("serving-cell query returned ERROR");
                self.outcome = TaskOutcome::TransportError;
                ctx.nav.cell_query_in_flight = false;
                self.state.mark_completed();
                return;
            }
        }

        if self.state.elapsed_ms(ctx.now_ms) > self.timeout_ms {
            // Parse whatever arrived; a late OK is not coming.
            self.outcome = TaskOutcome::Timeout;
            self.finalize(ctx);
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
