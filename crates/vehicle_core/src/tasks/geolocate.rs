//! Cell-tower geolocation lookup over HTTP.

use tracing::{debug, warn};

use super::{NetTask, TaskCtx, TaskOutcome, TaskState};

const DEFAULT_LOOKUP_TIMEOUT_MS: u64 = 2_000;
/// Upper bound on waiting for the shared HTTP machine to become idle.
const OVERALL_TIMEOUT_MS: u64 = 15_000;

/// POSTs the serving-cell body to the location API and scans the response
/// for `lat`/`lon`. On completion the source cell info is marked outdated so
/// the query → lookup pair is re-issued on the next GPS-less cycle.
pub struct GeolocationLookupTask {
    request_timeout_ms: u64,
    http_started: bool,
    outcome: TaskOutcome,
    state: TaskState,
}

impl Default for GeolocationLookupTask {
    fn default() -> Self {
        Self::new(DEFAULT_LOOKUP_TIMEOUT_MS)
    }
}

/// Naive key/value scan: locate `"key"`, then parse the numeric literal
/// after the following colon. The API's flat response makes this safe.
fn scan_number_after(body: &str, key: &str) -> Option<f64> {
    let key_pos = body.find(key)?;
    let colon = body[key_pos..].find(':')? + key_pos;
    let rest = body[colon + 1..].trim_start();
    let end = rest
        .find(|c: char| !matches!(c, '0'..='9' | '+' | '-' | '.' | 'e' | 'E'))
        .unwrap_or(rest.len());
    rest[..end].parse().ok()
}

fn status_not_ok(body: &str) -> bool {
    let Some(status_pos) = body.find("\"status\"") else {
        return false;
    };
    let Some(colon) = body[status_pos..].find(':') else {
        return false;
    };
    let value = &body[status_pos + colon + 1..];
    let value = &value[..value.len().min(16)];
    !(value.contains("ok") || value.contains("OK"))
}

impl GeolocationLookupTask {
    pub fn new(request_timeout_ms: u64) -> Self {
        Self {
            request_timeout_ms,
            http_started: false,
            outcome: TaskOutcome::Ok,
            state: TaskState::default(),
        }
    }

    pub fn outcome(&self) -> TaskOutcome {
        self.outcome
    }

    fn finish(&mut self, ctx: &mut TaskCtx<'_>, outcome: TaskOutcome) {
        self.outcome = outcome;
        // Re-issue the pair next time around, whatever happened here.
        ctx.nav.cell.is_outdated = true;
        ctx.nav.geo_lookup_in_flight = false;
        self.state.mark_completed();
    }
}

impl NetTask for GeolocationLookupTask {
    fn label(&self) -> &'static str {
        "geo-lookup"
    }

    fn execute(&mut self, ctx: &mut TaskCtx<'_>) {
        if self.state.is_completed() {
            return;
        }
        self.state.mark_started(ctx.now_ms);

        if !self.http_started {
            if !ctx.nav.cell.is_usable() {
                warn!("geolocation lookup without usable cell info");
                self.finish(ctx, TaskOutcome::DecodeError);
                return;
            }
            if !ctx.transport.http_idle() {
                if self.state.elapsed_ms(ctx.now_ms) > OVERALL_TIMEOUT_MS {
                    warn!("http never became idle for geolocation lookup");
                    self.finish(ctx, TaskOutcome::Timeout);
                }
                return;
            }

            let request = ctx.nav.cell.location_request(&ctx.config.geo_api_token);
            let body = match serde_json::to_string(&request) {
                Ok(body) => body,
                Err(err) => {
                    warn!(%err, "location request serialization failed");
                    self.finish(ctx, TaskOutcome::DecodeError);
                    return;
                }
            };
            if !ctx.transport.start_post_json(
                &ctx.config.geo_api_url,
                &body,
                self.request_timeout_ms,
                ctx.now_ms,
            ) {
                self.finish(ctx, TaskOutcome::TransportError);
                return;
            }
            self.http_started = true;
            return;
        }

        ctx.transport.http_step(ctx.now_ms);
        if !ctx.transport.http_done() {
            return;
        }

        let ok = ctx.transport.http_ok();
        let response = ctx.transport.http_result().to_vec();
        ctx.transport.http_reset();

        if !ok || response.is_empty() {
            warn!("geolocation http error or empty response");
            self.finish(ctx, TaskOutcome::TransportError);
            return;
        }

        let response = String::from_utf8_lossy(&response);
        let body = match response.split_once("\r\n\r\n") {
            Some((_, body)) => body,
            None => response.as_ref(),
        };

        if status_not_ok(body) {
            warn!("geolocation api status not ok");
            self.finish(ctx, TaskOutcome::DecodeError);
            return;
        }

        let (Some(lat), Some(lon)) = (
            scan_number_after(body, "\"lat\""),
            scan_number_after(body, "\"lon\""),
        ) else {
            warn!("lat/lon missing from geolocation response");
            self.finish(ctx, TaskOutcome::DecodeError);
            return;
        };

        if lat == 0.0 && lon == 0.0 {
            warn!("geolocation parsed (0,0), check api token");
        }

        // Cell-derived estimate: only fills in while GPS has nothing better.
        if !ctx.nav.has_fix {
            ctx.nav.latitude = lat as f32;
            ctx.nav.longitude = lon as f32;
        }
        debug!(lat, lon, "geolocation lookup resolved");
        self.finish(ctx, TaskOutcome::Ok);
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scans_numbers_after_keys() {
        let body = r#"{"status":"ok","balance":100,"lat":10.8231,"lon":106.6297,"accuracy":900}"#;
        assert_eq!(scan_number_after(body, "\"lat\""), Some(10.8231));
        assert_eq!(scan_number_after(body, "\"lon\""), Some(106.6297));
        assert_eq!(scan_number_after(body, "\"missing\""), None);
    }

    #[test]
    fn scans_negative_and_exponent_forms() {
        let body = r#"{"lat":-33.86,"lon":1.5e2}"#;
        assert_eq!(scan_number_after(body, "\"lat\""), Some(-33.86));
        assert_eq!(scan_number_after(body, "\"lon\""), Some(150.0));
    }

    #[test]
    fn detects_error_status() {
        assert!(!status_not_ok(r#"{"status":"ok","lat":1}"#));
        assert!(status_not_ok(r#"{"status":"error","message":"no token"}"#));
        assert!(!status_not_ok(r#"{"lat":1}"#), "absent status is accepted");
    }
}
