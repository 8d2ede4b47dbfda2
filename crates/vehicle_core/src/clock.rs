//! Vehicle time: monotonic tick milliseconds with a wall-clock anchor.
//!
//! The controller has no battery-backed RTC. After modem boot it reads the
//! network clock once (`AT+CCLK?`), anchors that instant against the monotonic
//! tick, and extrapolates wall-clock time from then on:
//! `now_unix_ms() = anchor.unix_ms + (tick_ms − anchor.tick_ms)`.
//!
//! The tick itself is advanced by the runner (`run_tick`), so tests control
//! time exactly.

use bevy_ecs::prelude::Resource;
use thiserror::Error;

/// One second in milliseconds.
pub const ONE_SEC_MS: u64 = 1000;
/// One minute in milliseconds.
pub const ONE_MIN_MS: u64 = 60 * ONE_SEC_MS;
/// One hour in milliseconds.
pub const ONE_HOUR_MS: u64 = 60 * ONE_MIN_MS;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClockError {
    /// `now_unix_ms` was called before the modem clock was read.
    #[error("wall clock not synced yet")]
    NotSynced,
    /// The modem's clock report did not match `+CCLK: "YY/MM/DD,HH:MM:SS±QQ"`.
    #[error("malformed clock report: {0}")]
    BadClockReport(String),
}

#[derive(Debug, Clone, Copy)]
struct WallAnchor {
    unix_ms: i64,
    tick_ms: u64,
}

/// Monotonic clock with an optional wall-clock anchor.
///
/// `tick_ms` starts at 0 and is advanced by the loop; wall-clock queries fail
/// with [ClockError::NotSynced] until [VehicleClock::sync_wall] is called.
#[derive(Debug, Clone, Default, Resource)]
pub struct VehicleClock {
    tick_ms: u64,
    anchor: Option<WallAnchor>,
}

impl VehicleClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the monotonic tick by `dt_ms`. Called once per loop iteration.
    pub fn advance(&mut self, dt_ms: u64) {
        self.tick_ms = self.tick_ms.saturating_add(dt_ms);
    }

    /// Current monotonic time in milliseconds since boot.
    pub fn tick_ms(&self) -> u64 {
        self.tick_ms
    }

    /// Anchor wall-clock time: `unix_ms` corresponds to the current tick.
    /// Re-syncing later is allowed and simply replaces the anchor.
    pub fn sync_wall(&mut self, unix_ms: i64) {
        self.anchor = Some(WallAnchor {
            unix_ms,
            tick_ms: self.tick_ms,
        });
    }

    pub fn is_synced(&self) -> bool {
        self.anchor.is_some()
    }

    /// Wall-clock milliseconds since the Unix epoch, extrapolated from the
    /// anchor via the monotonic tick.
    pub fn now_unix_ms(&self) -> Result<i64, ClockError> {
        let anchor = self.anchor.ok_or(ClockError::NotSynced)?;
        let elapsed = self.tick_ms - anchor.tick_ms;
        Ok(anchor.unix_ms + elapsed as i64)
    }
}

/// Fixed-period cadence helper: `fire` returns `true` at most once per period.
///
/// The first call fires immediately (next-due starts at 0); afterwards the
/// next due time is `now + period`, so a stalled loop does not "catch up"
/// with a burst of fires.
#[derive(Debug, Clone, Copy)]
pub struct Ticker {
    period_ms: u64,
    next_due_ms: u64,
}

impl Ticker {
    pub fn new(period_ms: u64) -> Self {
        Self {
            period_ms,
            next_due_ms: 0,
        }
    }

    pub fn period_ms(&self) -> u64 {
        self.period_ms
    }

    pub fn fire(&mut self, now_ms: u64) -> bool {
        if now_ms < self.next_due_ms {
            return false;
        }
        self.next_due_ms = now_ms + self.period_ms;
        true
    }
}

/// Days in the months preceding each month, non-leap year.
const DAYS_BEFORE_MONTH: [i64; 12] = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334];

fn is_leap_year(year: i64) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// Unix seconds for a broken-down UTC time. Portable `timegm`: no dependency
/// on the process timezone or DST rules.
pub fn unix_from_utc(year: i64, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> i64 {
    let years_since_1970 = year - 1970;

    // Leap days in [1970, year), then one more if we're past February of a
    // leap year.
    let leap_days = (years_since_1970 + 2) / 4 - (years_since_1970 + 70) / 100
        + (years_since_1970 + 370) / 400;

    let mut days = years_since_1970 * 365
        + leap_days
        + DAYS_BEFORE_MONTH[(month - 1) as usize]
        + (day as i64 - 1);
    if month > 2 && is_leap_year(year) {
        days += 1;
    }

    days * 86_400 + hour as i64 * 3_600 + min as i64 * 60 + sec as i64
}

/// Parse a modem clock report (`+CCLK: "24/11/28,07:35:44+28"`) into Unix
/// milliseconds (UTC).
///
/// The trailing offset is the local timezone in quarter-hours (`+28` means
/// UTC+7:00); the quoted timestamp is local time, so the offset is subtracted
/// to reach UTC.
pub fn parse_clock_report(line: &str) -> Result<i64, ClockError> {
    let bad = || ClockError::BadClockReport(line.to_string());

    let open = line.find('"').ok_or_else(bad)?;
    let close = line[open + 1..].find('"').ok_or_else(bad)? + open + 1;
    let stamp = &line[open + 1..close];

    // YY/MM/DD,HH:MM:SS±QQ
    if stamp.len() < 20 {
        return Err(bad());
    }
    let field = |range: std::ops::Range<usize>| -> Result<u32, ClockError> {
        stamp
            .get(range)
            .and_then(|s| s.parse::<u32>().ok())
            .ok_or_else(bad)
    };

    let year = 2000 + field(0..2)? as i64;
    let month = field(3..5)?;
    let day = field(6..8)?;
    let hour = field(9..11)?;
    let min = field(12..14)?;
    let sec = field(15..17)?;
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) || hour > 23 || min > 59 || sec > 60
    {
        return Err(bad());
    }

    let tz: i64 = stamp
        .get(17..)
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(bad)?;
    let tz_offset_secs = tz * 15 * 60;

    let unix_local = unix_from_utc(year, month, day, hour, min, sec);
    let unix_utc = unix_local - tz_offset_secs;
    Ok(unix_utc * 1000)
}
