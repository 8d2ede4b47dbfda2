//! Wire codec: little-endian, length-prefixed binary records.
//!
//! Every multi-byte integer and float is little-endian. Strings carry a `u8`
//! length (so at most 255 bytes) followed by raw bytes; longer strings are
//! truncated, not rejected. The ids involved are short and server-issued.
//!
//! Field order is the contract; see the per-record encoders.

use thiserror::Error;
use tracing::warn;

use crate::rental::UsageState;
use crate::telemetry::{Alert, AlertType, Telemetry};
use crate::trip::{Trip, TripStatus, TripTerminationPayload};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("payload ended unexpectedly")]
    UnexpectedEnd,
    #[error("string field is not valid UTF-8")]
    InvalidUtf8,
    #[error("invalid trip status code {0}")]
    InvalidStatus(u8),
    #[error("invalid alert type code {0}")]
    InvalidAlertType(u8),
    #[error("invalid usage state code {0}")]
    InvalidUsageState(u8),
}

fn put_str(buf: &mut Vec<u8>, s: &str) {
    let len = s.len().min(255);
    buf.push(len as u8);
    buf.extend_from_slice(&s.as_bytes()[..len]);
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        let end = self.pos.checked_add(n).ok_or(CodecError::UnexpectedEnd)?;
        if end > self.data.len() {
            return Err(CodecError::UnexpectedEnd);
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    fn i32_le(&mut self) -> Result<i32, CodecError> {
        let b: [u8; 4] = self.take(4)?.try_into().expect("4 bytes");
        Ok(i32::from_le_bytes(b))
    }

    fn i64_le(&mut self) -> Result<i64, CodecError> {
        let b: [u8; 8] = self.take(8)?.try_into().expect("8 bytes");
        Ok(i64::from_le_bytes(b))
    }

    fn f32_le(&mut self) -> Result<f32, CodecError> {
        let b: [u8; 4] = self.take(4)?.try_into().expect("4 bytes");
        Ok(f32::from_le_bytes(b))
    }

    fn str(&mut self) -> Result<String, CodecError> {
        let len = self.u8()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)
    }
}

/// Encoded size of a telemetry record for the given string fields.
pub fn telemetry_wire_len(t: &Telemetry) -> usize {
    // id + bike_id prefixes, battery i32, lng/lat f32, time i64,
    // last_gps f32×2, last_contact i64, four flags, usage byte.
    1 + t.id.len().min(255) + 1 + t.bike_id.len().min(255) + 4 + 4 + 4 + 8 + 4 + 4 + 8 + 4 + 1
}

pub fn encode_telemetry(t: &Telemetry) -> Vec<u8> {
    let mut buf = Vec::with_capacity(telemetry_wire_len(t));
    put_str(&mut buf, &t.id);
    put_str(&mut buf, &t.bike_id);
    buf.extend_from_slice(&t.battery.to_le_bytes());
    buf.extend_from_slice(&t.longitude.to_le_bytes());
    buf.extend_from_slice(&t.latitude.to_le_bytes());
    buf.extend_from_slice(&t.time.to_le_bytes());
    buf.extend_from_slice(&t.last_gps_long.to_le_bytes());
    buf.extend_from_slice(&t.last_gps_lat.to_le_bytes());
    buf.extend_from_slice(&t.last_gps_contact_time.to_le_bytes());
    buf.push(t.battery_is_low as u8);
    buf.push(t.is_toppled as u8);
    buf.push(t.is_crashed as u8);
    buf.push(t.is_out_of_bound as u8);
    buf.push(t.usage_state as u8);
    buf
}

pub fn decode_telemetry(data: &[u8]) -> Result<Telemetry, CodecError> {
    let mut r = Reader::new(data);
    Ok(Telemetry {
        id: r.str()?,
        bike_id: r.str()?,
        battery: r.i32_le()?,
        longitude: r.f32_le()?,
        latitude: r.f32_le()?,
        time: r.i64_le()?,
        last_gps_long: r.f32_le()?,
        last_gps_lat: r.f32_le()?,
        last_gps_contact_time: r.i64_le()?,
        battery_is_low: r.u8()? != 0,
        is_toppled: r.u8()? != 0,
        is_crashed: r.u8()? != 0,
        is_out_of_bound: r.u8()? != 0,
        usage_state: match r.u8()? {
            0 => UsageState::Idle,
            1 => UsageState::Reserved,
            2 => UsageState::InUse,
            other => return Err(CodecError::InvalidUsageState(other)),
        },
    })
}

pub fn encode_alert(a: &Alert) -> Vec<u8> {
    let mut buf = Vec::new();
    put_str(&mut buf, &a.id);
    put_str(&mut buf, &a.bike_id);
    put_str(&mut buf, &a.content);
    buf.push(a.alert_type as u8);
    buf.extend_from_slice(&a.longitude.to_le_bytes());
    buf.extend_from_slice(&a.latitude.to_le_bytes());
    buf.extend_from_slice(&a.time.to_le_bytes());
    buf
}

pub fn decode_alert(data: &[u8]) -> Result<Alert, CodecError> {
    let mut r = Reader::new(data);
    Ok(Alert {
        id: r.str()?,
        bike_id: r.str()?,
        content: r.str()?,
        alert_type: match r.u8()? {
            0 => AlertType::Crash,
            1 => AlertType::LowBattery,
            2 => AlertType::BoundaryCross,
            3 => AlertType::Topple,
            other => return Err(CodecError::InvalidAlertType(other)),
        },
        longitude: r.f32_le()?,
        latitude: r.f32_le()?,
        time: r.i64_le()?,
    })
}

/// Validation request body: the trip as received from the QR plus the
/// vehicle's current position.
pub fn encode_trip(t: &Trip) -> Vec<u8> {
    let mut buf = Vec::new();
    put_str(&mut buf, &t.id);
    put_str(&mut buf, &t.customer_id);
    put_str(&mut buf, &t.bike_id);
    buf.extend_from_slice(&t.reservation_expiry.to_le_bytes());
    put_str(&mut buf, &t.trip_secret);
    buf.extend_from_slice(&t.current_lng.to_le_bytes());
    buf.extend_from_slice(&t.current_lat.to_le_bytes());
    buf
}

pub fn encode_termination(p: &TripTerminationPayload) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8);
    buf.extend_from_slice(&p.end_lng.to_le_bytes());
    buf.extend_from_slice(&p.end_lat.to_le_bytes());
    buf
}

/// One-byte validation verdict: zero is invalid, anything else valid.
/// Out-of-vocabulary values and trailing bytes are tolerated with a warning.
pub fn decode_validation_response(data: &[u8]) -> Result<bool, CodecError> {
    let byte = *data.first().ok_or(CodecError::UnexpectedEnd)?;
    if byte > 1 {
        warn!("validation response byte {byte} outside {{0,1}}, treating as valid");
    }
    if data.len() > 1 {
        warn!("validation response has {} trailing bytes", data.len() - 1);
    }
    Ok(byte != 0)
}

/// One-byte trip status update; only {0,1,2} are legal.
pub fn decode_status_update(data: &[u8]) -> Result<TripStatus, CodecError> {
    let byte = *data.first().ok_or(CodecError::UnexpectedEnd)?;
    match byte {
        0 => Ok(TripStatus::Pending),
        1 => Ok(TripStatus::InProgress),
        2 => Ok(TripStatus::Complete),
        other => Err(CodecError::InvalidStatus(other)),
    }
}
