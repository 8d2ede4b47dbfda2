//! Trip records and QR-payload validation.
//!
//! A trip is issued by the backend and reaches the vehicle as a JSON object
//! inside a QR code. Validation is strict: every required key must be present,
//! non-null, and of the right type before the vehicle talks to the server at
//! all. A mistyped or hand-crafted QR must die here, not in the network path.

use serde_json::Value;
use thiserror::Error;

/// Largest accepted `reservation_expiry` (ms since epoch, ~year 2286).
pub const MAX_RESERVATION_EXPIRY: i64 = 9_999_999_999_999;

const REQUIRED_KEYS: [&str; 5] = ["id", "bike_id", "customer_id", "reservation_expiry", "trip_secret"];

/// A reservation issued by the server. `current_lng`/`current_lat` are filled
/// in by the vehicle just before the validation request is encoded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trip {
    pub id: String,
    pub customer_id: String,
    pub bike_id: String,
    pub reservation_expiry: i64,
    pub trip_secret: String,
    pub current_lng: f32,
    pub current_lat: f32,
}

/// Server-side trip status carried in a one-byte update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripStatus {
    Pending = 0,
    InProgress = 1,
    Complete = 2,
}

/// Body of a termination request: where the ride ended.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TripTerminationPayload {
    pub end_lng: f32,
    pub end_lat: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TripParseError {
    #[error("trip payload is not valid JSON: {0}")]
    Json(String),
    #[error("trip payload is not a JSON object")]
    NotAnObject,
    #[error("missing key '{0}'")]
    MissingKey(&'static str),
    #[error("null value for key '{0}'")]
    NullValue(&'static str),
    #[error("'{key}' is not a {expected}")]
    WrongType {
        key: &'static str,
        expected: &'static str,
    },
    #[error("'reservation_expiry' out of range: {0}")]
    ExpiryOutOfRange(i64),
}

fn required_str(obj: &serde_json::Map<String, Value>, key: &'static str) -> Result<String, TripParseError> {
    match obj.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(TripParseError::WrongType {
            key,
            expected: "string",
        }),
        None => Err(TripParseError::MissingKey(key)),
    }
}

/// Parse and validate a QR trip payload.
pub fn parse_trip_json(raw: &str) -> Result<Trip, TripParseError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| TripParseError::Json(e.to_string()))?;
    let obj = value.as_object().ok_or(TripParseError::NotAnObject)?;

    for key in REQUIRED_KEYS {
        match obj.get(key) {
            None => return Err(TripParseError::MissingKey(key)),
            Some(Value::Null) => return Err(TripParseError::NullValue(key)),
            Some(_) => {}
        }
    }

    let reservation_expiry = match obj.get("reservation_expiry") {
        Some(Value::Number(n)) if n.is_i64() => n.as_i64().unwrap_or_default(),
        _ => {
            return Err(TripParseError::WrongType {
                key: "reservation_expiry",
                expected: "64-bit integer",
            })
        }
    };
    if !(0..=MAX_RESERVATION_EXPIRY).contains(&reservation_expiry) {
        return Err(TripParseError::ExpiryOutOfRange(reservation_expiry));
    }

    Ok(Trip {
        id: required_str(obj, "id")?,
        customer_id: required_str(obj, "customer_id")?,
        bike_id: required_str(obj, "bike_id")?,
        reservation_expiry,
        trip_secret: required_str(obj, "trip_secret")?,
        current_lng: 0.0,
        current_lat: 0.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_json() -> String {
        r#"{"id":"T1","bike_id":"BIK_1","customer_id":"C1","reservation_expiry":9999,"trip_secret":"s"}"#
            .to_string()
    }

    #[test]
    fn accepts_well_formed_payload() {
        let trip = parse_trip_json(&valid_json()).expect("valid trip");
        assert_eq!(trip.id, "T1");
        assert_eq!(trip.bike_id, "BIK_1");
        assert_eq!(trip.customer_id, "C1");
        assert_eq!(trip.reservation_expiry, 9999);
        assert_eq!(trip.trip_secret, "s");
        assert_eq!(trip.current_lng, 0.0);
    }

    #[test]
    fn rejects_non_json_and_non_object() {
        assert!(matches!(
            parse_trip_json("not json"),
            Err(TripParseError::Json(_))
        ));
        assert_eq!(parse_trip_json("[1,2,3]"), Err(TripParseError::NotAnObject));
    }

    #[test]
    fn rejects_missing_and_null_keys() {
        let missing = r#"{"id":"T1","bike_id":"B","customer_id":"C","trip_secret":"s"}"#;
        assert_eq!(
            parse_trip_json(missing),
            Err(TripParseError::MissingKey("reservation_expiry"))
        );

        let null = r#"{"id":null,"bike_id":"B","customer_id":"C","reservation_expiry":1,"trip_secret":"s"}"#;
        assert_eq!(parse_trip_json(null), Err(TripParseError::NullValue("id")));
    }

    #[test]
    fn rejects_wrong_types() {
        let bad_id = r#"{"id":5,"bike_id":"B","customer_id":"C","reservation_expiry":1,"trip_secret":"s"}"#;
        assert_eq!(
            parse_trip_json(bad_id),
            Err(TripParseError::WrongType {
                key: "id",
                expected: "string"
            })
        );

        let bad_expiry = r#"{"id":"T","bike_id":"B","customer_id":"C","reservation_expiry":"soon","trip_secret":"s"}"#;
        assert_eq!(
            parse_trip_json(bad_expiry),
            Err(TripParseError::WrongType {
                key: "reservation_expiry",
                expected: "64-bit integer"
            })
        );

        let float_expiry = r#"{"id":"T","bike_id":"B","customer_id":"C","reservation_expiry":1.5,"trip_secret":"s"}"#;
        assert!(matches!(
            parse_trip_json(float_expiry),
            Err(TripParseError::WrongType { .. })
        ));
    }

    #[test]
    fn rejects_out_of_range_expiry() {
        let negative = r#"{"id":"T","bike_id":"B","customer_id":"C","reservation_expiry":-1,"trip_secret":"s"}"#;
        assert_eq!(
            parse_trip_json(negative),
            Err(TripParseError::ExpiryOutOfRange(-1))
        );

        let huge = r#"{"id":"T","bike_id":"B","customer_id":"C","reservation_expiry":10000000000000,"trip_secret":"s"}"#;
        assert_eq!(
            parse_trip_json(huge),
            Err(TripParseError::ExpiryOutOfRange(10_000_000_000_000))
        );
    }
}
