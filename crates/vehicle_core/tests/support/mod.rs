#![allow(dead_code)]

//! Shared helpers for the integration tests.

use vehicle_core::test_helpers::TestVehicle;

pub const TEST_BIKE: &str = "BIK_TEST";

/// A well-formed QR trip payload for the given ids.
pub fn trip_json(trip_id: &str, bike_id: &str) -> String {
    format!(
        r#"{{"id":"{trip_id}","bike_id":"{bike_id}","customer_id":"C1","reservation_expiry":9999,"trip_secret":"s"}}"#
    )
}

/// Run the loop until the keep-alive path has brought the MQTT session up.
pub fn warm_up(vehicle: &mut TestVehicle) {
    vehicle.run_ms(1_000);
    assert!(
        vehicle.broker.is_connected(),
        "mqtt session should be up after warm-up"
    );
}

/// Scan a QR, let validation publish, answer with "valid".
pub fn reserve_trip(vehicle: &mut TestVehicle, trip_id: &str) {
    vehicle.qr.push_scan(&trip_json(trip_id, TEST_BIKE));
    vehicle.run_ms(100);
    vehicle
        .broker
        .push_inbound(&format!("/reservation/{trip_id}/update"), &[1]);
    vehicle.run_ms(100);
}

/// Undock the helmet long enough for the debounced edge to fire.
pub fn start_ride(vehicle: &mut TestVehicle) {
    vehicle.helmet.set_connected(false);
    vehicle.run_ms(200);
}
