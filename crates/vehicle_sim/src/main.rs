//! Host simulator: drives the vehicle runtime through a scripted rental.
//!
//! Runs the cooperative loop against scripted devices (broker, modem, GPS,
//! helmet, QR) and narrates the lifecycle: boot, reservation, ride with
//! telemetry, helmet-triggered termination. Useful for eyeballing log output
//! and timings without hardware.
//!
//! ```text
//! RUST_LOG=vehicle_core=debug cargo run -p vehicle_sim -- --ride-secs 30
//! ```

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vehicle_core::codec::decode_telemetry;
use vehicle_core::geo::GpsFix;
use vehicle_core::rental::RentalPhase;
use vehicle_core::test_helpers::{build_test_vehicle_with, TestVehicle};
use vehicle_core::boot::VehicleParams;

#[derive(Debug, Parser)]
#[command(about = "Scripted rental against the vehicle runtime")]
struct Args {
    /// Bike identity used in topics and records.
    #[arg(long, default_value = "BIK_298A1J35")]
    bike_id: String,

    /// Ride duration between helmet undock and dock, in seconds.
    #[arg(long, default_value_t = 30)]
    ride_secs: u64,

    /// Seed for the record-id generator.
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn ride(vehicle: &mut TestVehicle, secs: u64) {
    // Drift north-east at scooter speed, one fix per second.
    let (mut lat, mut lng) = (10.8231f32, 106.6297f32);
    for _ in 0..secs {
        lat += 0.00004;
        lng += 0.00002;
        vehicle.gps.set_fix(Some(GpsFix {
            latitude: lat,
            longitude: lng,
        }));
        vehicle.run_ms(1_000);
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let args = Args::parse();

    let params = VehicleParams::default()
        .with_bike_id(args.bike_id.clone())
        .with_seed(args.seed);
    let mut vehicle = build_test_vehicle_with(params);
    info!("vehicle booted, warming up the link");
    vehicle.run_ms(1_000);

    let trip_json = format!(
        r#"{{"id":"TRIP-SIM-1","bike_id":"{}","customer_id":"CUS-77","reservation_expiry":9999999999999,"trip_secret":"sim"}}"#,
        args.bike_id
    );
    info!("rider scans the QR");
    vehicle.qr.push_scan(&trip_json);
    vehicle.run_ms(100);

    info!("server validates the reservation");
    vehicle
        .broker
        .push_inbound("/reservation/TRIP-SIM-1/update", &[0x01]);
    vehicle.run_ms(200);
    assert_eq!(vehicle.phase(), RentalPhase::Reserved);

    info!("rider takes the helmet, ride starts");
    vehicle.helmet.set_connected(false);
    vehicle.run_ms(200);
    ride(&mut vehicle, args.ride_secs);

    info!("rider docks the helmet, trip terminates");
    vehicle.helmet.set_connected(true);
    vehicle.run_ms(200);
    vehicle
        .broker
        .push_inbound("/reservation/TRIP-SIM-1/update", &[0x02]);
    vehicle.run_ms(500);
    assert_eq!(vehicle.phase(), RentalPhase::Idle);

    // Post-run summary from the broker's point of view.
    let telemetry_topic = format!("/telemetry/{}", args.bike_id);
    let records: Vec<_> = vehicle
        .broker
        .published_on(&telemetry_topic)
        .iter()
        .filter_map(|bytes| decode_telemetry(bytes).ok())
        .collect();

    println!("--- simulation summary ---");
    println!("trip:              TRIP-SIM-1 (completed)");
    println!("telemetry records: {}", records.len());
    if let (Some(first), Some(last)) = (records.first(), records.last()) {
        println!(
            "position drift:    ({:.4}, {:.4}) -> ({:.4}, {:.4})",
            first.latitude, first.longitude, last.latitude, last.longitude
        );
        println!("final battery:     {}%", last.battery);
    }
    println!("redraws:           {}", vehicle.display.draws().len());
}
