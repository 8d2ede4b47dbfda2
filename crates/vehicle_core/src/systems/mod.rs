//! Per-tick systems, one file per concern. [crate::runner::vehicle_schedule]
//! chains them in loop order: sensors first, then the rental orchestrator,
//! then exactly one scheduler step, then maintenance and the display.

pub mod alerts;
pub mod battery_sample;
pub mod display;
pub mod gps_update;
pub mod helmet;
pub mod network;
pub mod posture_update;
pub mod qr_intake;
pub mod telemetry_report;
