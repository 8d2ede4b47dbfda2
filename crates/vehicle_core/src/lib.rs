//! # Shared E-Scooter Vehicle Runtime
//!
//! The on-vehicle controller core for a shared e-scooter / e-bike: one
//! cooperative loop supervising sensors, a cellular MQTT/HTTP link, a small
//! OLED page model, and the rental lifecycle against a remote backend.
//!
//! ## Overview
//!
//! - **Priority task scheduler**: bounded, sorted queue of non-blocking
//!   network tasks over a single cellular transport
//! - **Task catalog**: publish, keep-alive, HTTP pump, serving-cell query,
//!   geolocation lookup, reservation validate/terminate
//! - **Battery estimator**: coulomb counting with voltage re-anchoring and
//!   non-volatile persistence
//! - **Posture classifier**: accelerometer-derived vehicle posture with
//!   dwell-time hysteresis
//! - **Rental orchestrator**: QR → validation → in-use → helmet-triggered
//!   termination, with alerts and periodic telemetry
//!
//! ## Key Concepts
//!
//! - **Cooperative**: single-threaded; tasks suspend by returning from
//!   `execute` without completing, and resume on the next scheduler step
//! - **Deterministic**: the clock is advanced by the caller, hardware enters
//!   through trait seams, and ids come from a seedable generator
//! - **Bounded**: the queue holds at most 20 tasks; admission under pressure
//!   is strictly by priority with tail eviction
//!
//! ## Example
//!
//! ```rust,no_run
//! use bevy_ecs::prelude::World;
//! use vehicle_core::boot::{build_vehicle, sync_wall_clock, VehicleParams};
//! use vehicle_core::runner::{run_for, vehicle_schedule, DEFAULT_TICK_MS};
//! # fn devices() -> vehicle_core::boot::DeviceBundle { unimplemented!() }
//!
//! let mut world = World::new();
//! build_vehicle(&mut world, VehicleParams::default().with_seed(42), devices());
//! sync_wall_clock(&mut world, 16);
//!
//! let mut schedule = vehicle_schedule();
//! run_for(&mut world, &mut schedule, 60_000, DEFAULT_TICK_MS);
//! ```

pub mod battery;
pub mod boot;
pub mod clock;
pub mod codec;
pub mod geo;
pub mod modem;
pub mod posture;
pub mod rental;
pub mod runner;
pub mod scheduler;
pub mod systems;
pub mod tasks;
pub mod telemetry;
pub mod transport;
pub mod trip;
pub mod ui;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
