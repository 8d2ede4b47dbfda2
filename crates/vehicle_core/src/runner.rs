//! Loop runner: advances the clock and runs the system schedule once per tick.

use bevy_ecs::prelude::{Schedule, World};
use bevy_ecs::schedule::IntoSystemConfigs;

use crate::clock::VehicleClock;
use crate::systems::{
    alerts::alert_system,
    battery_sample::battery_sample_system,
    display::display_refresh_system,
    gps_update::gps_update_system,
    helmet::{helmet_debounce_system, helmet_transition_system},
    network::{maintenance_enqueue_system, scheduler_step_system},
    posture_update::posture_update_system,
    qr_intake::qr_intake_system,
    telemetry_report::telemetry_report_system,
};

/// Default loop period for hosts that do not dictate one.
pub const DEFAULT_TICK_MS: u64 = 10;

/// The cooperative loop as a fixed-order schedule: sensor sampling, the
/// rental orchestrator, telemetry, one scheduler step, maintenance enqueue,
/// display refresh.
pub fn vehicle_schedule() -> Schedule {
    let mut schedule = Schedule::default();
    schedule.add_systems(
        (
            helmet_debounce_system,
            battery_sample_system,
            posture_update_system,
            gps_update_system,
            qr_intake_system,
            helmet_transition_system,
            alert_system,
            telemetry_report_system,
            scheduler_step_system,
            maintenance_enqueue_system,
            display_refresh_system,
        )
            .chain(),
    );
    schedule
}

/// One loop iteration: advance the monotonic clock by `dt_ms`, then run
/// every system once, in order.
pub fn run_tick(world: &mut World, schedule: &mut Schedule, dt_ms: u64) {
    world.resource_mut::<VehicleClock>().advance(dt_ms);
    schedule.run(world);
}

/// Run the loop for `duration_ms` of simulated time at a fixed tick. Returns
/// the number of iterations executed.
pub fn run_for(world: &mut World, schedule: &mut Schedule, duration_ms: u64, tick_ms: u64) -> u64 {
    let tick_ms = tick_ms.max(1);
    let ticks = duration_ms / tick_ms;
    for _ in 0..ticks {
        run_tick(world, schedule, tick_ms);
    }
    ticks
}
