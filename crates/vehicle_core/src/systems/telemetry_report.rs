use bevy_ecs::prelude::{Res, ResMut};
use tracing::debug;

use crate::battery::BatteryMonitor;
use crate::boot::{Cadence, VehicleConfig};
use crate::clock::VehicleClock;
use crate::codec::encode_telemetry;
use crate::geo::NavState;
use crate::posture::PostureMonitor;
use crate::rental::{OperationState, RentalState};
use crate::scheduler::{Priority, TaskQueue};
use crate::tasks::MqttPublishTask;
use crate::telemetry::{Telemetry, TelemetryIdGen};

/// Periodic telemetry: assemble the record from current sensor state and
/// enqueue its publish at normal priority. Waits for wall-clock sync; a
/// record stamped with a fake epoch is worse than a late one.
pub fn telemetry_report_system(
    clock: Res<VehicleClock>,
    config: Res<VehicleConfig>,
    battery: Res<BatteryMonitor>,
    posture: Res<PostureMonitor>,
    nav: Res<NavState>,
    rental: Res<RentalState>,
    mut cadence: ResMut<Cadence>,
    mut ids: ResMut<TelemetryIdGen>,
    mut queue: ResMut<TaskQueue>,
) {
    if !cadence.telemetry.fire(clock.tick_ms()) {
        return;
    }
    let Ok(time) = clock.now_unix_ms() else {
        debug!("telemetry skipped, wall clock not synced");
        return;
    };

    let record = Telemetry {
        id: ids.next_id(),
        bike_id: config.bike_id.clone(),
        longitude: nav.longitude,
        latitude: nav.latitude,
        battery: battery.level_percent(),
        time,
        last_gps_long: nav.last_gps_long,
        last_gps_lat: nav.last_gps_lat,
        last_gps_contact_time: nav.last_gps_contact_ms,
        battery_is_low: battery.is_low(),
        is_toppled: posture.confirmed().is_down(),
        is_crashed: false,
        is_out_of_bound: rental.operation == OperationState::OutOfBound,
        usage_state: rental.usage,
    };

    queue.enqueue(
        Box::new(MqttPublishTask::new(
            config.telemetry_topic(),
            encode_telemetry(&record),
        )),
        Priority::Normal,
    );
}
