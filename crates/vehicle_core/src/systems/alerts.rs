use bevy_ecs::prelude::{Res, ResMut};
use tracing::info;

use crate::battery::BatteryMonitor;
use crate::boot::{Cadence, VehicleConfig};
use crate::clock::VehicleClock;
use crate::codec::encode_alert;
use crate::geo::{GeoFence, NavState};
use crate::posture::PostureMonitor;
use crate::rental::{OperationState, RentalState};
use crate::scheduler::{Priority, TaskQueue};
use crate::tasks::MqttPublishTask;
use crate::telemetry::{Alert, AlertType, TelemetryIdGen};
use crate::ui::{DisplayPage, UiState};

fn push_alert(
    queue: &mut TaskQueue,
    config: &VehicleConfig,
    ids: &mut TelemetryIdGen,
    nav: &NavState,
    time: i64,
    alert_type: AlertType,
    content: &str,
) {
    let alert = Alert {
        id: ids.next_id(),
        bike_id: config.bike_id.clone(),
        content: content.to_string(),
        alert_type,
        longitude: nav.longitude,
        latitude: nav.latitude,
        time,
    };
    info!(kind = alert_type.as_str(), "alert raised");
    queue.enqueue(
        Box::new(MqttPublishTask::new(config.alert_topic(), encode_alert(&alert))),
        Priority::Critical,
    );
}

/// Alert production, throttled to one evaluation per second.
///
/// Each condition fires once per episode: the in-flight marker clears only
/// when the condition resolves (posture upright again, SOC back above the
/// threshold, vehicle back inside the fence).
pub fn alert_system(
    clock: Res<VehicleClock>,
    config: Res<VehicleConfig>,
    fence: Res<GeoFence>,
    posture: Res<PostureMonitor>,
    battery: Res<BatteryMonitor>,
    nav: Res<NavState>,
    mut cadence: ResMut<Cadence>,
    mut rental: ResMut<RentalState>,
    mut queue: ResMut<TaskQueue>,
    mut ids: ResMut<TelemetryIdGen>,
    mut ui: ResMut<UiState>,
) {
    if !cadence.alerts.fire(clock.tick_ms()) {
        return;
    }
    let time = clock.now_unix_ms().unwrap_or(0);

    // Topple: one alert per lay-down episode.
    if posture.confirmed().is_down() {
        if !rental.topple_alert_inflight {
            rental.topple_alert_inflight = true;
            push_alert(
                &mut queue,
                &config,
                &mut ids,
                &nav,
                time,
                AlertType::Topple,
                "vehicle toppled",
            );
        }
    } else if rental.topple_alert_inflight && posture.confirmed() == crate::posture::PostureState::Upright {
        rental.topple_alert_inflight = false;
    }

    // Low battery: once per excursion below the threshold.
    if battery.is_low() {
        if !rental.low_battery_alerted {
            rental.low_battery_alerted = true;
            rental.operation = OperationState::LowBattery;
            ui.set_page(DisplayPage::LowBatteryAlert);
            push_alert(
                &mut queue,
                &config,
                &mut ids,
                &nav,
                time,
                AlertType::LowBattery,
                "battery low",
            );
        }
    } else {
        rental.low_battery_alerted = false;
        if rental.operation == OperationState::LowBattery {
            rental.operation = OperationState::Normal;
        }
    }

    // Geofence: only judged on a live GPS fix.
    if nav.has_fix && !fence.inside(nav.latitude as f64, nav.longitude as f64) {
        if !rental.boundary_alerted {
            rental.boundary_alerted = true;
            rental.operation = OperationState::OutOfBound;
            ui.set_page(DisplayPage::BoundaryCrossAlert);
            push_alert(
                &mut queue,
                &config,
                &mut ids,
                &nav,
                time,
                AlertType::BoundaryCross,
                "outside allowed area",
            );
        }
    } else if nav.has_fix {
        rental.boundary_alerted = false;
        if rental.operation == OperationState::OutOfBound {
            rental.operation = OperationState::Normal;
        }
    }
}
