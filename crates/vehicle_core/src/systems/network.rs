use bevy_ecs::prelude::{Res, ResMut};

use crate::boot::{Cadence, VehicleConfig};
use crate::clock::VehicleClock;
use crate::geo::NavState;
use crate::rental::RentalState;
use crate::scheduler::{Priority, TaskQueue};
use crate::tasks::{HttpPumpTask, MqttKeepAliveTask, TaskCtx};
use crate::transport::Transport;
use crate::ui::UiState;

/// Exactly one scheduler step per loop iteration: the head task gets one
/// `execute` against a context assembled from the shared resources.
pub fn scheduler_step_system(
    clock: Res<VehicleClock>,
    config: Res<VehicleConfig>,
    mut queue: ResMut<TaskQueue>,
    mut transport: ResMut<Transport>,
    mut rental: ResMut<RentalState>,
    mut nav: ResMut<NavState>,
    mut ui: ResMut<UiState>,
) {
    let mut ctx = TaskCtx {
        now_ms: clock.tick_ms(),
        now_unix_ms: clock.now_unix_ms().ok(),
        config: &config,
        transport: &mut transport,
        rental: &mut rental,
        nav: &mut nav,
        ui: &mut ui,
    };
    queue.step(&mut ctx);
}

/// Filler maintenance: keep-alive every cycle, HTTP pump only while a
/// request is actually in flight. Never evicts anything.
pub fn maintenance_enqueue_system(
    clock: Res<VehicleClock>,
    transport: Res<Transport>,
    mut cadence: ResMut<Cadence>,
    mut queue: ResMut<TaskQueue>,
) {
    if !cadence.maintenance.fire(clock.tick_ms()) {
        return;
    }
    queue.enqueue_if_space(Box::new(MqttKeepAliveTask::new()), Priority::Low);
    if transport.http_busy() {
        queue.enqueue_if_space(Box::new(HttpPumpTask::new()), Priority::Low);
    }
}
