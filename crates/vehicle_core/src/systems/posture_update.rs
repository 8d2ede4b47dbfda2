use bevy_ecs::prelude::{Res, ResMut};

use crate::clock::VehicleClock;
use crate::posture::PostureMonitor;

/// One accelerometer sample into the posture classifier.
pub fn posture_update_system(clock: Res<VehicleClock>, mut posture: ResMut<PostureMonitor>) {
    posture.update(clock.tick_ms());
}
