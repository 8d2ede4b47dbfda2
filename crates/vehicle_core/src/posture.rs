//! Vehicle posture from accelerometer data, with dwell-time hysteresis.
//!
//! Each tick the normalized Z component of gravity (`z1`, rounded to one
//! decimal) maps to a candidate posture. A candidate is only promoted to the
//! confirmed posture after it has been stable for that posture's dwell time,
//! so a pothole cannot fake a topple, while a genuine lay-down is still
//! confirmed within seconds.

use bevy_ecs::prelude::Resource;

/// Below this acceleration magnitude the sample is noise and is discarded.
const ACCEL_EPSILON: f32 = 1e-3;

/// Accelerometer seam. `None` when the IMU is not responding.
pub trait Imu: Send + Sync {
    /// Raw acceleration vector `[ax, ay, az]` in any consistent unit.
    fn accel(&mut self) -> Option<[f32; 3]>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PostureState {
    #[default]
    Unknown,
    Upright,
    Tilted,
    OnSide,
    UpsideDown,
}

impl PostureState {
    /// Minimum stable time before this posture is confirmed.
    pub fn dwell_ms(self) -> u64 {
        match self {
            PostureState::Unknown => 0,
            PostureState::Upright => 2_000,
            PostureState::Tilted => 1_000,
            PostureState::OnSide => 3_000,
            PostureState::UpsideDown => 30_000,
        }
    }

    /// True for any lying posture worth alerting on.
    pub fn is_down(self) -> bool {
        matches!(
            self,
            PostureState::Tilted | PostureState::OnSide | PostureState::UpsideDown
        )
    }
}

/// Map a rounded normalized-Z value to a posture candidate.
pub fn classify_z1(z1: f32) -> PostureState {
    if z1 < 0.0 {
        PostureState::UpsideDown
    } else if z1 < 0.7 {
        PostureState::OnSide
    } else if z1 < 0.8 {
        PostureState::Tilted
    } else {
        PostureState::Upright
    }
}

/// Posture classifier resource; owns the IMU seam.
#[derive(Resource)]
pub struct PostureMonitor {
    imu: Box<dyn Imu>,
    confirmed: PostureState,
    candidate: PostureState,
    z1: f32,
    stable_since_ms: u64,
}

impl PostureMonitor {
    pub fn new(imu: Box<dyn Imu>) -> Self {
        Self {
            imu,
            confirmed: PostureState::Unknown,
            candidate: PostureState::Unknown,
            z1: 0.0,
            stable_since_ms: 0,
        }
    }

    pub fn confirmed(&self) -> PostureState {
        self.confirmed
    }

    pub fn candidate(&self) -> PostureState {
        self.candidate
    }

    pub fn z1(&self) -> f32 {
        self.z1
    }

    /// Feed one sample from the IMU. No-op if the sensor does not answer or
    /// the magnitude is degenerate.
    pub fn update(&mut self, now_ms: u64) {
        let Some([ax, ay, az]) = self.imu.accel() else {
            return;
        };
        let magnitude = (ax * ax + ay * ay + az * az).sqrt();
        if magnitude <= ACCEL_EPSILON {
            return;
        }

        let z1 = ((az / magnitude) * 10.0).round() / 10.0;
        let candidate = classify_z1(z1);

        if z1 != self.z1 || candidate != self.candidate {
            self.z1 = z1;
            self.candidate = candidate;
            self.stable_since_ms = now_ms;
        }

        if self.candidate != self.confirmed
            && now_ms.saturating_sub(self.stable_since_ms) >= self.candidate.dwell_ms()
        {
            self.confirmed = self.candidate;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedImu(Arc<Mutex<Option<[f32; 3]>>>);

    impl Imu for SharedImu {
        fn accel(&mut self) -> Option<[f32; 3]> {
            *self.0.lock().unwrap()
        }
    }

    fn with_accel(accel: [f32; 3]) -> (PostureMonitor, SharedImu) {
        let imu = SharedImu(Arc::new(Mutex::new(Some(accel))));
        (PostureMonitor::new(Box::new(imu.clone())), imu)
    }

    #[test]
    fn z1_bands_map_to_expected_candidates() {
        assert_eq!(classify_z1(1.0), PostureState::Upright);
        assert_eq!(classify_z1(0.8), PostureState::Upright);
        assert_eq!(classify_z1(0.7), PostureState::Tilted);
        assert_eq!(classify_z1(0.5), PostureState::OnSide);
        assert_eq!(classify_z1(0.0), PostureState::OnSide);
        assert_eq!(classify_z1(-0.1), PostureState::UpsideDown);
    }

    #[test]
    fn upright_confirms_after_its_dwell_time() {
        let (mut posture, _imu) = with_accel([0.0, 0.0, 1.0]);
        posture.update(0);
        assert_eq!(posture.confirmed(), PostureState::Unknown);
        posture.update(1_999);
        assert_eq!(posture.confirmed(), PostureState::Unknown);
        posture.update(2_000);
        assert_eq!(posture.confirmed(), PostureState::Upright);
    }

    #[test]
    fn oscillating_candidate_never_confirms() {
        let (mut posture, imu) = with_accel([0.0, 0.0, 1.0]);
        posture.update(0);
        posture.update(2_000);
        assert_eq!(posture.confirmed(), PostureState::Upright);

        // Flip between on-side and upright faster than either dwell time.
        for i in 0..10 {
            let accel = if i % 2 == 0 {
                [1.0, 0.0, 0.1]
            } else {
                [0.0, 0.0, 1.0]
            };
            *imu.0.lock().unwrap() = Some(accel);
            posture.update(2_000 + (i + 1) * 500);
        }
        assert_eq!(posture.confirmed(), PostureState::Upright);
    }

    #[test]
    fn lay_down_confirms_after_three_seconds() {
        let (mut posture, imu) = with_accel([0.0, 0.0, 1.0]);
        posture.update(0);
        posture.update(2_000);

        *imu.0.lock().unwrap() = Some([1.0, 0.0, 0.05]);
        posture.update(2_100);
        assert_eq!(posture.candidate(), PostureState::OnSide);
        assert_eq!(posture.confirmed(), PostureState::Upright);

        posture.update(5_000);
        assert_eq!(posture.confirmed(), PostureState::Upright);
        posture.update(5_100);
        assert_eq!(posture.confirmed(), PostureState::OnSide);
    }

    #[test]
    fn sensor_dropout_keeps_last_state() {
        let (mut posture, imu) = with_accel([0.0, 0.0, 1.0]);
        posture.update(0);
        posture.update(2_000);
        assert_eq!(posture.confirmed(), PostureState::Upright);

        *imu.0.lock().unwrap() = None;
        posture.update(10_000);
        assert_eq!(posture.confirmed(), PostureState::Upright);
    }

    #[test]
    fn z1_change_within_same_band_resets_dwell() {
        let (mut posture, imu) = with_accel([0.6, 0.0, 0.4]);
        posture.update(0);
        assert_eq!(posture.candidate(), PostureState::OnSide);

        // Still OnSide but a different rounded z1: the stability window restarts.
        *imu.0.lock().unwrap() = Some([0.866, 0.0, 0.5]);
        posture.update(2_900);
        posture.update(3_000);
        assert_eq!(posture.confirmed(), PostureState::Unknown);
        posture.update(5_900);
        assert_eq!(posture.confirmed(), PostureState::OnSide);
    }
}
