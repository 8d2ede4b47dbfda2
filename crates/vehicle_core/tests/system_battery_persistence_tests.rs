//! Battery state across power cycles, driven through the store seam.

use vehicle_core::battery::{BatteryMonitor, BatteryRecord, MAX_MAH};
use vehicle_core::test_helpers::{SharedGauge, SharedStore};

fn boot(gauge: &SharedGauge, store: &SharedStore) -> BatteryMonitor {
    let mut monitor = BatteryMonitor::new(gauge.gauge(), store.store());
    monitor.begin(0);
    monitor
}

#[test]
fn counter_survives_a_reboot_when_voltage_matches() {
    let gauge = SharedGauge::new(7.8, 400.0);
    let store = SharedStore::new();

    // First life: discharge for an hour, landing well into the pack.
    let mut first = boot(&gauge, &store);
    for minute in 1..=60u64 {
        first.update(minute * 60_000);
    }
    let used_at_shutdown = first.mah_used();
    assert!(used_at_shutdown > 0.0);
    // The 2-minute cadence has persisted along the way.
    let persisted = BatteryRecord::from_bytes(&store.bytes().expect("saved")).expect("valid");
    assert!((persisted.mah_used - used_at_shutdown).abs() < 10.0);

    // Second life at a similar voltage: adopt the persisted counter.
    let second = boot(&gauge, &store);
    assert!((second.mah_used() - persisted.mah_used).abs() < f32::EPSILON);
}

#[test]
fn swapped_pack_reanchors_from_voltage() {
    let store = SharedStore::new();
    store.set_bytes(Some(
        BatteryRecord {
            highest_voltage: 8.20,
            mah_used: 1600.0,
        }
        .to_bytes()
        .to_vec(),
    ));

    // Boot with a much lower pack voltage: 6.90 V → 20% SOC.
    let gauge = SharedGauge::new(6.90, 0.0);
    let monitor = boot(&gauge, &store);

    assert!((monitor.mah_used() - MAX_MAH * 0.80).abs() < 1.0);
    assert_eq!(monitor.level_percent(), 20);

    // Re-anchored state replaced the stale record.
    let persisted = BatteryRecord::from_bytes(&store.bytes().expect("saved")).expect("valid");
    assert!((persisted.highest_voltage - 6.90).abs() < 1e-3);
}

#[test]
fn save_failures_do_not_stop_the_estimator() {
    let gauge = SharedGauge::new(7.5, 200.0);
    let store = SharedStore::new();
    store.fail_saves(true);

    let mut monitor = boot(&gauge, &store);
    for minute in 1..=10u64 {
        monitor.update(minute * 60_000);
    }
    assert!(monitor.mah_used() > 0.0, "estimation continues");
    assert_eq!(store.bytes(), None, "nothing was persisted");
}

#[test]
fn garbage_in_the_store_falls_back_to_voltage() {
    let store = SharedStore::new();
    store.set_bytes(Some(vec![0x13, 0x37, 0xAB, 0xCD]));

    let gauge = SharedGauge::new(8.40, 0.0);
    let monitor = boot(&gauge, &store);
    assert_eq!(monitor.level_percent(), 100);
    assert_eq!(monitor.mah_used(), 0.0);

    // The magic word was rewritten on the post-anchor save.
    let persisted = BatteryRecord::from_bytes(&store.bytes().expect("saved"));
    assert!(persisted.is_some());
}
