//! Performance benchmarks for vehicle_core using Criterion.rs.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use vehicle_core::codec::{encode_alert, encode_telemetry};
use vehicle_core::posture::{classify_z1, PostureState};
use vehicle_core::rental::UsageState;
use vehicle_core::scheduler::{Priority, TaskQueue};
use vehicle_core::tasks::MqttPublishTask;
use vehicle_core::telemetry::{Alert, AlertType, Telemetry};

fn sample_telemetry() -> Telemetry {
    Telemetry {
        id: "9f2c11aa-4b4b-4b4b-4b4b-9f2c11aa4b4b".to_string(),
        bike_id: "BIK_298A1J35".to_string(),
        longitude: 106.6297,
        latitude: 10.8231,
        battery: 87,
        time: 1_732_754_144_000,
        last_gps_long: 106.6290,
        last_gps_lat: 10.8229,
        last_gps_contact_time: 1_732_754_140_000,
        battery_is_low: false,
        is_toppled: false,
        is_crashed: false,
        is_out_of_bound: false,
        usage_state: UsageState::InUse,
    }
}

fn bench_codec(c: &mut Criterion) {
    let telemetry = sample_telemetry();
    let alert = Alert {
        id: "9f2c11aa".to_string(),
        bike_id: "BIK_298A1J35".to_string(),
        content: "vehicle toppled".to_string(),
        alert_type: AlertType::Topple,
        longitude: 106.6297,
        latitude: 10.8231,
        time: 1_732_754_144_000,
    };

    let mut group = c.benchmark_group("codec");
    group.bench_function("encode_telemetry", |b| {
        b.iter(|| black_box(encode_telemetry(black_box(&telemetry))))
    });
    group.bench_function("encode_alert", |b| {
        b.iter(|| black_box(encode_alert(black_box(&alert))))
    });
    group.finish();
}

fn bench_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler");
    group.bench_function("enqueue_churn_full_queue", |b| {
        b.iter(|| {
            let mut queue = TaskQueue::default();
            for i in 0..200u32 {
                let priority = match i % 4 {
                    0 => Priority::Low,
                    1 => Priority::Normal,
                    2 => Priority::High,
                    _ => Priority::Critical,
                };
                queue.enqueue(
                    Box::new(MqttPublishTask::new("/telemetry/bench", vec![0u8; 64])),
                    priority,
                );
            }
            black_box(queue.len())
        })
    });
    group.finish();
}

fn bench_posture(c: &mut Criterion) {
    c.bench_function("classify_z1_sweep", |b| {
        b.iter(|| {
            let mut down = 0u32;
            let mut z = -1.0f32;
            while z <= 1.0 {
                if classify_z1(black_box(z)) != PostureState::Upright {
                    down += 1;
                }
                z += 0.001;
            }
            black_box(down)
        })
    });
}

criterion_group!(benches, bench_codec, bench_queue, bench_posture);
criterion_main!(benches);
