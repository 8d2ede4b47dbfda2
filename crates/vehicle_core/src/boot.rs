//! Vehicle assembly: parameters, device seams, and world construction.
//!
//! `build_vehicle` inserts every resource the schedule needs into a fresh
//! [World]. The hardware enters as a [DeviceBundle] of boxed trait objects;
//! production wires real drivers, tests wire the scripted devices from
//! [crate::test_helpers].

use bevy_ecs::prelude::{Resource, World};
use tracing::{info, warn};

use crate::battery::{BatteryGauge, BatteryMonitor, BatteryStore};
use crate::clock::{parse_clock_report, Ticker, VehicleClock};
use crate::geo::{GeoFence, GpsDevice, GpsReceiver, NavState};
use crate::posture::{Imu, PostureMonitor};
use crate::rental::{HelmetDevice, HelmetState, HelmetSwitch, QrDevice, QrScanner, RentalState};
use crate::scheduler::TaskQueue;
use crate::telemetry::TelemetryIdGen;
use crate::transport::{ModemControl, MqttClient, MqttCredentials, TcpSocket, Transport};
use crate::ui::{Display, DisplayDevice, UiState};

/// Identity, credentials, topic construction, and API endpoints.
#[derive(Debug, Clone, Resource)]
pub struct VehicleConfig {
    pub bike_id: String,
    pub geo_api_url: String,
    pub geo_api_token: String,
}

impl VehicleConfig {
    /// Config with default endpoints for the given bike id.
    pub fn for_bike(bike_id: impl Into<String>) -> Self {
        Self {
            bike_id: bike_id.into(),
            geo_api_url: "http://eu1.unwiredlabs.com/v2/process.php".to_string(),
            geo_api_token: String::new(),
        }
    }

    pub fn telemetry_topic(&self) -> String {
        format!("/telemetry/{}", self.bike_id)
    }

    pub fn alert_topic(&self) -> String {
        format!("alerts/{}", self.bike_id)
    }

    pub fn validate_request_topic(&self) -> String {
        format!("/reservation/{}/validate", self.bike_id)
    }

    /// Bike-side subscription carrying both the validation response and the
    /// termination status for a trip.
    pub fn update_topic(&self, trip_id: &str) -> String {
        format!("/reservation/{trip_id}/update")
    }

    pub fn termination_topic(&self, trip_id: &str) -> String {
        format!("/reservation/{}/{}/termination", self.bike_id, trip_id)
    }
}

/// Cadence tickers for the periodic systems.
#[derive(Debug, Resource)]
pub struct Cadence {
    pub telemetry: Ticker,
    pub alerts: Ticker,
    pub maintenance: Ticker,
}

/// Everything the loop runs against.
#[derive(Debug, Clone)]
pub struct VehicleParams {
    pub bike_id: String,
    pub mqtt_user: String,
    pub mqtt_pass: String,
    pub mqtt_client_prefix: String,
    pub geo_api_url: String,
    pub geo_api_token: String,
    pub telemetry_interval_ms: u64,
    pub alert_interval_ms: u64,
    pub maintenance_interval_ms: u64,
    /// Seed for the telemetry id generator; `None` draws from entropy.
    pub id_seed: Option<u64>,
    pub fence: GeoFence,
}

impl Default for VehicleParams {
    fn default() -> Self {
        Self {
            bike_id: "BIK_298A1J35".to_string(),
            mqtt_user: "BIK_298A1J35".to_string(),
            mqtt_pass: String::new(),
            mqtt_client_prefix: "goscoot-bike".to_string(),
            geo_api_url: "http://eu1.unwiredlabs.com/v2/process.php".to_string(),
            geo_api_token: String::new(),
            telemetry_interval_ms: 5_000,
            alert_interval_ms: 1_000,
            maintenance_interval_ms: 200,
            id_seed: None,
            fence: GeoFence::unbounded(),
        }
    }
}

impl VehicleParams {
    pub fn with_bike_id(mut self, bike_id: impl Into<String>) -> Self {
        self.bike_id = bike_id.into();
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.id_seed = Some(seed);
        self
    }

    pub fn with_fence(mut self, fence: GeoFence) -> Self {
        self.fence = fence;
        self
    }

    pub fn with_telemetry_interval_ms(mut self, interval_ms: u64) -> Self {
        self.telemetry_interval_ms = interval_ms;
        self
    }
}

/// The hardware seams, as the loop consumes them.
pub struct DeviceBundle {
    pub gauge: Box<dyn BatteryGauge>,
    pub battery_store: Box<dyn BatteryStore>,
    pub imu: Box<dyn Imu>,
    pub gps: Box<dyn GpsReceiver>,
    pub helmet: Box<dyn HelmetSwitch>,
    pub qr: Box<dyn QrScanner>,
    pub display: Box<dyn Display>,
    pub mqtt: Box<dyn MqttClient>,
    pub socket: Box<dyn TcpSocket>,
    pub modem: Box<dyn ModemControl>,
}

/// Insert every runtime resource into `world`. The battery estimator runs
/// its startup restore/re-anchor here.
pub fn build_vehicle(world: &mut World, params: VehicleParams, devices: DeviceBundle) {
    world.insert_resource(VehicleClock::new());
    world.insert_resource(Cadence {
        telemetry: Ticker::new(params.telemetry_interval_ms),
        alerts: Ticker::new(params.alert_interval_ms),
        maintenance: Ticker::new(params.maintenance_interval_ms),
    });
    world.insert_resource(VehicleConfig {
        bike_id: params.bike_id.clone(),
        geo_api_url: params.geo_api_url.clone(),
        geo_api_token: params.geo_api_token.clone(),
    });
    world.insert_resource(Transport::new(
        devices.mqtt,
        devices.socket,
        devices.modem,
        MqttCredentials {
            client_id_prefix: params.mqtt_client_prefix.clone(),
            user: params.mqtt_user.clone(),
            pass: params.mqtt_pass.clone(),
        },
    ));
    world.insert_resource(TaskQueue::default());
    world.insert_resource(RentalState::default());
    world.insert_resource(NavState::default());
    world.insert_resource(HelmetState::default());
    world.insert_resource(UiState::default());
    world.insert_resource(TelemetryIdGen::new(params.id_seed));
    world.insert_resource(params.fence.clone());

    let mut battery = BatteryMonitor::new(devices.gauge, devices.battery_store);
    battery.begin(0);
    world.insert_resource(battery);

    world.insert_resource(PostureMonitor::new(devices.imu));
    world.insert_resource(GpsDevice(devices.gps));
    world.insert_resource(HelmetDevice(devices.helmet));
    world.insert_resource(QrDevice(devices.qr));
    world.insert_resource(DisplayDevice(devices.display));

    info!(bike_id = %params.bike_id, "vehicle runtime assembled");
}

/// One-shot wall-clock sync from the modem (`AT+CCLK?`). Reads up to
/// `max_lines` response lines looking for the clock report; returns whether
/// the clock was anchored. Called once after modem boot; a failure leaves
/// the clock unsynced (telemetry waits, alerts stamp zero).
pub fn sync_wall_clock(world: &mut World, max_lines: usize) -> bool {
    let mut transport = world.resource_mut::<Transport>();
    transport.modem_drain();
    if !transport.modem_send("AT+CCLK?") {
        warn!("clock read command failed");
        return false;
    }

    let mut report = None;
    for _ in 0..max_lines {
        let Some(line) = transport.modem_poll_line() else {
            break;
        };
        let line = line.trim().to_string();
        if line.starts_with("+CCLK") {
            report = Some(line);
        } else if line == "OK" {
            break;
        } else if line.contains("ERROR") {
            warn!("clock read returned ERROR");
            return false;
        }
    }

    let Some(report) = report else {
        warn!("no clock report from modem");
        return false;
    };
    match parse_clock_report(&report) {
        Ok(unix_ms) => {
            world.resource_mut::<VehicleClock>().sync_wall(unix_ms);
            info!(unix_ms, "wall clock synced from modem");
            true
        }
        Err(err) => {
            warn!(%err, %report, "clock report rejected");
            false
        }
    }
}
