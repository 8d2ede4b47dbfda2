//! Scripted devices for tests and host simulation.
//!
//! Each fake is a cheap handle around shared state: the handle stays with the
//! test (or the simulator script) to script inputs and inspect effects, while
//! a boxed endpoint goes into the [crate::boot::DeviceBundle]. Everything is
//! deterministic; nothing sleeps or spawns.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bevy_ecs::prelude::{Schedule, World};

use crate::battery::{BatteryGauge, BatteryStore};
use crate::boot::{build_vehicle, sync_wall_clock, DeviceBundle, VehicleParams};
use crate::geo::{GpsFix, GpsReceiver};
use crate::posture::Imu;
use crate::rental::{HelmetSwitch, QrScanner, RentalPhase, RentalState, UsageState};
use crate::runner::{run_tick, vehicle_schedule, DEFAULT_TICK_MS};
use crate::transport::{
    InboundMessage, ModemControl, MqttClient, MqttCredentials, TcpSocket, Transport,
};
use crate::ui::{Display, DisplayPage, UiState};

/// Clock report the fake modem answers with by default
/// (2024-11-28 07:35:44 UTC+7).
pub const TEST_CLOCK_REPORT: &str = "+CCLK: \"24/11/28,07:35:44+28\"";
/// Matching Unix ms for [TEST_CLOCK_REPORT].
pub const TEST_CLOCK_UNIX_MS: i64 = 1_732_754_144_000;
/// Serving-cell report the fake modem answers with by default.
pub const TEST_CPSI_LINE: &str = "+CPSI: LTE,Online,452-02,0x1817,156384564,155,EUTRAN-BAND3";

// ----- MQTT broker ---------------------------------------------------------

#[derive(Default)]
struct BrokerInner {
    connected: bool,
    fail_connects: u32,
    connect_attempts: u32,
    client_ids: Vec<String>,
    subscriptions: Vec<String>,
    published: Vec<(String, Vec<u8>)>,
    inbound: VecDeque<InboundMessage>,
}

/// Handle to a scripted broker.
#[derive(Clone, Default)]
pub struct FakeBroker {
    inner: Arc<Mutex<BrokerInner>>,
}

struct BrokerEndpoint {
    inner: Arc<Mutex<BrokerInner>>,
}

impl FakeBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Boxed client endpoint for the device bundle.
    pub fn client(&self) -> Box<dyn MqttClient> {
        Box::new(BrokerEndpoint {
            inner: self.inner.clone(),
        })
    }

    /// Make the next `n` connect attempts fail.
    pub fn fail_connects(&self, n: u32) {
        self.inner.lock().unwrap().fail_connects = n;
    }

    pub fn connect_attempts(&self) -> u32 {
        self.inner.lock().unwrap().connect_attempts
    }

    pub fn client_ids(&self) -> Vec<String> {
        self.inner.lock().unwrap().client_ids.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.lock().unwrap().connected
    }

    /// Server-side session drop (next keep-alive notices).
    pub fn force_disconnect(&self) {
        self.inner.lock().unwrap().connected = false;
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.inner
            .lock()
            .unwrap()
            .subscriptions
            .iter()
            .any(|t| t == topic)
    }

    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.inner.lock().unwrap().published.clone()
    }

    /// Publishes on `topic`, in order.
    pub fn published_on(&self, topic: &str) -> Vec<Vec<u8>> {
        self.inner
            .lock()
            .unwrap()
            .published
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, p)| p.clone())
            .collect()
    }

    /// Queue a broker→vehicle message; delivered on the next poll if the
    /// vehicle is subscribed to the topic.
    pub fn push_inbound(&self, topic: &str, payload: &[u8]) {
        self.inner.lock().unwrap().inbound.push_back(InboundMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        });
    }
}

impl MqttClient for BrokerEndpoint {
    fn connect(&mut self, client_id: &str, _user: &str, _pass: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        inner.connect_attempts += 1;
        inner.client_ids.push(client_id.to_string());
        if inner.fail_connects > 0 {
            inner.fail_connects -= 1;
            return false;
        }
        inner.connected = true;
        true
    }

    fn is_connected(&self) -> bool {
        self.inner.lock().unwrap().connected
    }

    fn disconnect(&mut self) {
        self.inner.lock().unwrap().connected = false;
    }

    fn subscribe(&mut self, topic: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if !inner.connected {
            return false;
        }
        if !inner.subscriptions.iter().any(|t| t == topic) {
            inner.subscriptions.push(topic.to_string());
        }
        true
    }

    fn unsubscribe(&mut self, topic: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        inner.subscriptions.retain(|t| t != topic);
        true
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if !inner.connected {
            return false;
        }
        inner.published.push((topic.to_string(), payload.to_vec()));
        true
    }

    fn poll(&mut self) -> Vec<InboundMessage> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.connected {
            return Vec::new();
        }
        let mut delivered = Vec::new();
        while let Some(message) = inner.inbound.pop_front() {
            // The broker only sends what the session subscribed to.
            if inner.subscriptions.iter().any(|t| *t == message.topic) {
                delivered.push(message);
            }
        }
        delivered
    }
}

// ----- TCP socket ----------------------------------------------------------

#[derive(Default)]
struct SocketInner {
    connected: bool,
    refuse_connect: bool,
    close_after_read: bool,
    written: Vec<u8>,
    to_read: VecDeque<u8>,
}

/// Handle to a scripted TCP socket (the HTTP side of the shared session).
#[derive(Clone, Default)]
pub struct FakeSocket {
    inner: Arc<Mutex<SocketInner>>,
}

struct SocketEndpoint {
    inner: Arc<Mutex<SocketInner>>,
}

impl FakeSocket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn socket(&self) -> Box<dyn TcpSocket> {
        Box::new(SocketEndpoint {
            inner: self.inner.clone(),
        })
    }

    pub fn refuse_connect(&self, refuse: bool) {
        self.inner.lock().unwrap().refuse_connect = refuse;
    }

    /// Script response bytes for the peer to deliver.
    pub fn push_read(&self, bytes: &[u8]) {
        self.inner.lock().unwrap().to_read.extend(bytes.iter().copied());
    }

    /// Close the connection once the scripted bytes are drained (the
    /// `Connection: close` behavior real servers show).
    pub fn close_after_read(&self, close: bool) {
        self.inner.lock().unwrap().close_after_read = close;
    }

    pub fn written(&self) -> Vec<u8> {
        self.inner.lock().unwrap().written.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.lock().unwrap().connected
    }
}

impl TcpSocket for SocketEndpoint {
    fn connect(&mut self, _host: &str, _port: u16) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.refuse_connect {
            return false;
        }
        inner.connected = true;
        true
    }

    fn write(&mut self, bytes: &[u8]) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if !inner.connected {
            return false;
        }
        inner.written.extend_from_slice(bytes);
        true
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let mut n = 0;
        while n < buf.len() {
            match inner.to_read.pop_front() {
                Some(byte) => {
                    buf[n] = byte;
                    n += 1;
                }
                None => break,
            }
        }
        if inner.to_read.is_empty() && inner.close_after_read && n > 0 {
            inner.connected = false;
        }
        n
    }

    fn is_connected(&self) -> bool {
        self.inner.lock().unwrap().connected
    }

    fn close(&mut self) {
        self.inner.lock().unwrap().connected = false;
    }
}

// ----- Modem AT channel ----------------------------------------------------

struct ModemInner {
    sent: Vec<String>,
    lines: VecDeque<String>,
    clock_reply: Option<String>,
    cpsi_reply: Option<String>,
}

impl Default for ModemInner {
    fn default() -> Self {
        Self {
            sent: Vec::new(),
            lines: VecDeque::new(),
            clock_reply: Some(TEST_CLOCK_REPORT.to_string()),
            cpsi_reply: Some(TEST_CPSI_LINE.to_string()),
        }
    }
}

/// Handle to a scripted modem AT channel. Commands are auto-answered from
/// the configured replies; unknown commands stay silent (timeout path).
#[derive(Clone, Default)]
pub struct FakeModem {
    inner: Arc<Mutex<ModemInner>>,
}

struct ModemEndpoint {
    inner: Arc<Mutex<ModemInner>>,
}

impl FakeModem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn control(&self) -> Box<dyn ModemControl> {
        Box::new(ModemEndpoint {
            inner: self.inner.clone(),
        })
    }

    pub fn sent(&self) -> Vec<String> {
        self.inner.lock().unwrap().sent.clone()
    }

    pub fn set_clock_reply(&self, reply: Option<&str>) {
        self.inner.lock().unwrap().clock_reply = reply.map(str::to_string);
    }

    pub fn set_cpsi_reply(&self, reply: Option<&str>) {
        self.inner.lock().unwrap().cpsi_reply = reply.map(str::to_string);
    }

    /// Queue an arbitrary unsolicited response line.
    pub fn push_line(&self, line: &str) {
        self.inner.lock().unwrap().lines.push_back(line.to_string());
    }
}

impl ModemControl for ModemEndpoint {
    fn send_command(&mut self, cmd: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        inner.sent.push(cmd.to_string());
        if cmd.contains("CCLK") {
            if let Some(reply) = inner.clock_reply.clone() {
                inner.lines.push_back(reply);
                inner.lines.push_back("OK".to_string());
            }
        } else if cmd.contains("CPSI") {
            if let Some(reply) = inner.cpsi_reply.clone() {
                inner.lines.push_back(reply);
                inner.lines.push_back("OK".to_string());
            }
        }
        true
    }

    fn poll_line(&mut self) -> Option<String> {
        self.inner.lock().unwrap().lines.pop_front()
    }

    fn drain_input(&mut self) {
        self.inner.lock().unwrap().lines.clear();
    }
}

// ----- Sensors -------------------------------------------------------------

struct GaugeInner {
    voltage: Option<f32>,
    current_ma: Option<f32>,
}

/// Handle to a scripted battery gauge.
#[derive(Clone)]
pub struct SharedGauge {
    inner: Arc<Mutex<GaugeInner>>,
}

impl Default for SharedGauge {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(GaugeInner {
                voltage: Some(8.0),
                current_ma: Some(500.0),
            })),
        }
    }
}

struct GaugeEndpoint {
    inner: Arc<Mutex<GaugeInner>>,
}

impl SharedGauge {
    pub fn new(voltage: f32, current_ma: f32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(GaugeInner {
                voltage: Some(voltage),
                current_ma: Some(current_ma),
            })),
        }
    }

    pub fn gauge(&self) -> Box<dyn BatteryGauge> {
        Box::new(GaugeEndpoint {
            inner: self.inner.clone(),
        })
    }

    pub fn set_voltage(&self, voltage: Option<f32>) {
        self.inner.lock().unwrap().voltage = voltage;
    }

    pub fn set_current_ma(&self, current_ma: Option<f32>) {
        self.inner.lock().unwrap().current_ma = current_ma;
    }
}

impl BatteryGauge for GaugeEndpoint {
    fn bus_voltage(&mut self) -> Option<f32> {
        self.inner.lock().unwrap().voltage
    }

    fn current_ma(&mut self) -> Option<f32> {
        self.inner.lock().unwrap().current_ma
    }
}

/// Handle to an in-memory battery store.
#[derive(Clone, Default)]
pub struct SharedStore {
    bytes: Arc<Mutex<Option<Vec<u8>>>>,
    fail_saves: Arc<AtomicBool>,
}

struct StoreEndpoint {
    bytes: Arc<Mutex<Option<Vec<u8>>>>,
    fail_saves: Arc<AtomicBool>,
}

impl SharedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self) -> Box<dyn BatteryStore> {
        Box::new(StoreEndpoint {
            bytes: self.bytes.clone(),
            fail_saves: self.fail_saves.clone(),
        })
    }

    /// Pre-seed persisted bytes (simulating a previous power cycle).
    pub fn set_bytes(&self, bytes: Option<Vec<u8>>) {
        *self.bytes.lock().unwrap() = bytes;
    }

    pub fn bytes(&self) -> Option<Vec<u8>> {
        self.bytes.lock().unwrap().clone()
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

impl BatteryStore for StoreEndpoint {
    fn load(&mut self) -> Option<Vec<u8>> {
        self.bytes.lock().unwrap().clone()
    }

    fn save(&mut self, bytes: &[u8]) -> bool {
        if self.fail_saves.load(Ordering::SeqCst) {
            return false;
        }
        *self.bytes.lock().unwrap() = Some(bytes.to_vec());
        true
    }
}

/// Handle to a scripted IMU; upright by default.
#[derive(Clone)]
pub struct SharedImu {
    accel: Arc<Mutex<Option<[f32; 3]>>>,
}

impl Default for SharedImu {
    fn default() -> Self {
        Self {
            accel: Arc::new(Mutex::new(Some([0.0, 0.0, 1.0]))),
        }
    }
}

struct ImuEndpoint {
    accel: Arc<Mutex<Option<[f32; 3]>>>,
}

impl SharedImu {
    pub fn imu(&self) -> Box<dyn Imu> {
        Box::new(ImuEndpoint {
            accel: self.accel.clone(),
        })
    }

    pub fn set_accel(&self, accel: Option<[f32; 3]>) {
        *self.accel.lock().unwrap() = accel;
    }
}

impl Imu for ImuEndpoint {
    fn accel(&mut self) -> Option<[f32; 3]> {
        *self.accel.lock().unwrap()
    }
}

/// Handle to a scripted GPS receiver; no fix by default.
#[derive(Clone, Default)]
pub struct SharedGps {
    fix: Arc<Mutex<Option<GpsFix>>>,
}

struct GpsEndpoint {
    fix: Arc<Mutex<Option<GpsFix>>>,
}

impl SharedGps {
    pub fn receiver(&self) -> Box<dyn GpsReceiver> {
        Box::new(GpsEndpoint {
            fix: self.fix.clone(),
        })
    }

    pub fn set_fix(&self, fix: Option<GpsFix>) {
        *self.fix.lock().unwrap() = fix;
    }

    pub fn set_position(&self, latitude: f32, longitude: f32) {
        self.set_fix(Some(GpsFix {
            latitude,
            longitude,
        }));
    }
}

impl GpsReceiver for GpsEndpoint {
    fn poll_fix(&mut self) -> Option<GpsFix> {
        *self.fix.lock().unwrap()
    }
}

/// Handle to the helmet dock switch; docked by default.
#[derive(Clone)]
pub struct SharedHelmet {
    connected: Arc<AtomicBool>,
}

impl Default for SharedHelmet {
    fn default() -> Self {
        Self {
            connected: Arc::new(AtomicBool::new(true)),
        }
    }
}

struct HelmetEndpoint {
    connected: Arc<AtomicBool>,
}

impl SharedHelmet {
    pub fn switch(&self) -> Box<dyn HelmetSwitch> {
        Box::new(HelmetEndpoint {
            connected: self.connected.clone(),
        })
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

impl HelmetSwitch for HelmetEndpoint {
    fn is_connected(&mut self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Handle to a scripted QR scanner.
#[derive(Clone, Default)]
pub struct SharedQr {
    scans: Arc<Mutex<VecDeque<String>>>,
}

struct QrEndpoint {
    scans: Arc<Mutex<VecDeque<String>>>,
}

impl SharedQr {
    pub fn scanner(&self) -> Box<dyn QrScanner> {
        Box::new(QrEndpoint {
            scans: self.scans.clone(),
        })
    }

    pub fn push_scan(&self, payload: &str) {
        self.scans.lock().unwrap().push_back(payload.to_string());
    }
}

impl QrScanner for QrEndpoint {
    fn take_scan(&mut self) -> Option<String> {
        self.scans.lock().unwrap().pop_front()
    }
}

/// Handle to a display that records every redraw.
#[derive(Clone, Default)]
pub struct RecordingDisplay {
    draws: Arc<Mutex<Vec<(DisplayPage, f32, i32)>>>,
}

struct DisplayEndpoint {
    draws: Arc<Mutex<Vec<(DisplayPage, f32, i32)>>>,
}

impl RecordingDisplay {
    pub fn display(&self) -> Box<dyn Display> {
        Box::new(DisplayEndpoint {
            draws: self.draws.clone(),
        })
    }

    pub fn draws(&self) -> Vec<(DisplayPage, f32, i32)> {
        self.draws.lock().unwrap().clone()
    }

    pub fn last_page(&self) -> Option<DisplayPage> {
        self.draws.lock().unwrap().last().map(|(page, _, _)| *page)
    }
}

impl Display for DisplayEndpoint {
    fn draw(&mut self, page: DisplayPage, speed_kmh: f32, battery_percent: i32) {
        self.draws.lock().unwrap().push((page, speed_kmh, battery_percent));
    }
}

// ----- Assembly ------------------------------------------------------------

/// A transport over fresh fakes, for unit tests that only need the resource.
pub fn loopback_transport() -> Transport {
    Transport::new(
        FakeBroker::new().client(),
        FakeSocket::new().socket(),
        FakeModem::new().control(),
        MqttCredentials {
            client_id_prefix: "test".to_string(),
            user: "test".to_string(),
            pass: "test".to_string(),
        },
    )
}

/// A fully-wired vehicle world plus the script handles for every device.
pub struct TestVehicle {
    pub world: World,
    pub schedule: Schedule,
    pub broker: FakeBroker,
    pub socket: FakeSocket,
    pub modem: FakeModem,
    pub gauge: SharedGauge,
    pub store: SharedStore,
    pub imu: SharedImu,
    pub gps: SharedGps,
    pub helmet: SharedHelmet,
    pub qr: SharedQr,
    pub display: RecordingDisplay,
}

impl TestVehicle {
    /// One loop iteration of `dt_ms`.
    pub fn tick(&mut self, dt_ms: u64) {
        run_tick(&mut self.world, &mut self.schedule, dt_ms);
    }

    /// Run the loop for `duration_ms` at the default tick.
    pub fn run_ms(&mut self, duration_ms: u64) {
        let ticks = duration_ms / DEFAULT_TICK_MS;
        for _ in 0..ticks {
            self.tick(DEFAULT_TICK_MS);
        }
    }

    pub fn phase(&self) -> RentalPhase {
        self.world.resource::<RentalState>().phase
    }

    pub fn usage(&self) -> UsageState {
        self.world.resource::<RentalState>().usage
    }

    pub fn trip_id(&self) -> String {
        self.world.resource::<RentalState>().trip_id.clone()
    }

    pub fn page(&self) -> DisplayPage {
        self.world.resource::<UiState>().page
    }
}

/// Build a test vehicle with the given params; devices are scripted fakes
/// with sane defaults (docked helmet, upright IMU, healthy battery, a GPS
/// fix in central Saigon) and the wall clock synced from the fake modem.
///
/// The MQTT session comes up through the normal keep-alive path, so run the
/// loop for a moment before scripting traffic that needs the broker.
pub fn build_test_vehicle_with(params: VehicleParams) -> TestVehicle {
    let broker = FakeBroker::new();
    let socket = FakeSocket::new();
    let modem = FakeModem::new();
    let gauge = SharedGauge::default();
    let store = SharedStore::new();
    let imu = SharedImu::default();
    let gps = SharedGps::default();
    gps.set_position(10.8231, 106.6297);
    let helmet = SharedHelmet::default();
    let qr = SharedQr::default();
    let display = RecordingDisplay::default();

    let mut world = World::new();
    build_vehicle(
        &mut world,
        params,
        DeviceBundle {
            gauge: gauge.gauge(),
            battery_store: store.store(),
            imu: imu.imu(),
            gps: gps.receiver(),
            helmet: helmet.switch(),
            qr: qr.scanner(),
            display: display.display(),
            mqtt: broker.client(),
            socket: socket.socket(),
            modem: modem.control(),
        },
    );
    sync_wall_clock(&mut world, 16);

    TestVehicle {
        world,
        schedule: vehicle_schedule(),
        broker,
        socket,
        modem,
        gauge,
        store,
        imu,
        gps,
        helmet,
        qr,
        display,
    }
}

/// [build_test_vehicle_with] under default params and a fixed seed.
pub fn build_test_vehicle() -> TestVehicle {
    build_test_vehicle_with(VehicleParams::default().with_bike_id("BIK_TEST").with_seed(42))
}
