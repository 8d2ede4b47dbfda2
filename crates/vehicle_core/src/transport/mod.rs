//! Cellular transport: MQTT and HTTP multiplexed over one modem socket.
//!
//! The modem exposes a single TCP session, so MQTT and HTTP can never be live
//! at the same time. Starting an HTTP request disconnects MQTT first; once
//! the request finishes and is reset, the next keep-alive tick re-establishes
//! the MQTT session. AT-style side channels (clock read, serving-cell query)
//! go through [ModemControl], which is independent of the TCP session.

pub mod http;

use std::collections::VecDeque;

use bevy_ecs::prelude::Resource;
use tracing::{debug, info, warn};

pub use http::{HttpCall, HttpState, DEFAULT_HTTP_TIMEOUT_MS};

/// Minimum time between MQTT reconnect attempts.
pub const MQTT_RETRY_INTERVAL_MS: u64 = 10_000;

/// An inbound MQTT message delivered by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Wire-level MQTT client seam. The broker session and framing live behind
/// this trait; `poll` pumps the connection and returns whatever arrived.
pub trait MqttClient: Send + Sync {
    fn connect(&mut self, client_id: &str, user: &str, pass: &str) -> bool;
    fn is_connected(&self) -> bool;
    fn disconnect(&mut self);
    fn subscribe(&mut self, topic: &str) -> bool;
    fn unsubscribe(&mut self, topic: &str) -> bool;
    fn publish(&mut self, topic: &str, payload: &[u8]) -> bool;
    fn poll(&mut self) -> Vec<InboundMessage>;
}

/// Raw TCP byte stream on the modem (the socket HTTP borrows).
pub trait TcpSocket: Send + Sync {
    fn connect(&mut self, host: &str, port: u16) -> bool;
    fn write(&mut self, bytes: &[u8]) -> bool;
    /// Non-blocking read; returns the number of bytes written into `buf`.
    fn read(&mut self, buf: &mut [u8]) -> usize;
    fn is_connected(&self) -> bool;
    fn close(&mut self);
}

/// AT command channel for modem queries (clock, serving cell).
pub trait ModemControl: Send + Sync {
    fn send_command(&mut self, cmd: &str) -> bool;
    /// Next complete response line, if one is buffered.
    fn poll_line(&mut self) -> Option<String>;
    /// Discard any buffered input (before issuing a fresh query).
    fn drain_input(&mut self);
}

/// MQTT credentials and client-id prefix.
#[derive(Debug, Clone)]
pub struct MqttCredentials {
    pub client_id_prefix: String,
    pub user: String,
    pub pass: String,
}

/// The shared cellular transport resource.
#[derive(Resource)]
pub struct Transport {
    mqtt: Box<dyn MqttClient>,
    socket: Box<dyn TcpSocket>,
    modem: Box<dyn ModemControl>,
    http: HttpCall,
    creds: MqttCredentials,
    inbox: VecDeque<InboundMessage>,
    last_mqtt_attempt_ms: Option<u64>,
    connect_seq: u32,
}

impl Transport {
    pub fn new(
        mqtt: Box<dyn MqttClient>,
        socket: Box<dyn TcpSocket>,
        modem: Box<dyn ModemControl>,
        creds: MqttCredentials,
    ) -> Self {
        Self {
            mqtt,
            socket,
            modem,
            http: HttpCall::default(),
            creds,
            inbox: VecDeque::new(),
            last_mqtt_attempt_ms: None,
            connect_seq: 0,
        }
    }

    // ----- MQTT ---------------------------------------------------------

    pub fn mqtt_connected(&self) -> bool {
        self.mqtt.is_connected()
    }

    /// Pump inbound MQTT traffic into the inbox.
    pub fn pump_mqtt(&mut self) {
        self.inbox.extend(self.mqtt.poll());
    }

    /// Keep-alive tick: pump, and reconnect at most once per
    /// [MQTT_RETRY_INTERVAL_MS] while the socket is not claimed by HTTP.
    pub fn maintain_mqtt(&mut self, now_ms: u64) {
        self.pump_mqtt();
        if self.mqtt.is_connected() {
            return;
        }
        if self.http.is_reading() {
            // Socket belongs to HTTP right now.
            return;
        }
        if let Some(last) = self.last_mqtt_attempt_ms {
            if now_ms.saturating_sub(last) < MQTT_RETRY_INTERVAL_MS {
                return;
            }
        }
        self.last_mqtt_attempt_ms = Some(now_ms);

        self.connect_seq = self.connect_seq.wrapping_add(1);
        let client_id = format!("{}-{:04x}", self.creds.client_id_prefix, self.connect_seq);
        info!(%client_id, "mqtt connecting");
        if self
            .mqtt
            .connect(&client_id, &self.creds.user, &self.creds.pass)
        {
            info!("mqtt connected");
        } else {
            warn!("mqtt connect failed");
        }
    }

    pub fn publish(&mut self, topic: &str, payload: &[u8]) -> bool {
        if !self.mqtt.is_connected() {
            warn!(topic, "mqtt publish while disconnected");
            return false;
        }
        if payload.is_empty() {
            warn!(topic, "mqtt publish with empty payload");
            return false;
        }
        let ok = self.mqtt.publish(topic, payload);
        if ok {
            debug!(topic, len = payload.len(), "mqtt publish ok");
        } else {
            warn!(topic, "mqtt publish failed");
        }
        ok
    }

    pub fn subscribe(&mut self, topic: &str) -> bool {
        self.mqtt.subscribe(topic)
    }

    pub fn unsubscribe(&mut self, topic: &str) -> bool {
        self.mqtt.unsubscribe(topic)
    }

    /// Remove and return the first buffered message for `topic`.
    pub fn take_inbound(&mut self, topic: &str) -> Option<Vec<u8>> {
        let index = self.inbox.iter().position(|m| m.topic == topic)?;
        self.inbox.remove(index).map(|m| m.payload)
    }

    /// Buffered inbound messages (for diagnostics/tests).
    pub fn inbox_len(&self) -> usize {
        self.inbox.len()
    }

    // ----- HTTP (shared socket) ------------------------------------------

    pub fn http_idle(&self) -> bool {
        self.http.is_idle()
    }

    pub fn http_busy(&self) -> bool {
        self.http.is_reading()
    }

    pub fn http_done(&self) -> bool {
        self.http.is_done()
    }

    pub fn http_ok(&self) -> bool {
        self.http.is_ok()
    }

    pub fn http_result(&self) -> &[u8] {
        self.http.result()
    }

    /// Start a POST. Disconnects MQTT first: the TCP session is single-owner.
    pub fn start_post_json(
        &mut self,
        url: &str,
        body: &str,
        timeout_ms: u64,
        now_ms: u64,
    ) -> bool {
        if !self.http.is_idle() {
            return false;
        }
        if self.mqtt.is_connected() {
            debug!("disconnecting mqtt before http request");
            self.mqtt.disconnect();
        }
        self.http
            .start_post_json(self.socket.as_mut(), url, body, timeout_ms, now_ms)
    }

    pub fn start_get(&mut self, url: &str, timeout_ms: u64, now_ms: u64) -> bool {
        if !self.http.is_idle() {
            return false;
        }
        if self.mqtt.is_connected() {
            debug!("disconnecting mqtt before http request");
            self.mqtt.disconnect();
        }
        self.http.start_get(self.socket.as_mut(), url, timeout_ms, now_ms)
    }

    pub fn http_step(&mut self, now_ms: u64) {
        self.http.step(self.socket.as_mut(), now_ms);
    }

    pub fn http_reset(&mut self) {
        self.http.reset();
    }

    // ----- Modem side channel --------------------------------------------

    pub fn modem_send(&mut self, cmd: &str) -> bool {
        self.modem.send_command(cmd)
    }

    pub fn modem_poll_line(&mut self) -> Option<String> {
        self.modem.poll_line()
    }

    pub fn modem_drain(&mut self) {
        self.modem.drain_input();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{FakeBroker, FakeModem, FakeSocket};

    fn transport(broker: &FakeBroker, socket: &FakeSocket, modem: &FakeModem) -> Transport {
        Transport::new(
            broker.client(),
            socket.socket(),
            modem.control(),
            MqttCredentials {
                client_id_prefix: "veh".to_string(),
                user: "u".to_string(),
                pass: "p".to_string(),
            },
        )
    }

    #[test]
    fn keep_alive_reconnects_at_most_every_ten_seconds() {
        let broker = FakeBroker::new();
        broker.fail_connects(1);
        let socket = FakeSocket::new();
        let modem = FakeModem::new();
        let mut t = transport(&broker, &socket, &modem);

        t.maintain_mqtt(0);
        assert!(!t.mqtt_connected());
        assert_eq!(broker.connect_attempts(), 1);

        // Within the retry window: no new attempt.
        t.maintain_mqtt(5_000);
        assert_eq!(broker.connect_attempts(), 1);

        t.maintain_mqtt(10_000);
        assert!(t.mqtt_connected());
        assert_eq!(broker.connect_attempts(), 2);
    }

    #[test]
    fn client_ids_carry_prefix_and_change_per_attempt() {
        let broker = FakeBroker::new();
        let socket = FakeSocket::new();
        let modem = FakeModem::new();
        let mut t = transport(&broker, &socket, &modem);

        t.maintain_mqtt(0);
        broker.force_disconnect();
        t.maintain_mqtt(20_000);

        let ids = broker.client_ids();
        assert_eq!(ids.len(), 2);
        assert!(ids[0].starts_with("veh-"));
        assert_ne!(ids[0], ids[1]);
    }

    #[test]
    fn http_start_disconnects_mqtt() {
        let broker = FakeBroker::new();
        let socket = FakeSocket::new();
        let modem = FakeModem::new();
        let mut t = transport(&broker, &socket, &modem);

        t.maintain_mqtt(0);
        assert!(t.mqtt_connected());

        assert!(t.start_post_json("http://api.test/x", "{}", 1_000, 0));
        assert!(!t.mqtt_connected());
        assert!(t.http_busy());

        // While HTTP owns the socket, keep-alive must not reconnect.
        t.maintain_mqtt(30_000);
        assert!(!t.mqtt_connected());

        socket.push_read(b"HTTP/1.1 200 OK\r\n\r\nok");
        socket.close_after_read(true);
        t.http_step(1_000);
        assert!(t.http_ok());
        t.http_reset();

        t.maintain_mqtt(60_000);
        assert!(t.mqtt_connected());
    }

    #[test]
    fn publish_requires_connection_and_payload() {
        let broker = FakeBroker::new();
        let socket = FakeSocket::new();
        let modem = FakeModem::new();
        let mut t = transport(&broker, &socket, &modem);

        assert!(!t.publish("t", b"x"), "not connected yet");
        t.maintain_mqtt(0);
        assert!(!t.publish("t", b""), "empty payload");
        assert!(t.publish("t", b"x"));
        assert_eq!(broker.published().len(), 1);
    }

    #[test]
    fn inbound_messages_are_taken_by_topic() {
        let broker = FakeBroker::new();
        let socket = FakeSocket::new();
        let modem = FakeModem::new();
        let mut t = transport(&broker, &socket, &modem);

        t.maintain_mqtt(0);
        assert!(t.subscribe("/reservation/T1/update"));
        broker.push_inbound("/reservation/T1/update", &[1]);
        broker.push_inbound("/other", &[9]);

        t.pump_mqtt();
        assert_eq!(t.take_inbound("/reservation/T1/update"), Some(vec![1]));
        assert_eq!(t.take_inbound("/reservation/T1/update"), None);
    }
}
