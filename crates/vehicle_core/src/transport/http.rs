//! Non-blocking HTTP over the modem's raw TCP socket.
//!
//! One request at a time. `start_*` writes the whole request; `step` drains
//! whatever bytes are available and refreshes an inactivity timer. The
//! request completes when the peer closes the connection or the timer
//! expires. The result buffer contains the raw response, headers included;
//! the callers strip what they need.

use tracing::{debug, warn};

use super::TcpSocket;

/// Default inactivity timeout for a request.
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpState {
    Idle,
    Reading,
    Done,
    Error,
}

/// Split `http://host:port/path` into its parts. Port defaults to 80, path
/// to `/`. The scheme prefix is optional and ignored.
pub fn split_url(url: &str) -> (&str, u16, &str) {
    let rest = match url.split_once("://") {
        Some((_, rest)) => rest,
        None => url,
    };
    let (authority, path_start) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, "/"),
    };
    let (host, port) = match authority.split_once(':') {
        Some((host, port)) => (host, port.parse().unwrap_or(80)),
        None => (authority, 80),
    };
    (host, port, path_start)
}

/// Single-request HTTP state machine. The socket is passed in at each call
/// because it is shared with MQTT; the owner ([super::Transport]) serializes
/// access.
#[derive(Debug)]
pub struct HttpCall {
    state: HttpState,
    response: Vec<u8>,
    last_rx_ms: u64,
    timeout_ms: u64,
}

impl Default for HttpCall {
    fn default() -> Self {
        Self {
            state: HttpState::Idle,
            response: Vec::new(),
            last_rx_ms: 0,
            timeout_ms: DEFAULT_HTTP_TIMEOUT_MS,
        }
    }
}

impl HttpCall {
    pub fn state(&self) -> HttpState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == HttpState::Idle
    }

    /// Finished, successfully or not.
    pub fn is_done(&self) -> bool {
        matches!(self.state, HttpState::Done | HttpState::Error)
    }

    pub fn is_ok(&self) -> bool {
        self.state == HttpState::Done
    }

    /// Raw response bytes, headers included.
    pub fn result(&self) -> &[u8] {
        &self.response
    }

    /// True while a request is mid-flight and needs `step` calls.
    pub fn is_reading(&self) -> bool {
        self.state == HttpState::Reading
    }

    pub fn start_post_json(
        &mut self,
        socket: &mut dyn TcpSocket,
        url: &str,
        body: &str,
        timeout_ms: u64,
        now_ms: u64,
    ) -> bool {
        self.start(socket, url, Some(body), timeout_ms, now_ms)
    }

    pub fn start_get(
        &mut self,
        socket: &mut dyn TcpSocket,
        url: &str,
        timeout_ms: u64,
        now_ms: u64,
    ) -> bool {
        self.start(socket, url, None, timeout_ms, now_ms)
    }

    fn start(
        &mut self,
        socket: &mut dyn TcpSocket,
        url: &str,
        body: Option<&str>,
        timeout_ms: u64,
        now_ms: u64,
    ) -> bool {
        if self.state != HttpState::Idle {
            warn!(?url, "http busy, cannot start new request");
            return false;
        }

        let (host, port, path) = split_url(url);
        if !socket.connect(host, port) {
            warn!(host, port, "http connect failed");
            self.state = HttpState::Error;
            return false;
        }

        let request = match body {
            Some(body) => format!(
                "POST {path} HTTP/1.1\r\nHost: {host}\r\nContent-Type: application/json\r\n\
                 Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            ),
            None => format!("GET {path} HTTP/1.1\r\nHost: {host}\r\nConnection: close\r\n\r\n"),
        };
        if !socket.write(request.as_bytes()) {
            warn!(host, port, "http request write failed");
            socket.close();
            self.state = HttpState::Error;
            return false;
        }

        debug!(host, port, path, post = body.is_some(), "http request started");
        self.response.clear();
        self.timeout_ms = if timeout_ms > 0 {
            timeout_ms
        } else {
            DEFAULT_HTTP_TIMEOUT_MS
        };
        self.last_rx_ms = now_ms;
        self.state = HttpState::Reading;
        true
    }

    /// Drain available bytes; complete on disconnect or inactivity timeout.
    pub fn step(&mut self, socket: &mut dyn TcpSocket, now_ms: u64) {
        if self.state != HttpState::Reading {
            return;
        }

        let mut chunk = [0u8; 256];
        loop {
            let n = socket.read(&mut chunk);
            if n == 0 {
                break;
            }
            self.response.extend_from_slice(&chunk[..n]);
            self.last_rx_ms = now_ms;
        }

        if !socket.is_connected() || now_ms.saturating_sub(self.last_rx_ms) > self.timeout_ms {
            socket.close();
            self.state = if self.response.is_empty() {
                warn!("http empty response or timeout");
                HttpState::Error
            } else {
                HttpState::Done
            };
        }
    }

    /// Back to idle, ready for the next request.
    pub fn reset(&mut self) {
        self.state = HttpState::Idle;
        self.response.clear();
        self.last_rx_ms = 0;
        self.timeout_ms = DEFAULT_HTTP_TIMEOUT_MS;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::FakeSocket;

    #[test]
    fn splits_urls() {
        assert_eq!(
            split_url("http://eu1.unwiredlabs.com/v2/process.php"),
            ("eu1.unwiredlabs.com", 80, "/v2/process.php")
        );
        assert_eq!(split_url("example.com:8080"), ("example.com", 8080, "/"));
        assert_eq!(
            split_url("http://example.com:9000/x/y"),
            ("example.com", 9000, "/x/y")
        );
    }

    #[test]
    fn post_writes_request_and_reads_until_close() {
        let socket = FakeSocket::new();
        socket.push_read(b"HTTP/1.1 200 OK\r\n\r\n{\"ok\":1}");
        socket.close_after_read(true);

        let mut sock = socket.socket();
        let mut http = HttpCall::default();
        assert!(http.start_post_json(sock.as_mut(), "http://api.test/loc", "{}", 0, 0));
        assert!(http.is_reading());

        let written = socket.written();
        let text = String::from_utf8(written).unwrap();
        assert!(text.starts_with("POST /loc HTTP/1.1\r\n"));
        assert!(text.contains("Content-Length: 2"));
        assert!(text.ends_with("{}"));

        http.step(sock.as_mut(), 10);
        assert!(http.is_ok());
        assert!(http.result().ends_with(b"{\"ok\":1}"));
    }

    #[test]
    fn refuses_to_start_while_busy() {
        let socket = FakeSocket::new();
        let mut sock = socket.socket();
        let mut http = HttpCall::default();
        assert!(http.start_get(sock.as_mut(), "http://a.test/", 0, 0));
        assert!(!http.start_get(sock.as_mut(), "http://b.test/", 0, 0));
    }

    #[test]
    fn connect_failure_is_an_error_state() {
        let socket = FakeSocket::new();
        socket.refuse_connect(true);
        let mut sock = socket.socket();
        let mut http = HttpCall::default();
        assert!(!http.start_get(sock.as_mut(), "http://a.test/", 0, 0));
        assert_eq!(http.state(), HttpState::Error);
        http.reset();
        assert!(http.is_idle());
    }

    #[test]
    fn inactivity_timeout_without_data_is_error() {
        let socket = FakeSocket::new();
        let mut sock = socket.socket();
        let mut http = HttpCall::default();
        assert!(http.start_get(sock.as_mut(), "http://a.test/", 2_000, 0));

        http.step(sock.as_mut(), 1_000);
        assert!(http.is_reading());
        http.step(sock.as_mut(), 2_001);
        assert_eq!(http.state(), HttpState::Error);
        assert!(!socket.is_connected());
    }

    #[test]
    fn data_refreshes_the_timeout() {
        let socket = FakeSocket::new();
        let mut sock = socket.socket();
        let mut http = HttpCall::default();
        assert!(http.start_get(sock.as_mut(), "http://a.test/", 1_000, 0));

        socket.push_read(b"HTTP/1.1 200 OK\r\n");
        http.step(sock.as_mut(), 900);
        assert!(http.is_reading());

        // Timer restarted at 900; still alive at 1800, completes at 1901+.
        http.step(sock.as_mut(), 1_800);
        assert!(http.is_reading());
        http.step(sock.as_mut(), 1_901);
        assert!(http.is_ok());
    }
}
