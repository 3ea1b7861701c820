//! Pass-through relay for function-generator command lines.
//!
//! A leaf component: one pre-resolved, connected UDP socket behind a lock
//! serializing writers. Each accepted line goes out as a single
//! newline-terminated datagram; errors are logged, never retried, and never
//! surfaced to clients.

use std::io;
use std::net::UdpSocket;
use std::sync::Mutex;

use tracing::{debug, warn};

pub struct FgRelay {
    socket: Option<Mutex<UdpSocket>>,
}

impl FgRelay {
    /// A relay that drops every line with a diagnostic.
    pub fn disabled() -> Self {
        Self { socket: None }
    }

    /// Connect to the configured endpoint. An empty address disables the
    /// relay; every `send_line` is then dropped with a diagnostic.
    pub fn connect(addr: &str) -> io::Result<Self> {
        if addr.is_empty() {
            return Ok(Self::disabled());
        }
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect(addr)?;
        debug!(addr, "function generator relay connected");
        Ok(Self {
            socket: Some(Mutex::new(socket)),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.socket.is_some()
    }

    /// Send one command line, trimmed and newline-terminated, as a single
    /// datagram.
    pub fn send_line(&self, line: &str) {
        let socket = match &self.socket {
            Some(s) => s,
            None => {
                warn!("fg_send dropped: relay endpoint not configured");
                return;
            }
        };

        let mut payload = line.trim().to_string();
        payload.push('\n');

        let socket = socket.lock().expect("relay lock poisoned");
        match socket.send(payload.as_bytes()) {
            Ok(_) => debug!(line = line.trim(), "relayed to function generator"),
            Err(e) => warn!(error = %e, "function generator relay write failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_addr_disables() {
        let relay = FgRelay::connect("").unwrap();
        assert!(!relay.is_enabled());
        // Dropped with a diagnostic, no panic.
        relay.send_line("FREQ 1000");
    }

    #[test]
    fn test_line_terminated_once() {
        let target = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = target.local_addr().unwrap();
        let relay = FgRelay::connect(&addr.to_string()).unwrap();
        assert!(relay.is_enabled());

        relay.send_line("  FREQ 1000  ");
        let mut buf = [0u8; 64];
        let n = target.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"FREQ 1000\n");

        relay.send_line("AMPL 0.5\n");
        let n = target.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"AMPL 0.5\n");
    }
}
