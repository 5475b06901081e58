// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SHDR adapter client.
//!
//! One TCP reader thread per configured adapter. Lines are newline-delimited
//! UTF-8 and forwarded raw to the ingest queue; connection loss triggers a
//! stream reset (discarding any buffered multi-line asset body) and a
//! reconnect with bounded exponential backoff (100 ms -> 30 s).

use std::io::{BufRead, BufReader};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::Sender;

use super::IngestMessage;
use crate::config::{BACKOFF_INITIAL_MS, BACKOFF_MAX_MS};

/// TCP adapter reader with reconnect.
#[derive(Debug)]
pub struct AdapterClient {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl AdapterClient {
    /// Spawn the reader thread for one adapter endpoint.
    #[must_use]
    pub fn start(
        host: impl Into<String>,
        port: u16,
        device_uuid: impl Into<String>,
        sender: Sender<IngestMessage>,
    ) -> Self {
        let host = host.into();
        let device_uuid = device_uuid.into();
        let shutdown = Arc::new(AtomicBool::new(false));

        let flag = shutdown.clone();
        let handle = thread::Builder::new()
            .name(format!("adapter-{}", device_uuid))
            .spawn(move || reader_loop(&host, port, &device_uuid, &sender, &flag))
            .ok();

        Self { shutdown, handle }
    }

    /// Stop reading and join the thread.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for AdapterClient {
    fn drop(&mut self) {
        self.stop();
    }
}

fn reader_loop(
    host: &str,
    port: u16,
    device_uuid: &str,
    sender: &Sender<IngestMessage>,
    shutdown: &Arc<AtomicBool>,
) {
    let mut backoff_ms = BACKOFF_INITIAL_MS;

    while !shutdown.load(Ordering::Acquire) {
        match TcpStream::connect((host, port)) {
            Ok(stream) => {
                log::info!(
                    "[AdapterClient] Connected to {}:{} for device {}",
                    host,
                    port,
                    device_uuid
                );
                backoff_ms = BACKOFF_INITIAL_MS;
                read_stream(stream, device_uuid, sender, shutdown);
                if shutdown.load(Ordering::Acquire) {
                    break;
                }
                log::warn!(
                    "[AdapterClient] Connection to {}:{} lost, reconnecting",
                    host,
                    port
                );
                // A dropped connection may have cut a multi-line body short.
                let _ = sender.send(IngestMessage::StreamReset {
                    device_uuid: device_uuid.to_string(),
                });
            }
            Err(e) => {
                log::warn!(
                    "[AdapterClient] Connect to {}:{} failed: {}, retrying in {} ms",
                    host,
                    port,
                    e,
                    backoff_ms
                );
            }
        }

        sleep_interruptible(backoff_ms, shutdown);
        backoff_ms = (backoff_ms * 2).min(BACKOFF_MAX_MS);
    }
}

fn read_stream(
    stream: TcpStream,
    device_uuid: &str,
    sender: &Sender<IngestMessage>,
    shutdown: &Arc<AtomicBool>,
) {
    if let Err(e) = stream.set_read_timeout(Some(Duration::from_millis(500))) {
        log::warn!("[AdapterClient] set_read_timeout failed: {}", e);
    }
    let mut reader = BufReader::new(stream);
    let mut line = String::new();

    loop {
        if shutdown.load(Ordering::Acquire) {
            return;
        }
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => return, // EOF
            Ok(_) => {
                let msg = IngestMessage::Line {
                    device_uuid: device_uuid.to_string(),
                    line: line.clone(),
                };
                if sender.send(msg).is_err() {
                    // Sequencer gone; agent is stopping.
                    return;
                }
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                // Idle poll window; loop back to check shutdown.
            }
            Err(e) => {
                log::warn!("[AdapterClient] Read error on device {}: {}", device_uuid, e);
                return;
            }
        }
    }
}

/// Sleep in short slices so shutdown stays responsive through long backoffs.
fn sleep_interruptible(total_ms: u64, shutdown: &Arc<AtomicBool>) {
    let mut remaining = total_ms;
    while remaining > 0 && !shutdown.load(Ordering::Acquire) {
        let slice = remaining.min(100);
        thread::sleep(Duration::from_millis(slice));
        remaining -= slice;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::io::Write;
    use std::net::TcpListener;

    #[test]
    fn reads_lines_and_forwards_them() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("ephemeral bind");
        let addr = listener.local_addr().expect("local addr");

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            stream
                .write_all(b"2014-08-11T08:32:54.028533Z|avail|AVAILABLE\n")
                .expect("write line");
            // Dropping the stream ends the connection.
        });

        let (sender, receiver) = unbounded();
        let mut client = AdapterClient::start(addr.ip().to_string(), addr.port(), "000", sender);

        let msg = receiver
            .recv_timeout(Duration::from_secs(5))
            .expect("line arrives");
        match msg {
            IngestMessage::Line { device_uuid, line } => {
                assert_eq!(device_uuid, "000");
                assert!(line.starts_with("2014-08-11T08:32:54.028533Z|avail|AVAILABLE"));
            }
            other => panic!("expected line, got {:?}", other),
        }

        // Connection loss produces a stream reset before reconnect attempts.
        let msg = receiver
            .recv_timeout(Duration::from_secs(5))
            .expect("reset arrives");
        assert!(matches!(msg, IngestMessage::StreamReset { .. }));

        client.stop();
        server.join().expect("server thread");
    }

    #[test]
    fn stop_interrupts_backoff() {
        // Nothing listens on this port; the client sits in backoff.
        let (sender, _receiver) = unbounded();
        let mut client = AdapterClient::start("127.0.0.1", 1, "000", sender);
        thread::sleep(Duration::from_millis(50));

        let start = std::time::Instant::now();
        client.stop();
        assert!(
            start.elapsed() < Duration::from_secs(2),
            "stop should not wait out the full backoff"
        );
    }
}
