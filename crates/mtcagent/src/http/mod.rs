// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HTTP surface for MTConnect requests.
//!
//! Accepts TCP connections, parses `GET` request lines, and returns XML
//! documents. Handlers are readers only; one thread per connection, a
//! non-blocking accept loop, and an atomic shutdown flag. In-flight
//! responses complete on shutdown.

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::query::QueryEngine;

/// HTTP server answering `/probe`, `/current`, `/sample`, `/assets`.
#[derive(Debug)]
pub struct HttpServer {
    _listener: TcpListener,
    port: u16,
    shutdown: Arc<AtomicBool>,
    accept_thread: Option<JoinHandle<()>>,
}

impl HttpServer {
    /// Bind the listener and start accepting. Bind failure is fatal.
    pub fn bind(bind_addr: &str, port: u16, engine: Arc<QueryEngine>) -> Result<Self> {
        let listener = create_tcp_listener(bind_addr, port)
            .map_err(|e| Error::BindFailed(format!("{}:{}: {}", bind_addr, port, e)))?;
        let bound_port = listener
            .local_addr()
            .map_err(|e| Error::BindFailed(e.to_string()))?
            .port();

        let shutdown = Arc::new(AtomicBool::new(false));
        let accept_thread = {
            let listener = listener
                .try_clone()
                .map_err(|e| Error::BindFailed(e.to_string()))?;
            let shutdown = shutdown.clone();
            thread::Builder::new()
                .name("http-accept".to_string())
                .spawn(move || accept_loop(listener, shutdown, engine))
                .ok()
        };

        log::info!("[HttpServer] Listening on {}:{}", bind_addr, bound_port);
        Ok(Self {
            _listener: listener,
            port: bound_port,
            shutdown,
            accept_thread,
        })
    }

    /// Bound port (useful with ephemeral port 0).
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Signal shutdown to the accept loop.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    /// Shut down and join the accept thread.
    pub fn stop(&mut self) {
        self.shutdown();
        if let Some(handle) = self.accept_thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for HttpServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn create_tcp_listener(bind_addr: &str, port: u16) -> std::io::Result<TcpListener> {
    let addr = format!("{}:{}", bind_addr, port);
    let addr: SocketAddr = addr.parse().map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("Invalid address: {}", e),
        )
    })?;

    let socket = socket2::Socket::new(
        socket2::Domain::IPV4,
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(128)?;

    let listener: TcpListener = socket.into();
    listener.set_nonblocking(true)?;
    Ok(listener)
}

fn accept_loop(listener: TcpListener, shutdown: Arc<AtomicBool>, engine: Arc<QueryEngine>) {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        match listener.accept() {
            Ok((stream, _addr)) => {
                let _ = stream.set_nonblocking(false);
                let _ = stream.set_nodelay(true);
                let engine = engine.clone();
                let _ = thread::Builder::new()
                    .name("http-conn".to_string())
                    .spawn(move || handle_client(stream, &engine));
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(10));
            }
            Err(_) => {}
        }
    }
}

fn handle_client(stream: TcpStream, engine: &QueryEngine) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(10)));
    let mut reader = BufReader::new(match stream.try_clone() {
        Ok(clone) => clone,
        Err(e) => {
            log::debug!("[HttpServer::handle_client] try_clone failed: {}", e);
            return;
        }
    });

    let mut request_line = String::new();
    if reader.read_line(&mut request_line).is_err() {
        return;
    }

    // Drain the header block; only the request line matters.
    let mut header = String::new();
    loop {
        header.clear();
        match reader.read_line(&mut header) {
            Ok(0) => break,
            Ok(_) if header == "\r\n" || header == "\n" => break,
            Ok(_) => {}
            Err(_) => return,
        }
    }

    let (status, body) = dispatch(engine, request_line.trim_end());
    write_response(stream, status, &body);
}

/// Route one request line to the query engine.
fn dispatch(engine: &QueryEngine, request_line: &str) -> (u16, String) {
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("");
    let target = parts.next().unwrap_or("/");

    if method != "GET" {
        let err = Error::Unsupported(format!("method {}", method));
        return (405, engine.error_response(&err));
    }

    match route(engine, target) {
        Ok(body) => (200, body),
        Err(err) => {
            let status = match err.error_code() {
                Some("UNSUPPORTED") | Some("NO_DEVICE") => 404,
                Some(_) => 400,
                None => 500,
            };
            log::debug!("[HttpServer::dispatch] {} -> {}: {}", target, status, err);
            (status, engine.error_response(&err))
        }
    }
}

fn route(engine: &QueryEngine, target: &str) -> Result<String> {
    let (path, query) = match target.split_once('?') {
        Some((p, q)) => (p, q),
        None => (target, ""),
    };
    let params = parse_query(query);

    match path {
        "/" | "/probe" => engine.probe(get(&params, "device")),
        "/current" => {
            let at = parse_u64(&params, "at")?;
            engine.current(get(&params, "path"), at)
        }
        "/sample" => {
            let from = parse_u64(&params, "from")?;
            let count = parse_usize(&params, "count")?;
            if let Some(interval) = get(&params, "interval") {
                // Streaming delivery is an HTTP-framing concern; the core
                // answers one window per request.
                log::debug!(
                    "[HttpServer::route] interval={} requested, answering single window",
                    interval
                );
            }
            engine.sample(get(&params, "path"), from, count)
        }
        "/assets" => {
            let count = parse_usize(&params, "count")?;
            engine.assets(get(&params, "type"), count)
        }
        other => Err(Error::Unsupported(format!("path {}", other))),
    }
}

fn write_response(mut stream: TcpStream, status: u16, body: &str) {
    let reason = match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        _ => "Internal Server Error",
    };
    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: text/xml; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        reason,
        body.len()
    );
    if stream.write_all(head.as_bytes()).is_err() {
        return;
    }
    let _ = stream.write_all(body.as_bytes());
}

// ---------------------------------------------------------------------------
// Query-string handling
// ---------------------------------------------------------------------------

fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (percent_decode(k), percent_decode(v)),
            None => (percent_decode(pair), String::new()),
        })
        .collect()
}

fn get<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
        .filter(|v| !v.is_empty())
}

fn parse_u64(params: &[(String, String)], key: &str) -> Result<Option<u64>> {
    match get(params, key) {
        Some(raw) => raw
            .parse::<u64>()
            .map(Some)
            .map_err(|_| Error::InvalidParameter(format!("{}={}", key, raw))),
        None => Ok(None),
    }
}

fn parse_usize(params: &[(String, String)], key: &str) -> Result<Option<usize>> {
    match get(params, key) {
        Some(raw) => raw
            .parse::<usize>()
            .map(Some)
            .map_err(|_| Error::InvalidParameter(format!("{}={}", key, raw))),
        None => Ok(None),
    }
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                // Byte-wise: the escape may sit next to multibyte UTF-8.
                let decoded = std::str::from_utf8(&bytes[i + 1..i + 3])
                    .ok()
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok());
                match decoded {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            byte => {
                out.push(byte);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_decode_handles_quotes_and_spaces() {
        assert_eq!(
            percent_decode("%2F%2FDataItem%5B%40type%3D%22VOLTAGE%22%5D"),
            r#"//DataItem[@type="VOLTAGE"]"#
        );
        assert_eq!(percent_decode("a+b"), "a b");
        assert_eq!(percent_decode("plain"), "plain");
        // Truncated escapes pass through.
        assert_eq!(percent_decode("50%"), "50%");
    }

    #[test]
    fn parse_query_splits_pairs() {
        let params = parse_query("path=%2F%2FAxes&from=10&count=2");
        assert_eq!(get(&params, "path"), Some("//Axes"));
        assert_eq!(get(&params, "from"), Some("10"));
        assert_eq!(get(&params, "count"), Some("2"));
        assert_eq!(get(&params, "missing"), None);
    }

    #[test]
    fn numeric_params_validate() {
        let params = parse_query("from=abc");
        let err = parse_u64(&params, "from").expect_err("non-numeric");
        assert_eq!(err.error_code(), Some("INVALID_REQUEST"));

        let params = parse_query("from=7");
        assert_eq!(parse_u64(&params, "from").expect("numeric"), Some(7));
        assert_eq!(parse_u64(&params, "absent").expect("absent ok"), None);
    }
}
