//! Shared helpers for integration tests: spin up a real server on an
//! ephemeral port and talk to it over raw TCP.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::TcpStream;
use std::thread::JoinHandle;

use vantage::{Server, ServerConfig, ServerHandle};

/// Config bound to an ephemeral port with a throwaway auth token.
pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::new();
    config.set("PORT", "0");
    config.set("THREAD_COUNT", "4");
    config.set("AUTH_TOKEN", "test-token");
    config
}

/// Build, configure and start a server on a background thread. Returns once
/// the listener answers connections.
pub fn start_server(
    config: ServerConfig,
    configure: impl FnOnce(&mut Server),
) -> (ServerHandle, JoinHandle<()>) {
    let mut server = Server::new(config);
    configure(&mut server);
    let handle = server.handle();
    let join = std::thread::spawn(move || {
        server.start().expect("server failed to start");
    });
    handle.wait_ready().expect("server never became ready");
    (handle, join)
}

/// Send raw bytes, read until the server closes, return the full response.
pub fn raw_request(handle: &ServerHandle, request: &[u8]) -> Vec<u8> {
    let addr = handle.local_addr().expect("server not bound");
    let mut stream =
        TcpStream::connect(("127.0.0.1", addr.port())).expect("connect failed");
    stream.write_all(request).expect("write failed");
    let mut response = Vec::new();
    stream.read_to_end(&mut response).expect("read failed");
    response
}

/// Split a raw response into (status line, headers, body).
pub fn split_response(raw: &[u8]) -> (String, Vec<(String, String)>, Vec<u8>) {
    let separator = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("no header terminator");
    let head = String::from_utf8_lossy(&raw[..separator]);
    let mut lines = head.split("\r\n");
    let status_line = lines.next().unwrap_or_default().to_string();
    let headers = lines
        .filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            Some((name.trim().to_ascii_lowercase(), value.trim().to_string()))
        })
        .collect();
    (status_line, headers, raw[separator + 4..].to_vec())
}

pub fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k == &name.to_ascii_lowercase())
        .map(|(_, v)| v.as_str())
}
