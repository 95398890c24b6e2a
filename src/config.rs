//! Server configuration loaded from a `KEY=VALUE` file.
//!
//! The store keeps every key it reads (unknown keys are preserved but
//! ignored) and exposes typed getters with defaults for the keys the core
//! consumes. A loaded [`ServerConfig`] is a plain value: it is passed into
//! the server constructor and handed to plugins by reference, so there is no
//! process-wide singleton to reason about.
//!
//! File format: UTF-8 text, one `KEY=VALUE` per line, `#` starts a line
//! comment, keys are case-sensitive.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 8080;
/// Default document root for static serving.
pub const DEFAULT_DOC_ROOT: &str = "public";
/// Default file served for directory requests.
pub const DEFAULT_FILE: &str = "index.html";
/// Default upload destination.
pub const DEFAULT_UPLOAD_DIR: &str = "uploads";
/// Default per-file upload cap (50 MiB).
pub const DEFAULT_MAX_UPLOAD_SIZE: u64 = 50 * 1024 * 1024;
/// Default frame rate cap for streaming endpoints.
pub const DEFAULT_FPS_LIMIT: u32 = 15;
/// Default percentage of changed pixels below which a frame is suppressed.
pub const DEFAULT_DIFF_THRESHOLD: f64 = 1.0;
/// Default bound on the worker task queue.
pub const DEFAULT_QUEUE_DEPTH: usize = 1024;

/// Key/value configuration store.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    values: HashMap<String, String>,
}

impl ServerConfig {
    /// Create an empty configuration; every getter falls back to its default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a file.
    pub fn load(path: impl AsRef<Path>) -> io::Result<Self> {
        let text = fs::read_to_string(path)?;
        let mut config = Self::new();
        for line in text.lines() {
            config.parse_line(line);
        }
        Ok(config)
    }

    fn parse_line(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return;
        }
        let Some((key, value)) = line.split_once('=') else {
            return;
        };
        let key = key.trim();
        if !key.is_empty() {
            self.values.insert(key.to_string(), value.trim().to_string());
        }
    }

    /// Raw lookup.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Integer lookup; `None` when the key is absent or not a number.
    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    /// Boolean lookup accepting `true`/`1`/`yes` (case-insensitive).
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key)
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
    }

    /// Set a value, overwriting any existing one.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Number of stored keys, unknown ones included.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the store holds no keys at all.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    // Typed getters for the keys the core consumes.

    pub fn port(&self) -> u16 {
        self.get_int("PORT")
            .and_then(|v| u16::try_from(v).ok())
            .unwrap_or(DEFAULT_PORT)
    }

    pub fn doc_root(&self) -> PathBuf {
        PathBuf::from(self.get("DOC_ROOT").unwrap_or(DEFAULT_DOC_ROOT))
    }

    pub fn thread_count(&self) -> usize {
        self.get_int("THREAD_COUNT")
            .and_then(|v| usize::try_from(v).ok())
            .filter(|&v| v > 0)
            .unwrap_or_else(|| {
                thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
            })
    }

    pub fn upload_dir(&self) -> PathBuf {
        PathBuf::from(self.get("UPLOAD_DIR").unwrap_or(DEFAULT_UPLOAD_DIR))
    }

    pub fn max_upload_size(&self) -> u64 {
        self.get_int("MAX_UPLOAD_SIZE")
            .and_then(|v| u64::try_from(v).ok())
            .unwrap_or(DEFAULT_MAX_UPLOAD_SIZE)
    }

    pub fn auth_token(&self) -> &str {
        self.get("AUTH_TOKEN").unwrap_or("")
    }

    pub fn default_file(&self) -> &str {
        self.get("DEFAULT_FILE").unwrap_or(DEFAULT_FILE)
    }

    pub fn fps_limit(&self) -> u32 {
        self.get_int("FPS_LIMIT")
            .and_then(|v| u32::try_from(v).ok())
            .filter(|&v| v > 0)
            .unwrap_or(DEFAULT_FPS_LIMIT)
    }

    pub fn diff_threshold(&self) -> f64 {
        self.get("DIFF_THRESHOLD")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_DIFF_THRESHOLD)
    }

    pub fn queue_depth(&self) -> usize {
        self.get_int("QUEUE_DEPTH")
            .and_then(|v| usize::try_from(v).ok())
            .filter(|&v| v > 0)
            .unwrap_or(DEFAULT_QUEUE_DEPTH)
    }

    /// Optional hard deadline for a single streaming response, in seconds.
    pub fn stream_max_secs(&self) -> Option<u64> {
        self.get_int("STREAM_MAX_SECS").and_then(|v| u64::try_from(v).ok())
    }
}
