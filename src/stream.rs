//! Long-lived multipart streaming over an owned socket.
//!
//! A handler that wants to push frames (MJPEG-style) hands the worker a
//! stream continuation; the worker invokes it with the client socket and the
//! server's shutdown signal. [`stream_multipart`] then writes a
//! `multipart/x-mixed-replace` body until the producer fails, the peer
//! closes, the server shuts down, or an optional deadline passes.
//!
//! Pacing sleeps on the shutdown signal itself, so a server stop wakes the
//! loop immediately instead of stalling for a full frame interval.

use std::io::Write;
use std::net::TcpStream;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

/// Interval between statistics records.
const STATS_INTERVAL: Duration = Duration::from_secs(5);

/// Cancellation signal shared between the server and streaming tasks.
///
/// `wait_timeout` doubles as the pacing sleep: it returns early (with
/// `true`) the moment the signal fires.
#[derive(Clone, Default)]
pub struct ShutdownSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal and wake every waiter.
    pub fn signal(&self) {
        let (lock, condvar) = &*self.inner;
        let mut fired = lock.lock().unwrap_or_else(|e| e.into_inner());
        *fired = true;
        condvar.notify_all();
    }

    pub fn is_signalled(&self) -> bool {
        let (lock, _) = &*self.inner;
        *lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sleep for at most `timeout`. Returns `true` if the signal fired.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (lock, condvar) = &*self.inner;
        let mut fired = lock.lock().unwrap_or_else(|e| e.into_inner());
        let deadline = Instant::now() + timeout;
        while !*fired {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _timeout_result) = condvar
                .wait_timeout(fired, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            fired = guard;
        }
        true
    }
}

/// One frame ready to be written to the stream.
#[derive(Debug, Clone)]
pub struct Frame {
    pub content_type: String,
    pub data: Vec<u8>,
}

/// What a producer returned for one cycle.
#[derive(Debug)]
pub enum FrameUpdate {
    Frame(Frame),
    /// Nothing changed since the previous frame; skip this cycle.
    Unchanged,
}

/// Fatal producer failure; terminates the stream.
#[derive(Debug, Error)]
#[error("frame producer failed: {0}")]
pub struct FrameError(pub String);

/// Capability interface for frame sources.
///
/// Platform capture adapters implement this; the core never touches capture
/// APIs directly.
pub trait FrameProducer: Send {
    fn next_frame(&mut self) -> Result<FrameUpdate, FrameError>;
}

/// Frame-differencing helper for raster producers.
///
/// Tracks the previous raster and reports whether the fraction of changed
/// bytes reaches the configured threshold (a percentage; default 1%). The
/// first raster always counts as changed.
pub struct RasterDiffer {
    previous: Option<Vec<u8>>,
    threshold_percent: f64,
}

impl RasterDiffer {
    pub fn new(threshold_percent: f64) -> Self {
        Self {
            previous: None,
            threshold_percent,
        }
    }

    /// Compare against the previous raster and remember this one.
    pub fn changed(&mut self, raster: &[u8]) -> bool {
        let changed = match &self.previous {
            Some(prev) if prev.len() == raster.len() && !raster.is_empty() => {
                let diff = prev
                    .iter()
                    .zip(raster.iter())
                    .filter(|(a, b)| a != b)
                    .count();
                (diff as f64 / raster.len() as f64) * 100.0 >= self.threshold_percent
            }
            _ => true,
        };
        self.previous = Some(raster.to_vec());
        changed
    }
}

/// Streaming parameters.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Boundary token for the `multipart/x-mixed-replace` body.
    pub boundary: String,
    /// Frame rate cap; the loop enforces a minimum interval of `1000/fps` ms.
    pub fps: u32,
    /// Optional hard deadline for the whole stream.
    pub max_duration: Option<Duration>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            boundary: "frame".to_string(),
            fps: crate::config::DEFAULT_FPS_LIMIT,
            max_duration: None,
        }
    }
}

/// Counters accumulated over the life of one stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub frames_sent: u64,
    pub frames_skipped: u64,
    pub bytes_sent: u64,
}

/// Why a stream ended; informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    Shutdown,
    DeadlineReached,
    PeerClosed,
    ProducerFailed,
}

/// Drive a multipart push stream over an owned socket until a stop
/// condition is met. Returns the accumulated statistics.
pub fn stream_multipart(
    mut socket: TcpStream,
    producer: &mut dyn FrameProducer,
    shutdown: &ShutdownSignal,
    config: &StreamConfig,
) -> (StreamStats, StreamEnd) {
    let mut stats = StreamStats::default();
    let interval = Duration::from_millis(1000 / u64::from(config.fps.max(1)));
    let started = Instant::now();
    let deadline = config.max_duration.map(|d| started + d);
    let mut last_stats = started;
    let mut window_bytes: u64 = 0;

    let preamble = format!(
        "HTTP/1.1 200 OK\r\n\
         Content-Type: multipart/x-mixed-replace; boundary={}\r\n\
         Cache-Control: no-cache\r\n\
         Connection: close\r\n\r\n",
        config.boundary
    );
    if let Err(e) = socket.write_all(preamble.as_bytes()) {
        debug!(error = %e, "Stream peer closed before preamble");
        return (stats, StreamEnd::PeerClosed);
    }

    let end = loop {
        if shutdown.is_signalled() {
            break StreamEnd::Shutdown;
        }
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                break StreamEnd::DeadlineReached;
            }
        }

        let cycle_start = Instant::now();
        match producer.next_frame() {
            Err(e) => {
                warn!(error = %e, "Frame producer failed, ending stream");
                break StreamEnd::ProducerFailed;
            }
            Ok(FrameUpdate::Unchanged) => {
                stats.frames_skipped += 1;
            }
            Ok(FrameUpdate::Frame(frame)) => {
                let header = format!(
                    "--{}\r\nContent-Type: {}\r\nContent-Length: {}\r\n\r\n",
                    config.boundary,
                    frame.content_type,
                    frame.data.len()
                );
                let write = socket
                    .write_all(header.as_bytes())
                    .and_then(|_| socket.write_all(&frame.data))
                    .and_then(|_| socket.write_all(b"\r\n"));
                if let Err(e) = write {
                    debug!(error = %e, "Stream peer closed");
                    break StreamEnd::PeerClosed;
                }
                let written = (header.len() + frame.data.len() + 2) as u64;
                stats.frames_sent += 1;
                stats.bytes_sent += written;
                window_bytes += written;
            }
        }

        if last_stats.elapsed() >= STATS_INTERVAL {
            let kbps = (window_bytes as f64 / 1024.0) / last_stats.elapsed().as_secs_f64();
            info!(
                frames_sent = stats.frames_sent,
                frames_skipped = stats.frames_skipped,
                bytes_sent = stats.bytes_sent,
                bandwidth_kibps = format!("{kbps:.1}"),
                "Stream statistics"
            );
            last_stats = Instant::now();
            window_bytes = 0;
        }

        let elapsed = cycle_start.elapsed();
        if elapsed < interval && shutdown.wait_timeout(interval - elapsed) {
            break StreamEnd::Shutdown;
        }
    };

    let _ = socket.shutdown(std::net::Shutdown::Both);
    debug!(
        reason = ?end,
        frames_sent = stats.frames_sent,
        frames_skipped = stats.frames_skipped,
        "Stream ended"
    );
    (stats, end)
}

/// Encode a 24-bit BGR raster as an uncompressed bottom-up BMP.
///
/// Kept here so synthetic producers and capture adapters share one encoder.
pub fn encode_bmp(width: u32, height: u32, bgr: &[u8]) -> Vec<u8> {
    let row_len = (width as usize) * 3;
    let padded_row = (row_len + 3) & !3;
    let pixel_bytes = padded_row * height as usize;
    let file_size = 14 + 40 + pixel_bytes;

    let mut out = Vec::with_capacity(file_size);
    // BITMAPFILEHEADER
    out.extend_from_slice(b"BM");
    out.extend_from_slice(&(file_size as u32).to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&54u32.to_le_bytes());
    // BITMAPINFOHEADER
    out.extend_from_slice(&40u32.to_le_bytes());
    out.extend_from_slice(&(width as i32).to_le_bytes());
    out.extend_from_slice(&(height as i32).to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&24u16.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&(pixel_bytes as u32).to_le_bytes());
    out.extend_from_slice(&2835i32.to_le_bytes());
    out.extend_from_slice(&2835i32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    // Pixel rows, bottom-up, each padded to a 4-byte boundary.
    let padding = [0u8; 3];
    for row in (0..height as usize).rev() {
        let start = row * row_len;
        out.extend_from_slice(&bgr[start..start + row_len]);
        out.extend_from_slice(&padding[..padded_row - row_len]);
    }
    out
}

/// Synthetic frame source: a vertical bar sweeping across a solid field.
///
/// Stands in when no platform capture adapter is wired up, and gives the
/// streaming path something deterministic to chew on in tests.
pub struct TestPatternProducer {
    width: u32,
    height: u32,
    tick: u32,
    differ: RasterDiffer,
}

impl TestPatternProducer {
    pub fn new(width: u32, height: u32, diff_threshold: f64) -> Self {
        Self {
            width,
            height,
            tick: 0,
            differ: RasterDiffer::new(diff_threshold),
        }
    }

    fn raster(&self) -> Vec<u8> {
        let bar = self.tick % self.width;
        let mut bgr = vec![0x20u8; (self.width * self.height * 3) as usize];
        for y in 0..self.height {
            let idx = ((y * self.width + bar) * 3) as usize;
            bgr[idx] = 0xff;
            bgr[idx + 1] = 0xff;
            bgr[idx + 2] = 0xff;
        }
        bgr
    }
}

impl FrameProducer for TestPatternProducer {
    fn next_frame(&mut self) -> Result<FrameUpdate, FrameError> {
        let bgr = self.raster();
        self.tick = self.tick.wrapping_add(1);
        if !self.differ.changed(&bgr) {
            return Ok(FrameUpdate::Unchanged);
        }
        Ok(FrameUpdate::Frame(Frame {
            content_type: "image/bmp".to_string(),
            data: encode_bmp(self.width, self.height, &bgr),
        }))
    }
}
