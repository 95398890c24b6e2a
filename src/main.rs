use std::fs;
use std::path::Path;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use vantage::cli::Cli;
use vantage::plugin::{
    AuthPlugin, CorsPlugin, InputSink, MouseButton, RemoteInputPlugin, ScreenStreamPlugin,
    StaticFilesPlugin, StatusPlugin, UploadPlugin,
};
use vantage::stream::{FrameProducer, TestPatternProducer};
use vantage::{Server, ServerConfig};

const DEFAULT_CONFIG: &str = "\
# vantage server configuration

# Server settings
PORT=8080
DOC_ROOT=public
THREAD_COUNT=4

# Security
AUTH_TOKEN=change_me

# Streaming
FPS_LIMIT=15
DIFF_THRESHOLD=1.0

# Uploads
UPLOAD_DIR=uploads
MAX_UPLOAD_SIZE=52428800
";

const DEFAULT_VIEWER: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <title>vantage viewer</title>
  <style>
    body { font-family: system-ui, sans-serif; background: #10141f; color: #e4e4e4;
           margin: 0; display: flex; flex-direction: column; height: 100vh; }
    header { padding: 12px 24px; background: #1b2233; }
    main { flex: 1; display: flex; align-items: center; justify-content: center; }
    img { max-width: 95%; max-height: 95%; border-radius: 6px; }
    input, button { padding: 8px; margin: 4px; border-radius: 4px; border: none; }
  </style>
</head>
<body>
  <header>
    <strong>vantage</strong>
    <input id="token" type="text" placeholder="auth token">
    <button onclick="connect()">Connect</button>
  </header>
  <main><img id="view" alt="stream"></main>
  <script>
    function connect() {
      const token = document.getElementById('token').value;
      document.getElementById('view').src =
        '/stream?token=' + encodeURIComponent(token) + '&t=' + Date.now();
    }
    document.getElementById('view').addEventListener('click', async (e) => {
      const rect = e.target.getBoundingClientRect();
      const token = document.getElementById('token').value;
      const move = { type: 'move', x: (e.clientX - rect.left) / rect.width,
                     y: (e.clientY - rect.top) / rect.height };
      await fetch('/api/input', { method: 'POST',
        headers: { 'Authorization': 'Bearer ' + token,
                   'Content-Type': 'application/json' },
        body: JSON.stringify(move) });
      await fetch('/api/input', { method: 'POST',
        headers: { 'Authorization': 'Bearer ' + token,
                   'Content-Type': 'application/json' },
        body: JSON.stringify({ type: 'click' }) });
    });
  </script>
</body>
</html>
"#;

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

#[cfg(unix)]
extern "C" fn handle_signal(_signal: libc::c_int) {
    // Only async-signal-safe work here; the monitor thread does the rest.
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

#[cfg(unix)]
fn install_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGINT, handle_signal as usize);
        libc::signal(libc::SIGTERM, handle_signal as usize);
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    }
}

#[cfg(not(unix))]
fn install_signal_handlers() {}

/// No injection backend wired up: log commands and report success so the
/// viewer stays functional against a headless deployment.
struct LoggingInputSink;

impl InputSink for LoggingInputSink {
    fn move_cursor(&self, x: f64, y: f64) -> bool {
        info!(x, y, "Input: move");
        true
    }

    fn click(&self, button: MouseButton) -> bool {
        info!(button = ?button, "Input: click");
        true
    }

    fn key_press(&self, code: u16) -> bool {
        info!(code, "Input: key");
        true
    }
}

fn ensure_workspace(config: &ServerConfig) -> anyhow::Result<()> {
    let doc_root = config.doc_root();
    if !doc_root.exists() {
        fs::create_dir_all(&doc_root)
            .with_context(|| format!("creating document root {}", doc_root.display()))?;
    }
    let index = doc_root.join(config.default_file());
    if !index.exists() {
        fs::write(&index, DEFAULT_VIEWER)
            .with_context(|| format!("writing default viewer {}", index.display()))?;
        info!(path = %index.display(), "Created default viewer page");
    }
    let upload_dir = config.upload_dir();
    if !upload_dir.exists() {
        fs::create_dir_all(&upload_dir)
            .with_context(|| format!("creating upload dir {}", upload_dir.display()))?;
        info!(path = %upload_dir.display(), "Created upload directory");
    }
    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<ServerConfig> {
    if !path.exists() {
        fs::write(path, DEFAULT_CONFIG)
            .with_context(|| format!("writing default config {}", path.display()))?;
        info!(path = %path.display(), "Created default configuration");
    }
    let config =
        ServerConfig::load(path).with_context(|| format!("loading {}", path.display()))?;
    info!(path = %path.display(), keys = config.len(), "Configuration loaded");
    Ok(config)
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    ensure_workspace(&config)?;

    if config.auth_token().is_empty() {
        warn!("AUTH_TOKEN is empty; protected endpoints will reject every request");
    }

    let fps = config.fps_limit();
    let diff_threshold = config.diff_threshold();
    let doc_root = config.doc_root();

    let mut server = Server::new(config);
    let counters = server.counters();

    server.add_plugin(Box::new(AuthPlugin::new()))?;
    server.add_plugin(Box::new(CorsPlugin::default()))?;
    server.add_plugin(Box::new(StatusPlugin::new(counters)))?;
    server.add_plugin(Box::new(UploadPlugin::new()))?;
    server.add_plugin(Box::new(ScreenStreamPlugin::new(Arc::new(move || {
        // Until a platform capture adapter is wired in, stream the synthetic
        // test pattern so the whole pipeline stays exercisable.
        Box::new(TestPatternProducer::new(640, 360, diff_threshold)) as Box<dyn FrameProducer>
    }))))?;
    server.add_plugin(Box::new(RemoteInputPlugin::new(Arc::new(LoggingInputSink))))?;
    server.add_plugin(Box::new(StaticFilesPlugin::new(doc_root)))?;

    install_signal_handlers();
    let handle = server.handle();
    let monitor = handle.clone();
    thread::spawn(move || loop {
        if SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
            info!("Shutdown signal received");
            monitor.stop();
            break;
        }
        thread::sleep(Duration::from_millis(200));
    });

    info!(port = server.config().port(), fps, "Starting server");
    server.start()?;
    info!("Server shutdown complete");
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run() {
        error!(error = %format!("{e:#}"), "Fatal error");
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}
