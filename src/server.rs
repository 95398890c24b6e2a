//! Server orchestrator: owns the listener, the worker pool, the route
//! table, the middleware chain and the plugin registry.
//!
//! `start()` publishes plugin routes/middleware, runs the plugin start
//! sequence, binds the listener and blocks in the accept loop until a
//! [`ServerHandle`] stops it from another thread. Each accepted connection
//! becomes one pool task: read, parse, pipeline, respond (or hand the
//! socket to a stream continuation), close.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpStream};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;

use std::io::Write;

use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::context::{Context, ResponseKind};
use crate::error::{PluginError, ServerError};
use crate::http::request::{read_request, RecvError};
use crate::http::Response;
use crate::middleware::{run_chain, Middleware, MiddlewareStack};
use crate::net::{AcceptError, Listener};
use crate::plugin::{Plugin, PluginRegistry};
use crate::router::{RouteOutcome, Router};
use crate::stream::ShutdownSignal;
use crate::worker_pool::{WorkerPool, WorkerPoolConfig};

/// Connection and request counters, shared with plugins and handles.
#[derive(Debug, Default)]
pub struct ServerCounters {
    active: AtomicUsize,
    accepted: AtomicU64,
    closed: AtomicU64,
    requests: AtomicU64,
}

impl ServerCounters {
    fn conn_opened(&self) {
        self.active.fetch_add(1, Ordering::SeqCst);
        self.accepted.fetch_add(1, Ordering::SeqCst);
    }

    fn conn_closed(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.closed.fetch_add(1, Ordering::SeqCst);
    }

    fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
    }

    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn total_accepted(&self) -> u64 {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn total_closed(&self) -> u64 {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn total_requests(&self) -> u64 {
        self.requests.load(Ordering::SeqCst)
    }
}

/// Read-only view the accept loop shares with every worker task.
struct Engine {
    router: Router,
    middlewares: MiddlewareStack,
    counters: Arc<ServerCounters>,
    shutdown: ShutdownSignal,
}

/// Decrements the active-connection counter on every exit path of a task.
struct ConnectionGuard {
    counters: Arc<ServerCounters>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.counters.conn_closed();
    }
}

/// Remote control for a running server; cheap to clone around threads.
#[derive(Clone)]
pub struct ServerHandle {
    running: Arc<AtomicBool>,
    shutdown: ShutdownSignal,
    bound_addr: Arc<OnceLock<SocketAddr>>,
    counters: Arc<ServerCounters>,
}

impl ServerHandle {
    /// Request a graceful stop: clears the running flag, fires the shutdown
    /// signal for streaming tasks, and wakes the blocked accept call.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.signal();
        if let Some(addr) = self.local_addr() {
            let wake = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), addr.port());
            let _ = TcpStream::connect_timeout(&wake, Duration::from_millis(250));
        }
    }

    /// Address the server bound to, once `start()` got that far.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.bound_addr.get().copied()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn counters(&self) -> &ServerCounters {
        &self.counters
    }

    /// Poll until the listener answers connections.
    pub fn wait_ready(&self) -> std::io::Result<SocketAddr> {
        for _ in 0..200 {
            if let Some(addr) = self.local_addr() {
                let probe = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), addr.port());
                if TcpStream::connect(probe).is_ok() {
                    return Ok(addr);
                }
            }
            thread::sleep(Duration::from_millis(5));
        }
        Err(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "server not ready",
        ))
    }
}

/// The application server.
pub struct Server {
    config: Arc<ServerConfig>,
    router: Router,
    middlewares: MiddlewareStack,
    plugins: PluginRegistry,
    running: Arc<AtomicBool>,
    counters: Arc<ServerCounters>,
    shutdown: ShutdownSignal,
    bound_addr: Arc<OnceLock<SocketAddr>>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
            router: Router::new(),
            middlewares: MiddlewareStack::new(),
            plugins: PluginRegistry::new(),
            running: Arc::new(AtomicBool::new(false)),
            counters: Arc::new(ServerCounters::default()),
            shutdown: ShutdownSignal::new(),
            bound_addr: Arc::new(OnceLock::new()),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Register routes directly on the server, outside any plugin.
    pub fn router(&mut self) -> &mut Router {
        &mut self.router
    }

    /// Append middleware. Runs after all plugin middleware, in the order
    /// added.
    pub fn add_middleware(&mut self, middleware: Arc<dyn Middleware>) {
        self.middlewares.push(middleware);
    }

    /// Add a plugin: validated, initialized and queued for publication.
    /// Rejected while the server runs.
    pub fn add_plugin(&mut self, plugin: Box<dyn Plugin>) -> Result<(), PluginError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(PluginError::ServerRunning);
        }
        self.plugins.add(plugin, &self.config)
    }

    /// Remove a plugin by name before the server starts.
    pub fn remove_plugin(&mut self, name: &str) -> Result<bool, PluginError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(PluginError::ServerRunning);
        }
        Ok(self.plugins.remove(name))
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    pub fn counters(&self) -> Arc<ServerCounters> {
        self.counters.clone()
    }

    /// Control handle usable from other threads.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            running: self.running.clone(),
            shutdown: self.shutdown.clone(),
            bound_addr: self.bound_addr.clone(),
            counters: self.counters.clone(),
        }
    }

    /// Run the server. Blocks the calling thread until [`ServerHandle::stop`]
    /// is invoked, then drains workers and stops plugins before returning.
    pub fn start(&mut self) -> Result<(), ServerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ServerError::AlreadyRunning);
        }

        // Publish plugin routes and middleware in priority order, then give
        // every plugin its veto. Middleware added directly on the server
        // runs after all plugin middleware.
        let mut router = self.router.clone();
        let mut middlewares = MiddlewareStack::new();
        if let Err(e) = self.plugins.publish(&mut router, &mut middlewares) {
            self.running.store(false, Ordering::SeqCst);
            return Err(e.into());
        }
        middlewares.extend(self.middlewares.iter().cloned());
        if let Err(e) = self.plugins.start_all() {
            self.running.store(false, Ordering::SeqCst);
            return Err(e.into());
        }

        let port = self.config.port();
        let bind_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
        let listener = match Listener::bind(bind_addr) {
            Ok(l) => l,
            Err(e) => {
                error!(error = %e, "Startup failed");
                self.plugins.stop_all();
                self.running.store(false, Ordering::SeqCst);
                return Err(e.into());
            }
        };
        let local_addr = listener.local_addr();
        let _ = self.bound_addr.set(local_addr);

        let mut pool = WorkerPool::new(WorkerPoolConfig {
            num_workers: self.config.thread_count(),
            queue_depth: self.config.queue_depth(),
        });

        let engine = Arc::new(Engine {
            router,
            middlewares,
            counters: self.counters.clone(),
            shutdown: self.shutdown.clone(),
        });

        info!(
            addr = %local_addr,
            workers = self.config.thread_count(),
            routes = engine.router.len(),
            plugins = self.plugins.len(),
            "Server listening"
        );

        while self.running.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, peer)) => {
                    if !self.running.load(Ordering::SeqCst) {
                        // The wake-up connection from stop(); just drop it.
                        break;
                    }
                    self.counters.conn_opened();
                    let engine = engine.clone();
                    let submitted = pool.submit(move || {
                        let _guard = ConnectionGuard {
                            counters: engine.counters.clone(),
                        };
                        handle_connection(&engine, stream, peer);
                    });
                    if submitted.is_err() {
                        break;
                    }
                }
                Err(AcceptError::Interrupted) => continue,
                Err(AcceptError::Fatal(e)) => {
                    if self.running.load(Ordering::SeqCst) {
                        error!(error = %e, "Accept failed");
                        continue;
                    }
                    break;
                }
            }
        }

        drop(listener);
        pool.shutdown();
        self.plugins.stop_all();
        self.running.store(false, Ordering::SeqCst);

        info!(
            total_requests = self.counters.total_requests(),
            total_connections = self.counters.total_accepted(),
            "Server stopped"
        );
        Ok(())
    }
}

/// One connection, start to finish.
fn handle_connection(engine: &Engine, mut stream: TcpStream, peer: SocketAddr) {
    let request = match read_request(&mut stream) {
        Ok(Some(request)) => request,
        Ok(None) => {
            debug!(peer = %peer, "Connection closed without a request");
            return;
        }
        Err(RecvError::Parse(e)) => {
            warn!(peer = %peer, error = %e, "Request parse failed");
            let mut response = Response::new();
            response
                .set_status(e.status())
                .set_header("Content-Type", "text/plain")
                .set_body(e.to_string());
            let _ = stream.write_all(&response.to_bytes());
            return;
        }
        Err(RecvError::Io(e)) => {
            warn!(peer = %peer, error = %e, "Transport error while reading request");
            return;
        }
    };

    engine.counters.record_request();
    info!(method = %request.method, path = %request.path, peer = %peer, "Request");

    // The worker boundary: a panicking handler costs this request a 500,
    // never the worker.
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let mut ctx = Context::new(&request);
        run_chain(&engine.middlewares, &mut ctx, &mut |ctx| {
            match engine.router.dispatch(ctx) {
                RouteOutcome::Matched => {}
                RouteOutcome::MethodMismatch => {
                    ctx.status(405).html("<h1>405 Method Not Allowed</h1>");
                }
                RouteOutcome::NotFound => {
                    ctx.status(404).html("<h1>404 Not Found</h1>");
                }
            }
        });
        ctx.into_outcome()
    }));

    match outcome {
        Err(panic) => {
            error!(peer = %peer, panic = ?panic_message(&panic), "Handler panicked");
            let _ = stream.write_all(&Response::internal_error().to_bytes());
        }
        Ok(ResponseKind::Buffered(response)) => {
            let status = response.status_code();
            if let Err(e) = stream.write_all(&response.to_bytes()) {
                warn!(peer = %peer, error = %e, "Transport error while sending response");
            } else {
                debug!(peer = %peer, status, "Response sent");
            }
        }
        Ok(ResponseKind::Stream(continuation)) => {
            debug!(peer = %peer, "Handler took socket ownership for streaming");
            continuation(stream, engine.shutdown.clone());
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}
