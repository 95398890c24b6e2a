//! vantage: a modular HTTP/1.1 application server.
//!
//! Connections are accepted on a bounded worker pool, parsed into an
//! immutable [`http::Request`], routed through an ordered middleware chain
//! and a parameterized route table, and answered through a fluent
//! [`context::Context`]. Plugins extend the server with routes, middleware
//! and lifecycle hooks; long-lived multipart streams (MJPEG-style frame
//! push) take over the socket through an explicit stream continuation.

pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod http;
pub mod middleware;
pub mod net;
pub mod plugin;
pub mod router;
pub mod secure_path;
pub mod server;
pub mod stream;
pub mod worker_pool;

pub use config::ServerConfig;
pub use context::{Context, ResponseKind};
pub use error::{
    BindError, MultipartError, ParseError, PluginError, Result, RouterError, ServerError,
};
pub use http::{Method, Multipart, MultipartPart, Request, Response};
pub use middleware::{Middleware, MiddlewareStack, Next};
pub use plugin::{Plugin, PluginRegistry};
pub use router::{Handler, RouteOutcome, Router};
pub use server::{Server, ServerCounters, ServerHandle};
pub use stream::{Frame, FrameProducer, FrameUpdate, ShutdownSignal};
