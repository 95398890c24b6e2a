//! Error types shared across the server.
//!
//! Each subsystem gets its own enum so callers can match on the failure they
//! care about; everything funnels into [`ServerError`] at the orchestrator
//! boundary.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = ServerError> = std::result::Result<T, E>;

/// Failures produced by the HTTP request parser.
///
/// Every variant maps to a client-facing status via [`ParseError::status`]:
/// `RequestTooLarge` answers 413, everything else answers 400.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("malformed request line")]
    MalformedRequestLine,

    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),

    #[error("unsupported HTTP version: {0}")]
    UnsupportedVersion(String),

    #[error("header line exceeds {limit} bytes")]
    HeaderTooLarge { limit: usize },

    #[error("request has more than {limit} headers")]
    TooManyHeaders { limit: usize },

    #[error("bad percent encoding in {0}")]
    BadPercentEncoding(String),

    #[error("request exceeds {limit} bytes")]
    RequestTooLarge { limit: usize },
}

impl ParseError {
    /// Status code a failed parse reports to the client.
    pub fn status(&self) -> u16 {
        match self {
            ParseError::RequestTooLarge { .. } => 413,
            _ => 400,
        }
    }
}

/// Failures produced by the multipart/form-data parser.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MultipartError {
    #[error("missing multipart boundary")]
    MissingBoundary,

    #[error("multipart part has no header terminator")]
    MalformedPart,

    #[error("multipart body contained no parts")]
    Empty,
}

/// Failures surfaced synchronously by route registration.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("invalid route template '{template}': {source}")]
    InvalidTemplate {
        template: String,
        #[source]
        source: regex::Error,
    },
}

/// Failures in the plugin lifecycle.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("plugin '{0}' is already loaded")]
    Duplicate(String),

    #[error("plugin '{plugin}' is missing dependency '{dependency}'")]
    MissingDependency { plugin: String, dependency: String },

    #[error("plugin '{plugin}' failed to initialize: {reason}")]
    InitFailed { plugin: String, reason: String },

    #[error("plugin '{0}' aborted server start")]
    StartAborted(String),

    #[error("plugins cannot be added or removed while the server is running")]
    ServerRunning,
}

/// Failures binding the listening socket.
///
/// The messages carry the peer-friendly address and spell out the common
/// causes so a misconfigured deployment is diagnosable from the log alone.
#[derive(Debug, Error)]
pub enum BindError {
    #[error(
        "bind failed on {addr}: port {port} already in use \
         (another process owns this port; try `lsof -i :{port}`)"
    )]
    AddressInUse { addr: SocketAddr, port: u16 },

    #[error(
        "bind failed on {addr}: permission denied \
         (ports below 1024 require elevated privileges)"
    )]
    PermissionDenied { addr: SocketAddr },

    #[error("bind failed on {addr}: address not available on this machine")]
    AddressNotAvailable { addr: SocketAddr },

    #[error("bind failed on {addr}: socket is already bound")]
    InvalidState { addr: SocketAddr },

    #[error("bind failed on {addr}: {source}")]
    Other {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Top-level server failures reported by `Server::start`.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Bind(#[from] BindError),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    Router(#[from] RouterError),

    #[error("server is already running")]
    AlreadyRunning,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
