//! Socket transport: listener construction and accept classification.
//!
//! The listener is built through `socket2` so `SO_REUSEADDR` can be set
//! *before* bind; a plain `std::net::TcpListener::bind` sets options too
//! late to avoid `EADDRINUSE` after a fast restart. Accepted client sockets
//! are ordinary `std::net::TcpStream`s with blocking semantics; ownership
//! moves to the worker that handles the connection and the stream closes on
//! drop on every exit path.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};

use socket2::{Domain, Protocol, Socket, Type};
use tracing::debug;

use crate::error::BindError;

/// Listen backlog handed to the OS.
pub const LISTEN_BACKLOG: i32 = 128;

/// Outcome of a single `accept` call.
#[derive(Debug)]
pub enum AcceptError {
    /// Interrupted by a signal; the caller should retry.
    Interrupted,
    /// Anything else; the accept loop decides whether it is fatal.
    Fatal(io::Error),
}

/// Bound, listening IPv4 TCP socket.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    addr: SocketAddr,
}

impl Listener {
    /// Create, configure, bind and listen in one step.
    ///
    /// `SO_REUSEADDR` is enabled before bind. Bind failures are classified
    /// into [`BindError`] variants with actionable messages.
    pub fn bind(addr: SocketAddr) -> Result<Self, BindError> {
        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))
            .map_err(|source| BindError::Other { addr, source })?;
        socket
            .set_reuse_address(true)
            .map_err(|source| BindError::Other { addr, source })?;
        socket
            .bind(&addr.into())
            .map_err(|e| classify_bind_error(e, addr))?;
        socket
            .listen(LISTEN_BACKLOG)
            .map_err(|source| BindError::Other { addr, source })?;

        let inner: TcpListener = socket.into();
        // Re-query so a port-0 bind reports the port the OS actually picked.
        let addr = inner.local_addr().unwrap_or(addr);
        debug!(addr = %addr, backlog = LISTEN_BACKLOG, "Listener bound");
        Ok(Self { inner, addr })
    }

    /// Accept one connection.
    ///
    /// Signal interruption is reported separately so the accept loop can
    /// retry after re-checking its running flag.
    pub fn accept(&self) -> Result<(TcpStream, SocketAddr), AcceptError> {
        match self.inner.accept() {
            Ok(pair) => Ok(pair),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Err(AcceptError::Interrupted),
            Err(e) => Err(AcceptError::Fatal(e)),
        }
    }

    /// The address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }
}

fn classify_bind_error(source: io::Error, addr: SocketAddr) -> BindError {
    match source.kind() {
        io::ErrorKind::AddrInUse => BindError::AddressInUse {
            addr,
            port: addr.port(),
        },
        io::ErrorKind::PermissionDenied => BindError::PermissionDenied { addr },
        io::ErrorKind::AddrNotAvailable => BindError::AddressNotAvailable { addr },
        io::ErrorKind::InvalidInput => BindError::InvalidState { addr },
        _ => BindError::Other { addr, source },
    }
}
