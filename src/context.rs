//! Per-request context handed through middleware and handlers.
//!
//! A [`Context`] pairs a borrowed, parsed [`Request`] with the [`Response`]
//! under construction, plus extracted path parameters and a typed scratch
//! map middleware uses to pass values downstream (an authenticated user,
//! a request id). It lives for exactly one worker task.
//!
//! A handler normally mutates the response and returns; one that needs the
//! raw socket (frame streaming) installs a continuation with
//! [`Context::stream`], and the worker branches on [`ResponseKind`] instead
//! of serializing.

use std::any::Any;
use std::collections::HashMap;
use std::net::TcpStream;

use serde::Serialize;

use crate::http::{Request, Response};
use crate::stream::ShutdownSignal;

/// A handler-supplied function that takes ownership of the client socket.
pub type StreamContinuation = Box<dyn FnOnce(TcpStream, ShutdownSignal) + Send + 'static>;

/// What the pipeline produced for one request.
pub enum ResponseKind {
    /// Serialize and send the built response, then close.
    Buffered(Response),
    /// Hand the socket to the continuation; the worker writes nothing.
    Stream(StreamContinuation),
}

/// Request-scoped state bundle.
pub struct Context<'req> {
    request: &'req Request,
    response: Response,
    params: HashMap<String, String>,
    state: HashMap<String, Box<dyn Any + Send>>,
    stream: Option<StreamContinuation>,
}

impl<'req> Context<'req> {
    pub fn new(request: &'req Request) -> Self {
        Self {
            request,
            response: Response::new(),
            params: HashMap::new(),
            state: HashMap::new(),
            stream: None,
        }
    }

    pub fn request(&self) -> &Request {
        self.request
    }

    pub fn response(&mut self) -> &mut Response {
        &mut self.response
    }

    /// Path parameter extracted by the router (`/users/:id` yields `id`).
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub(crate) fn set_param(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.params.insert(name.into(), value.into());
    }

    /// Decoded query parameter.
    pub fn query(&self, name: &str) -> Option<&str> {
        self.request.query(name)
    }

    /// Case-insensitive request header.
    pub fn request_header(&self, name: &str) -> Option<&str> {
        self.request.header(name)
    }

    // Chainable response builders.

    pub fn status(&mut self, code: u16) -> &mut Self {
        self.response.set_status(code);
        self
    }

    pub fn header(&mut self, name: &str, value: &str) -> &mut Self {
        self.response.set_header(name, value);
        self
    }

    pub fn body(&mut self, body: impl Into<Vec<u8>>) -> &mut Self {
        self.response.set_body(body);
        self
    }

    /// Serialize `value` as the JSON body with `Content-Type: application/json`.
    pub fn json<T: Serialize>(&mut self, value: &T) -> &mut Self {
        let body = serde_json::to_vec(value).unwrap_or_else(|_| b"null".to_vec());
        self.header("Content-Type", "application/json").body(body)
    }

    pub fn html(&mut self, content: impl Into<String>) -> &mut Self {
        self.header("Content-Type", "text/html")
            .body(content.into().into_bytes())
    }

    pub fn text(&mut self, content: impl Into<String>) -> &mut Self {
        self.header("Content-Type", "text/plain")
            .body(content.into().into_bytes())
    }

    /// Redirect via `Location`; pass 302 unless a permanent move is meant.
    pub fn redirect(&mut self, url: &str, code: u16) -> &mut Self {
        self.status(code).header("Location", url)
    }

    // Typed scratch state middleware hands down to handlers.

    pub fn set(&mut self, key: impl Into<String>, value: impl Any + Send) {
        self.state.insert(key.into(), Box::new(value));
    }

    /// `None` when the key is absent or holds a different type.
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.state.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    pub fn has(&self, key: &str) -> bool {
        self.state.contains_key(key)
    }

    /// Take over the socket: the worker will invoke `continuation` with the
    /// client stream and the server's shutdown signal instead of
    /// serializing the buffered response.
    pub fn stream(
        &mut self,
        continuation: impl FnOnce(TcpStream, ShutdownSignal) + Send + 'static,
    ) {
        self.stream = Some(Box::new(continuation));
    }

    /// Collapse into the outcome the worker branches on.
    pub fn into_outcome(self) -> ResponseKind {
        match self.stream {
            Some(continuation) => ResponseKind::Stream(continuation),
            None => ResponseKind::Buffered(self.response),
        }
    }
}
