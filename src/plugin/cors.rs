//! CORS plugin.
//!
//! Short-circuits `OPTIONS` preflights with 204 and the allow headers, and
//! injects `Access-Control-Allow-Origin` into every other response after
//! the downstream pipeline has run.

use std::sync::Arc;

use super::Plugin;
use crate::config::ServerConfig;
use crate::context::Context;
use crate::error::PluginError;
use crate::http::Method;
use crate::middleware::{Middleware, MiddlewareStack, Next};

struct CorsHeaders {
    allow_origin: String,
    allow_methods: String,
    allow_headers: String,
}

impl Middleware for CorsHeaders {
    fn handle<'req>(&self, ctx: &mut Context<'req>, next: Next<'_, 'req>) {
        if ctx.request().method == Method::Options {
            ctx.status(204)
                .header("Access-Control-Allow-Origin", &self.allow_origin)
                .header("Access-Control-Allow-Methods", &self.allow_methods)
                .header("Access-Control-Allow-Headers", &self.allow_headers);
            return;
        }
        next.run(ctx);
        ctx.header("Access-Control-Allow-Origin", &self.allow_origin);
    }
}

/// Permissive CORS for browser viewers. Priority 150: before auth, so
/// preflights (which carry no credentials) are answered instead of
/// rejected.
pub struct CorsPlugin {
    allow_origin: String,
    allow_methods: String,
    allow_headers: String,
}

impl CorsPlugin {
    pub fn new(allow_origin: impl Into<String>) -> Self {
        Self {
            allow_origin: allow_origin.into(),
            ..Self::default()
        }
    }
}

impl Default for CorsPlugin {
    fn default() -> Self {
        Self {
            allow_origin: "*".to_string(),
            allow_methods: "GET, POST, OPTIONS".to_string(),
            allow_headers: "Authorization, Content-Type".to_string(),
        }
    }
}

impl Plugin for CorsPlugin {
    fn name(&self) -> &str {
        "cors"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn description(&self) -> &str {
        "Answers preflights and tags responses with CORS headers"
    }

    fn priority(&self) -> i32 {
        150
    }

    fn initialize(&mut self, _config: &ServerConfig) -> Result<(), PluginError> {
        Ok(())
    }

    fn register_middleware(&self, chain: &mut MiddlewareStack) {
        chain.push(Arc::new(CorsHeaders {
            allow_origin: self.allow_origin.clone(),
            allow_methods: self.allow_methods.clone(),
            allow_headers: self.allow_headers.clone(),
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ResponseKind;
    use crate::http::Request;
    use crate::middleware::run_chain;

    fn middleware() -> MiddlewareStack {
        let plugin = CorsPlugin::default();
        let mut chain = MiddlewareStack::new();
        plugin.register_middleware(&mut chain);
        chain
    }

    #[test]
    fn test_preflight_short_circuits() {
        let req = Request::parse(b"OPTIONS /api/x HTTP/1.1\r\n\r\n").unwrap();
        let mut ctx = Context::new(&req);
        let mut reached = false;
        run_chain(&middleware(), &mut ctx, &mut |_ctx| reached = true);
        let ResponseKind::Buffered(resp) = ctx.into_outcome() else {
            panic!("expected buffered response");
        };
        assert!(!reached);
        assert_eq!(resp.status_code(), 204);
        assert_eq!(resp.header("access-control-allow-origin"), Some("*"));
        assert_eq!(
            resp.header("access-control-allow-methods"),
            Some("GET, POST, OPTIONS")
        );
    }

    #[test]
    fn test_responses_tagged_after_next() {
        let req = Request::parse(b"GET /x HTTP/1.1\r\n\r\n").unwrap();
        let mut ctx = Context::new(&req);
        run_chain(&middleware(), &mut ctx, &mut |ctx| {
            ctx.text("ok");
        });
        let ResponseKind::Buffered(resp) = ctx.into_outcome() else {
            panic!("expected buffered response");
        };
        assert_eq!(resp.status_code(), 200);
        assert_eq!(resp.header("access-control-allow-origin"), Some("*"));
        assert_eq!(resp.body(), b"ok");
    }
}
