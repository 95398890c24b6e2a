//! Bearer-token authentication plugin.
//!
//! Guards a configured set of path prefixes with a shared token. Clients
//! send `Authorization: Bearer <token>`; clients that cannot set headers
//! (`<img>` tags pointed at a stream endpoint, `EventSource`) may pass
//! `?token=<token>` instead. Requests outside the protected prefixes pass
//! through untouched.

use std::sync::Arc;

use tracing::warn;

use super::Plugin;
use crate::config::ServerConfig;
use crate::context::Context;
use crate::error::PluginError;
use crate::middleware::{Middleware, MiddlewareStack, Next};

/// Prefixes guarded when none are configured explicitly.
const DEFAULT_PROTECTED: &[&str] = &["/api/", "/stream", "/upload"];

struct AuthGuard {
    token: String,
    protected: Vec<String>,
}

impl AuthGuard {
    fn requires_auth(&self, path: &str) -> bool {
        self.protected.iter().any(|prefix| path.starts_with(prefix))
    }

    fn authorized(&self, ctx: &Context<'_>) -> bool {
        if self.token.is_empty() {
            // No token configured: protected routes stay closed.
            return false;
        }
        if let Some(header) = ctx.request_header("authorization") {
            if let Some(bearer) = header.strip_prefix("Bearer ") {
                return bearer == self.token;
            }
        }
        ctx.query("token") == Some(self.token.as_str())
    }
}

impl Middleware for AuthGuard {
    fn handle<'req>(&self, ctx: &mut Context<'req>, next: Next<'_, 'req>) {
        if !self.requires_auth(&ctx.request().path) {
            next.run(ctx);
            return;
        }
        if self.authorized(ctx) {
            next.run(ctx);
            return;
        }
        warn!(path = %ctx.request().path, "Unauthorized access attempt");
        ctx.status(401).json(&serde_json::json!({ "error": "Unauthorized" }));
    }
}

/// Installs the [`AuthGuard`] middleware. Priority 200: runs before CORS
/// and all business middleware.
pub struct AuthPlugin {
    token: String,
    protected: Vec<String>,
}

impl AuthPlugin {
    /// Token is taken from `AUTH_TOKEN` at initialization.
    pub fn new() -> Self {
        Self {
            token: String::new(),
            protected: DEFAULT_PROTECTED.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Guard a custom set of path prefixes instead of the defaults.
    pub fn with_protected(prefixes: &[&str]) -> Self {
        Self {
            token: String::new(),
            protected: prefixes.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Default for AuthPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for AuthPlugin {
    fn name(&self) -> &str {
        "auth"
    }

    fn version(&self) -> &str {
        "1.1.0"
    }

    fn description(&self) -> &str {
        "Bearer-token guard for protected path prefixes"
    }

    fn priority(&self) -> i32 {
        200
    }

    fn initialize(&mut self, config: &ServerConfig) -> Result<(), PluginError> {
        self.token = config.auth_token().to_string();
        if self.token.is_empty() {
            warn!("AUTH_TOKEN is empty; protected routes will reject every request");
        }
        Ok(())
    }

    fn register_middleware(&self, chain: &mut MiddlewareStack) {
        chain.push(Arc::new(AuthGuard {
            token: self.token.clone(),
            protected: self.protected.clone(),
        }));
    }
}
