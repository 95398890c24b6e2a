//! Route table: template compilation, matching, parameter extraction.
//!
//! Templates are literal path segments with `:name` capturing one segment
//! (`[^/]+`) and a trailing `*` capturing the remaining path, slashes
//! included, under the parameter name `"*"`. Each template compiles to an
//! anchored regex with literal segments escaped.
//!
//! Matching walks the table in insertion order and stops at the first row
//! whose method and pattern both fit; first registered wins, always. The
//! table is built during startup and read-only once the accept loop runs.

use std::sync::Arc;

use regex::Regex;
use tracing::{debug, warn};

use crate::context::Context;
use crate::error::RouterError;
use crate::http::Method;

/// A route handler. Implemented by any `Fn(&mut Context)`.
pub trait Handler: Send + Sync {
    fn handle(&self, ctx: &mut Context<'_>);
}

impl<F> Handler for F
where
    F: Fn(&mut Context<'_>) + Send + Sync,
{
    fn handle(&self, ctx: &mut Context<'_>) {
        self(ctx)
    }
}

#[derive(Clone)]
struct Route {
    method: Method,
    template: String,
    pattern: Regex,
    param_names: Vec<String>,
    handler: Arc<dyn Handler>,
}

/// Result of one dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// A route matched; its handler ran exactly once.
    Matched,
    /// Some route's pattern matched the path but no row had this method.
    MethodMismatch,
    /// Nothing matched the path at all.
    NotFound,
}

/// Flat, ordered route table.
#[derive(Clone, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile `template` and append a route. Compilation failures surface
    /// here, synchronously; they never crash the running server.
    pub fn register(
        &mut self,
        method: Method,
        template: &str,
        handler: impl Handler + 'static,
    ) -> Result<(), RouterError> {
        self.register_arc(method, template, Arc::new(handler))
    }

    /// `register` for a shared handler (one handler, several rows).
    pub fn register_arc(
        &mut self,
        method: Method,
        template: &str,
        handler: Arc<dyn Handler>,
    ) -> Result<(), RouterError> {
        let (pattern, param_names) = compile_template(template)?;
        if self
            .routes
            .iter()
            .any(|r| r.method == method && r.template == template)
        {
            warn!(
                method = %method,
                template = template,
                "Route registered twice; the earlier registration wins"
            );
        }
        debug!(method = %method, template = template, params = ?param_names, "Route registered");
        self.routes.push(Route {
            method,
            template: template.to_string(),
            pattern,
            param_names,
            handler,
        });
        Ok(())
    }

    pub fn get(&mut self, template: &str, handler: impl Handler + 'static) -> Result<(), RouterError> {
        self.register(Method::Get, template, handler)
    }

    pub fn post(&mut self, template: &str, handler: impl Handler + 'static) -> Result<(), RouterError> {
        self.register(Method::Post, template, handler)
    }

    pub fn put(&mut self, template: &str, handler: impl Handler + 'static) -> Result<(), RouterError> {
        self.register(Method::Put, template, handler)
    }

    pub fn delete(&mut self, template: &str, handler: impl Handler + 'static) -> Result<(), RouterError> {
        self.register(Method::Delete, template, handler)
    }

    pub fn patch(&mut self, template: &str, handler: impl Handler + 'static) -> Result<(), RouterError> {
        self.register(Method::Patch, template, handler)
    }

    pub fn options(&mut self, template: &str, handler: impl Handler + 'static) -> Result<(), RouterError> {
        self.register(Method::Options, template, handler)
    }

    pub fn head(&mut self, template: &str, handler: impl Handler + 'static) -> Result<(), RouterError> {
        self.register(Method::Head, template, handler)
    }

    /// Child view that prepends `prefix` to every template registered
    /// through it. Groups nest; prefixes concatenate.
    pub fn group(&mut self, prefix: &str) -> RouteGroup<'_> {
        RouteGroup {
            router: self,
            prefix: prefix.to_string(),
        }
    }

    /// Match `(method, path)` against the table; on the first hit, extract
    /// parameters in template order into `ctx` and run the handler once.
    pub fn dispatch(&self, ctx: &mut Context<'_>) -> RouteOutcome {
        let method = ctx.request().method;
        let path = ctx.request().path.clone();
        let mut saw_path_match = false;

        for route in &self.routes {
            if route.method != method {
                if route.pattern.is_match(&path) {
                    saw_path_match = true;
                }
                continue;
            }
            if let Some(caps) = route.pattern.captures(&path) {
                for (i, name) in route.param_names.iter().enumerate() {
                    if let Some(capture) = caps.get(i + 1) {
                        ctx.set_param(name.clone(), capture.as_str().to_string());
                    }
                }
                route.handler.handle(ctx);
                return RouteOutcome::Matched;
            }
        }

        if saw_path_match {
            RouteOutcome::MethodMismatch
        } else {
            RouteOutcome::NotFound
        }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Registered templates, for logging at startup.
    pub fn templates(&self) -> impl Iterator<Item = (Method, &str)> {
        self.routes.iter().map(|r| (r.method, r.template.as_str()))
    }
}

/// Registration proxy created by [`Router::group`].
pub struct RouteGroup<'r> {
    router: &'r mut Router,
    prefix: String,
}

impl RouteGroup<'_> {
    pub fn register(
        &mut self,
        method: Method,
        template: &str,
        handler: impl Handler + 'static,
    ) -> Result<(), RouterError> {
        let full = format!("{}{}", self.prefix, template);
        self.router.register(method, &full, handler)
    }

    pub fn get(&mut self, template: &str, handler: impl Handler + 'static) -> Result<(), RouterError> {
        self.register(Method::Get, template, handler)
    }

    pub fn post(&mut self, template: &str, handler: impl Handler + 'static) -> Result<(), RouterError> {
        self.register(Method::Post, template, handler)
    }

    pub fn put(&mut self, template: &str, handler: impl Handler + 'static) -> Result<(), RouterError> {
        self.register(Method::Put, template, handler)
    }

    pub fn delete(&mut self, template: &str, handler: impl Handler + 'static) -> Result<(), RouterError> {
        self.register(Method::Delete, template, handler)
    }

    /// Nested group; prefixes concatenate.
    pub fn group(&mut self, prefix: &str) -> RouteGroup<'_> {
        RouteGroup {
            router: &mut *self.router,
            prefix: format!("{}{}", self.prefix, prefix),
        }
    }
}

/// Compile a template into an anchored regex plus ordered parameter names.
fn compile_template(template: &str) -> Result<(Regex, Vec<String>), RouterError> {
    let mut pattern = String::with_capacity(template.len() + 8);
    pattern.push('^');
    let mut param_names = Vec::new();

    let len = template.len();
    let mut pos = 0;
    while pos < len {
        let rest = &template[pos..];
        if rest.starts_with(':') {
            let end = rest.find('/').unwrap_or(rest.len());
            param_names.push(rest[1..end].to_string());
            pattern.push_str("([^/]+)");
            pos += end;
        } else if rest == "*" {
            // Trailing catch-all: the rest of the path, slashes included.
            param_names.push("*".to_string());
            pattern.push_str("(.*)");
            pos += 1;
        } else {
            let ch = rest.chars().next().expect("non-empty remainder");
            let mut buf = [0u8; 4];
            pattern.push_str(&regex::escape(ch.encode_utf8(&mut buf)));
            pos += ch.len_utf8();
        }
    }
    pattern.push('$');

    let regex = Regex::new(&pattern).map_err(|source| RouterError::InvalidTemplate {
        template: template.to_string(),
        source,
    })?;
    Ok((regex, param_names))
}
