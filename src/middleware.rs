//! Ordered middleware pipeline with a cooperative `next` continuation.
//!
//! Middleware runs in registration order. Each one receives the request
//! context and a [`Next`] value; calling [`Next::run`] descends into the
//! remainder of the chain (ultimately the router), and code after the call
//! runs once everything downstream has completed. Not calling it
//! short-circuits the pipeline.
//!
//! `Next` is consumed by value, so invoking the continuation twice is a
//! compile error rather than a runtime hazard.
//!
//! # Example
//!
//! ```rust,ignore
//! struct RequestTimer;
//!
//! impl Middleware for RequestTimer {
//!     fn handle<'req>(&self, ctx: &mut Context<'req>, next: Next<'_, 'req>) {
//!         let start = Instant::now();
//!         next.run(ctx);
//!         info!(elapsed_ms = start.elapsed().as_millis() as u64, "Request done");
//!     }
//! }
//! ```

use std::sync::Arc;

use crate::context::Context;

/// A middleware stage.
pub trait Middleware: Send + Sync {
    fn handle<'req>(&self, ctx: &mut Context<'req>, next: Next<'_, 'req>);
}

/// Ordered middleware list as the server stores it.
pub type MiddlewareStack = Vec<Arc<dyn Middleware>>;

/// Continuation that advances the chain by one step.
pub struct Next<'a, 'req> {
    rest: &'a [Arc<dyn Middleware>],
    tail: &'a mut dyn FnMut(&mut Context<'req>),
}

impl<'a, 'req> Next<'a, 'req> {
    /// Run the next middleware, or the terminal stage (the router) once the
    /// chain is exhausted.
    pub fn run(self, ctx: &mut Context<'req>) {
        match self.rest.split_first() {
            Some((head, rest)) => head.handle(
                ctx,
                Next {
                    rest,
                    tail: self.tail,
                },
            ),
            None => (self.tail)(ctx),
        }
    }
}

/// Execute the whole chain over `ctx`, ending in `tail`.
pub fn run_chain<'req>(
    chain: &[Arc<dyn Middleware>],
    ctx: &mut Context<'req>,
    tail: &mut dyn FnMut(&mut Context<'req>),
) {
    Next { rest: chain, tail }.run(ctx);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Request;
    use std::sync::Mutex;

    /// Records `<name>-pre` / `<name>-post` around `next`.
    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        call_next: bool,
    }

    impl Middleware for Recorder {
        fn handle<'req>(&self, ctx: &mut Context<'req>, next: Next<'_, 'req>) {
            self.log.lock().unwrap().push(format!("{}-pre", self.name));
            if self.call_next {
                next.run(ctx);
            } else {
                ctx.status(401);
            }
            self.log.lock().unwrap().push(format!("{}-post", self.name));
        }
    }

    fn chain(entries: Vec<(&'static str, bool)>, log: &Arc<Mutex<Vec<String>>>) -> MiddlewareStack {
        entries
            .into_iter()
            .map(|(name, call_next)| {
                Arc::new(Recorder {
                    name,
                    log: log.clone(),
                    call_next,
                }) as Arc<dyn Middleware>
            })
            .collect()
    }

    #[test]
    fn test_pre_post_nesting_order() {
        let req = Request::parse(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        let stack = chain(vec![("a", true), ("b", true)], &log);

        let mut ctx = Context::new(&req);
        let log_for_tail = log.clone();
        run_chain(&stack, &mut ctx, &mut |_ctx| {
            log_for_tail.lock().unwrap().push("tail".to_string());
        });

        assert_eq!(
            *log.lock().unwrap(),
            vec!["a-pre", "b-pre", "tail", "b-post", "a-post"]
        );
    }

    #[test]
    fn test_short_circuit_skips_downstream() {
        let req = Request::parse(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        let stack = chain(vec![("a", true), ("b", false), ("c", true)], &log);

        let mut ctx = Context::new(&req);
        let log_for_tail = log.clone();
        run_chain(&stack, &mut ctx, &mut |_ctx| {
            log_for_tail.lock().unwrap().push("tail".to_string());
        });

        assert_eq!(
            *log.lock().unwrap(),
            vec!["a-pre", "b-pre", "b-post", "a-post"]
        );
        let crate::context::ResponseKind::Buffered(resp) = ctx.into_outcome() else {
            panic!("expected buffered response");
        };
        assert_eq!(resp.status_code(), 401);
    }

    #[test]
    fn test_empty_chain_runs_tail() {
        let req = Request::parse(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        let mut ctx = Context::new(&req);
        let mut ran = false;
        run_chain(&[], &mut ctx, &mut |_ctx| ran = true);
        assert!(ran);
    }
}
