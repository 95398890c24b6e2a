//! Middleware pipeline contract: ordering, short-circuit, post-`next`
//! execution and state handoff to handlers.

use std::sync::{Arc, Mutex};

use vantage::middleware::run_chain;
use vantage::{Context, Middleware, MiddlewareStack, Next, Request, ResponseKind};

type Log = Arc<Mutex<Vec<String>>>;

struct Tagger {
    name: &'static str,
    log: Log,
    call_next: bool,
}

impl Middleware for Tagger {
    fn handle<'req>(&self, ctx: &mut Context<'req>, next: Next<'_, 'req>) {
        self.log.lock().unwrap().push(format!("{}-pre", self.name));
        if self.call_next {
            next.run(ctx);
            self.log.lock().unwrap().push(format!("{}-post", self.name));
        } else {
            ctx.status(401).json(&serde_json::json!({"error": "Unauthorized"}));
            self.log.lock().unwrap().push(format!("{}-post", self.name));
        }
    }
}

fn tagger(name: &'static str, log: &Log, call_next: bool) -> Arc<dyn Middleware> {
    Arc::new(Tagger {
        name,
        log: log.clone(),
        call_next,
    })
}

#[test]
fn test_full_chain_nesting() {
    // Pre-blocks run outside-in, the router runs once, post-blocks unwind
    // inside-out.
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let chain: MiddlewareStack = vec![
        tagger("m1", &log, true),
        tagger("m2", &log, true),
        tagger("m3", &log, true),
    ];
    let req = Request::parse(b"GET / HTTP/1.1\r\n\r\n").unwrap();
    let mut ctx = Context::new(&req);
    let tail_log = log.clone();
    run_chain(&chain, &mut ctx, &mut |_ctx| {
        tail_log.lock().unwrap().push("router".to_string());
    });
    assert_eq!(
        *log.lock().unwrap(),
        vec!["m1-pre", "m2-pre", "m3-pre", "router", "m3-post", "m2-post", "m1-post"]
    );
}

#[test]
fn test_short_circuit_scenario() {
    // A logs "A-pre" and marks its post-block; B answers 401 without
    // calling next and logs nothing; C logs "C-pre"; the handler logs "H".
    // Only "A-pre" may appear, the status is 401, and A's post-block runs.
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let a_post_ran = Arc::new(std::sync::atomic::AtomicBool::new(false));

    struct LoggingA {
        log: Log,
        post_ran: Arc<std::sync::atomic::AtomicBool>,
    }
    impl Middleware for LoggingA {
        fn handle<'req>(&self, ctx: &mut Context<'req>, next: Next<'_, 'req>) {
            self.log.lock().unwrap().push("A-pre".to_string());
            next.run(ctx);
            self.post_ran
                .store(true, std::sync::atomic::Ordering::SeqCst);
        }
    }

    struct RejectingB;
    impl Middleware for RejectingB {
        fn handle<'req>(&self, ctx: &mut Context<'req>, _next: Next<'_, 'req>) {
            ctx.status(401).json(&serde_json::json!({"error": "Unauthorized"}));
        }
    }

    struct LoggingC {
        log: Log,
    }
    impl Middleware for LoggingC {
        fn handle<'req>(&self, ctx: &mut Context<'req>, next: Next<'_, 'req>) {
            self.log.lock().unwrap().push("C-pre".to_string());
            next.run(ctx);
        }
    }

    let chain: MiddlewareStack = vec![
        Arc::new(LoggingA {
            log: log.clone(),
            post_ran: a_post_ran.clone(),
        }),
        Arc::new(RejectingB),
        Arc::new(LoggingC { log: log.clone() }),
    ];
    let req = Request::parse(b"GET /protected HTTP/1.1\r\n\r\n").unwrap();
    let mut ctx = Context::new(&req);
    let tail_log = log.clone();
    run_chain(&chain, &mut ctx, &mut |_ctx| {
        tail_log.lock().unwrap().push("H".to_string());
    });

    assert_eq!(*log.lock().unwrap(), vec!["A-pre"]);
    assert!(a_post_ran.load(std::sync::atomic::Ordering::SeqCst));

    let ResponseKind::Buffered(resp) = ctx.into_outcome() else {
        panic!("expected buffered response");
    };
    assert_eq!(resp.status_code(), 401);
}

#[test]
fn test_post_next_sees_downstream_response() {
    struct HeaderInjector;
    impl Middleware for HeaderInjector {
        fn handle<'req>(&self, ctx: &mut Context<'req>, next: Next<'_, 'req>) {
            next.run(ctx);
            let status = ctx.response().status_code().to_string();
            ctx.header("X-Observed-Status", &status);
        }
    }

    let chain: MiddlewareStack = vec![Arc::new(HeaderInjector)];
    let req = Request::parse(b"GET / HTTP/1.1\r\n\r\n").unwrap();
    let mut ctx = Context::new(&req);
    run_chain(&chain, &mut ctx, &mut |ctx| {
        ctx.status(418).text("teapot");
    });
    let ResponseKind::Buffered(resp) = ctx.into_outcome() else {
        panic!("expected buffered response");
    };
    assert_eq!(resp.header("x-observed-status"), Some("418"));
}

#[test]
fn test_state_flows_downstream() {
    struct UserInjector;
    impl Middleware for UserInjector {
        fn handle<'req>(&self, ctx: &mut Context<'req>, next: Next<'_, 'req>) {
            ctx.set("user", "alice".to_string());
            next.run(ctx);
        }
    }

    let chain: MiddlewareStack = vec![Arc::new(UserInjector)];
    let req = Request::parse(b"GET / HTTP/1.1\r\n\r\n").unwrap();
    let mut ctx = Context::new(&req);
    let observed = Arc::new(Mutex::new(None));
    let observed_in_tail = observed.clone();
    run_chain(&chain, &mut ctx, &mut |ctx| {
        *observed_in_tail.lock().unwrap() = ctx.get::<String>("user").cloned();
    });
    assert_eq!(*observed.lock().unwrap(), Some("alice".to_string()));
}

#[test]
fn test_registration_order_is_execution_order() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let chain: MiddlewareStack = vec![
        tagger("first", &log, true),
        tagger("second", &log, true),
    ];
    let req = Request::parse(b"GET / HTTP/1.1\r\n\r\n").unwrap();
    let mut ctx = Context::new(&req);
    run_chain(&chain, &mut ctx, &mut |_ctx| {});
    let entries = log.lock().unwrap().clone();
    assert_eq!(entries[0], "first-pre");
    assert_eq!(entries[1], "second-pre");
}
