//! Plugin registry lifecycle: ordering, rollback, duplicate and dependency
//! validation, priority-ordered publication.

use std::sync::{Arc, Mutex};

use vantage::middleware::MiddlewareStack;
use vantage::plugin::PluginRegistry;
use vantage::{
    Context, Middleware, Next, Plugin, PluginError, Router, RouterError, ServerConfig,
};

type Log = Arc<Mutex<Vec<String>>>;

struct ProbePlugin {
    name: &'static str,
    priority: i32,
    log: Log,
    start_ok: bool,
    enabled: bool,
    dependencies: Vec<&'static str>,
}

impl ProbePlugin {
    fn new(name: &'static str, priority: i32, log: &Log) -> Self {
        Self {
            name,
            priority,
            log: log.clone(),
            start_ok: true,
            enabled: true,
            dependencies: Vec::new(),
        }
    }

    fn record(&self, event: &str) {
        self.log.lock().unwrap().push(format!("{}:{event}", self.name));
    }
}

impl Plugin for ProbePlugin {
    fn name(&self) -> &str {
        self.name
    }

    fn version(&self) -> &str {
        "0.0.1"
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn dependencies(&self) -> Vec<&str> {
        self.dependencies.clone()
    }

    fn initialize(&mut self, _config: &ServerConfig) -> Result<(), PluginError> {
        self.record("init");
        Ok(())
    }

    fn register_routes(&self, _router: &mut Router) -> Result<(), RouterError> {
        self.record("routes");
        Ok(())
    }

    fn register_middleware(&self, chain: &mut MiddlewareStack) {
        self.record("middleware");
        struct Noop;
        impl Middleware for Noop {
            fn handle<'req>(&self, ctx: &mut Context<'req>, next: Next<'_, 'req>) {
                next.run(ctx);
            }
        }
        chain.push(Arc::new(Noop));
    }

    fn on_server_start(&self) -> bool {
        self.record("start");
        self.start_ok
    }

    fn on_server_stop(&self) {
        self.record("stop");
    }

    fn shutdown(&mut self) {
        self.record("shutdown");
    }
}

fn events(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

#[test]
fn test_duplicate_name_rejected() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let mut registry = PluginRegistry::new();
    let config = ServerConfig::new();
    registry
        .add(Box::new(ProbePlugin::new("p", 500, &log)), &config)
        .unwrap();
    let err = registry
        .add(Box::new(ProbePlugin::new("p", 100, &log)), &config)
        .unwrap_err();
    assert!(matches!(err, PluginError::Duplicate(name) if name == "p"));
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_missing_dependency_rejected() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let mut registry = PluginRegistry::new();
    let config = ServerConfig::new();
    let mut dependent = ProbePlugin::new("dependent", 500, &log);
    dependent.dependencies = vec!["base"];
    let err = registry.add(Box::new(dependent), &config).unwrap_err();
    assert!(matches!(err, PluginError::MissingDependency { .. }));

    registry
        .add(Box::new(ProbePlugin::new("base", 500, &log)), &config)
        .unwrap();
    let mut dependent = ProbePlugin::new("dependent", 500, &log);
    dependent.dependencies = vec!["base"];
    registry.add(Box::new(dependent), &config).unwrap();
    assert_eq!(registry.len(), 2);
}

#[test]
fn test_disabled_plugin_skipped() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let mut registry = PluginRegistry::new();
    let mut plugin = ProbePlugin::new("off", 500, &log);
    plugin.enabled = false;
    registry.add(Box::new(plugin), &ServerConfig::new()).unwrap();
    assert!(registry.is_empty());
    assert!(events(&log).is_empty());
}

#[test]
fn test_lifecycle_priority_order_and_reverse_stop() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let mut registry = PluginRegistry::new();
    let config = ServerConfig::new();
    // Added out of priority order on purpose.
    registry
        .add(Box::new(ProbePlugin::new("late", 900, &log)), &config)
        .unwrap();
    registry
        .add(Box::new(ProbePlugin::new("early", 100, &log)), &config)
        .unwrap();
    registry
        .add(Box::new(ProbePlugin::new("middle", 500, &log)), &config)
        .unwrap();
    log.lock().unwrap().clear();

    registry.start_all().unwrap();
    assert_eq!(events(&log), vec!["early:start", "middle:start", "late:start"]);

    log.lock().unwrap().clear();
    registry.stop_all();
    assert_eq!(
        events(&log),
        vec![
            "late:stop",
            "late:shutdown",
            "middle:stop",
            "middle:shutdown",
            "early:stop",
            "early:shutdown",
        ]
    );
}

#[test]
fn test_start_refusal_rolls_back_started_plugins() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let mut registry = PluginRegistry::new();
    let config = ServerConfig::new();
    registry
        .add(Box::new(ProbePlugin::new("a", 100, &log)), &config)
        .unwrap();
    registry
        .add(Box::new(ProbePlugin::new("b", 200, &log)), &config)
        .unwrap();
    let mut refusing = ProbePlugin::new("c", 300, &log);
    refusing.start_ok = false;
    registry.add(Box::new(refusing), &config).unwrap();
    log.lock().unwrap().clear();

    let err = registry.start_all().unwrap_err();
    assert!(matches!(err, PluginError::StartAborted(name) if name == "c"));
    // a and b started, then were torn down in reverse.
    assert_eq!(
        events(&log),
        vec![
            "a:start",
            "b:start",
            "c:start",
            "b:stop",
            "b:shutdown",
            "a:stop",
            "a:shutdown",
        ]
    );
}

#[test]
fn test_publication_in_priority_order() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let mut registry = PluginRegistry::new();
    let config = ServerConfig::new();
    registry
        .add(Box::new(ProbePlugin::new("ui", 900, &log)), &config)
        .unwrap();
    registry
        .add(Box::new(ProbePlugin::new("auth", 100, &log)), &config)
        .unwrap();
    log.lock().unwrap().clear();

    let mut router = Router::new();
    let mut chain = MiddlewareStack::new();
    registry.publish(&mut router, &mut chain).unwrap();

    assert_eq!(
        events(&log),
        vec!["auth:routes", "auth:middleware", "ui:routes", "ui:middleware"]
    );
    assert_eq!(chain.len(), 2);
}

#[test]
fn test_remove_runs_shutdown() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let mut registry = PluginRegistry::new();
    registry
        .add(
            Box::new(ProbePlugin::new("gone", 500, &log)),
            &ServerConfig::new(),
        )
        .unwrap();
    assert!(registry.remove("gone"));
    assert!(!registry.remove("gone"));
    assert!(events(&log).contains(&"gone:shutdown".to_string()));
}
