//! Plugin system: descriptor trait, lifecycle, ordered registry.
//!
//! Plugins are added before the server starts. `add` validates the
//! descriptor (unique name, dependencies present), initializes the plugin
//! against the loaded configuration, and keeps the list sorted by priority
//! (stable, lower first). Route and middleware *publication* is deferred to
//! server start and performed in priority order, so priority governs the
//! request pipeline exactly like it governs the lifecycle hooks.
//!
//! Start: `on_server_start` runs per plugin in priority order; the first
//! refusal aborts startup and tears already-started plugins back down in
//! reverse. Stop: `on_server_stop` then `shutdown` per plugin, reverse
//! priority order. `shutdown` must not fail; it has nothing to report to.

pub mod auth;
pub mod cors;
pub mod remote_input;
pub mod screen_stream;
pub mod static_files;
pub mod status;
pub mod upload;

use tracing::{error, info};

use crate::config::ServerConfig;
use crate::error::{PluginError, RouterError};
use crate::middleware::MiddlewareStack;
use crate::router::Router;

pub use auth::AuthPlugin;
pub use cors::CorsPlugin;
pub use remote_input::{InputSink, MouseButton, RemoteInputPlugin};
pub use screen_stream::ScreenStreamPlugin;
pub use static_files::{StaticFilesConfig, StaticFilesPlugin};
pub use status::StatusPlugin;
pub use upload::UploadPlugin;

/// Default plugin priority; lower runs first.
pub const DEFAULT_PRIORITY: i32 = 500;

/// A server extension.
///
/// Only `name`, `version` and `initialize` are mandatory; everything else
/// defaults to "does nothing".
pub trait Plugin: Send + Sync {
    /// Unique identifier; duplicates are rejected at add time.
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    fn author(&self) -> &str {
        ""
    }

    /// Lower priority runs first, for publication and lifecycle alike.
    fn priority(&self) -> i32 {
        DEFAULT_PRIORITY
    }

    /// Disabled plugins are skipped at add time.
    fn enabled(&self) -> bool {
        true
    }

    /// Names of plugins that must already be loaded.
    fn dependencies(&self) -> Vec<&str> {
        Vec::new()
    }

    /// Validate configuration and acquire resources. A failure keeps the
    /// plugin out of the registry.
    fn initialize(&mut self, config: &ServerConfig) -> Result<(), PluginError>;

    /// Contribute routes. Called at server start, in priority order.
    fn register_routes(&self, _router: &mut Router) -> Result<(), RouterError> {
        Ok(())
    }

    /// Contribute middleware. Called at server start, in priority order.
    fn register_middleware(&self, _chain: &mut MiddlewareStack) {}

    /// Last chance to refuse startup once every plugin is loaded.
    fn on_server_start(&self) -> bool {
        true
    }

    /// Runs after the server stopped accepting connections.
    fn on_server_stop(&self) {}

    /// Release resources. Must not panic.
    fn shutdown(&mut self) {}
}

/// Ordered plugin collection.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<Box<dyn Plugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate, initialize and insert a plugin, keeping the list sorted by
    /// priority (stable: equal priorities stay in insertion order).
    pub fn add(
        &mut self,
        mut plugin: Box<dyn Plugin>,
        config: &ServerConfig,
    ) -> Result<(), PluginError> {
        let name = plugin.name().to_string();
        if !plugin.enabled() {
            info!(plugin = %name, "Plugin disabled, skipping");
            return Ok(());
        }
        if self.plugins.iter().any(|p| p.name() == name) {
            return Err(PluginError::Duplicate(name));
        }
        for dependency in plugin.dependencies() {
            if !self.plugins.iter().any(|p| p.name() == dependency) {
                return Err(PluginError::MissingDependency {
                    plugin: name,
                    dependency: dependency.to_string(),
                });
            }
        }
        plugin.initialize(config)?;
        info!(
            plugin = %name,
            version = plugin.version(),
            priority = plugin.priority(),
            "Plugin loaded"
        );
        self.plugins.push(plugin);
        self.plugins.sort_by_key(|p| p.priority());
        Ok(())
    }

    /// Remove a plugin by name, running its `shutdown`.
    pub fn remove(&mut self, name: &str) -> bool {
        let Some(index) = self.plugins.iter().position(|p| p.name() == name) else {
            return false;
        };
        let mut plugin = self.plugins.remove(index);
        plugin.shutdown();
        info!(plugin = name, "Plugin removed");
        true
    }

    pub fn get(&self, name: &str) -> Option<&dyn Plugin> {
        self.plugins
            .iter()
            .find(|p| p.name() == name)
            .map(Box::as_ref)
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Loaded plugin names in priority order.
    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    /// Publish routes and middleware, in priority order.
    pub fn publish(
        &self,
        router: &mut Router,
        chain: &mut MiddlewareStack,
    ) -> Result<(), RouterError> {
        for plugin in &self.plugins {
            plugin.register_routes(router)?;
            plugin.register_middleware(chain);
        }
        Ok(())
    }

    /// Run `on_server_start` in priority order. On the first refusal, tear
    /// down the already-started plugins in reverse order and fail.
    pub fn start_all(&mut self) -> Result<(), PluginError> {
        for index in 0..self.plugins.len() {
            if !self.plugins[index].on_server_start() {
                let name = self.plugins[index].name().to_string();
                error!(plugin = %name, "Plugin refused server start, rolling back");
                for started in (0..index).rev() {
                    self.plugins[started].on_server_stop();
                    self.plugins[started].shutdown();
                }
                return Err(PluginError::StartAborted(name));
            }
        }
        Ok(())
    }

    /// Run `on_server_stop` then `shutdown` per plugin, reverse priority
    /// order.
    pub fn stop_all(&mut self) {
        for plugin in self.plugins.iter_mut().rev() {
            plugin.on_server_stop();
            plugin.shutdown();
        }
        if !self.plugins.is_empty() {
            info!(count = self.plugins.len(), "Plugins stopped");
        }
    }
}
