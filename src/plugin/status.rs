//! Server status endpoint.

use std::sync::Arc;

use serde_json::json;

use super::Plugin;
use crate::config::ServerConfig;
use crate::context::Context;
use crate::error::{PluginError, RouterError};
use crate::router::Router;
use crate::server::ServerCounters;

/// `GET /api/status`: liveness plus the orchestrator's counters.
pub struct StatusPlugin {
    counters: Arc<ServerCounters>,
    fps_limit: u32,
}

impl StatusPlugin {
    pub fn new(counters: Arc<ServerCounters>) -> Self {
        Self {
            counters,
            fps_limit: crate::config::DEFAULT_FPS_LIMIT,
        }
    }
}

impl Plugin for StatusPlugin {
    fn name(&self) -> &str {
        "status"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn description(&self) -> &str {
        "Reports server liveness and counters as JSON"
    }

    fn initialize(&mut self, config: &ServerConfig) -> Result<(), PluginError> {
        self.fps_limit = config.fps_limit();
        Ok(())
    }

    fn register_routes(&self, router: &mut Router) -> Result<(), RouterError> {
        let counters = self.counters.clone();
        let fps_limit = self.fps_limit;
        router.get("/api/status", move |ctx: &mut Context<'_>| {
            ctx.json(&json!({
                "status": "online",
                "fps_limit": fps_limit,
                "active_connections": counters.active_connections(),
                "total_requests": counters.total_requests(),
            }));
        })
    }
}
