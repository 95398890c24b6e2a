//! Remote input control endpoint.
//!
//! `POST /api/input` decodes a JSON command and forwards it to an injected
//! [`InputSink`] capability. Platform injection backends implement the
//! trait; the core only parses and dispatches.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::Plugin;
use crate::config::ServerConfig;
use crate::context::Context;
use crate::error::{PluginError, RouterError};
use crate::router::Router;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
}

/// Capability interface for input injection.
pub trait InputSink: Send + Sync {
    /// Move the cursor to normalized coordinates in `[0, 1]`.
    fn move_cursor(&self, x: f64, y: f64) -> bool;
    fn click(&self, button: MouseButton) -> bool;
    fn key_press(&self, code: u16) -> bool;
}

/// Wire format of `/api/input` commands, e.g.
/// `{"type":"move","x":0.5,"y":0.5}` or `{"type":"key","key":13}`.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum InputCommand {
    Move { x: f64, y: f64 },
    Click,
    Rightclick,
    Key { key: u16 },
}

/// Registers the input route. Priority 450.
pub struct RemoteInputPlugin {
    sink: Arc<dyn InputSink>,
}

impl RemoteInputPlugin {
    pub fn new(sink: Arc<dyn InputSink>) -> Self {
        Self { sink }
    }
}

impl Plugin for RemoteInputPlugin {
    fn name(&self) -> &str {
        "remote-input"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn description(&self) -> &str {
        "Forwards JSON input commands to the injection backend"
    }

    fn priority(&self) -> i32 {
        450
    }

    fn initialize(&mut self, _config: &ServerConfig) -> Result<(), PluginError> {
        Ok(())
    }

    fn register_routes(&self, router: &mut Router) -> Result<(), RouterError> {
        let sink = self.sink.clone();
        router.post("/api/input", move |ctx: &mut Context<'_>| {
            handle_input(sink.as_ref(), ctx)
        })
    }
}

fn handle_input(sink: &dyn InputSink, ctx: &mut Context<'_>) {
    let command: InputCommand = match serde_json::from_slice(&ctx.request().body) {
        Ok(cmd) => cmd,
        Err(e) => {
            ctx.status(400)
                .json(&json!({ "error": format!("Invalid input command: {e}") }));
            return;
        }
    };
    debug!(command = ?command, "Input command received");

    let success = match command {
        InputCommand::Move { x, y } => sink.move_cursor(x, y),
        InputCommand::Click => sink.click(MouseButton::Left),
        InputCommand::Rightclick => sink.click(MouseButton::Right),
        InputCommand::Key { key } => sink.key_press(key),
    };

    if success {
        ctx.json(&json!({ "status": "success" }));
    } else {
        ctx.json(&json!({ "status": "error" }));
    }
}
