//! MJPEG-style frame push endpoint.
//!
//! `GET /stream` upgrades the response to the multipart streaming channel.
//! Frames come from an injected [`FrameProducer`] factory (one producer per
//! viewer); the plugin itself never touches capture APIs, so any raster
//! source plugs in, the built-in test pattern included.

use std::sync::Arc;
use std::time::Duration;

use super::Plugin;
use crate::config::ServerConfig;
use crate::context::Context;
use crate::error::{PluginError, RouterError};
use crate::router::Router;
use crate::stream::{stream_multipart, FrameProducer, StreamConfig};

/// Builds a fresh producer for each connected viewer.
pub type ProducerFactory = Arc<dyn Fn() -> Box<dyn FrameProducer> + Send + Sync>;

/// Registers the streaming route. Priority 450.
pub struct ScreenStreamPlugin {
    factory: ProducerFactory,
    stream_config: Arc<StreamConfig>,
}

impl ScreenStreamPlugin {
    pub fn new(factory: ProducerFactory) -> Self {
        Self {
            factory,
            stream_config: Arc::new(StreamConfig::default()),
        }
    }
}

impl Plugin for ScreenStreamPlugin {
    fn name(&self) -> &str {
        "screen-stream"
    }

    fn version(&self) -> &str {
        "2.0.0"
    }

    fn description(&self) -> &str {
        "Pushes frames as multipart/x-mixed-replace"
    }

    fn priority(&self) -> i32 {
        450
    }

    fn initialize(&mut self, config: &ServerConfig) -> Result<(), PluginError> {
        self.stream_config = Arc::new(StreamConfig {
            boundary: "frame".to_string(),
            fps: config.fps_limit(),
            max_duration: config.stream_max_secs().map(Duration::from_secs),
        });
        Ok(())
    }

    fn register_routes(&self, router: &mut Router) -> Result<(), RouterError> {
        let factory = self.factory.clone();
        let stream_config = self.stream_config.clone();
        router.get("/stream", move |ctx: &mut Context<'_>| {
            let factory = factory.clone();
            let stream_config = stream_config.clone();
            ctx.stream(move |socket, shutdown| {
                let mut producer = factory();
                stream_multipart(socket, producer.as_mut(), &shutdown, &stream_config);
            });
        })
    }
}
