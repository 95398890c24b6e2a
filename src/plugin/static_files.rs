//! Static file serving plugin.
//!
//! Mounts a document root at a URL prefix via a catch-all route. Every
//! request path goes through the canonical-root containment check in
//! [`crate::secure_path`]; anything that cannot be proven inside the root
//! answers 403 and is logged as a traversal attempt.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use super::Plugin;
use crate::config::ServerConfig;
use crate::context::Context;
use crate::error::{PluginError, RouterError};
use crate::http::{mime, Method};
use crate::router::Router;
use crate::secure_path;

/// Tunables for [`StaticFilesPlugin`].
#[derive(Debug, Clone)]
pub struct StaticFilesConfig {
    /// Document root directory; must exist at initialization.
    pub root: PathBuf,
    /// URL prefix the root is mounted at.
    pub mount: String,
    /// File served when a directory is requested.
    pub default_file: String,
    /// `Cache-Control` header attached to every served file.
    pub cache_control: String,
    /// Files larger than this answer 413.
    pub max_file_size: u64,
}

impl Default for StaticFilesConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(crate::config::DEFAULT_DOC_ROOT),
            mount: "/".to_string(),
            default_file: crate::config::DEFAULT_FILE.to_string(),
            cache_control: "public, max-age=3600".to_string(),
            max_file_size: 100 * 1024 * 1024,
        }
    }
}

/// Serves files under a document root with traversal protection and MIME
/// detection. Priority 900: mounted after every dynamic route.
pub struct StaticFilesPlugin {
    config: Arc<StaticFilesConfig>,
}

impl StaticFilesPlugin {
    /// Serve `root` at `/` with defaults.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_config(StaticFilesConfig {
            root: root.into(),
            ..StaticFilesConfig::default()
        })
    }

    pub fn with_config(config: StaticFilesConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl Plugin for StaticFilesPlugin {
    fn name(&self) -> &str {
        "static-files"
    }

    fn version(&self) -> &str {
        "2.0.0"
    }

    fn description(&self) -> &str {
        "Serves static files with traversal protection and MIME detection"
    }

    fn priority(&self) -> i32 {
        900
    }

    fn initialize(&mut self, config: &ServerConfig) -> Result<(), PluginError> {
        let mut cfg = (*self.config).clone();
        cfg.default_file = config.default_file().to_string();

        if !cfg.mount.starts_with('/') {
            return Err(PluginError::InitFailed {
                plugin: self.name().to_string(),
                reason: format!("mount path '{}' must start with /", cfg.mount),
            });
        }
        let canonical = cfg.root.canonicalize().map_err(|e| PluginError::InitFailed {
            plugin: self.name().to_string(),
            reason: format!("document root '{}': {e}", cfg.root.display()),
        })?;
        if !canonical.is_dir() {
            return Err(PluginError::InitFailed {
                plugin: self.name().to_string(),
                reason: format!("document root '{}' is not a directory", canonical.display()),
            });
        }
        cfg.root = canonical;
        info!(
            root = %cfg.root.display(),
            mount = %cfg.mount,
            "Static files plugin initialized"
        );
        self.config = Arc::new(cfg);
        Ok(())
    }

    fn register_routes(&self, router: &mut Router) -> Result<(), RouterError> {
        let mut template = self.config.mount.clone();
        if !template.ends_with('/') {
            template.push('/');
        }
        template.push('*');

        let handler = {
            let config = self.config.clone();
            Arc::new(move |ctx: &mut Context<'_>| serve(&config, ctx))
        };
        router.register_arc(Method::Get, &template, handler.clone())?;
        router.register_arc(Method::Head, &template, handler)?;
        Ok(())
    }
}

fn serve(config: &StaticFilesConfig, ctx: &mut Context<'_>) {
    let requested = ctx.param("*").unwrap_or("").to_string();

    let Some(path) = secure_path::resolve(&config.root, &requested, &config.default_file) else {
        warn!(requested = %requested, "Path traversal attempt blocked");
        ctx.status(403)
            .html("<h1>403 Forbidden</h1><p>Access denied.</p>");
        return;
    };

    if !path.exists() {
        ctx.status(404).html("<h1>404 Not Found</h1>");
        return;
    }
    if !path.is_file() {
        ctx.status(403)
            .html("<h1>403 Forbidden</h1><p>Not a regular file.</p>");
        return;
    }

    let size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
    if size > config.max_file_size {
        ctx.status(413).html("<h1>413 Payload Too Large</h1>");
        return;
    }

    let media_type = mime::from_path(&path);
    if ctx.request().method == Method::Head {
        ctx.header("Content-Type", media_type)
            .header("Cache-Control", &config.cache_control)
            .header("Content-Length", &size.to_string());
        return;
    }

    match fs::read(&path) {
        Ok(content) => {
            ctx.header("Content-Type", media_type)
                .header("Cache-Control", &config.cache_control)
                .body(content);
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read static file");
            ctx.status(500).html("<h1>500 Internal Server Error</h1>");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Request;

    fn setup(root: &std::path::Path) -> StaticFilesPlugin {
        let mut plugin = StaticFilesPlugin::new(root);
        plugin.initialize(&ServerConfig::new()).unwrap();
        plugin
    }

    fn serve_path(plugin: &StaticFilesPlugin, rest: &str) -> (u16, Vec<u8>) {
        let req = Request::parse(b"GET /ignored HTTP/1.1\r\n\r\n").unwrap();
        let mut ctx = Context::new(&req);
        ctx.set_param("*", rest);
        serve(&plugin.config, &mut ctx);
        let crate::context::ResponseKind::Buffered(resp) = ctx.into_outcome() else {
            panic!("expected buffered response");
        };
        (resp.status_code(), resp.body().to_vec())
    }

    #[test]
    fn test_serves_file_with_mime() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("site.css"), "body{}").unwrap();
        let plugin = setup(dir.path());
        let (status, body) = serve_path(&plugin, "site.css");
        assert_eq!(status, 200);
        assert_eq!(body, b"body{}");
    }

    #[test]
    fn test_missing_file_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let plugin = setup(dir.path());
        let (status, _) = serve_path(&plugin, "nope.txt");
        assert_eq!(status, 404);
    }

    #[test]
    fn test_traversal_is_403() {
        let dir = tempfile::tempdir().unwrap();
        let plugin = setup(dir.path());
        let (status, _) = serve_path(&plugin, "../../etc/passwd");
        assert_eq!(status, 403);
    }

    #[test]
    fn test_init_fails_on_missing_root() {
        let mut plugin = StaticFilesPlugin::new("/definitely/not/here");
        assert!(plugin.initialize(&ServerConfig::new()).is_err());
    }
}
