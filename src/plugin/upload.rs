//! Multipart file upload plugin.
//!
//! `POST /upload` accepts `multipart/form-data`, writes each file part into
//! the configured upload directory and answers a JSON receipt. Client
//! filenames are reduced to their final path component before joining, so a
//! crafted `filename="../../x"` cannot leave the upload directory. Files
//! above the configured size cap are skipped with a warning, not fatal.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use super::Plugin;
use crate::config::ServerConfig;
use crate::context::Context;
use crate::error::{PluginError, RouterError};
use crate::http::multipart::{boundary_from_content_type, Multipart};
use crate::router::Router;

struct UploadTarget {
    dir: PathBuf,
    max_size: u64,
}

/// Registers the upload route. Priority 400.
pub struct UploadPlugin {
    target: Arc<UploadTarget>,
}

impl UploadPlugin {
    pub fn new() -> Self {
        Self {
            target: Arc::new(UploadTarget {
                dir: PathBuf::from(crate::config::DEFAULT_UPLOAD_DIR),
                max_size: crate::config::DEFAULT_MAX_UPLOAD_SIZE,
            }),
        }
    }
}

impl Default for UploadPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for UploadPlugin {
    fn name(&self) -> &str {
        "upload"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn description(&self) -> &str {
        "Stores multipart file uploads in the configured directory"
    }

    fn priority(&self) -> i32 {
        400
    }

    fn initialize(&mut self, config: &ServerConfig) -> Result<(), PluginError> {
        let dir = config.upload_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| PluginError::InitFailed {
                plugin: self.name().to_string(),
                reason: format!("cannot create upload dir '{}': {e}", dir.display()),
            })?;
        }
        self.target = Arc::new(UploadTarget {
            dir,
            max_size: config.max_upload_size(),
        });
        info!(dir = %self.target.dir.display(), "Upload plugin initialized");
        Ok(())
    }

    fn register_routes(&self, router: &mut Router) -> Result<(), RouterError> {
        let target = self.target.clone();
        router.post("/upload", move |ctx: &mut Context<'_>| {
            handle_upload(&target, ctx)
        })
    }
}

fn handle_upload(target: &UploadTarget, ctx: &mut Context<'_>) {
    let Some(content_type) = ctx.request().content_type().map(str::to_string) else {
        ctx.status(400).json(&json!({ "error": "Missing Content-Type" }));
        return;
    };
    let Some(boundary) = boundary_from_content_type(&content_type).map(str::to_string) else {
        ctx.status(400).json(&json!({ "error": "Missing boundary" }));
        return;
    };

    let multipart = match Multipart::parse(&ctx.request().body, &boundary) {
        Ok(m) => m,
        Err(e) => {
            ctx.status(400)
                .json(&json!({ "error": format!("Failed to parse multipart data: {e}") }));
            return;
        }
    };

    let files: Vec<_> = multipart.file_parts().collect();
    if files.is_empty() {
        ctx.status(400).json(&json!({ "error": "No files found" }));
        return;
    }

    let mut saved: Vec<String> = Vec::new();
    for file in files {
        if file.data.len() as u64 > target.max_size {
            warn!(
                filename = %file.filename,
                size = file.data.len(),
                "Uploaded file exceeds size cap, skipping"
            );
            continue;
        }
        // Keep only the final path component of the client-supplied name.
        let Some(safe_name) = Path::new(&file.filename)
            .file_name()
            .and_then(|n| n.to_str())
        else {
            warn!(filename = %file.filename, "Uploaded filename unusable, skipping");
            continue;
        };
        let destination = target.dir.join(safe_name);
        match fs::write(&destination, &file.data) {
            Ok(()) => {
                info!(path = %destination.display(), bytes = file.data.len(), "Saved upload");
                saved.push(safe_name.to_string());
            }
            Err(e) => {
                warn!(path = %destination.display(), error = %e, "Failed to save upload");
            }
        }
    }

    ctx.json(&json!({
        "status": "success",
        "uploaded": saved.len(),
        "files": saved,
    }));
}
