//! Public files and compiled assets.
//!
//! Runs before everything else in the pipeline. A hit short-circuits the
//! request; a miss falls through to routing.
//!
//! - `/<file>` → `<public_dir>/<file>` when that file exists
//! - `<prefix>/<file>` and `<prefix>/<timestamp>/<file>` → `<assets_dir>/<file>`

use std::path::{Component, Path, PathBuf};

use axum::body::Body;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{Method, StatusCode};
use axum::response::Response;
use tokio::fs;

use crate::config::schema::AssetsConfig;

/// Content-Type for a file extension.
pub fn content_type(extension: Option<&str>) -> &'static str {
    match extension {
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css",
        Some("txt" | "md") => "text/plain; charset=utf-8",
        Some("xml") => "application/xml",
        Some("js" | "mjs") => "application/javascript",
        Some("json") => "application/json",
        Some("map") => "application/json",
        Some("wasm") => "application/wasm",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("webp") => "image/webp",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        Some("otf") => "font/otf",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// Static file collaborator.
#[derive(Debug, Clone)]
pub struct StaticAssets {
    public_dir: PathBuf,
    assets_dir: PathBuf,
    prefix: String,
}

impl StaticAssets {
    pub fn new(config: &AssetsConfig) -> Self {
        Self {
            public_dir: config.public_dir.clone(),
            assets_dir: config.assets_dir.clone(),
            prefix: config.prefix.trim_end_matches('/').to_string(),
        }
    }

    /// Candidate file for a request path. Pure path mapping; the file may not
    /// exist.
    pub fn resolve(&self, path: &str) -> Option<PathBuf> {
        self.locate(path).map(|(_, file)| file)
    }

    /// Served directory and candidate file.
    fn locate(&self, path: &str) -> Option<(&Path, PathBuf)> {
        if let Some(rest) = path
            .strip_prefix(&self.prefix)
            .and_then(|rest| rest.strip_prefix('/'))
        {
            let rest = match rest.split_once('/') {
                Some((stamp, file)) if is_timestamp(stamp) => file,
                _ => rest,
            };
            return Some((self.assets_dir.as_path(), safe_join(&self.assets_dir, rest)?));
        }
        Some((
            self.public_dir.as_path(),
            safe_join(&self.public_dir, path.trim_start_matches('/'))?,
        ))
    }

    /// Serve the file for `path`, or `None` to let the pipeline continue.
    pub async fn serve(&self, method: &Method, path: &str) -> Option<Response> {
        if !matches!(*method, Method::GET | Method::HEAD) {
            return None;
        }
        let (root, file) = self.locate(path)?;
        let metadata = fs::metadata(&file).await.ok()?;
        if !metadata.is_file() {
            return None;
        }

        // Symlinks must not lead out of the served directory.
        let root = fs::canonicalize(root).await.ok()?;
        let canonical = fs::canonicalize(&file).await.ok()?;
        if !canonical.starts_with(&root) {
            tracing::warn!(path, resolved = %canonical.display(), "Path traversal attempt blocked");
            return None;
        }

        let content = match fs::read(&canonical).await {
            Ok(content) => content,
            Err(e) => {
                tracing::error!(file = %canonical.display(), error = %e, "Failed to read static file");
                return None;
            }
        };

        let mime = content_type(file.extension().and_then(|e| e.to_str()));
        let length = content.len();
        let body = if *method == Method::HEAD {
            Body::empty()
        } else {
            Body::from(content)
        };
        Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, mime)
            .header(CONTENT_LENGTH, length)
            .body(body)
            .ok()
    }
}

fn is_timestamp(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}

/// `base/relative`, refusing anything but plain segments.
fn safe_join(base: &Path, relative: &str) -> Option<PathBuf> {
    if relative.is_empty() {
        return None;
    }
    let relative = Path::new(relative);
    let plain = relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if !plain {
        return None;
    }
    Some(base.join(relative))
}
