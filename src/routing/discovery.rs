//! Handler unit discovery.
//!
//! # Responsibilities
//! - Enumerate handler units under the routes directory (recursively)
//! - Derive each unit's dispatch key from its relative path
//! - Load a unit into a handler through a [`UnitLoader`]
//!
//! # Design Decisions
//! - The loader decides which files are units (by extension)
//! - Hidden files (editor swap files, dotfiles) are never units
//! - Enumeration is sorted so discovery is deterministic

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::http::Method;
use futures_util::future::BoxFuture;
use serde::Deserialize;
use thiserror::Error;

use crate::http::error::HandlerResult;
use crate::http::request::RequestContext;
use crate::http::response::method_not_allowed;
use crate::routing::handler::{Handler, SharedHandler};
use crate::routing::key::unit_key;
use crate::view::{Locals, TITLE};

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid handler unit {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },

    #[error("units {first} and {second} both map to key {key:?}")]
    DuplicateKey {
        key: String,
        first: PathBuf,
        second: PathBuf,
    },
}

/// Turns a unit's source file into a handler.
pub trait UnitLoader: Send + Sync {
    /// File extension (without the dot) of the units this loader reads.
    fn extension(&self) -> &str;

    fn load(&self, key: &str, path: &Path) -> Result<SharedHandler, DiscoveryError>;
}

/// A unit found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerUnit {
    pub key: String,
    pub path: PathBuf,
}

/// A routes directory paired with the loader for its units.
#[derive(Clone)]
pub struct RouteSource {
    dir: PathBuf,
    loader: Arc<dyn UnitLoader>,
}

impl RouteSource {
    pub fn new(dir: impl Into<PathBuf>, loader: Arc<dyn UnitLoader>) -> Self {
        Self {
            dir: dir.into(),
            loader,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Map a path (absolute, or relative to the directory) to its unit.
    /// `None` when the path cannot be a unit of this source.
    pub fn unit_for(&self, path: &Path) -> Option<HandlerUnit> {
        let relative = if path.is_absolute() {
            match path.strip_prefix(&self.dir) {
                Ok(relative) => relative.to_path_buf(),
                Err(_) => {
                    // File watchers report canonical paths.
                    let dir = fs::canonicalize(&self.dir).ok()?;
                    path.strip_prefix(dir).ok()?.to_path_buf()
                }
            }
        } else {
            path.strip_prefix(&self.dir).unwrap_or(path).to_path_buf()
        };

        if relative.extension().and_then(|e| e.to_str()) != Some(self.loader.extension()) {
            return None;
        }
        let hidden = relative
            .file_name()
            .and_then(|n| n.to_str())
            .map_or(true, |n| n.starts_with('.'));
        if hidden {
            return None;
        }

        let key = unit_key(&relative)?;
        Some(HandlerUnit {
            key,
            path: self.dir.join(relative),
        })
    }

    /// Every unit under the directory, sorted by path.
    pub fn units(&self) -> Result<Vec<HandlerUnit>, DiscoveryError> {
        let mut files = Vec::new();
        walk(&self.dir, &mut files)?;
        files.sort();

        let mut units: Vec<HandlerUnit> = Vec::new();
        for file in files {
            let Some(unit) = self.unit_for(&file) else {
                continue;
            };
            if let Some(existing) = units.iter().find(|u| u.key == unit.key) {
                return Err(DiscoveryError::DuplicateKey {
                    key: unit.key,
                    first: existing.path.clone(),
                    second: unit.path,
                });
            }
            units.push(unit);
        }
        Ok(units)
    }

    pub fn load(&self, unit: &HandlerUnit) -> Result<SharedHandler, DiscoveryError> {
        self.loader.load(&unit.key, &unit.path)
    }
}

fn walk(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), DiscoveryError> {
    let entries = fs::read_dir(dir).map_err(|source| DiscoveryError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| DiscoveryError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let hidden = entry.file_name().to_str().map_or(true, |n| n.starts_with('.'));
        if hidden {
            continue;
        }
        if path.is_dir() {
            walk(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

/// On-disk format of a view unit.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ViewUnitFile {
    view: Option<String>,
    title: Option<String>,
    #[serde(default)]
    methods: Vec<String>,
    #[serde(default)]
    locals: Locals,
}

/// Loads `.toml` units describing a view to render.
///
/// ```toml
/// view = "about"          # defaults to the key
/// title = "About"
/// methods = ["GET"]       # HEAD follows GET; default GET
///
/// [locals]
/// team = "Platform"
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct ViewUnitLoader;

impl UnitLoader for ViewUnitLoader {
    fn extension(&self) -> &str {
        "toml"
    }

    fn load(&self, key: &str, path: &Path) -> Result<SharedHandler, DiscoveryError> {
        let content = fs::read_to_string(path).map_err(|source| DiscoveryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ViewUnitFile = toml::from_str(&content).map_err(|source| DiscoveryError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let mut methods = Vec::new();
        for name in &file.methods {
            let method = Method::from_bytes(name.to_ascii_uppercase().as_bytes()).map_err(|_| {
                DiscoveryError::Invalid {
                    path: path.to_path_buf(),
                    reason: format!("unknown method {name:?}"),
                }
            })?;
            if !methods.contains(&method) {
                methods.push(method);
            }
        }
        if methods.is_empty() {
            methods.push(Method::GET);
        }
        if methods.contains(&Method::GET) && !methods.contains(&Method::HEAD) {
            methods.push(Method::HEAD);
        }

        let mut locals = file.locals;
        if let Some(title) = file.title {
            locals.insert(TITLE.to_string(), title.into());
        }

        Ok(Arc::new(ViewRoute {
            view: file.view.unwrap_or_else(|| key.to_string()),
            methods,
            locals,
        }))
    }
}

/// Handler produced by [`ViewUnitLoader`].
#[derive(Debug, Clone)]
pub struct ViewRoute {
    view: String,
    methods: Vec<Method>,
    locals: Locals,
}

impl ViewRoute {
    fn respond(&self, ctx: &mut RequestContext) -> HandlerResult {
        if !self.methods.contains(ctx.method()) {
            return Ok(method_not_allowed(&self.methods));
        }
        ctx.view(&self.view, self.locals.clone())
    }
}

impl Handler for ViewRoute {
    fn call<'a>(&'a self, ctx: &'a mut RequestContext) -> BoxFuture<'a, HandlerResult> {
        let result = self.respond(ctx);
        Box::pin(std::future::ready(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::CsrfConfig;
    use crate::http::request::Params;
    use crate::security::csrf::CsrfGuard;
    use crate::security::session::Session;
    use crate::view::LayoutRenderer;
    use axum::http::header::ALLOW;
    use axum::http::{HeaderMap, StatusCode};
    use futures_util::FutureExt;

    fn source(dir: &Path) -> RouteSource {
        RouteSource::new(dir, Arc::new(ViewUnitLoader))
    }

    #[test]
    fn test_units_are_discovered_recursively() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("Admin")).unwrap();
        fs::write(dir.path().join("about.toml"), "").unwrap();
        fs::write(dir.path().join("Admin/Users.toml"), "").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();
        fs::write(dir.path().join(".hidden.toml"), "").unwrap();

        let keys: Vec<String> = source(dir.path())
            .units()
            .unwrap()
            .into_iter()
            .map(|u| u.key)
            .collect();
        assert_eq!(keys, vec!["about", "admin/users"]);
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("about.toml"), "").unwrap();
        fs::write(dir.path().join("About.toml"), "").unwrap();

        // Case-insensitive filesystems only hold one of the two.
        if fs::read_dir(dir.path()).unwrap().count() == 2 {
            let err = source(dir.path()).units().unwrap_err();
            assert!(matches!(err, DiscoveryError::DuplicateKey { key, .. } if key == "about"));
        }
    }

    #[test]
    fn test_unit_for_paths() {
        let dir = tempfile::tempdir().unwrap();
        let source = source(dir.path());

        let unit = source.unit_for(&dir.path().join("contact.toml")).unwrap();
        assert_eq!(unit.key, "contact");
        assert_eq!(unit.path, dir.path().join("contact.toml"));

        let unit = source.unit_for(Path::new("admin/users.toml")).unwrap();
        assert_eq!(unit.key, "admin/users");

        assert!(source.unit_for(&dir.path().join("contact.rs")).is_none());
        assert!(source.unit_for(Path::new("/elsewhere/contact.toml")).is_none());
    }

    fn context(method: Method) -> RequestContext {
        let renderer = LayoutRenderer::new().with_view("contact", "<p>{{ email }}</p>");
        RequestContext::new(
            method,
            "/contact",
            "contact",
            HeaderMap::new(),
            Params::new(),
            Session::new(),
            Arc::new(renderer),
            Arc::new(CsrfGuard::new(CsrfConfig::default())),
        )
    }

    #[test]
    fn test_view_unit_methods() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contact.toml");
        fs::write(
            &path,
            "title = \"Contact\"\nmethods = [\"get\", \"post\"]\n[locals]\nemail = \"a@b.c\"\n",
        )
        .unwrap();
        let handler = ViewUnitLoader.load("contact", &path).unwrap();

        for method in [Method::GET, Method::HEAD, Method::POST] {
            let mut ctx = context(method);
            let response = handler.call(&mut ctx).now_or_never().unwrap().unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let mut ctx = context(Method::DELETE);
        let response = handler.call(&mut ctx).now_or_never().unwrap().unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[ALLOW], "GET, POST, HEAD");
    }

    #[test]
    fn test_view_unit_errors() {
        let dir = tempfile::tempdir().unwrap();
        let bad_method = dir.path().join("a.toml");
        fs::write(&bad_method, "methods = [\"G ET\"]").unwrap();
        assert!(matches!(
            ViewUnitLoader.load("a", &bad_method),
            Err(DiscoveryError::Invalid { .. })
        ));

        let bad_toml = dir.path().join("b.toml");
        fs::write(&bad_toml, "view = ").unwrap();
        assert!(matches!(
            ViewUnitLoader.load("b", &bad_toml),
            Err(DiscoveryError::Parse { .. })
        ));

        let unknown = dir.path().join("c.toml");
        fs::write(&unknown, "layout = \"x\"").unwrap();
        assert!(matches!(
            ViewUnitLoader.load("c", &unknown),
            Err(DiscoveryError::Parse { .. })
        ));
    }
}
