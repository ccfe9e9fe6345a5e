//! View rendering.
//!
//! The pipeline treats rendering as an opaque `render(name, locals) → body`
//! service behind the [`Renderer`] trait. [`LayoutRenderer`] is the built-in
//! implementation: `<name>.html` templates from a views directory, wrapped in
//! `layout.html`, with `{{ key }}` (escaped) and `{{{ key }}}` (raw)
//! placeholders.

mod template;

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::RwLock;

use serde_json::Value;
use thiserror::Error;

pub use template::{escape_html, substitute};

/// Values passed to a view.
pub type Locals = serde_json::Map<String, Value>;

/// Local that replaces the view body.
pub const CONTENT: &str = "content";

/// Local holding the page title.
pub const TITLE: &str = "title";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("view {0:?} not found")]
    MissingView(String),

    #[error("invalid view name {0:?}")]
    InvalidName(String),

    #[error("failed to read view {view:?}: {source}")]
    Io {
        view: String,
        #[source]
        source: io::Error,
    },
}

/// The render service.
pub trait Renderer: Send + Sync {
    fn render(&self, view: &str, locals: &Locals) -> Result<String, RenderError>;
}

const DEFAULT_LAYOUT: &str = "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
<title>{{ title }}</title>\n<link rel=\"stylesheet\" href=\"/assets/app.css\">\n</head>\n\
<body>\n<h1>{{ title }}</h1>\n{{{ content }}}\n</body>\n</html>\n";

const DEFAULT_INDEX: &str = "<p>Welcome.</p>";

/// Templates from a directory, wrapped in a layout.
pub struct LayoutRenderer {
    views_dir: Option<PathBuf>,
    inline: HashMap<String, String>,
    cache: Option<RwLock<HashMap<String, String>>>,
}

impl LayoutRenderer {
    /// Renderer with only inline views (`layout` and `index` built in).
    pub fn new() -> Self {
        let mut inline = HashMap::new();
        inline.insert("layout".to_string(), DEFAULT_LAYOUT.to_string());
        inline.insert("index".to_string(), DEFAULT_INDEX.to_string());
        Self {
            views_dir: None,
            inline,
            cache: None,
        }
    }

    /// Read templates from `dir`; files take precedence over inline views.
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.views_dir = Some(dir.into());
        self
    }

    /// Keep templates in memory after the first read. Without it every render
    /// re-reads the file, which is what development wants.
    pub fn cached(mut self) -> Self {
        self.cache = Some(RwLock::new(HashMap::new()));
        self
    }

    pub fn with_view(mut self, name: impl Into<String>, template: impl Into<String>) -> Self {
        self.inline.insert(name.into(), template.into());
        self
    }

    fn template(&self, view: &str) -> Result<String, RenderError> {
        if view.is_empty() || view.split('/').any(|s| s.is_empty() || s == "." || s == "..") {
            return Err(RenderError::InvalidName(view.to_string()));
        }

        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.read().ok().and_then(|c| c.get(view).cloned()) {
                return Ok(hit);
            }
        }

        let template = match self.read_file(view)? {
            Some(t) => t,
            None => self
                .inline
                .get(view)
                .cloned()
                .ok_or_else(|| RenderError::MissingView(view.to_string()))?,
        };

        if let Some(cache) = &self.cache {
            if let Ok(mut cache) = cache.write() {
                cache.insert(view.to_string(), template.clone());
            }
        }
        Ok(template)
    }

    fn read_file(&self, view: &str) -> Result<Option<String>, RenderError> {
        let Some(dir) = &self.views_dir else {
            return Ok(None);
        };
        match fs::read_to_string(dir.join(format!("{view}.html"))) {
            Ok(t) => Ok(Some(t)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(RenderError::Io {
                view: view.to_string(),
                source,
            }),
        }
    }
}

impl Default for LayoutRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for LayoutRenderer {
    fn render(&self, view: &str, locals: &Locals) -> Result<String, RenderError> {
        let body = match locals.get(CONTENT) {
            Some(Value::String(content)) => content.clone(),
            _ => substitute(&self.template(view)?, locals),
        };

        let mut layout_locals = locals.clone();
        layout_locals.insert(CONTENT.to_string(), Value::String(body));
        layout_locals
            .entry(TITLE)
            .or_insert_with(|| Value::String(String::new()));
        Ok(substitute(&self.template("layout")?, &layout_locals))
    }
}
