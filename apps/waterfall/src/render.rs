//! Rendering host boundary — the container tiles are drawn into.
//!
//! The engine never builds markup itself. It asks the host for a fragment per
//! item, wraps it in the configured tag, and from then on only moves and resizes
//! fragments by their load-order index.

use serde::Serialize;
use serde_json::Value;

use crate::layout::TileGeometry;

/// One inserted tile as the host sees it. Always absolutely positioned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fragment {
    pub tag: String,
    pub content: String,
    pub geometry: TileGeometry,
}

/// The container a layout renders into.
pub trait RenderHost: Send + 'static {
    /// Current measured width of the container, in pixels.
    fn container_width(&self) -> f64;

    /// Content of the fragment for one item.
    fn template(&self, item: &Value) -> String;

    /// Appends a fragment. Fragments are kept in insertion order.
    fn insert(&mut self, fragment: Fragment);

    /// Moves the `index`-th inserted fragment.
    fn reposition(&mut self, index: usize, geometry: TileGeometry);

    fn set_container_height(&mut self, height: f64);
}

// ────────────────────────────────────────────────────────────────────────────
// MarkupTemplate
// ────────────────────────────────────────────────────────────────────────────

/// String template with `{{field}}` placeholders for the item's top-level fields.
///
/// Strings are inserted verbatim, other values as JSON, missing fields as "".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkupTemplate {
    source: String,
}

impl MarkupTemplate {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    pub fn render(&self, item: &Value) -> String {
        let mut out = String::with_capacity(self.source.len());
        let mut rest = self.source.as_str();

        while let Some(open) = rest.find("{{") {
            let Some(close) = rest[open + 2..].find("}}") else {
                break;
            };
            out.push_str(&rest[..open]);
            let field = rest[open + 2..open + 2 + close].trim();
            match item.get(field) {
                Some(Value::String(s)) => out.push_str(s),
                Some(Value::Null) | None => {}
                Some(other) => out.push_str(&other.to_string()),
            }
            rest = &rest[open + 2 + close + 2..];
        }
        out.push_str(rest);
        out
    }
}

// ────────────────────────────────────────────────────────────────────────────
// MemoryContainer
// ────────────────────────────────────────────────────────────────────────────

/// Headless container that records fragments instead of drawing them.
/// The width is whatever the owner last reported.
#[derive(Debug, Clone, Default)]
pub struct MemoryContainer {
    width: f64,
    height: f64,
    template: MarkupTemplate,
    fragments: Vec<Fragment>,
}

impl MemoryContainer {
    pub fn new(width: f64, template: MarkupTemplate) -> Self {
        Self {
            width,
            height: 0.0,
            template,
            fragments: Vec::new(),
        }
    }

    pub fn set_width(&mut self, width: f64) {
        self.width = width;
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }
}

impl RenderHost for MemoryContainer {
    fn container_width(&self) -> f64 {
        self.width
    }

    fn template(&self, item: &Value) -> String {
        self.template.render(item)
    }

    fn insert(&mut self, fragment: Fragment) {
        self.fragments.push(fragment);
    }

    fn reposition(&mut self, index: usize, geometry: TileGeometry) {
        if let Some(fragment) = self.fragments.get_mut(index) {
            fragment.geometry = geometry;
        }
    }

    fn set_container_height(&mut self, height: f64) {
        self.height = height;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
