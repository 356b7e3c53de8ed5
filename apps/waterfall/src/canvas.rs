//! The layout engine and its rendering host, locked together.
//!
//! Tile `i` in the engine and fragment `i` in the host always describe the same
//! item. Placement and relayout go through one mutex so neither can observe the
//! other half-done.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::layout::{ColumnPolicy, LayoutEngine, LayoutError, TileGeometry};
use crate::probe::Dimensions;
use crate::render::{Fragment, RenderHost};

pub type SharedCanvas<H> = Arc<Mutex<Canvas<H>>>;

pub struct Canvas<H> {
    pub engine: LayoutEngine,
    pub host: H,
    tile_tag: String,
}

impl<H: RenderHost> Canvas<H> {
    pub fn new(engine: LayoutEngine, host: H, tile_tag: impl Into<String>) -> Self {
        Self {
            engine,
            host,
            tile_tag: tile_tag.into(),
        }
    }

    pub fn into_shared(self) -> SharedCanvas<H> {
        Arc::new(Mutex::new(self))
    }

    /// Places one probed item, appends it to the tile list and inserts its fragment.
    pub fn place_item(&mut self, item: Value, dims: Dimensions) -> TileGeometry {
        let content = self.host.template(&item);
        let geometry = self
            .engine
            .push_tile(item, dims.width as f64, dims.height as f64)
            .geometry;
        self.host.insert(Fragment {
            tag: self.tile_tag.clone(),
            content,
            geometry,
        });
        self.host.set_container_height(self.engine.container_height());
        geometry
    }

    /// Applies new container geometry. When it changed, every tile is replayed
    /// and every fragment moved; returns whether anything happened.
    pub fn reflow(
        &mut self,
        container_width: f64,
        margin: f64,
        policy: ColumnPolicy,
    ) -> Result<bool, LayoutError> {
        if !self
            .engine
            .configure_geometry(container_width, margin, policy)?
        {
            return Ok(false);
        }
        self.engine.relayout();
        for (index, tile) in self.engine.tiles().iter().enumerate() {
            self.host.reposition(index, tile.geometry);
        }
        self.host.set_container_height(self.engine.container_height());
        Ok(true)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Spacing;
    use crate::render::{MarkupTemplate, MemoryContainer};
    use serde_json::json;

    fn canvas() -> Canvas<MemoryContainer> {
        let mut engine = LayoutEngine::new(Spacing::default());
        engine
            .configure_geometry(310.0, 10.0, ColumnPolicy::Fixed(3))
            .unwrap();
        Canvas::new(
            engine,
            MemoryContainer::new(310.0, MarkupTemplate::new("<img src=\"{{url}}\">")),
            "figure",
        )
    }

    #[test]
    fn test_place_item_inserts_matching_fragment() {
        let mut canvas = canvas();
        let geometry = canvas.place_item(
            json!({ "url": "a.png" }),
            Dimensions {
                width: 100,
                height: 200,
            },
        );
        let fragment = &canvas.host.fragments()[0];
        assert_eq!(fragment.tag, "figure");
        assert_eq!(fragment.content, "<img src=\"a.png\">");
        assert_eq!(fragment.geometry, geometry);
        assert_eq!(canvas.host.height(), canvas.engine.container_height());
    }

    #[test]
    fn test_reflow_moves_fragments_with_tiles() {
        let mut canvas = canvas();
        for i in 0..5 {
            canvas.place_item(
                json!({ "url": format!("{i}.png") }),
                Dimensions {
                    width: 100,
                    height: 100 + i * 40,
                },
            );
        }
        assert!(canvas.reflow(620.0, 10.0, ColumnPolicy::Fixed(2)).unwrap());

        for (tile, fragment) in canvas.engine.tiles().iter().zip(canvas.host.fragments()) {
            assert_eq!(tile.geometry, fragment.geometry);
        }
        assert_eq!(canvas.host.height(), canvas.engine.container_height());
    }

    #[test]
    fn test_reflow_unchanged_geometry_reports_false() {
        let mut canvas = canvas();
        assert!(!canvas.reflow(310.0, 10.0, ColumnPolicy::Fixed(3)).unwrap());
    }
}
