//! Layout Engine — column geometry, tile placement and full relayout.
//!
//! # Placement rule
//! Every tile goes to the shortest column at the moment it is placed (lowest
//! index on ties). Its rendered height keeps the natural aspect ratio at the
//! column's tile width:
//!
//! ```text
//! height = ceil(ceil(tile_width - horizontal_offset) * natural_h / natural_w) + vertical_offset
//! top    = column_height + margin
//! left   = column * (tile_width + margin) + margin
//! ```
//!
//! # Relayout
//! `relayout` replays placement for the loaded-tile list in load order from
//! empty columns. Only `column` and `geometry` of each tile are rewritten, so
//! two relayouts over the same tiles and geometry are bit-identical.
//!
//! The engine is plain data. Callers that share it across tasks wrap it in a
//! mutex so `place_tile` and `relayout` never interleave.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::layout::columns::ColumnSet;

// ────────────────────────────────────────────────────────────────────────────
// Types
// ────────────────────────────────────────────────────────────────────────────

/// Upper bound on the resolved column count under any policy.
pub const MAX_COLUMNS: usize = 1024;

/// How the column count is chosen for a container width.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnPolicy {
    /// Always exactly this many columns.
    Fixed(u32),
    /// As many columns as fit while each stays at least this wide.
    MinTileWidth(f64),
}

impl ColumnPolicy {
    /// Resolves the column count for a container width and margin.
    ///
    /// `MinTileWidth`: `floor((width - margin) / (min_tile_width + margin))`, at least 1.
    /// Either policy fails with `TooManyColumns` above [`MAX_COLUMNS`].
    pub fn column_count(&self, container_width: f64, margin: f64) -> Result<usize, LayoutError> {
        let count = match *self {
            ColumnPolicy::Fixed(0) => return Err(LayoutError::InvalidColumnCount),
            ColumnPolicy::Fixed(n) => f64::from(n),
            ColumnPolicy::MinTileWidth(min) => {
                let step = min + margin;
                if !step.is_finite() || step <= 0.0 {
                    return Err(LayoutError::InvalidMinTileWidth(min));
                }
                ((container_width - margin) / step).floor().max(1.0)
            }
        };
        if !count.is_finite() || count > MAX_COLUMNS as f64 {
            return Err(LayoutError::TooManyColumns(count));
        }
        Ok(count as usize)
    }
}

/// Fixed pixel compensation applied to every tile.
///
/// `horizontal_offset` is the part of the tile width that is not image (frame,
/// padding), `vertical_offset` the extra height below it (caption, border).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Spacing {
    pub horizontal_offset: f64,
    pub vertical_offset: f64,
    /// Blank space kept under the tallest column.
    pub bottom_padding: f64,
}

/// Absolute position and size of one tile inside the container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TileGeometry {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
}

/// One placed content item.
///
/// `item`, `natural_width` and `natural_height` never change after the tile is
/// created; `column` and `geometry` are rewritten by every relayout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tile {
    pub item: serde_json::Value,
    pub natural_width: f64,
    pub natural_height: f64,
    pub column: usize,
    pub geometry: TileGeometry,
}

/// Serializable view of the whole layout.
#[derive(Debug, Clone, Serialize)]
pub struct LayoutSnapshot {
    pub container_width: f64,
    pub column_count: usize,
    pub tile_width: f64,
    pub margin: f64,
    pub column_heights: Vec<f64>,
    pub container_height: f64,
    pub tiles: Vec<Tile>,
}

#[derive(Debug, Error, PartialEq)]
pub enum LayoutError {
    #[error("Container width must be a finite non-negative number, got {0}")]
    InvalidContainerWidth(f64),

    #[error("Margin must be a finite non-negative number, got {0}")]
    InvalidMargin(f64),

    #[error("Fixed column count must be at least 1")]
    InvalidColumnCount,

    #[error("Minimum tile width must leave a positive column step, got {0}")]
    InvalidMinTileWidth(f64),

    #[error("Column count {0} exceeds the maximum of {MAX_COLUMNS}")]
    TooManyColumns(f64),
}

// ────────────────────────────────────────────────────────────────────────────
// Engine
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct LayoutEngine {
    spacing: Spacing,
    container_width: f64,
    margin: f64,
    tile_width: f64,
    columns: ColumnSet,
    container_height: f64,
    tiles: Vec<Tile>,
}

impl LayoutEngine {
    /// Creates an unconfigured engine. `configure_geometry` must run before
    /// the first placement.
    pub fn new(spacing: Spacing) -> Self {
        Self {
            spacing,
            container_width: 0.0,
            margin: 0.0,
            tile_width: 0.0,
            columns: ColumnSet::new(0),
            container_height: spacing.bottom_padding,
            tiles: Vec::new(),
        }
    }

    /// Recomputes column count and tile width for a container.
    ///
    /// Returns `Ok(false)` without touching any state when both the width and
    /// the resolved column count are unchanged. Otherwise the columns are
    /// reset to zero height and `Ok(true)` is returned; the caller is expected
    /// to `relayout` afterwards.
    pub fn configure_geometry(
        &mut self,
        container_width: f64,
        margin: f64,
        policy: ColumnPolicy,
    ) -> Result<bool, LayoutError> {
        if !container_width.is_finite() || container_width < 0.0 {
            return Err(LayoutError::InvalidContainerWidth(container_width));
        }
        if !margin.is_finite() || margin < 0.0 {
            return Err(LayoutError::InvalidMargin(margin));
        }
        let column_count = policy.column_count(container_width, margin)?;

        if column_count == self.columns.len()
            && container_width == self.container_width
            && margin == self.margin
        {
            return Ok(false);
        }

        let gutters = (column_count + 1) as f64 * margin;
        // A container narrower than its gutters collapses tiles to zero width
        // instead of going negative.
        self.tile_width = ((container_width - gutters) / column_count as f64).max(0.0);
        self.container_width = container_width;
        self.margin = margin;
        self.columns.reset(column_count);
        self.update_container_height();
        Ok(true)
    }

    /// Places one tile in the shortest column and returns its geometry.
    ///
    /// # Panics
    /// When `natural_width` is not a positive finite number, `natural_height`
    /// is negative or non-finite, or the engine was never configured. Callers
    /// must filter such tiles out before placement.
    pub fn place_tile(
        &mut self,
        natural_width: f64,
        natural_height: f64,
        vertical_offset: f64,
        horizontal_offset: f64,
    ) -> TileGeometry {
        self.place(natural_width, natural_height, vertical_offset, horizontal_offset)
            .1
    }

    /// Places a tile using the engine's own offsets and appends it to the
    /// loaded-tile list.
    pub fn push_tile(
        &mut self,
        item: serde_json::Value,
        natural_width: f64,
        natural_height: f64,
    ) -> &Tile {
        let Spacing {
            horizontal_offset,
            vertical_offset,
            ..
        } = self.spacing;
        let (column, geometry) =
            self.place(natural_width, natural_height, vertical_offset, horizontal_offset);
        self.tiles.push(Tile {
            item,
            natural_width,
            natural_height,
            column,
            geometry,
        });
        &self.tiles[self.tiles.len() - 1]
    }

    /// Zeroes every column and replays placement for all loaded tiles in load order.
    pub fn relayout(&mut self) {
        self.columns.reset(self.columns.len());
        self.update_container_height();

        let Spacing {
            horizontal_offset,
            vertical_offset,
            ..
        } = self.spacing;
        let mut tiles = std::mem::take(&mut self.tiles);
        for tile in tiles.iter_mut() {
            let (column, geometry) = self.place(
                tile.natural_width,
                tile.natural_height,
                vertical_offset,
                horizontal_offset,
            );
            tile.column = column;
            tile.geometry = geometry;
        }
        self.tiles = tiles;
    }

    fn place(
        &mut self,
        natural_width: f64,
        natural_height: f64,
        vertical_offset: f64,
        horizontal_offset: f64,
    ) -> (usize, TileGeometry) {
        assert!(
            natural_width.is_finite() && natural_width > 0.0,
            "tile natural width must be positive, got {natural_width}"
        );
        assert!(
            natural_height.is_finite() && natural_height >= 0.0,
            "tile natural height must be non-negative, got {natural_height}"
        );
        assert!(
            !self.columns.is_empty(),
            "configure_geometry must run before placing tiles"
        );

        let column = self.columns.shortest();
        let adjusted_width = self.tile_width - horizontal_offset;
        let height =
            (adjusted_width.ceil() * natural_height / natural_width).ceil() + vertical_offset;

        let geometry = TileGeometry {
            top: self.columns.height(column) + self.margin,
            left: column as f64 * (self.tile_width + self.margin) + self.margin,
            width: self.tile_width,
            height,
        };

        self.columns.grow(column, height + self.margin);
        self.update_container_height();
        (column, geometry)
    }

    fn update_container_height(&mut self) {
        self.container_height = self.columns.tallest_height() + self.spacing.bottom_padding;
    }

    // ── accessors ───────────────────────────────────────────────────────────

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_heights(&self) -> &[f64] {
        self.columns.heights()
    }

    pub fn tile_width(&self) -> f64 {
        self.tile_width
    }

    pub fn container_width(&self) -> f64 {
        self.container_width
    }

    pub fn container_height(&self) -> f64 {
        self.container_height
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn snapshot(&self) -> LayoutSnapshot {
        LayoutSnapshot {
            container_width: self.container_width,
            column_count: self.columns.len(),
            tile_width: self.tile_width,
            margin: self.margin,
            column_heights: self.columns.heights().to_vec(),
            container_height: self.container_height,
            tiles: self.tiles.clone(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
