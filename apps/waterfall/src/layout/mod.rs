// Layout Engine: pure geometry, no I/O.
// Column-height tracking, deterministic tile placement, full relayout.

pub mod columns;
pub mod engine;

pub use columns::ColumnSet;
pub use engine::{
    ColumnPolicy, LayoutEngine, LayoutError, LayoutSnapshot, Spacing, Tile, TileGeometry,
    MAX_COLUMNS,
};
