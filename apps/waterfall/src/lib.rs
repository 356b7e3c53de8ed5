//! Masonry ("waterfall") layout engine fed by a paginated, probed asset stream.
//!
//! Bottom-up:
//! - `layout` — column heights, placement, relayout. Pure geometry.
//! - `pipeline` — one fetched page to placed tiles, completion tracked per page.
//! - `pagination` — load lock, page cursor, exhaustion.
//! - `reflow` — container geometry checks, polling or event driven.
//! - `waterfall` — one layout instance wiring the above to its collaborators.
//!
//! `routes`, `state` and `errors` expose layouts over HTTP.

pub mod canvas;
pub mod config;
pub mod errors;
pub mod events;
pub mod layout;
pub mod pagination;
pub mod pipeline;
pub mod probe;
pub mod reflow;
pub mod render;
pub mod routes;
pub mod source;
pub mod state;
pub mod waterfall;

pub use config::WaterfallConfig;
pub use layout::{ColumnPolicy, LayoutEngine, Tile, TileGeometry};
pub use pagination::{LoadError, PageState};
pub use pipeline::PageOutcome;
pub use waterfall::{Collaborators, Waterfall};
