//! Builds a balanced corpus of fixed-size training tiles for pixel
//! labeling from vector ground truth and stacked satellite scenes.
//!
//! Per scene: composite the class-coded label sources into one masked
//! raster (last source wins), union the scene's cloud/water masks onto
//! it, plan a tile grid covering the labeled extent, then crop, encode
//! and persist tiles in bounded batches through a worker pool.

pub mod collaborators;
pub mod composite;
pub mod config;
pub mod corpus;
pub mod error;
pub mod extract;
pub mod fmask;
pub mod grid;
pub mod pipeline;
pub mod raster;

pub use composite::{composite_labels, LabelSource};
pub use config::{ClassCodeAssignment, ExtractionConfig};
pub use corpus::CorpusWriter;
pub use error::ExtractError;
pub use extract::{extract_tile, SkipReason, Tile};
pub use fmask::apply_cloud_water_masks;
pub use grid::plan_tile_grid;
pub use pipeline::{Pipeline, SceneId, SceneStats};
pub use raster::{GridGeo, ImageStack, LabelRaster};
