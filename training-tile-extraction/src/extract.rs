//! Per-tile extraction: crop the image stack and label raster at a
//! grid origin, decide the tile's scalar class code, and build the
//! one-hot pixel target.

use std::collections::BTreeMap;

use log::debug;
use ndarray::{s, Array3};
use serde::{Deserialize, Serialize};

use crate::raster::{ImageStack, LabelRaster};

/// One persisted training unit: the cropped imagery, the per-pixel
/// one-hot target and the tile's scalar class code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tile {
    /// tile_size x tile_size x bands crop of the scene imagery.
    pub data: Array3<f32>,
    /// tile_size x tile_size x n_classes one-hot target. Masked pixels
    /// are zero on every channel.
    pub one_hot: Array3<u8>,
    pub class_code: u32,
}

/// Why a grid cell produced no tile. Both are normal edge conditions,
/// not defects; they are skipped silently and only counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No labeled pixel anywhere in the crop.
    FullyMasked,
    /// The crop ran over the raster edge and is not exactly
    /// tile_size x tile_size.
    ShapeMismatch,
}

/// Extract the tile at `origin`, or report why it was skipped.
pub fn extract_tile(
    stack: &ImageStack,
    labels: &LabelRaster,
    origin: (usize, usize),
    tile_size: usize,
    n_classes: usize,
) -> Result<Tile, SkipReason> {
    let (row0, col0) = origin;
    let (rows, cols) = labels.shape();
    let row1 = (row0 + tile_size).min(rows);
    let col1 = (col0 + tile_size).min(cols);

    let mut any_valid = false;
    for r in row0..row1 {
        for c in col0..col1 {
            if !labels.is_masked(r, c) {
                any_valid = true;
                break;
            }
        }
        if any_valid {
            break;
        }
    }
    if !any_valid {
        debug!("tile at ({}, {}) fully masked, skipping", row0, col0);
        return Err(SkipReason::FullyMasked);
    }
    if row1 - row0 != tile_size || col1 - col0 != tile_size {
        debug!(
            "tile at ({}, {}) clipped to {}x{}, skipping",
            row0,
            col0,
            row1 - row0,
            col1 - col0
        );
        return Err(SkipReason::ShapeMismatch);
    }

    let class_code = assign_class_code(labels, origin, tile_size);
    let one_hot = one_hot_from_labels(labels, origin, tile_size, n_classes);
    let data = stack
        .data()
        .slice(s![row0..row1, col0..col1, ..])
        .to_owned();

    Ok(Tile {
        data,
        one_hot,
        class_code,
    })
}

/// Decide the tile's scalar class code.
///
/// If any labeled pixel carries the background code 0, the whole tile
/// is coded 0, regardless of the majority. This override deliberately
/// biases the corpus toward tiles that are purely minority/positive
/// classes. Otherwise the most frequent labeled code wins; on a tied
/// count the lowest class code wins, which keeps the decision
/// deterministic.
fn assign_class_code(labels: &LabelRaster, origin: (usize, usize), tile_size: usize) -> u32 {
    let (row0, col0) = origin;
    let mut counts: BTreeMap<u32, usize> = BTreeMap::new();
    for r in row0..row0 + tile_size {
        for c in col0..col0 + tile_size {
            if let Some(code) = labels.get(r, c) {
                if code == 0 {
                    return 0;
                }
                *counts.entry(code).or_insert(0) += 1;
            }
        }
    }
    let mut best_code = 0;
    let mut best_count = 0;
    for (&code, &count) in &counts {
        // Strict > keeps the lowest code on ties (ascending iteration).
        if count > best_count {
            best_code = code;
            best_count = count;
        }
    }
    best_code
}

/// Channel c of the target is 1 exactly where the labels equal class
/// code c; masked pixels contribute 0 everywhere.
fn one_hot_from_labels(
    labels: &LabelRaster,
    origin: (usize, usize),
    tile_size: usize,
    n_classes: usize,
) -> Array3<u8> {
    let (row0, col0) = origin;
    let mut one_hot = Array3::<u8>::zeros((tile_size, tile_size, n_classes));
    for r in 0..tile_size {
        for c in 0..tile_size {
            if let Some(code) = labels.get(row0 + r, col0 + c) {
                if (code as usize) < n_classes {
                    one_hot[(r, c, code as usize)] = 1;
                }
            }
        }
    }
    one_hot
}
