//! Cloud and water masking. "Fmasks" flag pixels obscured by cloud or
//! water; obscured pixels must not reach the training set, so every
//! fmask found for a scene is unioned onto the composite label raster.

use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::collaborators::{walk_files, GridWarper, RasterReader};
use crate::error::ExtractError;
use crate::raster::LabelRaster;

/// Obscured-pixel flag value inside an auxiliary mask raster.
const OBSCURED: u8 = 1;

/// Recursively locate every auxiliary mask file in the scene directory
/// by filename suffix. Sorted for deterministic application order,
/// though the union itself is order-independent.
pub fn discover_mask_files(scene_dir: &Path, suffixes: &[String]) -> Result<Vec<PathBuf>, ExtractError> {
    let files = walk_files(scene_dir)?;
    Ok(files
        .into_iter()
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| suffixes.iter().any(|s| n.ends_with(s.as_str())))
                .unwrap_or(false)
        })
        .collect())
}

/// Union every cloud/water mask found under `scene_dir` into the label
/// raster: any cell flagged obscured by any mask becomes masked. Masks
/// on a different grid are first resampled to the reference grid
/// (nearest neighbour, categorical data). Masking only ever grows the
/// masked set.
pub fn apply_cloud_water_masks<R, W>(
    labels: &mut LabelRaster,
    scene_dir: &Path,
    suffixes: &[String],
    reader: &R,
    warper: &W,
) -> Result<(), ExtractError>
where
    R: RasterReader,
    W: GridWarper,
{
    let mask_files = discover_mask_files(scene_dir, suffixes)?;
    if mask_files.is_empty() {
        warn!("no cloud/water masks found under {:?}", scene_dir);
        return Ok(());
    }
    let before = labels.valid_count();
    for path in &mask_files {
        let (raster, geo) = reader.read(path)?;
        let raster = if geo.same_grid(labels.geo()) {
            raster
        } else {
            debug!("fmask {:?} off-grid, warping to reference", path);
            warper.warp(&raster, &geo, labels.geo())?
        };
        for ((r, c), &v) in raster.indexed_iter() {
            if v == OBSCURED {
                labels.mask_cell(r, c);
            }
        }
    }
    info!(
        "applied {} cloud/water masks under {:?}: labeled px {} -> {}",
        mask_files.len(),
        scene_dir,
        before,
        labels.valid_count()
    );
    Ok(())
}
