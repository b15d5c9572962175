//! Seams to the external geo stack. Vector rasterization, raster I/O,
//! re-gridding and band stacking are collaborators, not core logic;
//! the default implementations here work over pre-aligned `.npy`
//! rasters, which is enough to run the pipeline end to end and to back
//! the tests. A GDAL-backed set can be swapped in behind the same
//! traits without touching the extraction core.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use ndarray::{Array2, Array3};
use ndarray_npy::read_npy;

use crate::error::ExtractError;
use crate::raster::{GridGeo, ImageStack};

/// Rasterize one vector label source against a raster mold: true where
/// the source's geometry claims the cell.
pub trait VectorRasterizer {
    fn rasterize(&self, source: &Path, mold: &GridGeo) -> Result<Array2<bool>, ExtractError>;
}

/// Read an auxiliary categorical raster together with its grid.
pub trait RasterReader {
    fn read(&self, path: &Path) -> Result<(Array2<u8>, GridGeo), ExtractError>;

    /// Grid metadata only, for picking a scene's reference mold.
    fn read_geo(&self, path: &Path) -> Result<GridGeo, ExtractError> {
        self.read(path).map(|(_, geo)| geo)
    }
}

/// Resample a categorical raster onto a target grid. Nearest-neighbour
/// semantics; class codes must never be interpolated.
pub trait GridWarper {
    fn warp(&self, raster: &Array2<u8>, from: &GridGeo, to: &GridGeo) -> Result<Array2<u8>, ExtractError>;
}

/// Stack a scene directory's band files into one aligned ImageStack.
pub trait SceneStacker {
    fn stack(&self, scene_dir: &Path, band_suffixes: &[String], target: &GridGeo) -> Result<ImageStack, ExtractError>;
}

/// Ensure a scene directory of raw band files exists locally, fetching
/// it if the provider supports that. Failure aborts extraction for the
/// scene.
pub trait SceneFetcher {
    fn ensure_scene(&self, scene_dir: &Path) -> Result<(), ExtractError>;
}

/// Fetcher for fully local runs: the scene directory must already be
/// on disk.
#[derive(Debug, Default)]
pub struct LocalScenes;

impl SceneFetcher for LocalScenes {
    fn ensure_scene(&self, scene_dir: &Path) -> Result<(), ExtractError> {
        if scene_dir.is_dir() {
            Ok(())
        } else {
            Err(ExtractError::SceneMissing {
                dir: scene_dir.to_path_buf(),
            })
        }
    }
}

/// Recursively collect every file under `dir`, sorted by path so
/// downstream iteration order is deterministic.
pub fn walk_files(dir: &Path) -> Result<Vec<PathBuf>, ExtractError> {
    let mut out = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(d) = stack.pop() {
        let rd = fs::read_dir(&d).map_err(|e| ExtractError::source_read(&d, e))?;
        for entry in rd {
            let entry = entry.map_err(|e| ExtractError::source_read(&d, e))?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                out.push(path);
            }
        }
    }
    out.sort();
    Ok(out)
}

/// Label sources arrive pre-rasterized as `.npy` masks on the scene
/// grid: nonzero means the source claims the cell.
#[derive(Debug, Default)]
pub struct NpyRasterizer;

impl VectorRasterizer for NpyRasterizer {
    fn rasterize(&self, source: &Path, mold: &GridGeo) -> Result<Array2<bool>, ExtractError> {
        let raw: Array2<u8> =
            read_npy(source).map_err(|e| ExtractError::source_read(source, e))?;
        if raw.dim() != mold.shape() {
            return Err(ExtractError::GridMismatch {
                path: source.to_path_buf(),
                expected: mold.shape(),
                actual: raw.dim(),
            });
        }
        Ok(raw.mapv(|v| v != 0))
    }
}

/// Reads plain `.npy` rasters; the grid is the bare array shape since
/// `.npy` carries no geo metadata of its own.
#[derive(Debug, Default)]
pub struct NpyRasterReader;

impl RasterReader for NpyRasterReader {
    fn read(&self, path: &Path) -> Result<(Array2<u8>, GridGeo), ExtractError> {
        let raw: Array2<u8> = read_npy(path).map_err(|e| ExtractError::source_read(path, e))?;
        let (rows, cols) = raw.dim();
        Ok((raw, GridGeo::bare(rows, cols)))
    }

    fn read_geo(&self, path: &Path) -> Result<GridGeo, ExtractError> {
        // Band rasters are f32 or u16; masks are u8. Shape is all we
        // need, so try each element type in turn.
        if let Ok(arr) = read_npy::<_, Array2<f32>>(path) {
            let (rows, cols) = arr.dim();
            return Ok(GridGeo::bare(rows, cols));
        }
        if let Ok(arr) = read_npy::<_, Array2<u16>>(path) {
            let (rows, cols) = arr.dim();
            return Ok(GridGeo::bare(rows, cols));
        }
        let arr: Array2<u8> = read_npy(path).map_err(|e| ExtractError::source_read(path, e))?;
        let (rows, cols) = arr.dim();
        Ok(GridGeo::bare(rows, cols))
    }
}

/// Nearest-neighbour resampling onto the target extent.
#[derive(Debug, Default)]
pub struct NearestWarper;

impl GridWarper for NearestWarper {
    fn warp(&self, raster: &Array2<u8>, from: &GridGeo, to: &GridGeo) -> Result<Array2<u8>, ExtractError> {
        let (src_rows, src_cols) = from.shape();
        let (dst_rows, dst_cols) = to.shape();
        debug!(
            "warping raster from ({}, {}) to ({}, {})",
            src_rows, src_cols, dst_rows, dst_cols
        );
        let mut out = Array2::zeros((dst_rows, dst_cols));
        for ((r, c), cell) in out.indexed_iter_mut() {
            let sr = (r * src_rows / dst_rows).min(src_rows - 1);
            let sc = (c * src_cols / dst_cols).min(src_cols - 1);
            *cell = raster[(sr, sc)];
        }
        Ok(out)
    }
}

/// Walks the scene directory for band files matching the configured
/// suffixes and stacks them, suffix order giving band order. Every
/// band must already sit on the target grid; a missing or misshapen
/// band is fatal to the scene (redownload required).
#[derive(Debug, Default)]
pub struct NpySceneStacker;

impl NpySceneStacker {
    fn read_band(path: &Path) -> Result<Array2<f32>, ExtractError> {
        if let Ok(arr) = read_npy::<_, Array2<f32>>(path) {
            return Ok(arr);
        }
        let raw: Array2<u16> = read_npy(path).map_err(|e| ExtractError::SceneStack {
            scene: path.display().to_string(),
            source: Box::new(e),
        })?;
        Ok(raw.mapv(f32::from))
    }
}

impl SceneStacker for NpySceneStacker {
    fn stack(&self, scene_dir: &Path, band_suffixes: &[String], target: &GridGeo) -> Result<ImageStack, ExtractError> {
        let files = walk_files(scene_dir)?;
        let mut band_paths = Vec::with_capacity(band_suffixes.len());
        for suffix in band_suffixes {
            let matched: Vec<&PathBuf> = files
                .iter()
                .filter(|p| {
                    p.file_name()
                        .and_then(|n| n.to_str())
                        .map(|n| n.ends_with(suffix.as_str()))
                        .unwrap_or(false)
                })
                .collect();
            match matched.first() {
                Some(p) => band_paths.push((*p).clone()),
                None => {
                    return Err(ExtractError::SceneStack {
                        scene: scene_dir.display().to_string(),
                        source: format!("no band file matching {:?}", suffix).into(),
                    })
                }
            }
        }

        let (rows, cols) = target.shape();
        let mut data = Array3::<f32>::zeros((rows, cols, band_paths.len()));
        for (band_idx, path) in band_paths.iter().enumerate() {
            let band = Self::read_band(path)?;
            if band.dim() != (rows, cols) {
                return Err(ExtractError::GridMismatch {
                    path: path.clone(),
                    expected: (rows, cols),
                    actual: band.dim(),
                });
            }
            for ((r, c), &v) in band.indexed_iter() {
                data[(r, c, band_idx)] = v;
            }
            debug!("stacked band {} from {:?}", band_idx, path);
        }
        Ok(ImageStack::new(data))
    }
}
