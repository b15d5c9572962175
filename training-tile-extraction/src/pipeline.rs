//! Per-scene orchestration: composite the label sources, apply cloud
//! and water masks, plan the tile grid, then extract and persist tiles
//! with bounded memory. Stages before persistence run sequentially on
//! the calling thread; the corpus writer's pool is the only internal
//! concurrency.

use std::path::{Path, PathBuf};

use log::{error, info, warn};
use rand::seq::SliceRandom;

use crate::collaborators::{
    walk_files, GridWarper, LocalScenes, NearestWarper, NpyRasterReader, NpyRasterizer,
    NpySceneStacker, RasterReader, SceneFetcher, SceneStacker, VectorRasterizer,
};
use crate::composite::{composite_labels, LabelSource};
use crate::config::ExtractionConfig;
use crate::corpus::CorpusWriter;
use crate::error::ExtractError;
use crate::extract::{extract_tile, SkipReason};
use crate::fmask::apply_cloud_water_masks;
use crate::grid::plan_tile_grid;

/// One satellite capture footprint: path/row/year, naming its scene
/// directory `<path>_<row>_<year>` under the image root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SceneId {
    pub path: u32,
    pub row: u32,
    pub year: u32,
}

impl SceneId {
    pub fn dir_name(&self) -> String {
        format!("{}_{}_{}", self.path, self.row, self.year)
    }
}

impl std::fmt::Display for SceneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}_{}", self.path, self.row, self.year)
    }
}

/// Split a label-source file stem `<name>_<path>_<row>_<year>` into
/// the source name and the scene it belongs to.
pub fn parse_label_stem(stem: &str) -> Option<(String, SceneId)> {
    let parts: Vec<&str> = stem.split('_').collect();
    if parts.len() < 4 {
        return None;
    }
    let n = parts.len();
    let path = parts[n - 3].parse().ok()?;
    let row = parts[n - 2].parse().ok()?;
    let year = parts[n - 1].parse().ok()?;
    Some((parts[..n - 3].join("_"), SceneId { path, row, year }))
}

/// Tile accounting for one scene extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SceneStats {
    pub planned: usize,
    pub written: usize,
    pub skipped_masked: usize,
    pub skipped_shape: usize,
}

/// The extraction pipeline over its collaborator seams. The defaults
/// work on pre-aligned `.npy` scenes; a GDAL-backed set slots in for
/// real imagery.
pub struct Pipeline<F, Rz, Rd, Wp, St> {
    fetcher: F,
    rasterizer: Rz,
    reader: Rd,
    warper: Wp,
    stacker: St,
    config: ExtractionConfig,
}

impl Pipeline<LocalScenes, NpyRasterizer, NpyRasterReader, NearestWarper, NpySceneStacker> {
    pub fn with_defaults(config: ExtractionConfig) -> Result<Self, ExtractError> {
        Pipeline::new(
            LocalScenes,
            NpyRasterizer,
            NpyRasterReader,
            NearestWarper,
            NpySceneStacker,
            config,
        )
    }
}

impl<F, Rz, Rd, Wp, St> Pipeline<F, Rz, Rd, Wp, St>
where
    F: SceneFetcher,
    Rz: VectorRasterizer,
    Rd: RasterReader,
    Wp: GridWarper,
    St: SceneStacker,
{
    pub fn new(
        fetcher: F,
        rasterizer: Rz,
        reader: Rd,
        warper: Wp,
        stacker: St,
        config: ExtractionConfig,
    ) -> Result<Self, ExtractError> {
        config.validate()?;
        Ok(Pipeline {
            fetcher,
            rasterizer,
            reader,
            warper,
            stacker,
            config,
        })
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Run the full extraction for one scene: any error aborts the
    /// scene with no partial corpus growth beyond tiles already
    /// flushed, and the caller decides whether to redownload and
    /// retry.
    pub fn extract_scene(
        &self,
        scene_dir: &Path,
        sources: &[LabelSource],
        corpus_root: &Path,
    ) -> Result<SceneStats, ExtractError> {
        self.fetcher.ensure_scene(scene_dir)?;
        let mold_file = self.reference_band_file(scene_dir)?;
        let mold = self.reader.read_geo(&mold_file)?;
        info!(
            "scene {:?}: reference grid {}x{} from {:?}",
            scene_dir, mold.rows, mold.cols, mold_file
        );

        let mut labels = composite_labels(sources, &self.rasterizer, &mold)?;

        let stack = match self.stacker.stack(scene_dir, &self.config.band_suffixes, &mold) {
            Ok(stack) => stack,
            Err(e) => {
                error!("redownload images for {:?}: {}", scene_dir, e);
                return Err(e);
            }
        };

        apply_cloud_water_masks(
            &mut labels,
            scene_dir,
            &self.config.mask_suffixes,
            &self.reader,
            &self.warper,
        )?;

        let origins = plan_tile_grid(&labels, self.config.tile_size);
        let mut stats = SceneStats {
            planned: origins.len(),
            ..SceneStats::default()
        };

        let mut writer = CorpusWriter::new(corpus_root, self.config.tile_batch, self.config.workers)?;
        for origin in origins {
            match extract_tile(&stack, &labels, origin, self.config.tile_size, self.config.n_classes) {
                Ok(tile) => writer.push(tile)?,
                Err(SkipReason::FullyMasked) => stats.skipped_masked += 1,
                Err(SkipReason::ShapeMismatch) => stats.skipped_shape += 1,
            }
        }
        stats.written = writer.finish()?;
        info!(
            "scene {:?}: {} planned, {} written, {} skipped masked, {} skipped shape",
            scene_dir, stats.planned, stats.written, stats.skipped_masked, stats.skipped_shape
        );
        Ok(stats)
    }

    /// Pick the scene's reference raster: a random band file, skipping
    /// quality-assessment rasters, exactly like grabbing an arbitrary
    /// TIF from a landsat directory.
    fn reference_band_file(&self, scene_dir: &Path) -> Result<PathBuf, ExtractError> {
        let files = walk_files(scene_dir)?;
        let candidates: Vec<PathBuf> = files
            .into_iter()
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| {
                        !n.contains("BQA")
                            && self
                                .config
                                .band_suffixes
                                .iter()
                                .any(|s| n.ends_with(s.as_str()))
                    })
                    .unwrap_or(false)
            })
            .collect();
        candidates
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| ExtractError::SceneStack {
                scene: scene_dir.display().to_string(),
                source: "no band rasters found for reference grid".into(),
            })
    }
}

/// Scan the label directory and group sources per scene, ordered by
/// filename within each scene. Sources whose name matches no class-map
/// prefix are skipped with a warning.
pub fn group_label_sources(
    label_dir: &Path,
    class_map: &crate::config::ClassCodeAssignment,
) -> Result<std::collections::BTreeMap<SceneId, Vec<LabelSource>>, ExtractError> {
    let mut by_scene: std::collections::BTreeMap<SceneId, Vec<LabelSource>> =
        std::collections::BTreeMap::new();
    for path in walk_files(label_dir)? {
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if path.extension().and_then(|e| e.to_str()) != Some("npy") {
            continue;
        }
        let Some((name, scene)) = parse_label_stem(stem) else {
            warn!("label file {:?} does not parse as <name>_<path>_<row>_<year>, skipping", path);
            continue;
        };
        let Some(class_code) = class_map.code_for(&name) else {
            warn!("no class code assigned for source {:?}, skipping", path);
            continue;
        };
        by_scene.entry(scene).or_default().push(LabelSource {
            path: path.clone(),
            class_code,
        });
    }
    Ok(by_scene)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClassCodeAssignment;
    use ndarray::Array2;
    use ndarray_npy::write_npy;
    use tempfile::tempdir;

    #[test]
    fn label_stem_parses_scene_suffix() {
        let (name, scene) = parse_label_stem("irrigated_39_27_2013").unwrap();
        assert_eq!(name, "irrigated");
        assert_eq!(
            scene,
            SceneId {
                path: 39,
                row: 27,
                year: 2013
            }
        );
        assert_eq!(scene.dir_name(), "39_27_2013");
    }

    #[test]
    fn label_stem_keeps_underscored_names() {
        let (name, scene) = parse_label_stem("dryland_wheat_40_28_2014").unwrap();
        assert_eq!(name, "dryland_wheat");
        assert_eq!(scene.year, 2014);
    }

    #[test]
    fn label_stem_rejects_short_or_non_numeric() {
        assert!(parse_label_stem("irrigated_39_27").is_none());
        assert!(parse_label_stem("irrigated_a_b_c").is_none());
    }

    #[test]
    fn sources_group_per_scene_in_filename_order() {
        let dir = tempdir().unwrap();
        let m: Array2<u8> = Array2::zeros((2, 2));
        write_npy(dir.path().join("fallow_39_27_2013.npy"), &m).unwrap();
        write_npy(dir.path().join("irrigated_39_27_2013.npy"), &m).unwrap();
        write_npy(dir.path().join("irrigated_40_28_2013.npy"), &m).unwrap();
        write_npy(dir.path().join("notes.txt.npy"), &m).unwrap(); // unparseable stem

        let map = ClassCodeAssignment::new(vec![
            ("irrigated".to_string(), 1),
            ("fallow".to_string(), 2),
        ]);
        let grouped = group_label_sources(dir.path(), &map).unwrap();
        assert_eq!(grouped.len(), 2);

        let scene = SceneId {
            path: 39,
            row: 27,
            year: 2013,
        };
        let sources = &grouped[&scene];
        assert_eq!(sources.len(), 2);
        // Lexicographic order fixes the last-source-wins contract.
        assert_eq!(sources[0].class_code, 2);
        assert_eq!(sources[1].class_code, 1);
    }

    #[test]
    fn unmapped_sources_are_skipped() {
        let dir = tempdir().unwrap();
        let m: Array2<u8> = Array2::zeros((2, 2));
        write_npy(dir.path().join("wetlands_39_27_2013.npy"), &m).unwrap();
        let map = ClassCodeAssignment::new(vec![("irrigated".to_string(), 1)]);
        let grouped = group_label_sources(dir.path(), &map).unwrap();
        assert!(grouped.is_empty());
    }

    #[test]
    fn missing_scene_dir_aborts() {
        let dir = tempdir().unwrap();
        let pipeline = Pipeline::with_defaults(ExtractionConfig::default()).unwrap();
        let err = pipeline
            .extract_scene(&dir.path().join("39_27_2013"), &[], dir.path())
            .unwrap_err();
        assert!(matches!(err, ExtractError::SceneMissing { .. }));
    }
}
