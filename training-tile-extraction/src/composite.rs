//! Label compositing: merge per-source class-coded rasters into one
//! masked label raster for the scene.

use std::path::PathBuf;

use log::{debug, info};

use crate::collaborators::VectorRasterizer;
use crate::error::ExtractError;
use crate::raster::{GridGeo, LabelRaster};

/// One vector ground-truth source and the class code its geometry
/// burns into the composite.
#[derive(Debug, Clone)]
pub struct LabelSource {
    pub path: PathBuf,
    pub class_code: u32,
}

/// Rasterize every source against the mold grid and write its class
/// code into each cell the source claims. Sources are applied in the
/// order given: at overlapping cells the last source wins, and that
/// ordering is a contract, not an accident of iteration. A cell stays
/// masked iff no source claims it.
///
/// Any source that fails to rasterize aborts the whole composite; a
/// partially composited raster is never returned.
pub fn composite_labels<R: VectorRasterizer>(
    sources: &[LabelSource],
    rasterizer: &R,
    mold: &GridGeo,
) -> Result<LabelRaster, ExtractError> {
    let mut labels = LabelRaster::masked(mold.clone());
    for source in sources {
        let claimed = rasterizer.rasterize(&source.path, mold)?;
        let mut burned = 0usize;
        for ((r, c), &hit) in claimed.indexed_iter() {
            if hit {
                labels.set(r, c, source.class_code);
                burned += 1;
            }
        }
        debug!(
            "composited source {:?} => class {} over {} px",
            source.path, source.class_code, burned
        );
    }
    info!(
        "composite of {} sources => {} labeled px",
        sources.len(),
        labels.valid_count()
    );
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use std::cell::RefCell;
    use std::path::Path;

    /// Rasterizer fed from an in-memory table keyed by file stem.
    struct TableRasterizer {
        table: Vec<(String, Array2<bool>)>,
        calls: RefCell<Vec<String>>,
    }

    impl TableRasterizer {
        fn new(table: Vec<(String, Array2<bool>)>) -> Self {
            TableRasterizer {
                table,
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl VectorRasterizer for TableRasterizer {
        fn rasterize(&self, source: &Path, _mold: &GridGeo) -> Result<Array2<bool>, ExtractError> {
            let stem = source.file_stem().unwrap().to_string_lossy().to_string();
            self.calls.borrow_mut().push(stem.clone());
            self.table
                .iter()
                .find(|(name, _)| *name == stem)
                .map(|(_, m)| m.clone())
                .ok_or_else(|| ExtractError::source_read(source, std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no such source",
                )))
        }
    }

    fn source(name: &str, code: u32) -> LabelSource {
        LabelSource {
            path: PathBuf::from(format!("{}.shp", name)),
            class_code: code,
        }
    }

    fn claim(cells: &[(usize, usize)]) -> Array2<bool> {
        let mut m = Array2::from_elem((4, 4), false);
        for &(r, c) in cells {
            m[(r, c)] = true;
        }
        m
    }

    #[test]
    fn last_source_wins_on_overlap() {
        let rasterizer = TableRasterizer::new(vec![
            ("a".to_string(), claim(&[(0, 0), (1, 1)])),
            ("b".to_string(), claim(&[(1, 1), (2, 2)])),
        ]);
        let labels = composite_labels(
            &[source("a", 1), source("b", 2)],
            &rasterizer,
            &GridGeo::bare(4, 4),
        )
        .unwrap();

        assert_eq!(labels.get(0, 0), Some(1));
        assert_eq!(labels.get(1, 1), Some(2)); // overlap: later source
        assert_eq!(labels.get(2, 2), Some(2));
        assert_eq!(rasterizer.calls.borrow().as_slice(), ["a", "b"]);
    }

    #[test]
    fn unclaimed_cells_stay_masked() {
        let rasterizer = TableRasterizer::new(vec![("a".to_string(), claim(&[(3, 3)]))]);
        let labels =
            composite_labels(&[source("a", 5)], &rasterizer, &GridGeo::bare(4, 4)).unwrap();
        assert_eq!(labels.valid_count(), 1);
        assert!(labels.is_masked(0, 0));
        assert_eq!(labels.get(3, 3), Some(5));
    }

    #[test]
    fn failed_source_aborts_composite() {
        let rasterizer = TableRasterizer::new(vec![("a".to_string(), claim(&[(0, 0)]))]);
        let err = composite_labels(
            &[source("a", 1), source("missing", 2)],
            &rasterizer,
            &GridGeo::bare(4, 4),
        )
        .unwrap_err();
        assert!(matches!(err, ExtractError::SourceRead { .. }));
    }

    #[test]
    fn compositing_is_deterministic() {
        let rasterizer = TableRasterizer::new(vec![
            ("a".to_string(), claim(&[(0, 0), (0, 1)])),
            ("b".to_string(), claim(&[(0, 1)])),
        ]);
        let sources = [source("a", 1), source("b", 2)];
        let first = composite_labels(&sources, &rasterizer, &GridGeo::bare(4, 4)).unwrap();
        let second = composite_labels(&sources, &rasterizer, &GridGeo::bare(4, 4)).unwrap();
        assert_eq!(first, second);
    }
}
