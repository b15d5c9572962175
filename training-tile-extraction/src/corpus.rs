//! Corpus persistence. Tiles buffer in memory up to a batch threshold
//! and flush through a bounded worker pool, one file write per tile.
//! Artifacts live under one `class_<code>_data/` directory per class
//! and are never overwritten: a name collision is an error on every
//! write path, single or pooled.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info};
use rayon::prelude::*;
use rayon::ThreadPool;
use rayon::ThreadPoolBuilder;

use crate::error::ExtractError;
use crate::extract::Tile;

/// Artifact filename extension.
const TILE_EXT: &str = "tile";

type Namer = Box<dyn Fn(&Tile) -> String + Send + Sync>;

/// Buffers extracted tiles and flushes them to per-class storage with
/// a fixed-size worker pool. Each tile is consumed exactly once; the
/// writer retains nothing after a flush.
pub struct CorpusWriter {
    root: PathBuf,
    batch: Vec<Tile>,
    batch_threshold: usize,
    pool: ThreadPool,
    namer: Namer,
    written: usize,
}

impl CorpusWriter {
    pub fn new(root: impl Into<PathBuf>, batch_threshold: usize, workers: usize) -> Result<Self, ExtractError> {
        Self::with_namer(root, batch_threshold, workers, Box::new(|_| stamp_name()))
    }

    /// Writer with an explicit artifact-name generator. The default
    /// derives names from a nanosecond timestamp; tests inject fixed
    /// names to provoke collisions.
    pub fn with_namer(
        root: impl Into<PathBuf>,
        batch_threshold: usize,
        workers: usize,
        namer: Namer,
    ) -> Result<Self, ExtractError> {
        if batch_threshold == 0 {
            return Err(ExtractError::InvalidConfig("batch threshold must be positive".into()));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| ExtractError::InvalidConfig(format!("worker pool: {}", e)))?;
        Ok(CorpusWriter {
            root: root.into(),
            batch: Vec::new(),
            batch_threshold,
            pool,
            namer,
            written: 0,
        })
    }

    /// Queue one tile; flushes the batch through the pool once the
    /// threshold is reached.
    pub fn push(&mut self, tile: Tile) -> Result<(), ExtractError> {
        self.batch.push(tile);
        if self.batch.len() >= self.batch_threshold {
            self.flush()?;
        }
        Ok(())
    }

    /// Flush any buffered remainder. Call once at stream end.
    pub fn finish(&mut self) -> Result<usize, ExtractError> {
        if !self.batch.is_empty() {
            self.flush()?;
        }
        Ok(self.written)
    }

    pub fn written(&self) -> usize {
        self.written
    }

    /// Dispatch the buffered batch to the pool, one persistence call
    /// per tile. Every write in the batch runs to completion; if any
    /// failed, the first error is returned afterwards. Successful
    /// writes stay on disk (the corpus only grows, there is no
    /// rollback).
    fn flush(&mut self) -> Result<(), ExtractError> {
        let tiles = std::mem::take(&mut self.batch);
        let n = tiles.len();
        debug!("flushing batch of {} tiles to {:?}", n, self.root);
        let root = self.root.clone();
        let namer = &self.namer;
        let results: Vec<Result<PathBuf, ExtractError>> = self.pool.install(|| {
            tiles
                .par_iter()
                .map(|tile| write_tile_named(&root, tile, &namer(tile)))
                .collect()
        });
        drop(tiles);

        let mut first_err = None;
        for result in results {
            match result {
                Ok(path) => {
                    self.written += 1;
                    debug!("wrote tile artifact {:?}", path);
                }
                Err(e) => {
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
        }
        info!("batch flush done: {} tiles queued, {} written so far", n, self.written);
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Nanoseconds since the epoch, the artifact name source.
fn stamp_name() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    nanos.to_string()
}

/// Per-class sub-directory for a class code.
pub fn class_dir(root: &Path, class_code: u32) -> PathBuf {
    root.join(format!("class_{}_data", class_code))
}

/// Single-tile persistence with a generated artifact name.
pub fn write_tile(root: &Path, tile: &Tile) -> Result<PathBuf, ExtractError> {
    write_tile_named(root, tile, &stamp_name())
}

/// Persist one tile under `class_<code>_data/<name>.tile`. Fails with
/// [`ExtractError::NameCollision`] if the artifact already exists;
/// existing tiles are never overwritten.
pub fn write_tile_named(root: &Path, tile: &Tile, name: &str) -> Result<PathBuf, ExtractError> {
    let dir = class_dir(root, tile.class_code);
    fs::create_dir_all(&dir).map_err(|e| ExtractError::persist(&dir, e))?;
    let path = dir.join(format!("{}.{}", name, TILE_EXT));
    // create_new is atomic: concurrent writers racing on one name get
    // exactly one winner.
    let mut file = match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            return Err(ExtractError::NameCollision { path });
        }
        Err(e) => return Err(ExtractError::persist(&path, e)),
    };
    let bytes = bincode::serialize(tile).map_err(|e| ExtractError::persist(&path, e))?;
    std::io::Write::write_all(&mut file, &bytes).map_err(|e| ExtractError::persist(&path, e))?;
    Ok(path)
}

/// Read one tile artifact back. Used by consumers of the corpus and by
/// the integration tests.
pub fn read_tile(path: &Path) -> Result<Tile, ExtractError> {
    let bytes = fs::read(path).map_err(|e| ExtractError::source_read(path, e))?;
    bincode::deserialize(&bytes).map_err(|e| ExtractError::source_read(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn tile(class_code: u32) -> Tile {
        Tile {
            data: Array3::from_elem((4, 4, 2), 1.5),
            one_hot: Array3::zeros((4, 4, 3)),
            class_code,
        }
    }

    #[test]
    fn write_then_read_round_trip() {
        let dir = tempdir().unwrap();
        let t = tile(2);
        let path = write_tile(dir.path(), &t).unwrap();
        assert!(path.starts_with(dir.path().join("class_2_data")));

        let back = read_tile(&path).unwrap();
        assert_eq!(back.class_code, 2);
        assert_eq!(back.data, t.data);
        assert_eq!(back.one_hot, t.one_hot);
    }

    #[test]
    fn single_write_collision_fails_loud() {
        let dir = tempdir().unwrap();
        write_tile_named(dir.path(), &tile(1), "fixed").unwrap();
        let err = write_tile_named(dir.path(), &tile(1), "fixed").unwrap_err();
        assert!(matches!(err, ExtractError::NameCollision { .. }));
        // Exactly one artifact survives.
        let entries: Vec<_> = fs::read_dir(class_dir(dir.path(), 1)).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn batch_flushes_at_threshold() {
        let dir = tempdir().unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let mut writer = CorpusWriter::with_namer(
            dir.path(),
            3,
            2,
            Box::new(move |_| format!("t{}", c.fetch_add(1, Ordering::SeqCst))),
        )
        .unwrap();
        for _ in 0..3 {
            writer.push(tile(0)).unwrap();
        }
        // Threshold reached inside push; nothing left buffered.
        assert_eq!(writer.written(), 3);
        assert_eq!(writer.finish().unwrap(), 3);
        let entries: Vec<_> = fs::read_dir(class_dir(dir.path(), 0)).unwrap().collect();
        assert_eq!(entries.len(), 3);
    }

    #[test]
    fn finish_flushes_remainder() {
        let dir = tempdir().unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let mut writer = CorpusWriter::with_namer(
            dir.path(),
            50,
            2,
            Box::new(move |_| format!("t{}", c.fetch_add(1, Ordering::SeqCst))),
        )
        .unwrap();
        writer.push(tile(1)).unwrap();
        writer.push(tile(2)).unwrap();
        assert_eq!(writer.finish().unwrap(), 2);
        assert!(class_dir(dir.path(), 1).exists());
        assert!(class_dir(dir.path(), 2).exists());
    }

    #[test]
    fn pooled_collision_surfaces_and_keeps_one_artifact() {
        let dir = tempdir().unwrap();
        // Every tile gets the same name: the batch must fail loud and
        // the corpus must end with exactly one of the two artifacts.
        let mut writer = CorpusWriter::with_namer(
            dir.path(),
            2,
            2,
            Box::new(|_| "same".to_string()),
        )
        .unwrap();
        writer.push(tile(3)).unwrap();
        let err = writer.push(tile(3)).unwrap_err();
        assert!(matches!(err, ExtractError::NameCollision { .. }));
        let entries: Vec<_> = fs::read_dir(class_dir(dir.path(), 3)).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(writer.written(), 1);
    }

    #[test]
    fn generated_names_do_not_collide_in_sequence() {
        let dir = tempdir().unwrap();
        let a = write_tile(dir.path(), &tile(0)).unwrap();
        let b = write_tile(dir.path(), &tile(0)).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn zero_batch_threshold_rejected() {
        let dir = tempdir().unwrap();
        assert!(CorpusWriter::new(dir.path(), 0, 1).is_err());
    }
}
