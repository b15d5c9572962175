use std::thread;

use crate::error::ExtractError;

/// Hard cap on the writer pool; the host CPU count is only a hint.
const MAX_WRITE_WORKERS: usize = 8;

/// All knobs of the extraction pipeline, enumerated and validated up
/// front. Collaborator-specific settings (band suffixes, mask suffixes)
/// live here too so a run is fully described by one value.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// Edge length of a square training tile, in pixels.
    pub tile_size: usize,
    /// Number of distinct class codes, including background code 0.
    pub n_classes: usize,
    /// How many tiles accumulate in memory before a flush to disk.
    pub tile_batch: usize,
    /// Size of the corpus-writer worker pool.
    pub workers: usize,
    /// Filename suffixes identifying cloud/water masks in a scene dir.
    pub mask_suffixes: Vec<String>,
    /// Filename suffixes identifying band rasters in a scene dir.
    pub band_suffixes: Vec<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        ExtractionConfig {
            tile_size: 608,
            n_classes: 4,
            tile_batch: 50,
            workers: default_workers(),
            mask_suffixes: vec!["_fmask.npy".to_string()],
            band_suffixes: (1..=7).map(|b| format!("_B{}.npy", b)).collect(),
        }
    }
}

impl ExtractionConfig {
    pub fn validate(&self) -> Result<(), ExtractError> {
        if self.tile_size == 0 {
            return Err(ExtractError::InvalidConfig("tile_size must be positive".into()));
        }
        if self.n_classes == 0 {
            return Err(ExtractError::InvalidConfig("n_classes must be positive".into()));
        }
        if self.tile_batch == 0 {
            return Err(ExtractError::InvalidConfig("tile_batch must be positive".into()));
        }
        if self.workers == 0 {
            return Err(ExtractError::InvalidConfig("workers must be positive".into()));
        }
        Ok(())
    }
}

/// Available parallelism, capped so concurrent scene runs cannot
/// exhaust the host.
pub fn default_workers() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(MAX_WRITE_WORKERS)
}

/// Mapping from label-source filename prefix to integer class code,
/// fixed once per run.
#[derive(Debug, Clone, Default)]
pub struct ClassCodeAssignment {
    entries: Vec<(String, u32)>,
}

impl ClassCodeAssignment {
    pub fn new(entries: Vec<(String, u32)>) -> Self {
        ClassCodeAssignment { entries }
    }

    pub fn push(&mut self, prefix: String, code: u32) {
        self.entries.push((prefix, code));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Code for a source file stem; first matching prefix in insertion
    /// order wins.
    pub fn code_for(&self, stem: &str) -> Option<u32> {
        self.entries
            .iter()
            .find(|(prefix, _)| stem.starts_with(prefix.as_str()))
            .map(|&(_, code)| code)
    }
}

/// Parse one `PREFIX=CODE` mapping as given on the command line.
pub fn parse_class_map(raw: &str) -> Result<(String, u32), ExtractError> {
    let (prefix, code) = raw
        .split_once('=')
        .ok_or_else(|| ExtractError::InvalidConfig(format!("class map entry {:?} is not PREFIX=CODE", raw)))?;
    if prefix.is_empty() {
        return Err(ExtractError::InvalidConfig(format!("class map entry {:?} has an empty prefix", raw)));
    }
    let code = code
        .parse::<u32>()
        .map_err(|e| ExtractError::InvalidConfig(format!("class map entry {:?}: bad code: {}", raw, e)))?;
    Ok((prefix.to_string(), code))
}
