use ndarray::{Array2, Array3, ArrayView2};

/// Geo-referencing of one raster grid: extent plus an affine pixel
/// transform and a CRS code. Two rasters are "on the same grid" when
/// all three agree; auxiliary masks that disagree get warped first.
#[derive(Debug, Clone, PartialEq)]
pub struct GridGeo {
    pub rows: usize,
    pub cols: usize,
    /// Affine transform (a, b, c, d, e, f) mapping pixel to map space.
    pub transform: [f64; 6],
    pub epsg: u32,
}

impl GridGeo {
    /// Grid with identity pixel transform, used for rasters that carry
    /// no geo metadata of their own (plain .npy arrays).
    pub fn bare(rows: usize, cols: usize) -> Self {
        GridGeo {
            rows,
            cols,
            transform: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            epsg: 0,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn same_grid(&self, other: &GridGeo) -> bool {
        self == other
    }
}

/// 2-D class-coded label raster with per-cell validity, the masked-array
/// analogue the extraction pipeline works over. A cell is either a
/// non-negative class code or masked (unlabeled / obscured).
#[derive(Debug, Clone, PartialEq)]
pub struct LabelRaster {
    codes: Array2<u32>,
    valid: Array2<bool>,
    geo: GridGeo,
}

impl LabelRaster {
    /// Masked-everywhere raster on the given grid, the mold every scene
    /// extraction starts from.
    pub fn masked(geo: GridGeo) -> Self {
        let shape = (geo.rows, geo.cols);
        LabelRaster {
            codes: Array2::zeros(shape),
            valid: Array2::from_elem(shape, false),
            geo,
        }
    }

    pub fn geo(&self) -> &GridGeo {
        &self.geo
    }

    pub fn shape(&self) -> (usize, usize) {
        self.codes.dim()
    }

    /// Class code at (row, col), or None when masked.
    pub fn get(&self, row: usize, col: usize) -> Option<u32> {
        if self.valid[(row, col)] {
            Some(self.codes[(row, col)])
        } else {
            None
        }
    }

    /// Assign a class code, unmasking the cell.
    pub fn set(&mut self, row: usize, col: usize, code: u32) {
        self.codes[(row, col)] = code;
        self.valid[(row, col)] = true;
    }

    /// Mask a cell out. Masking never resurrects a value.
    pub fn mask_cell(&mut self, row: usize, col: usize) {
        self.valid[(row, col)] = false;
    }

    pub fn is_masked(&self, row: usize, col: usize) -> bool {
        !self.valid[(row, col)]
    }

    pub fn valid_count(&self) -> usize {
        self.valid.iter().filter(|&&v| v).count()
    }

    pub fn codes(&self) -> ArrayView2<'_, u32> {
        self.codes.view()
    }

    pub fn validity(&self) -> ArrayView2<'_, bool> {
        self.valid.view()
    }

    /// Bounding box (min_row, max_row, min_col, max_col) of valid
    /// cells, inclusive on both ends. None when fully masked.
    pub fn valid_bounds(&self) -> Option<(usize, usize, usize, usize)> {
        let mut bounds: Option<(usize, usize, usize, usize)> = None;
        for ((r, c), &v) in self.valid.indexed_iter() {
            if !v {
                continue;
            }
            bounds = Some(match bounds {
                None => (r, r, c, c),
                Some((r0, r1, c0, c1)) => (r0.min(r), r1.max(r), c0.min(c), c1.max(c)),
            });
        }
        bounds
    }
}

/// Stacked multi-band scene imagery, axes (row, col, band), aligned to
/// one reference grid. Immutable once stacked.
#[derive(Debug, Clone)]
pub struct ImageStack {
    data: Array3<f32>,
}

impl ImageStack {
    pub fn new(data: Array3<f32>) -> Self {
        ImageStack { data }
    }

    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    pub fn rows(&self) -> usize {
        self.data.dim().0
    }

    pub fn cols(&self) -> usize {
        self.data.dim().1
    }

    pub fn bands(&self) -> usize {
        self.data.dim().2
    }
}
