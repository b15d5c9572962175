//! Tile-grid planning: the rectangular grid of tile origins covering
//! the labeled extent, padded up to whole tile multiples.

use log::info;

use crate::raster::LabelRaster;

/// Compute all (row_origin, col_origin) tile corners covering the
/// bounding box of valid label cells. The box's far edge is padded so
/// each axis spans an exact multiple of `tile_size`; origins step by
/// `tile_size` and are emitted row-major. With a fully masked raster
/// the grid is empty and downstream stages see zero tiles.
///
/// A degenerate box (min == max on an axis) still yields one tile on
/// that axis, because the padding always advances the far edge by at
/// least one pixel.
pub fn plan_tile_grid(labels: &LabelRaster, tile_size: usize) -> Vec<(usize, usize)> {
    let Some((min_row, max_row, min_col, max_col)) = labels.valid_bounds() else {
        info!("no labeled pixels => empty tile grid");
        return Vec::new();
    };

    let max_row = max_row + (tile_size - ((max_row - min_row) % tile_size));
    let max_col = max_col + (tile_size - ((max_col - min_col) % tile_size));

    let mut origins = Vec::new();
    let mut row = min_row;
    while row < max_row {
        let mut col = min_col;
        while col < max_col {
            origins.push((row, col));
            col += tile_size;
        }
        row += tile_size;
    }
    info!(
        "planned {} tile origins over rows [{}, {}), cols [{}, {})",
        origins.len(),
        min_row,
        max_row,
        min_col,
        max_col
    );
    origins
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::GridGeo;

    fn raster_with(cells: &[(usize, usize)], rows: usize, cols: usize) -> LabelRaster {
        let mut labels = LabelRaster::masked(GridGeo::bare(rows, cols));
        for &(r, c) in cells {
            labels.set(r, c, 1);
        }
        labels
    }

    #[test]
    fn fully_masked_raster_plans_empty_grid() {
        let labels = LabelRaster::masked(GridGeo::bare(100, 100));
        assert!(plan_tile_grid(&labels, 10).is_empty());
    }

    #[test]
    fn single_pixel_yields_one_tile() {
        let labels = raster_with(&[(5, 7)], 100, 100);
        assert_eq!(plan_tile_grid(&labels, 10), vec![(5, 7)]);
    }

    #[test]
    fn exact_two_by_two_cover() {
        // Valid box rows 0..=1215, cols 0..=1215, tile 608 => 2x2 grid.
        let labels = raster_with(&[(0, 0), (1215, 1215)], 1216, 1216);
        let grid = plan_tile_grid(&labels, 608);
        assert_eq!(grid, vec![(0, 0), (0, 608), (608, 0), (608, 608)]);
    }

    #[test]
    fn span_is_padded_to_tile_multiple() {
        let labels = raster_with(&[(3, 4), (20, 33)], 200, 200);
        let tile_size = 10;
        let grid = plan_tile_grid(&labels, tile_size);
        assert!(!grid.is_empty());

        let min_row = grid.iter().map(|&(r, _)| r).min().unwrap();
        let max_row = grid.iter().map(|&(r, _)| r).max().unwrap();
        let min_col = grid.iter().map(|&(_, c)| c).min().unwrap();
        let max_col = grid.iter().map(|&(_, c)| c).max().unwrap();
        assert_eq!((max_row + tile_size - min_row) % tile_size, 0);
        assert_eq!((max_col + tile_size - min_col) % tile_size, 0);

        for &(r, c) in &grid {
            assert_eq!((r - min_row) % tile_size, 0);
            assert_eq!((c - min_col) % tile_size, 0);
        }
    }

    #[test]
    fn origins_never_exceed_padded_bound() {
        let labels = raster_with(&[(1, 1), (25, 14)], 200, 200);
        let tile_size = 8;
        let (_, max_row, _, max_col) = labels.valid_bounds().unwrap();
        for (r, c) in plan_tile_grid(&labels, tile_size) {
            assert!(r + tile_size <= max_row + tile_size);
            assert!(c + tile_size <= max_col + tile_size);
        }
    }

    #[test]
    fn origins_are_row_major() {
        let labels = raster_with(&[(0, 0), (19, 19)], 50, 50);
        let grid = plan_tile_grid(&labels, 10);
        assert_eq!(grid, vec![(0, 0), (0, 10), (10, 0), (10, 10)]);
    }
}
