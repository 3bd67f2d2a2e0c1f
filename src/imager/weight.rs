//! Visibility weighting.

use crate::{config::Weighting, precision::ImagerFloat, types::WeightsGrid};

/// Grid cell `(row, column)` of a baseline, or `None` outside the grid.
///
/// `scale` converts wavelengths to cells: grid size times cell size.
pub(crate) fn grid_cell<T: ImagerFloat>(
    u: T,
    v: T,
    scale: f64,
    size: usize,
) -> Option<(usize, usize)> {
    let half = (size / 2) as i64;
    let x = (u.as_f64() * scale).round() as i64 + half;
    let y = (v.as_f64() * scale).round() as i64 + half;
    let inside = |i: i64| i >= 0 && i < size as i64;
    (inside(x) && inside(y)).then_some((y as usize, x as usize))
}

/// Add natural weights to the uniform-weighting grid. Returns the number of
/// visibilities that fell outside it.
pub(crate) fn bin_weights<T: ImagerFloat>(
    uu: &[T],
    vv: &[T],
    weights: &[T],
    scale: f64,
    grid: &mut WeightsGrid<T>,
) -> usize {
    let size = grid.nrows();
    let mut skipped = 0;
    for ((&u, &v), &w) in uu.iter().zip(vv).zip(weights) {
        match grid_cell(u, v, scale, size) {
            Some(cell) => grid[cell] += w,
            None => skipped += 1,
        }
    }
    skipped
}

/// `w * sqrt(u^2 + v^2)`
pub(crate) fn radial<T: ImagerFloat>(u: T, v: T, weight: T) -> T {
    weight * u.hypot(v)
}

/// Divide each weight by the summed weight of its grid cell.
///
/// Visibilities outside the grid, or in a cell that is empty, keep their
/// natural weight and are counted in the returned total.
pub(crate) fn uniform<T: ImagerFloat>(
    uu: &[T],
    vv: &[T],
    weights: &mut [T],
    scale: f64,
    grid: &WeightsGrid<T>,
) -> usize {
    let size = grid.nrows();
    let mut skipped = 0;
    for ((&u, &v), w) in uu.iter().zip(vv).zip(weights.iter_mut()) {
        match grid_cell(u, v, scale, size).map(|cell| grid[cell]) {
            Some(sum) if sum > T::zero() => *w /= sum,
            _ => skipped += 1,
        }
    }
    skipped
}

/// Reweight in place. Returns the number of skipped uniform lookups.
pub(crate) fn apply<T: ImagerFloat>(
    weighting: Weighting,
    uu: &[T],
    vv: &[T],
    weights: &mut [T],
    scale: f64,
    grid: Option<&WeightsGrid<T>>,
) -> usize {
    match (weighting, grid) {
        (Weighting::Natural, _) => 0,
        (Weighting::Radial, _) => {
            for ((&u, &v), w) in uu.iter().zip(vv).zip(weights.iter_mut()) {
                *w = radial(u, v, *w);
            }
            0
        }
        (Weighting::Uniform, Some(grid)) => uniform(uu, vv, weights, scale, grid),
        (Weighting::Uniform, None) => weights.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PlaneExtension;
    use approx::assert_abs_diff_eq;

    #[test]
    fn radial_scales_by_baseline_length() {
        assert_abs_diff_eq!(radial(3.0, 4.0, 2.0), 10.0);
        let mut weights = [2.0f32, 1.0];
        apply(
            Weighting::Radial,
            &[3.0, 0.0],
            &[4.0, -0.5],
            &mut weights,
            1.0,
            None,
        );
        assert_abs_diff_eq!(weights[0], 10.0);
        assert_abs_diff_eq!(weights[1], 0.5);
    }

    #[test]
    fn out_of_grid_bins_are_skipped() {
        let mut grid = WeightsGrid::<f64>::initialize(8);
        // One cell per wavelength: cells cover u in [-4, 3]
        let skipped = bin_weights(
            &[0.0, 1.0, 4.0, -9.0],
            &[0.0, 0.0, 0.0, 2.0],
            &[1.0; 4],
            1.0,
            &mut grid,
        );
        assert_eq!(skipped, 2);
        assert_abs_diff_eq!(grid.sum(), 2.0);
        assert_abs_diff_eq!(grid[(4, 4)], 1.0);
        assert_abs_diff_eq!(grid[(4, 5)], 1.0);
    }

    #[test]
    fn uniform_divides_by_cell_sum() {
        let mut grid = WeightsGrid::<f64>::initialize(8);
        bin_weights(&[0.0, 0.2, 1.0], &[0.0; 3], &[1.0, 3.0, 2.0], 1.0, &mut grid);

        let mut weights = [1.0, 3.0, 2.0, 5.0, 7.0];
        let skipped = uniform(
            &[0.0, 0.2, 1.0, 2.0, 30.0],
            &[0.0; 5],
            &mut weights,
            1.0,
            &grid,
        );
        assert_abs_diff_eq!(weights[0], 0.25);
        assert_abs_diff_eq!(weights[1], 0.75);
        assert_abs_diff_eq!(weights[2], 1.0);
        // Empty cell and out of grid keep natural weights
        assert_abs_diff_eq!(weights[3], 5.0);
        assert_abs_diff_eq!(weights[4], 7.0);
        assert_eq!(skipped, 2);
    }
}
