use fftw::types::Sign;
use ndarray::prelude::*;
use num_complex::Complex;

use crate::{
    constants::MIN_CORRECTION,
    error::Result,
    precision::{ImagerFloat, fft_centred},
    types::Plane,
};

/// Normalised images and (for gridding algorithms) uv grids, in plane
/// order: channel-major, then polarisation.
#[derive(Clone, Debug, PartialEq)]
pub struct Finalized<T> {
    pub images: Vec<Array2<T>>,
    pub grids: Vec<Array2<Complex<T>>>,
}

/// `plane / norm`, or the plane unchanged when nothing was accumulated.
pub(crate) fn normalised_grid<T: ImagerFloat>(plane: &Plane<T>, norm: f64) -> Plane<T> {
    if norm == 0.0 {
        plane.clone()
    } else {
        let inv = T::cast(1.0 / norm);
        plane.mapv(|c| c * inv)
    }
}

pub(crate) fn image_from_dft<T: ImagerFloat>(plane: &Plane<T>, norm: f64) -> Array2<T> {
    normalised_grid(plane, norm).mapv(|c| c.re)
}

/// Transform a uv grid to an image of `image_size` pixels taken from the
/// centre of the grid, dividing by the gridding correction.
pub(crate) fn image_from_grid<T: ImagerFloat>(
    plane: &Plane<T>,
    norm: f64,
    image_size: usize,
    correction: &[f64],
) -> Result<Array2<T>> {
    let mut grid = normalised_grid(plane, norm);
    fft_centred(&mut grid, Sign::Forward)?;

    let offset = grid.nrows() / 2 - image_size / 2;
    Ok(Array2::from_shape_fn((image_size, image_size), |(y, x)| {
        let (gy, gx) = (y + offset, x + offset);
        let c = correction[gy] * correction[gx];
        let value = grid[(gy, gx)].re;
        if c.abs() < MIN_CORRECTION {
            value
        } else {
            value / T::cast(c)
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PlaneExtension;
    use approx::assert_abs_diff_eq;

    #[test]
    fn zero_norm_leaves_plane_unnormalised() {
        let mut plane = Plane::<f64>::initialize(2);
        plane[(0, 1)] = Complex::new(3.0, -1.0);
        assert_eq!(normalised_grid(&plane, 0.0), plane);
        assert_abs_diff_eq!(image_from_dft(&plane, 2.0)[(0, 1)], 1.5);
    }

    #[test]
    fn centre_cell_images_to_flat_field() {
        let mut plane = Plane::<f64>::initialize(16);
        plane[(8, 8)] = Complex::new(4.0, 0.0);
        let image = image_from_grid(&plane, 2.0, 8, &[1.0; 16]).unwrap();
        assert_eq!(image.dim(), (8, 8));
        for value in image.iter() {
            assert_abs_diff_eq!(*value, 2.0, epsilon = 1e-12);
        }
    }
}
