use ndarray::{Zip, prelude::*};
use num_complex::Complex;

use super::select::Selection;
use crate::{precision::ImagerFloat, types::Plane};

/// Direction cosines of every image pixel.
#[derive(Clone, Debug)]
pub(crate) struct DftPixels<T> {
    ls: Array1<T>,
    ms: Array1<T>,
    /// `n - 1` per pixel, `[y, x]`
    n_minus_one: Array2<T>,
}

impl<T: ImagerFloat> DftPixels<T> {
    pub(crate) fn new(size: usize, cellsize_rad: f64) -> Self {
        let ls = Array1::from_shape_fn(size, |x| T::cast(compute_lm(x, size, cellsize_rad)));
        let ms = ls.clone();
        let n_minus_one = Array2::from_shape_fn((size, size), |(y, x)| {
            T::cast(-compute_n(ls[x].as_f64(), ms[y].as_f64()))
        });
        Self {
            ls,
            ms,
            n_minus_one,
        }
    }
}

fn compute_lm(x: usize, size: usize, cellsize_rad: f64) -> f64 {
    ((x as f64 - (size / 2) as f64) * cellsize_rad).sin()
}

/// `1 - sqrt(1 - l^2 - m^2)`, evaluated without cancellation.
pub(crate) fn compute_n(l: f64, m: f64) -> f64 {
    let tmp = l * l + m * m;

    if tmp >= 1.0 {
        return 1.0;
    }

    tmp / (1.0 + f64::sqrt(1.0 - tmp))
}

/// Add the direct Fourier sum of `selection` to every pixel of `plane`.
/// The w term is included when `three_d` is set.
///
/// Returns the sum of the weights used.
pub(crate) fn update_plane_dft<T: ImagerFloat>(
    pixels: &DftPixels<T>,
    three_d: bool,
    selection: &Selection<T>,
    plane: &mut Plane<T>,
) -> f64 {
    let two_pi = T::cast(2.0 * std::f64::consts::PI);
    let weighted: Vec<Complex<T>> = selection
        .amps
        .iter()
        .zip(&selection.weights)
        .map(|(&a, &w)| a * w)
        .collect();

    Zip::indexed(plane.view_mut()).par_for_each(|(y, x), pixel| {
        let l = pixels.ls[x];
        let m = pixels.ms[y];
        let n = if three_d {
            pixels.n_minus_one[(y, x)]
        } else {
            T::zero()
        };

        let mut sum = Complex::new(T::zero(), T::zero());
        for (i, value) in weighted.iter().enumerate() {
            let phase =
                -two_pi * (selection.uu[i] * l + selection.vv[i] * m + selection.ww[i] * n);
            let (sin, cos) = phase.sin_cos();
            sum += value * Complex::new(cos, sin);
        }
        *pixel += sum;
    });

    selection.weights.iter().map(|w| w.as_f64()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PlaneExtension;
    use approx::assert_abs_diff_eq;

    #[test]
    fn pixel_coordinates_are_centred() {
        let pixels = DftPixels::<f64>::new(4, 0.1);
        assert_abs_diff_eq!(pixels.ls[2], 0.0);
        assert_abs_diff_eq!(pixels.ls[0], (-0.2f64).sin());
        assert_abs_diff_eq!(pixels.n_minus_one[(2, 2)], 0.0);
        assert!(pixels.n_minus_one[(0, 0)] < 0.0);
    }

    #[test]
    fn three_d_adds_w_phase() {
        let pixels = DftPixels::<f64>::new(4, 0.2);
        let selection = Selection {
            uu: vec![0.0],
            vv: vec![0.0],
            ww: vec![10.0],
            amps: vec![Complex::new(1.0, 0.0)],
            weights: vec![2.0],
            times: vec![0.0],
        };

        let mut flat = Plane::<f64>::initialize(4);
        let norm = update_plane_dft(&pixels, false, &selection, &mut flat);
        assert_abs_diff_eq!(norm, 2.0);
        assert_abs_diff_eq!(flat[(0, 0)].re, 2.0);

        let mut curved = Plane::<f64>::initialize(4);
        update_plane_dft(&pixels, true, &selection, &mut curved);
        let phase = -2.0 * std::f64::consts::PI * 10.0 * pixels.n_minus_one[(0, 1)];
        assert_abs_diff_eq!(curved[(0, 1)].re, 2.0 * phase.cos(), epsilon = 1e-12);
        assert_abs_diff_eq!(curved[(0, 1)].im, 2.0 * phase.sin(), epsilon = 1e-12);
        assert_abs_diff_eq!(curved[(2, 2)].re, 2.0, epsilon = 1e-12);
    }
}
