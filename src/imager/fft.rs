//! Convolutional gridding onto a regular uv grid.

use super::select::Selection;
use crate::{
    config::GridKernel,
    constants::{FFT_KERNEL_OVERSAMPLE, FFT_KERNEL_SUPPORT},
    precision::ImagerFloat,
    types::{Plane, evaluate_spheroidal},
};

/// Tabulated separable gridding kernel and its image-plane correction.
#[derive(Clone, Debug)]
pub(crate) struct FftKernel<T> {
    support: usize,
    oversample: usize,
    /// Kernel value at offsets `i / oversample` cells, `i >= 0`.
    table: Vec<T>,
    /// Correction factor for each column (or row) of the padded grid.
    pub(crate) correction: Vec<f64>,
}

fn kernel_value(kind: GridKernel, d: f64, support: usize) -> f64 {
    let d = d.abs();
    match kind {
        GridKernel::Pillbox => {
            if d <= 0.5 {
                1.0
            } else {
                0.0
            }
        }
        GridKernel::Linear => (1.0 - d).max(0.0),
        GridKernel::Spheroidal => evaluate_spheroidal(d / support as f64),
    }
}

impl<T: ImagerFloat> FftKernel<T> {
    pub(crate) fn new(kind: GridKernel, grid_size: usize) -> Self {
        let support = FFT_KERNEL_SUPPORT;
        let oversample = FFT_KERNEL_OVERSAMPLE;
        let values: Vec<f64> = (0..=(support + 1) * oversample)
            .map(|i| kernel_value(kind, i as f64 / oversample as f64, support))
            .collect();

        Self {
            support,
            oversample,
            table: values.iter().map(|&v| T::cast(v)).collect(),
            correction: correction_profile(
                &values[..=support * oversample],
                oversample,
                grid_size,
            ),
        }
    }

    fn sample(&self, d: f64) -> T {
        let i = (d.abs() * self.oversample as f64).round() as usize;
        self.table.get(i).copied().unwrap_or_else(T::zero)
    }

    pub(crate) fn support(&self) -> usize {
        self.support
    }

    /// Kernel samples for the `2 * support + 1` cells around a visibility at
    /// `position` cells from the grid centre, with the index of the nearest
    /// cell.
    fn weights_at(&self, position: f64) -> (i64, Vec<T>) {
        let nearest = position.round();
        let frac = nearest - position;
        let s = self.support as i64;
        let weights = (-s..=s).map(|j| self.sample(j as f64 + frac)).collect();
        (nearest as i64, weights)
    }
}

/// Fourier transform of a symmetric kernel, sampled at `oversample` points
/// per cell from the centre outwards, for every pixel of a `grid_size`
/// image. Normalised to one at the centre.
pub(crate) fn correction_profile(
    values: &[f64],
    oversample: usize,
    grid_size: usize,
) -> Vec<f64> {
    let total: f64 = values[0] + 2.0 * values[1..].iter().sum::<f64>();
    let centre = (grid_size / 2) as f64;
    (0..grid_size)
        .map(|x| {
            let nu = (x as f64 - centre) / grid_size as f64;
            let sum: f64 = values
                .iter()
                .enumerate()
                .map(|(i, &k)| {
                    let d = i as f64 / oversample as f64;
                    let factor = if i == 0 { 1.0 } else { 2.0 };
                    factor * k * (2.0 * std::f64::consts::PI * d * nu).cos()
                })
                .sum();
            if total == 0.0 { 1.0 } else { sum / total }
        })
        .collect()
}

/// Grid `selection` onto `plane`. `scale` converts wavelengths to cells.
///
/// Returns the sum of weights gridded and the number of visibilities whose
/// support left the grid.
pub(crate) fn update_plane_fft<T: ImagerFloat>(
    kernel: &FftKernel<T>,
    selection: &Selection<T>,
    scale: f64,
    plane: &mut Plane<T>,
) -> (f64, usize) {
    let size = plane.nrows() as i64;
    let half = size / 2;
    let s = kernel.support() as i64;
    let mut norm = 0.0;
    let mut skipped = 0;

    for i in 0..selection.len() {
        let (cu, kx) = kernel.weights_at(selection.uu[i].as_f64() * scale);
        let (cv, ky) = kernel.weights_at(selection.vv[i].as_f64() * scale);
        let (iu, iv) = (cu + half, cv + half);
        if iu - s < 0 || iu + s >= size || iv - s < 0 || iv + s >= size {
            skipped += 1;
            continue;
        }

        let sum: T = kx.iter().copied().sum::<T>() * ky.iter().copied().sum::<T>();
        if sum == T::zero() {
            skipped += 1;
            continue;
        }
        let weight = selection.weights[i];
        let value = selection.amps[i] * (weight / sum);

        for (jy, &wy) in ky.iter().enumerate() {
            let y = (iv - s) as usize + jy;
            for (jx, &wx) in kx.iter().enumerate() {
                let x = (iu - s) as usize + jx;
                plane[(y, x)] += value * (wx * wy);
            }
        }
        norm += weight.as_f64();
    }

    (norm, skipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PlaneExtension;
    use approx::assert_abs_diff_eq;
    use num_complex::Complex;

    fn selection(uu: Vec<f64>, vv: Vec<f64>) -> Selection<f64> {
        let n = uu.len();
        Selection {
            ww: vec![0.0; n],
            amps: vec![Complex::new(2.0, 1.0); n],
            weights: vec![0.5; n],
            times: vec![0.0; n],
            uu,
            vv,
        }
    }

    #[test]
    fn gridded_kernel_sums_to_the_weighted_amplitude() {
        for kind in [GridKernel::Pillbox, GridKernel::Linear, GridKernel::Spheroidal] {
            let kernel = FftKernel::<f64>::new(kind, 32);
            let mut plane = Plane::<f64>::initialize(32);
            let (norm, skipped) =
                update_plane_fft(&kernel, &selection(vec![3.3], vec![-2.6]), 1.0, &mut plane);
            assert_eq!(skipped, 0);
            assert_abs_diff_eq!(norm, 0.5);
            let total: Complex<f64> = plane.iter().sum();
            assert_abs_diff_eq!(total.re, 1.0, epsilon = 1e-12);
            assert_abs_diff_eq!(total.im, 0.5, epsilon = 1e-12);
        }
    }

    #[test]
    fn support_outside_the_grid_is_skipped() {
        let kernel = FftKernel::<f32>::new(GridKernel::Spheroidal, 16);
        let mut plane = Plane::<f32>::initialize(16);
        let sel = Selection {
            uu: vec![0.0, 6.0, -9.0],
            vv: vec![0.0; 3],
            ww: vec![0.0; 3],
            amps: vec![Complex::new(1.0, 0.0); 3],
            weights: vec![1.0; 3],
            times: vec![0.0; 3],
        };
        let (norm, skipped) = update_plane_fft(&kernel, &sel, 1.0, &mut plane);
        assert_eq!(skipped, 2);
        assert_abs_diff_eq!(norm, 1.0);
    }

    #[test]
    fn correction_is_one_at_centre_and_falls_off() {
        let kernel = FftKernel::<f64>::new(GridKernel::Spheroidal, 64);
        assert_abs_diff_eq!(kernel.correction[32], 1.0, epsilon = 1e-12);
        assert!(kernel.correction[8] < kernel.correction[24]);
        assert_abs_diff_eq!(kernel.correction[16], kernel.correction[48], epsilon = 1e-12);
        let pillbox = FftKernel::<f64>::new(GridKernel::Pillbox, 64);
        assert!(pillbox.correction.iter().all(|&c| c > 0.5));
    }
}
