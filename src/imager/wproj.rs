//! W-projection gridding.

use fftw::types::Sign;
use log::debug;
use ndarray::prelude::*;
use num_complex::Complex;

use super::{dft::compute_n, fft::correction_profile, select::Selection, store::WStats};
use crate::{
    constants::{MAX_W_PLANES, MAX_W_SUPPORT, MIN_W_SUPPORT, W_KERNEL_OVERSAMPLE},
    error::{ImagerError, Result},
    precision::{ImagerFloat, fft_centred},
    types::{Plane, Taper, TaperExtension},
    util::print_param,
};

/// Bank of oversampled convolution kernels, one per W-plane.
#[derive(Clone, Debug)]
pub(crate) struct WKernels<T> {
    support: usize,
    oversample: usize,
    w_scale: f64,
    kernels: Vec<Array2<Complex<T>>>,
    pub(crate) correction: Vec<f64>,
}

/// Number of W-planes and kernel half-width for the given |w| statistics
/// and field of view in radians.
pub(crate) fn kernel_dimensions(
    stats: &WStats,
    fov_rad: f64,
    num_w_planes: Option<usize>,
    w_support: Option<usize>,
) -> (usize, usize) {
    let fov_sq = fov_rad * fov_rad;
    let planes = num_w_planes.unwrap_or_else(|| {
        if stats.count == 0 || stats.max == 0.0 {
            1
        } else {
            ((stats.rms() * fov_sq).ceil() as usize + 1).clamp(2, MAX_W_PLANES)
        }
    });
    let support = w_support.unwrap_or_else(|| {
        (MIN_W_SUPPORT + (stats.max * fov_sq / 2.0).ceil() as usize)
            .clamp(MIN_W_SUPPORT, MAX_W_SUPPORT)
    });
    (planes, support)
}

impl<T: ImagerFloat> WKernels<T> {
    pub(crate) fn new(
        stats: &WStats,
        grid_size: usize,
        cellsize_rad: f64,
        num_w_planes: Option<usize>,
        w_support: Option<usize>,
    ) -> Result<Self> {
        let fov = grid_size as f64 * cellsize_rad;
        let (num_planes, support) = kernel_dimensions(stats, fov, num_w_planes, w_support);
        let oversample = W_KERNEL_OVERSAMPLE;
        let width = 2 * support + 1;
        let size = oversample * width;
        let centre = size / 2;

        let w_scale = if num_planes > 1 && stats.max > 0.0 {
            ((num_planes - 1) as f64).powi(2) / stats.max
        } else {
            0.0
        };
        print_param!("W-planes", num_planes);
        print_param!("W-kernel support", support);
        debug!("max |w| {:.3}, rms |w| {:.3}, w scale {w_scale:.6}", stats.max, stats.rms());

        let taper = Taper::generate(width);
        let mut kernels = Vec::with_capacity(num_planes);
        for plane in 0..num_planes {
            let w = if w_scale > 0.0 {
                (plane * plane) as f64 / w_scale
            } else {
                0.0
            };

            let mut screen = Array2::<Complex<T>>::zeros((size, size));
            for ((i, j), &t) in taper.indexed_iter() {
                let l = (j as f64 - support as f64) * fov / width as f64;
                let m = (i as f64 - support as f64) * fov / width as f64;
                // exp(-2 pi i w (n - 1))
                let phase = 2.0 * std::f64::consts::PI * w * compute_n(l, m);
                let value = Complex::from_polar(t, phase);
                screen[(centre - support + i, centre - support + j)] =
                    Complex::new(T::cast(value.re), T::cast(value.im));
            }
            fft_centred(&mut screen, Sign::Backward)?;
            kernels.push(screen);
        }

        let s = support as isize;
        let o = oversample as isize;
        let c = centre as isize;
        let mut sum = 0.0;
        for jy in -s..=s {
            for jx in -s..=s {
                sum += kernels[0][((c + jy * o) as usize, (c + jx * o) as usize)].re.as_f64();
            }
        }
        if sum == 0.0 {
            return Err(ImagerError::Fft("W-kernel has zero sum".into()));
        }
        let inv = T::cast(1.0 / sum);
        for kernel in &mut kernels {
            kernel.mapv_inplace(|k| k * inv);
        }

        let profile: Vec<f64> = kernels[0]
            .row(centre)
            .iter()
            .skip(centre)
            .map(|k| k.re.as_f64())
            .collect();
        let correction = correction_profile(&profile, oversample, grid_size);

        Ok(Self {
            support,
            oversample,
            w_scale,
            kernels,
            correction,
        })
    }

    fn plane_index(&self, w: f64) -> usize {
        let index = (w.abs() * self.w_scale).sqrt().round() as usize;
        index.min(self.kernels.len() - 1)
    }

    fn kernel_index(&self, offset: f64) -> usize {
        let size = self.kernels[0].nrows() as isize;
        let index = size / 2 + (offset * self.oversample as f64).round() as isize;
        index.clamp(0, size - 1) as usize
    }
}

/// Grid `selection`, which must be sorted by |w|, onto `plane`.
///
/// Returns the sum of weights gridded and the number of visibilities whose
/// support left the grid.
pub(crate) fn update_plane_wproj<T: ImagerFloat>(
    kernels: &WKernels<T>,
    selection: &Selection<T>,
    scale: f64,
    plane: &mut Plane<T>,
) -> (f64, usize) {
    let size = plane.nrows() as i64;
    let half = size / 2;
    let s = kernels.support as i64;
    let mut norm = 0.0;
    let mut skipped = 0;

    for i in 0..selection.len() {
        let pos_u = selection.uu[i].as_f64() * scale;
        let pos_v = selection.vv[i].as_f64() * scale;
        let (nearest_u, nearest_v) = (pos_u.round(), pos_v.round());
        let iu = nearest_u as i64 + half;
        let iv = nearest_v as i64 + half;
        if iu - s < 0 || iu + s >= size || iv - s < 0 || iv + s >= size {
            skipped += 1;
            continue;
        }

        let w = selection.ww[i].as_f64();
        let kernel = &kernels.kernels[kernels.plane_index(w)];
        let conjugate = w < 0.0;
        let weight = selection.weights[i];
        let value = selection.amps[i] * weight;
        let (frac_u, frac_v) = (nearest_u - pos_u, nearest_v - pos_v);

        for jy in -s..=s {
            let ky = kernels.kernel_index(jy as f64 + frac_v);
            let y = (iv + jy) as usize;
            for jx in -s..=s {
                let kx = kernels.kernel_index(jx as f64 + frac_u);
                let k = kernel[(ky, kx)];
                let k = if conjugate { k.conj() } else { k };
                plane[(y, (iu + jx) as usize)] += value * k;
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

    fn stats(max: f64) -> WStats {
        let mut stats = WStats::default();
        stats.update(&[0.0, max / 2.0, max]);
        stats
    }

    #[test]
    fn dimensions_follow_w_statistics() {
        assert_eq!(kernel_dimensions(&WStats::default(), 0.1, None, None), (1, 3));
        // fov^2 = 1/64
        let (planes, support) = kernel_dimensions(&stats(2000.0), 0.125, None, None);
        assert!((2..=MAX_W_PLANES).contains(&planes));
        assert_eq!(support, 3 + 16);
        assert_eq!(kernel_dimensions(&stats(2000.0), 0.125, Some(5), Some(4)), (5, 4));
    }

    #[test]
    fn zero_w_kernel_grids_with_unit_gain() {
        let kernels = WKernels::<f64>::new(&stats(500.0), 64, 0.002, Some(4), Some(3)).unwrap();
        assert_eq!(kernels.kernels.len(), 4);
        assert_eq!(kernels.plane_index(0.0), 0);
        assert_eq!(kernels.plane_index(-500.0), 3);
        assert_abs_diff_eq!(kernels.correction[32], 1.0, epsilon = 1e-9);

        let selection = Selection {
            // Exactly on cells (10, -5)
            uu: vec![78.125],
            vv: vec![-39.0625],
            ww: vec![0.0],
            amps: vec![Complex::new(1.0, 0.0)],
            weights: vec![1.0],
            times: vec![0.0],
        };
        let mut plane = Plane::<f64>::initialize(64);
        let (norm, skipped) = update_plane_wproj(&kernels, &selection, 64.0 * 0.002, &mut plane);
        assert_eq!(skipped, 0);
        assert_abs_diff_eq!(norm, 1.0);
        let total: Complex<f64> = plane.iter().sum();
        assert_abs_diff_eq!(total.re, 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(total.im, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn negative_w_uses_conjugate_kernel() {
        let kernels = WKernels::<f64>::new(&stats(800.0), 64, 0.004, Some(3), Some(4)).unwrap();
        let grid = |w: f64| {
            let selection = Selection {
                uu: vec![0.0],
                vv: vec![0.0],
                ww: vec![w],
                amps: vec![Complex::new(1.0, 0.0)],
                weights: vec![1.0],
                times: vec![0.0],
            };
            let mut plane = Plane::<f64>::initialize(64);
            update_plane_wproj(&kernels, &selection, 64.0 * 0.004, &mut plane);
            plane
        };
        let positive = grid(800.0);
        let negative = grid(-800.0);
        let (y, x) = (32, 33);
        assert!(positive[(y, x)].im.abs() > 1e-6);
        assert_abs_diff_eq!(negative[(y, x)].re, positive[(y, x)].re, epsilon = 1e-12);
        assert_abs_diff_eq!(negative[(y, x)].im, -positive[(y, x)].im, epsilon = 1e-12);
    }
}
