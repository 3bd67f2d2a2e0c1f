use std::path::Path;

use ndarray::prelude::*;
use ndarray_rand::rand::{Rng, SeedableRng, rngs::StdRng};
use num_complex::{Complex32, Complex64};

use crate::{constants::SPEED_OF_LIGHT, types::*};

pub type Visibility = Complex32;

/// Cross-correlations, shape (`baseline_count`, `timestep_count`,
/// `channel_count`, `correlation_count`)
pub type VisibilityArray = Array4<Visibility>;

/// An unpolarised point source at direction cosines (`l`, `m`) relative to
/// the phase centre.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointSource {
    pub l: f64,
    pub m: f64,
    pub flux: f64,
}

impl PointSource {
    /// Scatter `count` unit-flux sources uniformly within `max_offset_rad`
    /// of the phase centre on both axes.
    pub fn random(count: usize, max_offset_rad: f64, random_seed: u64) -> Vec<Self> {
        let mut rng = StdRng::seed_from_u64(random_seed);
        (0..count)
            .map(|_| {
                let x: f64 = rng.gen_range(-max_offset_rad..=max_offset_rad);
                let y: f64 = rng.gen_range(-max_offset_rad..=max_offset_rad);
                PointSource {
                    l: x.sin(),
                    m: y.sin(),
                    flux: 1.0,
                }
            })
            .collect()
    }

    fn n_minus_one(&self) -> f64 {
        (1.0 - self.l * self.l - self.m * self.m).max(0.0).sqrt() - 1.0
    }
}

pub trait VisibilityArrayExtension {
    fn generate(
        sources: &[PointSource],
        correlation_count: usize,
        frequencies: &FrequencyArray,
        uvw: &UvwArray,
    ) -> Self;
    fn from_file(path: &Path) -> Result<Self, ndarray_npy::ReadNpyError>
    where
        Self: Sized;
}

impl VisibilityArrayExtension for VisibilityArray {
    /// Predict the visibilities of `sources` on the given baselines.
    ///
    /// With four correlations the flux goes to XX and YY; with one it is the
    /// total intensity.
    fn generate(
        sources: &[PointSource],
        correlation_count: usize,
        frequencies: &FrequencyArray,
        uvw: &UvwArray,
    ) -> Self {
        let (baseline_count, timestep_count) = uvw.dim();
        let mut visibilities = VisibilityArray::zeros((
            baseline_count,
            timestep_count,
            frequencies.len(),
            correlation_count,
        ));

        for source in sources {
            for ((baseline, t), coords) in uvw.indexed_iter() {
                add_point_source(
                    source,
                    coords,
                    frequencies,
                    visibilities.slice_mut(s![baseline, t, .., ..]),
                );
            }
        }

        visibilities
    }

    fn from_file(path: &Path) -> Result<Self, ndarray_npy::ReadNpyError>
    where
        Self: Sized,
    {
        ndarray_npy::read_npy(path)
    }
}

fn add_point_source(
    source: &PointSource,
    coords: &Uvw,
    frequencies: &FrequencyArray,
    mut visibilities: ArrayViewMut2<Visibility>,
) {
    let n = source.n_minus_one();
    for (c, mut correlations) in visibilities.outer_iter_mut().enumerate() {
        let scale = frequencies[c] / SPEED_OF_LIGHT;
        let phase = 2.0
            * std::f64::consts::PI
            * scale
            * (coords.u * source.l + coords.v * source.m + coords.w * n);
        let value = source.flux * Complex64::from_polar(1.0, phase);
        let value = Visibility::new(value.re as f32, value.im as f32);

        let count = correlations.len();
        if count == 4 {
            correlations[0] += value;
            correlations[3] += value;
        } else {
            correlations.mapv_inplace(|x| x + value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn source_at_phase_centre_is_flat() {
        let uvw = UvwArray::from_elem((3, 2), Uvw::new(120.0, -40.0, 5.0));
        let frequencies = FrequencyArray::generate(100e6, 1e6, 2);
        let source = PointSource {
            l: 0.0,
            m: 0.0,
            flux: 2.5,
        };
        let vis = VisibilityArray::generate(&[source], 4, &frequencies, &uvw);
        assert_eq!(vis.dim(), (3, 2, 2, 4));
        for b in 0..3 {
            assert_abs_diff_eq!(vis[(b, 1, 1, 0)].re, 2.5);
            assert_abs_diff_eq!(vis[(b, 1, 1, 0)].im, 0.0);
            assert_abs_diff_eq!(vis[(b, 1, 1, 1)].norm(), 0.0);
            assert_abs_diff_eq!(vis[(b, 1, 1, 3)].re, 2.5);
        }
    }

    #[test]
    fn offset_source_phase_follows_baseline() {
        // One wavelength east-west at 299.792458 MHz
        let uvw = UvwArray::from_elem((1, 1), Uvw::new(1.0, 0.0, 0.0));
        let frequencies = FrequencyArray::from(vec![SPEED_OF_LIGHT]);
        let source = PointSource {
            l: 0.25,
            m: 0.0,
            flux: 1.0,
        };
        let vis = VisibilityArray::generate(&[source], 1, &frequencies, &uvw);
        // exp(+i pi / 2)
        assert_abs_diff_eq!(vis[(0, 0, 0, 0)].re, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(vis[(0, 0, 0, 0)].im, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn random_sources_stay_in_field() {
        let sources = PointSource::random(20, 0.01, 5);
        assert_eq!(sources.len(), 20);
        assert!(sources.iter().all(|s| s.l.abs() <= 0.01 && s.m.abs() <= 0.01));
        assert_eq!(sources, PointSource::random(20, 0.01, 5));
    }
}
