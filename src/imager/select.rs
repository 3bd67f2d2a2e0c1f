//! Selection of the visibilities that contribute to one output plane.

use std::borrow::Cow;

use num_complex::Complex;

use crate::{config::ImageType, constants::SPEED_OF_LIGHT, precision::ImagerFloat};

/// Update input in the working precision.
///
/// Amplitudes are `[channel - start_channel][row][pol]`, weights
/// `[row][pol]`, coordinates in metres.
pub(crate) struct Rows<'a, T: Clone> {
    pub num_rows: usize,
    pub start_channel: usize,
    pub end_channel: usize,
    pub num_pols: usize,
    pub uu: Cow<'a, [T]>,
    pub vv: Cow<'a, [T]>,
    pub ww: Cow<'a, [T]>,
    pub amplitudes: Option<Cow<'a, [Complex<T>]>>,
    pub weights: Cow<'a, [T]>,
    pub time_centroids: &'a [f64],
}

/// How one output polarisation is formed from the input correlations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PolRule {
    Scalar,
    Direct(usize),
    StokesI,
    StokesQ,
    StokesU,
    StokesV,
}

impl PolRule {
    pub(crate) fn new(image_type: ImageType, num_pols: usize, pol: usize) -> Self {
        if num_pols == 1 {
            return PolRule::Scalar;
        }
        if image_type == ImageType::Psf {
            return PolRule::StokesI;
        }
        let index = image_type.pol_offset() + pol;
        if image_type.uses_stokes() {
            match index {
                0 => PolRule::StokesI,
                1 => PolRule::StokesQ,
                2 => PolRule::StokesU,
                _ => PolRule::StokesV,
            }
        } else {
            PolRule::Direct(index)
        }
    }

    fn weight<T: ImagerFloat>(self, w: &[T]) -> T {
        let half = T::cast(0.5);
        match self {
            PolRule::Scalar => w[0],
            PolRule::Direct(p) => w[p],
            PolRule::StokesI | PolRule::StokesQ => (w[0] + w[3]) * half,
            PolRule::StokesU | PolRule::StokesV => (w[1] + w[2]) * half,
        }
    }

    fn amplitude<T: ImagerFloat>(self, a: &[Complex<T>]) -> Complex<T> {
        let half = T::cast(0.5);
        match self {
            PolRule::Scalar => a[0],
            PolRule::Direct(p) => a[p],
            PolRule::StokesI => (a[0] + a[3]) * half,
            PolRule::StokesQ => (a[0] - a[3]) * half,
            PolRule::StokesU => (a[1] + a[2]) * half,
            PolRule::StokesV => {
                let d = (a[1] - a[2]) * half;
                Complex::new(d.im, -d.re)
            }
        }
    }
}

/// Compacted visibilities for one plane. Coordinates are in wavelengths.
/// `amps` is empty in coordinate-only mode.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct Selection<T> {
    pub uu: Vec<T>,
    pub vv: Vec<T>,
    pub ww: Vec<T>,
    pub amps: Vec<Complex<T>>,
    pub weights: Vec<T>,
    pub times: Vec<f64>,
}

impl<T: ImagerFloat> Selection<T> {
    pub(crate) fn len(&self) -> usize {
        self.uu.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.uu.is_empty()
    }

    /// Gather the visibilities of `rows` in the given channels for one
    /// output polarisation.
    pub(crate) fn gather(
        rows: &Rows<'_, T>,
        channels: &[usize],
        channel_freqs: impl Fn(usize) -> f64,
        rule: PolRule,
    ) -> Self {
        let mut selection = Self::default();
        let num_pols = rows.num_pols;

        for &channel in channels {
            if channel < rows.start_channel || channel > rows.end_channel {
                continue;
            }
            let scale = T::cast(channel_freqs(channel) / SPEED_OF_LIGHT);
            let offset = (channel - rows.start_channel) * rows.num_rows * num_pols;

            for row in 0..rows.num_rows {
                selection.uu.push(rows.uu[row] * scale);
                selection.vv.push(rows.vv[row] * scale);
                selection.ww.push(rows.ww[row] * scale);
                selection
                    .weights
                    .push(rule.weight(&rows.weights[row * num_pols..(row + 1) * num_pols]));
                selection.times.push(rows.time_centroids[row]);
                if let Some(amps) = &rows.amplitudes {
                    let start = offset + row * num_pols;
                    selection
                        .amps
                        .push(rule.amplitude(&amps[start..start + num_pols]));
                }
            }
        }
        selection
    }

    /// Keep visibilities for which `keep(i)` holds.
    pub(crate) fn retain(&mut self, keep: impl Fn(usize) -> bool) {
        let order: Vec<usize> = (0..self.len()).filter(|&i| keep(i)).collect();
        if order.len() != self.len() {
            self.gather_in_order(&order);
        }
    }

    /// Keep time centroids within `[min_sec, max_sec]` (MJD seconds); a
    /// maximum of zero or less is unbounded.
    pub(crate) fn filter_time(&mut self, min_sec: f64, max_sec: f64) {
        if max_sec <= 0.0 && min_sec <= 0.0 {
            return;
        }
        let times = self.times.clone();
        self.retain(|i| times[i] >= min_sec && (max_sec <= 0.0 || times[i] <= max_sec));
    }

    /// Keep baselines with `min <= sqrt(u^2 + v^2) <= max` wavelengths; a
    /// negative maximum is unbounded.
    pub(crate) fn filter_uv(&mut self, min: f64, max: f64) {
        if min <= 0.0 && max < 0.0 {
            return;
        }
        let lengths: Vec<f64> = self
            .uu
            .iter()
            .zip(&self.vv)
            .map(|(&u, &v)| u.hypot(v).as_f64())
            .collect();
        self.retain(|i| lengths[i] >= min && (max < 0.0 || lengths[i] <= max));
    }

    /// Reorder by non-decreasing |w|.
    pub(crate) fn sort_by_abs_w(&mut self) {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_unstable_by(|&a, &b| {
            self.ww[a]
                .abs()
                .as_f64()
                .total_cmp(&self.ww[b].abs().as_f64())
        });
        self.gather_in_order(&order);
    }

    fn gather_in_order(&mut self, order: &[usize]) {
        fn gather<V: Copy>(values: &[V], order: &[usize]) -> Vec<V> {
            order.iter().map(|&i| values[i]).collect()
        }
        self.uu = gather(&self.uu, order);
        self.vv = gather(&self.vv, order);
        self.ww = gather(&self.ww, order);
        self.weights = gather(&self.weights, order);
        self.times = gather(&self.times, order);
        if !self.amps.is_empty() {
            self.amps = gather(&self.amps, order);
        }
    }

    /// Replace every amplitude by one, for point-spread functions.
    pub(crate) fn set_unit_amplitudes(&mut self) {
        self.amps.fill(Complex::new(T::one(), T::zero()));
    }
}

/// Rotation of baseline coordinates and visibility phases from the data
/// phase centre to a new image centre.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Rotation {
    matrix: [[f64; 3]; 3],
}

impl Rotation {
    pub(crate) fn new(from_deg: (f64, f64), to_deg: (f64, f64)) -> Self {
        let e0 = uvw_axes(from_deg.0.to_radians(), from_deg.1.to_radians());
        let e1 = uvw_axes(to_deg.0.to_radians(), to_deg.1.to_radians());
        let mut matrix = [[0.0; 3]; 3];
        for (i, row) in matrix.iter_mut().enumerate() {
            for (j, value) in row.iter_mut().enumerate() {
                *value = (0..3).map(|k| e1[i][k] * e0[j][k]).sum();
            }
        }
        Self { matrix }
    }

    /// Rotate coordinates in place, phase-rotating amplitudes (if any) by
    /// the change in w.
    pub(crate) fn apply<T: ImagerFloat>(&self, selection: &mut Selection<T>) {
        let m = &self.matrix;
        let has_amps = !selection.amps.is_empty();
        for i in 0..selection.len() {
            let (u, v, w) = (
                selection.uu[i].as_f64(),
                selection.vv[i].as_f64(),
                selection.ww[i].as_f64(),
            );
            let u1 = m[0][0] * u + m[0][1] * v + m[0][2] * w;
            let v1 = m[1][0] * u + m[1][1] * v + m[1][2] * w;
            let w1 = m[2][0] * u + m[2][1] * v + m[2][2] * w;
            selection.uu[i] = T::cast(u1);
            selection.vv[i] = T::cast(v1);
            selection.ww[i] = T::cast(w1);
            if has_amps {
                let phase = -2.0 * std::f64::consts::PI * (w1 - w);
                let (sin, cos) = phase.sin_cos();
                selection.amps[i] *= Complex::new(T::cast(cos), T::cast(sin));
            }
        }
    }
}

/// Unit vectors of the u, v and w axes for a phase centre, in equatorial
/// Cartesian coordinates.
fn uvw_axes(ra: f64, dec: f64) -> [[f64; 3]; 3] {
    let (sin_ra, cos_ra) = ra.sin_cos();
    let (sin_dec, cos_dec) = dec.sin_cos();
    [
        [-sin_ra, cos_ra, 0.0],
        [-sin_dec * cos_ra, -sin_dec * sin_ra, cos_dec],
        [cos_dec * cos_ra, cos_dec * sin_ra, sin_dec],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn rows<'a>(
        uu: &'a [f64],
        amps: &'a [Complex<f64>],
        weights: &'a [f64],
        times: &'a [f64],
        num_pols: usize,
    ) -> Rows<'a, f64> {
        Rows {
            num_rows: uu.len(),
            start_channel: 0,
            end_channel: 0,
            num_pols,
            uu: Cow::Borrowed(uu),
            vv: Cow::Borrowed(uu),
            ww: Cow::Borrowed(uu),
            amplitudes: Some(Cow::Borrowed(amps)),
            weights: Cow::Borrowed(weights),
            time_centroids: times,
        }
    }

    #[test]
    fn linear_to_stokes() {
        let amps = [
            Complex::new(3.0, 0.0),
            Complex::new(1.0, 2.0),
            Complex::new(1.0, -2.0),
            Complex::new(1.0, 0.0),
        ];
        let weights = [1.0, 2.0, 4.0, 3.0];
        let input = rows(&[SPEED_OF_LIGHT], &amps, &weights, &[0.0], 4);
        let freq = |_| 1.0;

        let i = Selection::gather(&input, &[0], freq, PolRule::StokesI);
        assert_eq!(i.amps, vec![Complex::new(2.0, 0.0)]);
        assert_abs_diff_eq!(i.weights[0], 2.0);
        assert_abs_diff_eq!(i.uu[0], 1.0);

        let q = Selection::gather(&input, &[0], freq, PolRule::StokesQ);
        assert_eq!(q.amps, vec![Complex::new(1.0, 0.0)]);

        let u = Selection::gather(&input, &[0], freq, PolRule::StokesU);
        assert_eq!(u.amps, vec![Complex::new(1.0, 0.0)]);
        assert_abs_diff_eq!(u.weights[0], 3.0);

        // XY - YX = 4i, so V = 2
        let v = Selection::gather(&input, &[0], freq, PolRule::StokesV);
        assert_eq!(v.amps, vec![Complex::new(2.0, 0.0)]);
    }

    #[test]
    fn pol_rules_follow_image_type() {
        assert_eq!(PolRule::new(ImageType::I, 1, 0), PolRule::Scalar);
        assert_eq!(PolRule::new(ImageType::Stokes, 4, 3), PolRule::StokesV);
        assert_eq!(PolRule::new(ImageType::Linear, 4, 2), PolRule::Direct(2));
        assert_eq!(PolRule::new(ImageType::YY, 4, 0), PolRule::Direct(3));
        assert_eq!(PolRule::new(ImageType::Psf, 4, 0), PolRule::StokesI);
    }

    #[test]
    fn filters_compact_all_columns() {
        let uu = [1.0, 2.0, 3.0, 4.0];
        let amps: Vec<_> = (0..4).map(|i| Complex::new(i as f64, 0.0)).collect();
        let times = [10.0, 20.0, 30.0, 40.0];
        let input = rows(&uu, &amps, &[1.0; 4], &times, 1);
        let mut selection =
            Selection::gather(&input, &[0], |_| SPEED_OF_LIGHT, PolRule::Scalar);

        selection.filter_time(15.0, 35.0);
        assert_eq!(selection.times, vec![20.0, 30.0]);
        assert_eq!(selection.amps[0], Complex::new(1.0, 0.0));

        // |uv| = sqrt(2) * u
        selection.filter_uv(0.0, 3.0);
        assert_eq!(selection.uu, vec![2.0]);
        assert_eq!(selection.amps, vec![Complex::new(1.0, 0.0)]);

        selection.filter_uv(10.0, -1.0);
        assert!(selection.is_empty());
    }

    #[test]
    fn sort_by_abs_w_moves_every_column() {
        let mut selection = Selection::<f64> {
            uu: vec![1.0, 2.0, 3.0],
            vv: vec![0.0; 3],
            ww: vec![-5.0, 1.0, -2.0],
            amps: vec![Complex::new(1.0, 0.0), Complex::new(2.0, 0.0), Complex::new(3.0, 0.0)],
            weights: vec![0.1, 0.2, 0.3],
            times: vec![0.0; 3],
        };
        selection.sort_by_abs_w();
        assert_eq!(selection.ww, vec![1.0, -2.0, -5.0]);
        assert_eq!(selection.uu, vec![2.0, 3.0, 1.0]);
        assert_eq!(selection.weights, vec![0.2, 0.3, 0.1]);
        assert_eq!(selection.amps[2], Complex::new(1.0, 0.0));
    }

    #[test]
    fn rotation_to_same_centre_is_identity() {
        let rotation = Rotation::new((30.0, -40.0), (30.0, -40.0));
        let mut selection = Selection::<f64> {
            uu: vec![100.0],
            vv: vec![-50.0],
            ww: vec![7.0],
            amps: vec![Complex::new(0.0, 1.0)],
            weights: vec![1.0],
            times: vec![0.0],
        };
        rotation.apply(&mut selection);
        assert_abs_diff_eq!(selection.uu[0], 100.0, epsilon = 1e-9);
        assert_abs_diff_eq!(selection.vv[0], -50.0, epsilon = 1e-9);
        assert_abs_diff_eq!(selection.ww[0], 7.0, epsilon = 1e-9);
        assert_abs_diff_eq!(selection.amps[0].im, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn rotation_onto_a_source_flattens_its_phase() {
        let (ra0, dec0) = (0.0f64, 0.0f64);
        let (ra, dec) = (1.0f64, 0.5f64);
        let (a, d, d0) = ((ra - ra0).to_radians(), dec.to_radians(), dec0.to_radians());
        let l = d.cos() * a.sin();
        let m = d.sin() * d0.cos() - d.cos() * d0.sin() * a.cos();
        let n = (1.0 - l * l - m * m).sqrt();

        let uvw = [(120.0, -80.0, 15.0), (-300.0, 40.0, -22.0), (55.0, 210.0, 3.0)];
        let mut selection = Selection::<f64> {
            uu: uvw.iter().map(|c| c.0).collect(),
            vv: uvw.iter().map(|c| c.1).collect(),
            ww: uvw.iter().map(|c| c.2).collect(),
            amps: uvw
                .iter()
                .map(|&(u, v, w)| {
                    let phase = 2.0 * std::f64::consts::PI * (u * l + v * m + w * (n - 1.0));
                    Complex::from_polar(1.0, phase)
                })
                .collect(),
            weights: vec![1.0; 3],
            times: vec![0.0; 3],
        };

        Rotation::new((ra0, dec0), (ra, dec)).apply(&mut selection);
        for amp in &selection.amps {
            assert_abs_diff_eq!(amp.re, 1.0, epsilon = 1e-9);
            assert_abs_diff_eq!(amp.im, 0.0, epsilon = 1e-9);
        }
    }
}
