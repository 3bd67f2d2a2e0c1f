//! The imager: accumulates visibility blocks onto per-plane grids and turns
//! them into images.
//!
//! An [`Imager`] is driven through an optional coordinate pass (needed for
//! uniform weighting and W-projection) followed by a full pass with
//! amplitudes, then [`Imager::finalize`]. Any error poisons the imager until
//! [`Imager::reset`].

use std::borrow::Cow;

use log::{debug, warn};
use num_complex::Complex;

use crate::{
    config::{Algorithm, DirectionMode, ImageType, ImagerConfig, Weighting},
    constants::SECONDS_PER_DAY,
    dataset::{VisBlock, VisHeader},
    error::{ErrorKind, ImagerError, Result},
    precision::{ComplexBuffer, ImagerFloat, RealBuffer},
    types::{Plane, WeightsGrid},
    util::print_param,
};

mod dft;
mod fft;
mod finalize;
mod select;
mod store;
mod weight;
mod wproj;

use dft::{DftPixels, update_plane_dft};
use fft::{FftKernel, update_plane_fft};
use finalize::{image_from_dft, image_from_grid, normalised_grid};
use select::{PolRule, Rotation, Rows, Selection};
use store::PlaneStore;
use wproj::{WKernels, update_plane_wproj};

pub use finalize::Finalized;
pub use store::{SkipCounts, WStats};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassState {
    Idle,
    CoordinatePass,
    FullPass,
}

/// One batch of visibilities.
///
/// `amplitudes` is `[channel - start_channel][row][pol]` and is absent for a
/// coordinate-only update. Coordinates are in metres, one per row;
/// `weights` are `[row][pol]`; `time_centroids` are in MJD seconds.
#[derive(Clone, Copy, Debug)]
pub struct UpdateRequest<'a> {
    pub num_rows: usize,
    pub start_channel: usize,
    pub end_channel: usize,
    pub num_pols: usize,
    pub uu: &'a RealBuffer,
    pub vv: &'a RealBuffer,
    pub ww: &'a RealBuffer,
    pub amplitudes: Option<&'a ComplexBuffer>,
    pub weights: &'a RealBuffer,
    pub time_centroids: &'a [f64],
}

/// Regularly spaced channels of the input data.
#[derive(Clone, Copy, Debug, PartialEq)]
struct ChannelAxis {
    start_hz: f64,
    inc_hz: f64,
    num: usize,
}

impl ChannelAxis {
    fn frequency(&self, channel: usize) -> f64 {
        self.start_hz + channel as f64 * self.inc_hz
    }
}

enum AlgorithmState<T> {
    Dft(DftPixels<T>),
    Fft(FftKernel<T>),
    WProjection(WKernels<T>),
}

pub struct Imager<T: ImagerFloat> {
    config: ImagerConfig,
    state: PassState,
    coords_frozen: bool,
    fault: Option<ErrorKind>,
    channels: Option<ChannelAxis>,
    /// Input channel indices inside the frequency range.
    selected_channels: Vec<usize>,
    im_freqs: Vec<f64>,
    vis_phase_centre_deg: Option<(f64, f64)>,
    store: PlaneStore<T>,
    w_stats: WStats,
    algorithm: Option<AlgorithmState<T>>,
    skipped: SkipCounts,
}

impl<T: ImagerFloat> Imager<T> {
    pub fn new(config: ImagerConfig) -> Result<Self> {
        config.validate()?;
        debug!(
            "Created {} imager, {} pixels, {} precision",
            config.algorithm,
            config.image_size,
            T::PRECISION
        );
        Ok(Self {
            config,
            state: PassState::Idle,
            coords_frozen: false,
            fault: None,
            channels: None,
            selected_channels: Vec::new(),
            im_freqs: Vec::new(),
            vis_phase_centre_deg: None,
            store: PlaneStore::new(),
            w_stats: WStats::default(),
            algorithm: None,
            skipped: SkipCounts::default(),
        })
    }

    pub fn config(&self) -> &ImagerConfig {
        &self.config
    }

    pub fn state(&self) -> PassState {
        self.state
    }

    /// Kind of the error that poisoned the imager, if any.
    pub fn fault(&self) -> Option<ErrorKind> {
        self.fault
    }

    pub fn num_planes(&self) -> usize {
        self.im_freqs.len() * self.config.image_type.num_pols()
    }

    /// Frequencies of the output channels in Hz.
    pub fn image_frequencies(&self) -> &[f64] {
        &self.im_freqs
    }

    pub fn plane_norms(&self) -> &[f64] {
        &self.store.norms
    }

    pub fn plane(&self, index: usize) -> Option<&Plane<T>> {
        self.store.planes.get(index)
    }

    pub fn weights_grid(&self, index: usize) -> Option<&WeightsGrid<T>> {
        self.store.weights_grids.get(index)
    }

    pub fn w_stats(&self) -> WStats {
        self.w_stats
    }

    pub fn skip_counts(&self) -> SkipCounts {
        self.skipped
    }

    fn guard(&self) -> Result<()> {
        match self.fault {
            Some(kind) => Err(ImagerError::AlreadyFailed(kind)),
            None => Ok(()),
        }
    }

    fn record<R>(&mut self, result: Result<R>) -> Result<R> {
        if let Err(e) = &result {
            self.fault.get_or_insert(e.kind());
        }
        result
    }

    /// Describe the channels of the input data.
    ///
    /// With channel snapshots every input channel inside the frequency range
    /// becomes an output channel; otherwise they are synthesised into one
    /// plane at their mean frequency.
    pub fn set_vis_frequency(&mut self, start_hz: f64, inc_hz: f64, num: usize) -> Result<()> {
        self.guard()?;
        let result = self.set_channels(ChannelAxis {
            start_hz,
            inc_hz,
            num,
        });
        self.record(result)
    }

    fn set_channels(&mut self, axis: ChannelAxis) -> Result<()> {
        if self.channels == Some(axis) {
            return Ok(());
        }
        let (min_hz, max_hz) = self.config.freq_range_hz;
        let selected: Vec<usize> = (0..axis.num)
            .filter(|&c| {
                let f = axis.frequency(c);
                f >= min_hz && (max_hz <= 0.0 || f <= max_hz)
            })
            .collect();
        if selected.is_empty() {
            return Err(ImagerError::InvalidArgument(format!(
                "no input channels inside {min_hz}..{max_hz} Hz"
            )));
        }

        let im_freqs: Vec<f64> = if self.config.channel_snapshots {
            selected.iter().map(|&c| axis.frequency(c)).collect()
        } else {
            let sum: f64 = selected.iter().map(|&c| axis.frequency(c)).sum();
            vec![sum / selected.len() as f64]
        };

        let planes = im_freqs.len() * self.config.image_type.num_pols();
        let allocated = self.store.planes.len().max(self.store.weights_grids.len());
        if allocated > 0 && allocated != planes {
            return Err(ImagerError::InvalidArgument(format!(
                "channel change would need {planes} planes, {allocated} already allocated"
            )));
        }

        self.channels = Some(axis);
        self.selected_channels = selected;
        self.im_freqs = im_freqs;
        Ok(())
    }

    pub fn set_vis_phase_centre(&mut self, ra_deg: f64, dec_deg: f64) -> Result<()> {
        self.guard()?;
        self.vis_phase_centre_deg = Some((ra_deg, dec_deg));
        Ok(())
    }

    /// Start gathering coordinates. Restarting a pass discards what the
    /// previous one gathered.
    pub fn begin_coordinate_pass(&mut self) -> Result<()> {
        self.guard()?;
        let result = self.start_coordinate_pass();
        self.record(result)
    }

    fn start_coordinate_pass(&mut self) -> Result<()> {
        if self.state == PassState::FullPass {
            return Err(ImagerError::Protocol(
                "coordinate pass started after amplitudes were gridded".into(),
            ));
        }
        self.state = PassState::CoordinatePass;
        self.coords_frozen = false;
        self.store.clear_weights_grids();
        self.w_stats = WStats::default();
        Ok(())
    }

    pub fn end_coordinate_pass(&mut self) -> Result<()> {
        self.guard()?;
        if self.state != PassState::CoordinatePass {
            let result = Err(ImagerError::Protocol(
                "no coordinate pass in progress".into(),
            ));
            return self.record(result);
        }
        self.state = PassState::Idle;
        self.coords_frozen = true;
        if self.config.algorithm == Algorithm::WProjection {
            print_param!("max |w|", format!("{:.3} wavelengths", self.w_stats.max));
            print_param!("rms |w|", format!("{:.3} wavelengths", self.w_stats.rms()));
        }
        Ok(())
    }

    /// Accumulate one batch. A batch without amplitudes feeds the coordinate
    /// pass.
    pub fn update(&mut self, request: &UpdateRequest<'_>) -> Result<()> {
        self.guard()?;
        let rows = Rows {
            num_rows: request.num_rows,
            start_channel: request.start_channel,
            end_channel: request.end_channel,
            num_pols: request.num_pols,
            uu: T::real_slice(request.uu),
            vv: T::real_slice(request.vv),
            ww: T::real_slice(request.ww),
            amplitudes: request.amplitudes.map(T::complex_slice),
            weights: T::real_slice(request.weights),
            time_centroids: request.time_centroids,
        };
        let result = self.update_rows(&rows);
        self.record(result)
    }

    /// Accumulate a block read from a dataset, taking channels, times and
    /// the phase centre from its header.
    pub fn update_from_block(&mut self, header: &VisHeader, block: &VisBlock) -> Result<()> {
        self.guard()?;
        let result = self.block_update(header, block);
        self.record(result)
    }

    fn block_update(&mut self, header: &VisHeader, block: &VisBlock) -> Result<()> {
        header.check_block_dims(block)?;
        self.set_channels(ChannelAxis {
            start_hz: header.freq_start_hz,
            inc_hz: header.freq_inc_hz,
            num: header.num_channels,
        })?;
        self.vis_phase_centre_deg = Some(header.phase_centre_deg);

        let (nt, nc, nb, np) = (
            block.num_times,
            block.num_channels,
            block.num_baselines,
            block.num_pols,
        );
        let num_rows = block.num_rows();
        let times: Vec<f64> = (0..nt)
            .flat_map(|t| std::iter::repeat_n(header.time_centroid(block.start_time_index + t), nb))
            .collect();
        let uu = T::real_slice(&block.uu);
        let vv = T::real_slice(&block.vv);
        let ww = T::real_slice(&block.ww);
        let weights: Cow<'_, [T]> = match &block.weights {
            Some(w) => T::real_slice(w),
            None => Cow::Owned(vec![T::one(); num_rows * np]),
        };
        let amplitudes = block.amplitudes.as_ref().map(T::complex_slice);
        if let Some(amps) = &amplitudes {
            let needed = num_rows * nc * np;
            if amps.len() < needed {
                return Err(ImagerError::MemoryNotAllocated {
                    what: "block amplitudes",
                    needed,
                    available: amps.len(),
                });
            }
        }

        for c in 0..nc {
            let channel_amps = amplitudes.as_ref().map(|amps| {
                let mut out = Vec::with_capacity(num_rows * np);
                for t in 0..nt {
                    let start = (t * nc + c) * nb * np;
                    out.extend_from_slice(&amps[start..start + nb * np]);
                }
                Cow::<[Complex<T>]>::Owned(out)
            });
            let rows = Rows {
                num_rows,
                start_channel: block.start_channel + c,
                end_channel: block.start_channel + c,
                num_pols: np,
                uu: Cow::Borrowed(&uu[..]),
                vv: Cow::Borrowed(&vv[..]),
                ww: Cow::Borrowed(&ww[..]),
                amplitudes: channel_amps,
                weights: Cow::Borrowed(&weights[..]),
                time_centroids: &times,
            };
            self.update_rows(&rows)?;
        }
        Ok(())
    }

    /// Everything that can be rejected is checked here, before any state
    /// changes.
    fn check_rows(&self, rows: &Rows<'_, T>) -> Result<Option<Rotation>> {
        if rows.num_pols != 1 && rows.num_pols != 4 {
            return Err(ImagerError::InvalidArgument(format!(
                "{} polarisations given, expected 1 or 4",
                rows.num_pols
            )));
        }
        if rows.end_channel < rows.start_channel {
            return Err(ImagerError::InvalidArgument(format!(
                "channel range {}..={} is empty",
                rows.start_channel, rows.end_channel
            )));
        }
        let Some(axis) = self.channels else {
            return Err(ImagerError::InvalidArgument(
                "visibility frequencies have not been set".into(),
            ));
        };
        if rows.end_channel >= axis.num {
            return Err(ImagerError::InvalidArgument(format!(
                "channel {} is outside the {} input channels",
                rows.end_channel, axis.num
            )));
        }
        if rows.num_pols == 1 && !self.config.image_type.accepts_scalar_input() {
            return Err(ImagerError::InvalidArgument(format!(
                "a {:?} image needs 4 polarisations, got scalar data",
                self.config.image_type
            )));
        }

        let rows_needed = rows.num_rows;
        check_len("baseline uu", rows_needed, rows.uu.len())?;
        check_len("baseline vv", rows_needed, rows.vv.len())?;
        check_len("baseline ww", rows_needed, rows.ww.len())?;
        check_len("time centroids", rows_needed, rows.time_centroids.len())?;
        check_len("weights", rows_needed * rows.num_pols, rows.weights.len())?;
        if let Some(amps) = &rows.amplitudes {
            let channels = rows.end_channel - rows.start_channel + 1;
            check_len(
                "amplitudes",
                rows_needed * rows.num_pols * channels,
                amps.len(),
            )?;
        }

        match (self.config.direction, self.vis_phase_centre_deg) {
            (DirectionMode::PhaseCentre, _) => Ok(None),
            (DirectionMode::Rotate { ra_deg, dec_deg }, Some(from)) => {
                Ok(Some(Rotation::new(from, (ra_deg, dec_deg))))
            }
            (DirectionMode::Rotate { .. }, None) => Err(ImagerError::InvalidArgument(
                "the data phase centre is needed to rotate the image centre".into(),
            )),
        }
    }

    fn update_rows(&mut self, rows: &Rows<'_, T>) -> Result<()> {
        let rotation = self.check_rows(rows)?;
        let coords_only = rows.amplitudes.is_none();
        self.prepare_pass(coords_only)?;

        let Some(axis) = self.channels else {
            return Ok(());
        };
        let num_pols = self.config.image_type.num_pols();
        let scale = self.config.plane_size() as f64 * self.config.cellsize_rad;
        let (min_mjd, max_mjd) = self.config.time_range_mjd;
        let (min_uv, max_uv) = self.config.uv_range_lambda;

        for c in 0..self.im_freqs.len() {
            for p in 0..num_pols {
                let channels = if self.config.channel_snapshots {
                    &self.selected_channels[c..=c]
                } else {
                    &self.selected_channels[..]
                };
                let rule = PolRule::new(self.config.image_type, rows.num_pols, p);
                let mut selection = Selection::gather(rows, channels, |ch| axis.frequency(ch), rule);
                if selection.is_empty() {
                    continue;
                }
                if let Some(rotation) = &rotation {
                    rotation.apply(&mut selection);
                }
                if !coords_only && self.config.image_type == ImageType::Psf {
                    selection.set_unit_amplitudes();
                }
                selection.filter_time(min_mjd * SECONDS_PER_DAY, max_mjd * SECONDS_PER_DAY);
                selection.filter_uv(min_uv, max_uv);
                if selection.is_empty() {
                    continue;
                }

                let index = c * num_pols + p;
                if coords_only {
                    self.update_coordinates(index, &selection, scale);
                } else {
                    self.update_plane(index, selection, scale)?;
                }
            }
        }
        Ok(())
    }

    /// Move between passes and allocate what the pass needs.
    fn prepare_pass(&mut self, coords_only: bool) -> Result<()> {
        match (self.state, coords_only) {
            (PassState::FullPass, true) => {
                return Err(ImagerError::Protocol(
                    "coordinate-only update during the full pass".into(),
                ));
            }
            (PassState::CoordinatePass, false) => {
                return Err(ImagerError::Protocol(
                    "amplitudes given before the coordinate pass was ended".into(),
                ));
            }
            (PassState::Idle, true) => self.start_coordinate_pass()?,
            (PassState::Idle, false) => {
                if self.config.requires_coordinate_pass() && !self.coords_frozen {
                    return Err(ImagerError::Protocol(format!(
                        "{} imaging with {} weighting needs a coordinate pass first",
                        self.config.algorithm, self.config.weighting
                    )));
                }
                self.algorithm = Some(self.init_algorithm()?);
                self.state = PassState::FullPass;
            }
            (PassState::CoordinatePass, true) | (PassState::FullPass, false) => {}
        }

        let (planes, size) = (self.num_planes(), self.config.plane_size());
        if self.config.weighting == Weighting::Uniform {
            self.store.ensure_weights_grids(planes, size)?;
        }
        if !coords_only {
            self.store.ensure_planes(planes, size)?;
        }
        Ok(())
    }

    fn init_algorithm(&self) -> Result<AlgorithmState<T>> {
        let config = &self.config;
        Ok(match config.algorithm {
            Algorithm::Dft2d | Algorithm::Dft3d => {
                AlgorithmState::Dft(DftPixels::new(config.image_size, config.cellsize_rad))
            }
            Algorithm::Fft => {
                AlgorithmState::Fft(FftKernel::new(config.grid_kernel, config.plane_size()))
            }
            Algorithm::WProjection => AlgorithmState::WProjection(WKernels::new(
                &self.w_stats,
                config.plane_size(),
                config.cellsize_rad,
                config.num_w_planes,
                config.w_support,
            )?),
        })
    }

    fn update_coordinates(&mut self, index: usize, selection: &Selection<T>, scale: f64) {
        if self.config.weighting == Weighting::Uniform {
            let skipped = weight::bin_weights(
                &selection.uu,
                &selection.vv,
                &selection.weights,
                scale,
                &mut self.store.weights_grids[index],
            );
            if skipped > 0 {
                warn!("Skipped {skipped} visibility weights");
                self.skipped.weights += skipped;
            }
        }
        if self.config.algorithm == Algorithm::WProjection {
            self.w_stats.update(&selection.ww);
        }
    }

    fn update_plane(&mut self, index: usize, mut selection: Selection<T>, scale: f64) -> Result<()> {
        let grid = self.store.weights_grids.get(index);
        let skipped = weight::apply(
            self.config.weighting,
            &selection.uu,
            &selection.vv,
            &mut selection.weights,
            scale,
            grid,
        );
        if skipped > 0 {
            warn!("Skipped {skipped} visibility weights");
            self.skipped.weights += skipped;
        }

        let plane = &mut self.store.planes[index];
        let (norm, skipped) = match &self.algorithm {
            Some(AlgorithmState::Dft(pixels)) => {
                let three_d = self.config.algorithm == Algorithm::Dft3d;
                (update_plane_dft(pixels, three_d, &selection, plane), 0)
            }
            Some(AlgorithmState::Fft(kernel)) => update_plane_fft(kernel, &selection, scale, plane),
            Some(AlgorithmState::WProjection(kernels)) => {
                selection.sort_by_abs_w();
                update_plane_wproj(kernels, &selection, scale, plane)
            }
            None => {
                return Err(ImagerError::Protocol(
                    "imaging algorithm was not initialised".into(),
                ));
            }
        };
        if skipped > 0 {
            warn!("Skipped {skipped} visibility points");
            self.skipped.points += skipped;
        }
        self.store.norms[index] += norm;
        Ok(())
    }

    /// Normalise and transform the first `image_count` planes to images and
    /// return the first `grid_count` normalised uv grids.
    pub fn finalize(&mut self, image_count: usize, grid_count: usize) -> Result<Finalized<T>> {
        self.guard()?;
        let result = self.finalize_planes(image_count, grid_count);
        self.record(result)
    }

    fn finalize_planes(&self, image_count: usize, grid_count: usize) -> Result<Finalized<T>> {
        let planes = self.num_planes();
        if image_count > planes || grid_count > planes {
            return Err(ImagerError::InvalidArgument(format!(
                "asked for {image_count} images and {grid_count} grids from {planes} planes"
            )));
        }
        if grid_count > 0 && self.config.algorithm.is_dft() {
            return Err(ImagerError::InvalidArgument(format!(
                "the {} algorithm makes no uv grids",
                self.config.algorithm
            )));
        }

        let image_size = self.config.image_size;
        let grid_size = self.config.plane_size();
        if !self.store.has_planes() {
            return Ok(Finalized {
                images: vec![ndarray::Array2::zeros((image_size, image_size)); image_count],
                grids: vec![ndarray::Array2::zeros((grid_size, grid_size)); grid_count],
            });
        }

        let mut images = Vec::with_capacity(image_count);
        for i in 0..image_count {
            let (plane, norm) = (&self.store.planes[i], self.store.norms[i]);
            let image = match &self.algorithm {
                Some(AlgorithmState::Dft(_)) => image_from_dft(plane, norm),
                Some(AlgorithmState::Fft(kernel)) => {
                    image_from_grid(plane, norm, image_size, &kernel.correction)?
                }
                Some(AlgorithmState::WProjection(kernels)) => {
                    image_from_grid(plane, norm, image_size, &kernels.correction)?
                }
                None => ndarray::Array2::zeros((image_size, image_size)),
            };
            images.push(image);
        }
        let grids = (0..grid_count)
            .map(|i| normalised_grid(&self.store.planes[i], self.store.norms[i]))
            .collect();

        Ok(Finalized { images, grids })
    }

    /// Return to the freshly created state, keeping the configuration and
    /// the channel and phase-centre settings.
    pub fn reset(&mut self) {
        self.state = PassState::Idle;
        self.coords_frozen = false;
        self.fault = None;
        self.store.clear();
        self.w_stats = WStats::default();
        self.algorithm = None;
        self.skipped = SkipCounts::default();
    }
}

fn check_len(what: &'static str, needed: usize, available: usize) -> Result<()> {
    if available < needed {
        Err(ImagerError::MemoryNotAllocated {
            what,
            needed,
            available,
        })
    } else {
        Ok(())
    }
}
