//! Directory of npy arrays, as written by the `generate` command.
//!
//! - `uvw.npy`: [`Uvw`] records in metres, shape (baseline, time)
//! - `frequencies.npy`: evenly spaced channel frequencies in Hz
//! - `visibilities.npy`: `complex64`, shape (baseline, time, channel, pol)
//! - `weights.npy` (optional): `float32`, shape (baseline, time, pol)
//! - `header.npy` (optional): `[time_start_mjd, time_inc_sec, ra_deg, dec_deg]`
//!
//! Each time sample is one block.

use std::path::{Path, PathBuf};

use log::debug;
use ndarray::prelude::*;
use ndarray_npy::{read_npy, write_npy};

use super::{VisBlock, VisHeader, VisReader};
use crate::{
    error::{ImagerError, Result},
    precision::{ComplexBuffer, Precision, RealBuffer},
    types::{
        FrequencyArray, FrequencyArrayExtension, UvwArray, UvwArrayExtension, VisibilityArray,
        VisibilityArrayExtension,
    },
};

const UVW_FILE: &str = "uvw.npy";
const FREQUENCIES_FILE: &str = "frequencies.npy";
const VISIBILITIES_FILE: &str = "visibilities.npy";
const WEIGHTS_FILE: &str = "weights.npy";
const HEADER_FILE: &str = "header.npy";

pub struct NpyReader {
    dir: PathBuf,
    header: VisHeader,
    uvw: UvwArray,
    visibilities: VisibilityArray,
    weights: Option<Array3<f32>>,
}

impl NpyReader {
    pub fn open(dir: &Path) -> Result<Self> {
        let uvw = UvwArray::from_file(&dir.join(UVW_FILE))?;
        let frequencies = FrequencyArray::from_file(&dir.join(FREQUENCIES_FILE))?;
        let visibilities = VisibilityArray::from_file(&dir.join(VISIBILITIES_FILE))?;

        let weights_path = dir.join(WEIGHTS_FILE);
        let weights: Option<Array3<f32>> = if weights_path.exists() {
            Some(read_npy(&weights_path)?)
        } else {
            None
        };

        let header_path = dir.join(HEADER_FILE);
        let extra: Array1<f64> = if header_path.exists() {
            read_npy(&header_path)?
        } else {
            Array1::zeros(4)
        };
        if extra.len() != 4 {
            return Err(ImagerError::file_io(
                header_path,
                "expected [time_start_mjd, time_inc_sec, ra_deg, dec_deg]",
            ));
        }

        let (num_baselines, num_times) = uvw.dim();
        let (vis_baselines, vis_times, num_channels, num_pols) = visibilities.dim();
        if (vis_baselines, vis_times) != (num_baselines, num_times)
            || num_channels != frequencies.len()
        {
            return Err(ImagerError::file_io(
                dir.join(VISIBILITIES_FILE),
                format!(
                    "shape {:?} does not match {num_baselines} baselines, {num_times} times and {} channels",
                    visibilities.dim(),
                    frequencies.len()
                ),
            ));
        }
        if let Some(w) = &weights {
            if w.dim() != (num_baselines, num_times, num_pols) {
                return Err(ImagerError::file_io(
                    weights_path,
                    format!("shape {:?} does not match the visibilities", w.dim()),
                ));
            }
        }

        let (freq_start_hz, freq_inc_hz) = channel_axis(&frequencies)?;
        debug!(
            "{}: {num_baselines} baselines, {num_times} times, {num_channels} channels",
            dir.display()
        );

        let header = VisHeader {
            num_channels,
            freq_start_hz,
            freq_inc_hz,
            num_times,
            time_start_mjd_utc: extra[0],
            time_inc_sec: extra[1],
            max_times_per_block: 1,
            num_stations: stations_for(num_baselines),
            num_baselines,
            num_pols,
            phase_centre_deg: (extra[2], extra[3]),
            precision: Precision::Single,
        };

        Ok(NpyReader {
            dir: dir.to_path_buf(),
            header,
            uvw,
            visibilities,
            weights,
        })
    }
}

impl VisReader for NpyReader {
    fn header(&self) -> &VisHeader {
        &self.header
    }

    fn read_block(&mut self, index: usize, coords_only: bool) -> Result<VisBlock> {
        if index >= self.header.num_times {
            return Err(ImagerError::file_io(
                &self.dir,
                format!(
                    "missing block {index} in a dataset of {} blocks",
                    self.header.num_times
                ),
            ));
        }

        let uvw = self.uvw.column(index);
        let uu = uvw.iter().map(|c| c.u).collect();
        let vv = uvw.iter().map(|c| c.v).collect();
        let ww = uvw.iter().map(|c| c.w).collect();

        let amplitudes = (!coords_only).then(|| {
            // (baseline, channel, pol) -> [channel][baseline][pol]
            let vis = self.visibilities.index_axis(Axis(1), index);
            ComplexBuffer::Single(vis.permuted_axes([1, 0, 2]).iter().copied().collect())
        });
        let weights = self.weights.as_ref().map(|w| {
            RealBuffer::Single(w.index_axis(Axis(1), index).iter().copied().collect())
        });

        Ok(VisBlock {
            start_time_index: index,
            start_channel: 0,
            num_times: 1,
            num_channels: self.header.num_channels,
            num_baselines: self.header.num_baselines,
            num_pols: self.header.num_pols,
            uu: RealBuffer::Double(uu),
            vv: RealBuffer::Double(vv),
            ww: RealBuffer::Double(ww),
            amplitudes,
            weights,
        })
    }
}

/// Write the arrays of an npy dataset into `dir`, creating it if needed.
pub fn write_npy_dataset(
    dir: &Path,
    uvw: &UvwArray,
    frequencies: &FrequencyArray,
    visibilities: &VisibilityArray,
    time_start_mjd: f64,
    time_inc_sec: f64,
    phase_centre_deg: (f64, f64),
) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| ImagerError::file_io(dir, e))?;
    write_npy(dir.join(UVW_FILE), uvw)?;
    write_npy(dir.join(FREQUENCIES_FILE), frequencies)?;
    write_npy(dir.join(VISIBILITIES_FILE), visibilities)?;
    let header = array![
        time_start_mjd,
        time_inc_sec,
        phase_centre_deg.0,
        phase_centre_deg.1
    ];
    write_npy(dir.join(HEADER_FILE), &header)?;
    Ok(())
}

/// Start and increment of an evenly spaced channel axis.
fn channel_axis(frequencies: &FrequencyArray) -> Result<(f64, f64)> {
    let start = frequencies.first().copied().unwrap_or(0.0);
    if frequencies.len() < 2 {
        return Ok((start, 0.0));
    }
    let inc = frequencies[1] - frequencies[0];
    let tolerance = 1e-6 * inc.abs().max(1.0);
    let even = frequencies
        .iter()
        .enumerate()
        .all(|(c, &f)| (f - (start + c as f64 * inc)).abs() <= tolerance);
    if even {
        Ok((start, inc))
    } else {
        Err(ImagerError::InvalidArgument(
            "channel frequencies must be evenly spaced".into(),
        ))
    }
}

/// Number of stations that form `num_baselines` cross-correlated pairs, or
/// zero if there is no such number.
fn stations_for(num_baselines: usize) -> usize {
    let n = ((1.0 + (1.0 + 8.0 * num_baselines as f64).sqrt()) / 2.0).round() as usize;
    if n * n.saturating_sub(1) / 2 == num_baselines {
        n
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::ErrorKind,
        types::{PointSource, UvwTracks},
    };
    use approx::assert_abs_diff_eq;

    fn dataset(dir: &Path) -> (UvwArray, VisibilityArray) {
        let uvw = UvwArray::generate(&UvwTracks {
            baseline_count: 6,
            timestep_count: 3,
            time_inc_sec: 10.0,
            max_baseline_m: 500.0,
            ellipticity: None,
            w_fraction: 0.0,
            random_seed: Some(1),
        });
        let frequencies = FrequencyArray::generate(150e6, 2e6, 4);
        let sources = [PointSource {
            l: 0.01,
            m: -0.02,
            flux: 3.0,
        }];
        let vis = VisibilityArray::generate(&sources, 4, &frequencies, &uvw);
        write_npy_dataset(dir, &uvw, &frequencies, &vis, 60_000.0, 10.0, (0.0, -27.0)).unwrap();
        (uvw, vis)
    }

    #[test]
    fn reads_one_block_per_time() {
        let dir = tempfile::tempdir().unwrap();
        let (uvw, vis) = dataset(dir.path());
        let mut reader = NpyReader::open(dir.path()).unwrap();

        let header = reader.header().clone();
        assert_eq!(header.num_blocks(), 3);
        assert_eq!(header.num_stations, 4);
        assert_abs_diff_eq!(header.freq_inc_hz, 2e6);
        assert_abs_diff_eq!(header.phase_centre_deg.1, -27.0);

        let block = reader.read_block(2, false).unwrap();
        assert_eq!(block.num_rows(), 6);
        let RealBuffer::Double(ww) = &block.ww else {
            panic!("coordinates should be double precision");
        };
        assert_abs_diff_eq!(ww[4], uvw[(4, 2)].w);

        let Some(ComplexBuffer::Single(amps)) = &block.amplitudes else {
            panic!("amplitudes should be present");
        };
        // channel 3, baseline 5, pol 0
        assert_eq!(amps[(3 * 6 + 5) * 4], vis[(5, 2, 3, 0)]);
        assert!(block.weights.is_none());

        let err = reader.read_block(3, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileIo);
    }

    #[test]
    fn uneven_channels_are_rejected() {
        let frequencies = FrequencyArray::from(vec![1e8, 1.1e8, 1.3e8]);
        assert!(channel_axis(&frequencies).is_err());
        assert_eq!(stations_for(10), 5);
        assert_eq!(stations_for(7), 0);
    }
}
