//! Visibility dataset readers.
//!
//! Every source is exposed as a [`VisHeader`] plus a sequence of [`VisBlock`]s
//! in increasing time order.

use std::path::Path;

use crate::{
    constants::SECONDS_PER_DAY,
    error::{ImagerError, Result},
    precision::{ComplexBuffer, Precision, RealBuffer},
};

mod binary;
#[cfg(feature = "ms")]
mod ms;
mod npy;

pub use binary::{BinaryReader, BinaryWriter};
#[cfg(feature = "ms")]
pub use ms::MsReader;
pub use npy::{NpyReader, write_npy_dataset};

/// Dataset-wide metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct VisHeader {
    pub num_channels: usize,
    pub freq_start_hz: f64,
    pub freq_inc_hz: f64,
    pub num_times: usize,
    /// Start of the first time sample, MJD(UTC) in days.
    pub time_start_mjd_utc: f64,
    pub time_inc_sec: f64,
    pub max_times_per_block: usize,
    pub num_stations: usize,
    pub num_baselines: usize,
    pub num_pols: usize,
    pub phase_centre_deg: (f64, f64),
    /// Storage precision of coordinates and amplitudes.
    pub precision: Precision,
}

impl VisHeader {
    pub fn num_blocks(&self) -> usize {
        if self.max_times_per_block == 0 {
            0
        } else {
            self.num_times.div_ceil(self.max_times_per_block)
        }
    }

    /// Time centroid of sample `time_index` in MJD seconds.
    pub fn time_centroid(&self, time_index: usize) -> f64 {
        self.time_start_mjd_utc * SECONDS_PER_DAY + (time_index as f64 + 0.5) * self.time_inc_sec
    }

    pub(crate) fn check_block_dims(&self, block: &VisBlock) -> Result<()> {
        if block.num_baselines != self.num_baselines || block.num_pols != self.num_pols {
            return Err(ImagerError::InvalidArgument(format!(
                "block has {} baselines x {} pols, header says {} x {}",
                block.num_baselines, block.num_pols, self.num_baselines, self.num_pols
            )));
        }
        let end_channel = block.start_channel + block.num_channels;
        if end_channel > self.num_channels {
            return Err(ImagerError::InvalidArgument(format!(
                "block channels {}..{end_channel} exceed the {} channels of the header",
                block.start_channel, self.num_channels
            )));
        }
        Ok(())
    }
}

/// Cross-correlation data for a contiguous range of times and channels.
///
/// Coordinates are in metres, `[time][baseline]`. Amplitudes are
/// `[time][channel][baseline][pol]` and weights `[time][baseline][pol]`.
#[derive(Clone, Debug, PartialEq)]
pub struct VisBlock {
    pub start_time_index: usize,
    pub start_channel: usize,
    pub num_times: usize,
    pub num_channels: usize,
    pub num_baselines: usize,
    pub num_pols: usize,
    pub uu: RealBuffer,
    pub vv: RealBuffer,
    pub ww: RealBuffer,
    /// Absent when only coordinates were read.
    pub amplitudes: Option<ComplexBuffer>,
    /// Absent when the source stores no weights; all weights are then one.
    pub weights: Option<RealBuffer>,
}

impl VisBlock {
    pub fn num_rows(&self) -> usize {
        self.num_times * self.num_baselines
    }
}

pub trait VisReader {
    fn header(&self) -> &VisHeader;

    fn num_blocks(&self) -> usize {
        self.header().num_blocks()
    }

    /// Read block `index`. Amplitudes are skipped with `coords_only`.
    fn read_block(&mut self, index: usize, coords_only: bool) -> Result<VisBlock>;

    fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

/// Open a dataset, choosing the reader from the path.
///
/// `*.ms` and `*.MS` are Measurement Sets, directories are npy datasets and
/// anything else is a tagged binary container.
pub fn open_dataset(path: &Path, ms_column: &str) -> Result<Box<dyn VisReader>> {
    let is_ms = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("ms"));

    if is_ms {
        open_ms(path, ms_column)
    } else if path.is_dir() {
        Ok(Box::new(NpyReader::open(path)?))
    } else {
        Ok(Box::new(BinaryReader::open(path)?))
    }
}

#[cfg(feature = "ms")]
fn open_ms(path: &Path, ms_column: &str) -> Result<Box<dyn VisReader>> {
    Ok(Box::new(MsReader::open(path, ms_column)?))
}

#[cfg(not(feature = "ms"))]
fn open_ms(path: &Path, _ms_column: &str) -> Result<Box<dyn VisReader>> {
    Err(ImagerError::FunctionNotAvailable(format!(
        "{} is a Measurement Set; rebuild with the `ms` feature to read it",
        path.display()
    )))
}
