use std::path::Path;

use ndarray::prelude::*;

/// Channel frequencies in Hz, shape (`channel_count`)
pub type FrequencyArray = Array1<f64>;

pub trait FrequencyArrayExtension {
    fn generate(start_hz: f64, increment_hz: f64, channel_count: usize) -> Self;
    fn from_file(path: &Path) -> Result<Self, ndarray_npy::ReadNpyError>
    where
        Self: Sized;
}

impl FrequencyArrayExtension for FrequencyArray {
    /// Evenly spaced channels starting at `start_hz`.
    fn generate(start_hz: f64, increment_hz: f64, channel_count: usize) -> Self {
        Array::from_iter((0..channel_count).map(|c| start_hz + c as f64 * increment_hz))
    }

    fn from_file(path: &Path) -> Result<Self, ndarray_npy::ReadNpyError>
    where
        Self: Sized,
    {
        ndarray_npy::read_npy(path)
    }
}
