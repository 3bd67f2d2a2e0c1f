//! Streaming radio-interferometric imager.
//!
//! Visibility blocks are read from a dataset one at a time and accumulated
//! onto per-channel, per-polarisation planes with a direct Fourier
//! transform, FFT gridding or W-projection, then normalised and transformed
//! to images. See [`Imager`] for the update protocol and [`run::run`] for a
//! complete pass over a dataset.

pub mod cli;
pub mod config;
pub mod constants;
pub mod dataset;
pub mod error;
pub mod imager;
pub mod input;
pub mod precision;
pub mod run;
pub mod types;
mod util;

pub use config::ImagerConfig;
pub use error::{ErrorKind, ImagerError, Result};
pub use imager::{Finalized, Imager, UpdateRequest};
