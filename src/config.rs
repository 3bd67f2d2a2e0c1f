//! Imaging configuration.
//!
//! The configuration is read-only once an [`Imager`](crate::Imager) has been
//! created from it.

use std::{fmt, path::PathBuf, str::FromStr};

use crate::{
    constants::DEFAULT_GRID_PADDING,
    error::{ImagerError, Result},
    precision::Precision,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Algorithm {
    Dft2d,
    Dft3d,
    Fft,
    WProjection,
}

impl Algorithm {
    pub fn is_dft(self) -> bool {
        matches!(self, Algorithm::Dft2d | Algorithm::Dft3d)
    }
}

impl FromStr for Algorithm {
    type Err = ImagerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "dft2d" | "dft-2d" | "dft 2d" => Ok(Algorithm::Dft2d),
            "dft3d" | "dft-3d" | "dft 3d" => Ok(Algorithm::Dft3d),
            "fft" => Ok(Algorithm::Fft),
            "wproj" | "w-projection" | "wprojection" => Ok(Algorithm::WProjection),
            other => Err(ImagerError::FunctionNotAvailable(format!(
                "unknown imaging algorithm '{other}'"
            ))),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Algorithm::Dft2d => "DFT 2D",
            Algorithm::Dft3d => "DFT 3D",
            Algorithm::Fft => "FFT",
            Algorithm::WProjection => "W-projection",
        };
        write!(f, "{name}")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Weighting {
    Natural,
    Radial,
    Uniform,
}

impl FromStr for Weighting {
    type Err = ImagerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "natural" => Ok(Weighting::Natural),
            "radial" => Ok(Weighting::Radial),
            "uniform" => Ok(Weighting::Uniform),
            other => Err(ImagerError::FunctionNotAvailable(format!(
                "unknown weighting '{other}'"
            ))),
        }
    }
}

impl fmt::Display for Weighting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Weighting::Natural => "natural",
            Weighting::Radial => "radial",
            Weighting::Uniform => "uniform",
        };
        write!(f, "{name}")
    }
}

/// The quantity each output plane holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageType {
    I,
    Q,
    U,
    V,
    XX,
    XY,
    YX,
    YY,
    /// All four Stokes parameters, I, Q, U and V.
    Stokes,
    /// All four linear correlations, XX, XY, YX and YY.
    Linear,
    /// Point-spread function; amplitudes are replaced by one.
    Psf,
}

impl ImageType {
    /// Number of output polarisation planes per channel.
    pub fn num_pols(self) -> usize {
        match self {
            ImageType::Stokes | ImageType::Linear => 4,
            _ => 1,
        }
    }

    pub fn uses_stokes(self) -> bool {
        matches!(
            self,
            ImageType::I | ImageType::Q | ImageType::U | ImageType::V | ImageType::Stokes
        )
    }

    /// Index of the first output polarisation within the 4-element set.
    pub fn pol_offset(self) -> usize {
        match self {
            ImageType::Q | ImageType::XY => 1,
            ImageType::U | ImageType::YX => 2,
            ImageType::V | ImageType::YY => 3,
            _ => 0,
        }
    }

    /// A scalar input can only make total-intensity or PSF images.
    pub fn accepts_scalar_input(self) -> bool {
        matches!(self, ImageType::I | ImageType::Psf)
    }

    pub fn pol_label(self, pol: usize) -> &'static str {
        const STOKES: [&str; 4] = ["I", "Q", "U", "V"];
        const LINEAR: [&str; 4] = ["XX", "XY", "YX", "YY"];
        match self {
            ImageType::Psf => "PSF",
            t if t.uses_stokes() => STOKES[(t.pol_offset() + pol) % 4],
            t => LINEAR[(t.pol_offset() + pol) % 4],
        }
    }
}

impl FromStr for ImageType {
    type Err = ImagerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "I" => Ok(ImageType::I),
            "Q" => Ok(ImageType::Q),
            "U" => Ok(ImageType::U),
            "V" => Ok(ImageType::V),
            "XX" => Ok(ImageType::XX),
            "XY" => Ok(ImageType::XY),
            "YX" => Ok(ImageType::YX),
            "YY" => Ok(ImageType::YY),
            "STOKES" | "IQUV" => Ok(ImageType::Stokes),
            "LINEAR" => Ok(ImageType::Linear),
            "PSF" => Ok(ImageType::Psf),
            other => Err(ImagerError::InvalidArgument(format!(
                "unknown image type '{other}'"
            ))),
        }
    }
}

/// Convolution kernel used by FFT gridding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum GridKernel {
    /// Nearest-cell gridding.
    Pillbox,
    /// Triangle function over one cell either side.
    Linear,
    /// Prolate spheroidal anti-aliasing function.
    #[default]
    Spheroidal,
}

impl FromStr for GridKernel {
    type Err = ImagerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pillbox" | "nearest" => Ok(GridKernel::Pillbox),
            "linear" | "triangle" => Ok(GridKernel::Linear),
            "spheroidal" | "sph" => Ok(GridKernel::Spheroidal),
            other => Err(ImagerError::FunctionNotAvailable(format!(
                "unknown gridding kernel '{other}'"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum DirectionMode {
    /// Image at the phase centre of the data.
    #[default]
    PhaseCentre,
    /// Rotate baselines and visibilities to a new image centre.
    Rotate { ra_deg: f64, dec_deg: f64 },
}

#[derive(Clone, Debug, PartialEq)]
pub struct ImagerConfig {
    pub algorithm: Algorithm,
    pub weighting: Weighting,
    pub image_type: ImageType,
    pub precision: Precision,

    /// Side length of the output images in pixels.
    pub image_size: usize,
    /// Angular size of an image pixel in radians.
    pub cellsize_rad: f64,
    /// Grid side length relative to the image for FFT-based algorithms.
    pub grid_padding: f64,
    pub grid_kernel: GridKernel,
    pub num_w_planes: Option<usize>,
    pub w_support: Option<usize>,

    pub direction: DirectionMode,
    /// One plane per selected channel instead of frequency synthesis.
    pub channel_snapshots: bool,
    /// Frequency range in Hz; an upper limit of zero or less is unbounded.
    pub freq_range_hz: (f64, f64),
    /// Time centroid range as MJD(UTC); an upper limit of zero or less is
    /// unbounded.
    pub time_range_mjd: (f64, f64),
    /// Range of time indices to read from a dataset, inclusive.
    pub time_index_range: (usize, Option<usize>),
    /// Baseline length range in wavelengths; a negative upper limit is
    /// unbounded.
    pub uv_range_lambda: (f64, f64),

    /// Column read from Measurement Sets.
    pub ms_column: String,
    pub input_path: Option<PathBuf>,
    pub output_root: Option<PathBuf>,
    pub write_images: bool,
    pub write_grids: bool,
}

impl Default for ImagerConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Fft,
            weighting: Weighting::Natural,
            image_type: ImageType::I,
            precision: Precision::Double,
            image_size: 256,
            cellsize_rad: (2.0f64 / 256.0).to_radians(),
            grid_padding: DEFAULT_GRID_PADDING,
            grid_kernel: GridKernel::Spheroidal,
            num_w_planes: None,
            w_support: None,
            direction: DirectionMode::PhaseCentre,
            channel_snapshots: false,
            freq_range_hz: (0.0, 0.0),
            time_range_mjd: (0.0, 0.0),
            time_index_range: (0, None),
            uv_range_lambda: (0.0, -1.0),
            ms_column: "DATA".into(),
            input_path: None,
            output_root: None,
            write_images: true,
            write_grids: false,
        }
    }
}

impl ImagerConfig {
    pub fn new(algorithm: Algorithm, image_size: usize, fov_deg: f64) -> Self {
        Self {
            algorithm,
            image_size,
            cellsize_rad: (fov_deg / image_size as f64).to_radians(),
            ..Self::default()
        }
    }

    pub fn fov_rad(&self) -> f64 {
        self.cellsize_rad * self.image_size as f64
    }

    /// Side length of the accumulation planes.
    ///
    /// Direct transforms accumulate straight onto the image; gridding
    /// algorithms use a padded grid with an even side length.
    pub fn plane_size(&self) -> usize {
        if self.algorithm.is_dft() {
            self.image_size
        } else {
            let padded = (self.image_size as f64 * self.grid_padding).ceil() as usize;
            padded + padded % 2
        }
    }

    /// Whether the dataset has to be read once for coordinates before the
    /// amplitudes are gridded.
    pub fn requires_coordinate_pass(&self) -> bool {
        self.weighting == Weighting::Uniform || self.algorithm == Algorithm::WProjection
    }

    pub fn validate(&self) -> Result<()> {
        if self.image_size == 0 {
            return Err(ImagerError::InvalidArgument(
                "image size must be at least one pixel".into(),
            ));
        }
        if !(self.cellsize_rad.is_finite() && self.cellsize_rad > 0.0) {
            return Err(ImagerError::InvalidArgument(format!(
                "cell size must be positive, got {} rad",
                self.cellsize_rad
            )));
        }
        if !self.algorithm.is_dft() && self.grid_padding < 1.0 {
            return Err(ImagerError::InvalidArgument(format!(
                "grid padding must be at least 1, got {}",
                self.grid_padding
            )));
        }
        if self.weighting == Weighting::Uniform && self.algorithm.is_dft() && self.image_size < 2
        {
            return Err(ImagerError::InvalidArgument(
                "uniform weighting needs a grid of at least 2 cells".into(),
            ));
        }
        if matches!(self.num_w_planes, Some(0)) {
            return Err(ImagerError::InvalidArgument(
                "number of W-planes must be positive".into(),
            ));
        }
        if let (start, Some(end)) = self.time_index_range {
            if end < start {
                return Err(ImagerError::InvalidArgument(format!(
                    "time index range {start}..={end} is empty"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_selectors_are_not_available() {
        let algorithm = "gridless".parse::<Algorithm>().unwrap_err();
        assert!(matches!(algorithm, ImagerError::FunctionNotAvailable(_)));
        let weighting = "briggs".parse::<Weighting>().unwrap_err();
        assert!(matches!(weighting, ImagerError::FunctionNotAvailable(_)));
        assert_eq!("W-Projection".parse::<Algorithm>().unwrap(), Algorithm::WProjection);
    }

    #[test]
    fn padded_plane_size_is_even() {
        let mut config = ImagerConfig::new(Algorithm::Fft, 101, 1.0);
        config.grid_padding = 1.2;
        assert_eq!(config.plane_size(), 122);
        config.algorithm = Algorithm::Dft2d;
        assert_eq!(config.plane_size(), 101);
    }

    #[test]
    fn pol_labels_follow_offsets() {
        assert_eq!(ImageType::Stokes.pol_label(3), "V");
        assert_eq!(ImageType::YX.pol_label(0), "YX");
        assert_eq!(ImageType::Psf.pol_label(0), "PSF");
        assert!(!ImageType::Q.accepts_scalar_input());
    }

    #[test]
    fn coordinate_pass_needed_for_uniform_or_wproj() {
        let mut config = ImagerConfig::new(Algorithm::Fft, 64, 1.0);
        assert!(!config.requires_coordinate_pass());
        config.weighting = Weighting::Uniform;
        assert!(config.requires_coordinate_pass());
        config.weighting = Weighting::Radial;
        config.algorithm = Algorithm::WProjection;
        assert!(config.requires_coordinate_pass());
    }
}
