use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::{
    config::{DirectionMode, ImagerConfig},
    error::{ImagerError, Result},
    input::SimulationParams,
};

/// Command-line options
#[derive(Parser, Debug)]
#[command(version, about, long_about = Some("Streaming visibility imager"))]
pub struct Cli {
    /// More log output: -v for debug, -vv for trace
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Simulate point sources and write them as a dataset
    Generate(GenerateArgs),
    /// Make images from a dataset
    Image(ImageArgs),
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Output path: a directory of npy files, or a file with --binary
    #[arg(value_name = "OUTPUT_PATH")]
    pub output: PathBuf,

    /// Write a tagged binary container instead of npy files
    #[arg(long)]
    pub binary: bool,

    /// Times per block in the binary container
    #[arg(long, default_value = "16")]
    pub max_times_per_block: usize,

    /// Store the binary container in single precision
    #[arg(long)]
    pub single: bool,

    /// Length of the observation in hours
    #[arg(long, default_value = "1.0")]
    pub observation_hours: f64,

    /// Integration time in seconds
    #[arg(long, default_value = "60.0")]
    pub time_inc_sec: f64,

    /// Start of the observation, MJD(UTC)
    #[arg(long, default_value = "60000.0")]
    pub time_start_mjd: f64,

    /// Number of frequency channels
    #[arg(long, default_value = "4")]
    pub channel_count: usize,

    /// Number of stations
    #[arg(long, default_value = "20")]
    pub station_count: usize,

    /// Starting frequency in hertz
    #[arg(long, default_value = "150e6")]
    pub start_frequency: f64,

    /// Frequency increment in hertz
    #[arg(long, default_value = "1e6")]
    pub frequency_increment: f64,

    /// Longest baseline in metres
    #[arg(long, default_value = "2000.0")]
    pub max_baseline: f64,

    /// Ellipticity for simulated UVW data
    #[arg(long)]
    pub ellipticity: Option<f64>,

    /// Size of w relative to the projected baseline
    #[arg(long, default_value = "0.1")]
    pub w_fraction: f64,

    /// Number of point sources
    #[arg(long, default_value = "4")]
    pub point_sources_count: usize,

    /// Largest source offset from the phase centre in degrees
    #[arg(long, default_value = "0.5")]
    pub max_offset_deg: f64,

    /// Number of correlations, 1 or 4
    #[arg(long, default_value = "4")]
    pub correlation_count: usize,

    /// Phase centre right ascension in degrees
    #[arg(long, default_value = "0.0")]
    pub ra_deg: f64,

    /// Phase centre declination in degrees
    #[arg(long, default_value = "-30.0", allow_hyphen_values = true)]
    pub dec_deg: f64,

    /// Random seed for RNG
    #[arg(long)]
    pub random_seed: Option<u64>,
}

impl GenerateArgs {
    /// The number of timesteps, as derived from the observation time.
    pub fn timestep_count(&self) -> usize {
        (self.observation_hours * 3600.0 / self.time_inc_sec).floor() as usize
    }

    pub fn params(&self) -> Result<SimulationParams> {
        if self.correlation_count != 1 && self.correlation_count != 4 {
            return Err(ImagerError::InvalidArgument(format!(
                "{} correlations requested, expected 1 or 4",
                self.correlation_count
            )));
        }
        if self.time_inc_sec <= 0.0 {
            return Err(ImagerError::InvalidArgument(
                "integration time must be positive".into(),
            ));
        }
        Ok(SimulationParams {
            station_count: self.station_count,
            timestep_count: self.timestep_count(),
            time_inc_sec: self.time_inc_sec,
            channel_count: self.channel_count,
            start_frequency_hz: self.start_frequency,
            frequency_increment_hz: self.frequency_increment,
            max_baseline_m: self.max_baseline,
            ellipticity: self.ellipticity,
            w_fraction: self.w_fraction,
            point_source_count: self.point_sources_count,
            max_offset_deg: self.max_offset_deg,
            correlation_count: self.correlation_count,
            random_seed: self.random_seed,
            time_start_mjd: self.time_start_mjd,
            phase_centre_deg: (self.ra_deg, self.dec_deg),
        })
    }
}

#[derive(Args, Debug)]
pub struct ImageArgs {
    /// Dataset: a Measurement Set, a directory of npy files or a binary
    /// container
    #[arg(value_name = "INPUT_PATH")]
    pub input: PathBuf,

    /// Prefix of the output npy files
    #[arg(long, short, value_name = "OUTPUT_ROOT")]
    pub output_root: Option<PathBuf>,

    /// dft2d, dft3d, fft or wproj
    #[arg(long, default_value = "fft")]
    pub algorithm: String,

    /// natural, radial or uniform
    #[arg(long, default_value = "natural")]
    pub weighting: String,

    /// I, Q, U, V, XX, XY, YX, YY, stokes, linear or psf
    #[arg(long, default_value = "I")]
    pub image_type: String,

    /// Image side length in pixels
    #[arg(long, default_value = "256")]
    pub size: usize,

    /// Field of view in degrees
    #[arg(long, default_value = "2.0")]
    pub fov_deg: f64,

    /// Pixel size in arcseconds; overrides the field of view
    #[arg(long)]
    pub cellsize_arcsec: Option<f64>,

    /// single or double
    #[arg(long, default_value = "double")]
    pub precision: String,

    /// FFT gridding kernel: pillbox, linear or spheroidal
    #[arg(long, default_value = "spheroidal")]
    pub kernel: String,

    /// Grid size relative to the image for gridding algorithms
    #[arg(long, default_value = "1.2")]
    pub padding: f64,

    /// Number of W-projection planes
    #[arg(long)]
    pub w_planes: Option<usize>,

    /// Half-width of the W-projection kernels in grid cells
    #[arg(long)]
    pub w_support: Option<usize>,

    /// Image centre right ascension in degrees
    #[arg(long, requires = "dec_deg")]
    pub ra_deg: Option<f64>,

    /// Image centre declination in degrees
    #[arg(long, requires = "ra_deg", allow_hyphen_values = true)]
    pub dec_deg: Option<f64>,

    /// One image per channel instead of frequency synthesis
    #[arg(long)]
    pub channel_snapshots: bool,

    /// Lowest frequency to image in hertz
    #[arg(long, default_value = "0.0")]
    pub freq_min: f64,

    /// Highest frequency to image in hertz; zero for no limit
    #[arg(long, default_value = "0.0")]
    pub freq_max: f64,

    /// Earliest time centroid, MJD(UTC)
    #[arg(long, default_value = "0.0")]
    pub time_min_mjd: f64,

    /// Latest time centroid, MJD(UTC); zero for no limit
    #[arg(long, default_value = "0.0")]
    pub time_max_mjd: f64,

    /// First time index to read
    #[arg(long, default_value = "0")]
    pub time_start_index: usize,

    /// Last time index to read
    #[arg(long)]
    pub time_end_index: Option<usize>,

    /// Shortest baseline in wavelengths
    #[arg(long, default_value = "0.0")]
    pub uv_min: f64,

    /// Longest baseline in wavelengths; negative for no limit
    #[arg(long, default_value = "-1.0", allow_hyphen_values = true)]
    pub uv_max: f64,

    /// Measurement Set column to image
    #[arg(long, default_value = "DATA")]
    pub ms_column: String,

    /// Skip writing images
    #[arg(long)]
    pub no_images: bool,

    /// Also write the normalised uv grids
    #[arg(long)]
    pub grids: bool,
}

impl ImagerConfig {
    pub fn from_args(args: &ImageArgs) -> Result<Self> {
        let mut config = ImagerConfig::new(args.algorithm.parse()?, args.size, args.fov_deg);
        if let Some(arcsec) = args.cellsize_arcsec {
            config.cellsize_rad = (arcsec / 3600.0).to_radians();
        }
        config.weighting = args.weighting.parse()?;
        config.image_type = args.image_type.parse()?;
        config.precision = args.precision.parse()?;
        config.grid_kernel = args.kernel.parse()?;
        config.grid_padding = args.padding;
        config.num_w_planes = args.w_planes;
        config.w_support = args.w_support;
        config.direction = match (args.ra_deg, args.dec_deg) {
            (Some(ra_deg), Some(dec_deg)) => DirectionMode::Rotate { ra_deg, dec_deg },
            (None, None) => DirectionMode::PhaseCentre,
            _ => {
                return Err(ImagerError::InvalidArgument(
                    "an image centre needs both RA and Dec".into(),
                ));
            }
        };
        config.channel_snapshots = args.channel_snapshots;
        config.freq_range_hz = (args.freq_min, args.freq_max);
        config.time_range_mjd = (args.time_min_mjd, args.time_max_mjd);
        config.time_index_range = (args.time_start_index, args.time_end_index);
        config.uv_range_lambda = (args.uv_min, args.uv_max);
        config.ms_column = args.ms_column.clone();
        config.input_path = Some(args.input.clone());
        config.output_root = args.output_root.clone();
        config.write_images = !args.no_images;
        config.write_grids = args.grids;

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{Algorithm, ImageType, Weighting},
        error::ErrorKind,
    };

    fn image_args(extra: &[&str]) -> ImageArgs {
        let mut argv = vec!["visimager", "image", "data.vis"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Image(args) => args,
            Commands::Generate(_) => panic!("expected the image subcommand"),
        }
    }

    #[test]
    fn image_args_map_to_config() {
        let args = image_args(&[
            "--algorithm",
            "wproj",
            "--weighting",
            "uniform",
            "--image-type",
            "stokes",
            "--size",
            "128",
            "--ra-deg",
            "12.5",
            "--dec-deg",
            "-45",
            "--uv-max",
            "-1",
            "--grids",
        ]);
        let config = ImagerConfig::from_args(&args).unwrap();
        assert_eq!(config.algorithm, Algorithm::WProjection);
        assert_eq!(config.weighting, Weighting::Uniform);
        assert_eq!(config.image_type, ImageType::Stokes);
        assert_eq!(
            config.direction,
            DirectionMode::Rotate {
                ra_deg: 12.5,
                dec_deg: -45.0
            }
        );
        assert!(config.write_grids && config.write_images);
        assert_eq!(config.input_path, Some(PathBuf::from("data.vis")));
    }

    #[test]
    fn unknown_algorithm_is_not_available() {
        let args = image_args(&["--algorithm", "gridless"]);
        let err = ImagerConfig::from_args(&args).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FunctionNotAvailable);
    }

    #[test]
    fn generate_derives_timesteps() {
        let cli = Cli::try_parse_from([
            "visimager",
            "-v",
            "generate",
            "out",
            "--observation-hours",
            "0.5",
            "--time-inc-sec",
            "10",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);
        let Commands::Generate(args) = cli.command else {
            panic!("expected the generate subcommand");
        };
        assert_eq!(args.timestep_count(), 180);
        assert_eq!(args.params().unwrap().phase_centre_deg, (0.0, -30.0));
    }
}
