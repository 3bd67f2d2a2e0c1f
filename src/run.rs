//! Imaging a dataset from start to finish.

use std::path::{Path, PathBuf};

use log::{info, warn};
use ndarray_npy::{WritableElement, write_npy};
use num_complex::Complex;

use crate::{
    config::{DirectionMode, ImagerConfig},
    dataset::{VisHeader, VisReader, open_dataset},
    error::{ImagerError, Result},
    imager::{Finalized, Imager},
    precision::{ImagerFloat, Precision},
    util::{Progress, print_header, print_param, time_function},
};

/// Image `config.input_path` in the configured precision, writing the
/// products under `config.output_root` if one is set.
pub fn run(config: &ImagerConfig) -> Result<()> {
    match config.precision {
        Precision::Single => image_dataset::<f32>(config).map(|_| ()),
        Precision::Double => image_dataset::<f64>(config).map(|_| ()),
    }
}

pub fn image_dataset<T>(config: &ImagerConfig) -> Result<Finalized<T>>
where
    T: ImagerFloat + WritableElement,
    Complex<T>: WritableElement,
{
    let path = config
        .input_path
        .as_deref()
        .ok_or_else(|| ImagerError::InvalidArgument("no input dataset given".into()))?;
    print_parameters(config);

    let mut reader = time_function!("open dataset", open_dataset(path, &config.ms_column)?);
    let header = reader.header().clone();
    print_dataset(path, &header);

    let mut imager = Imager::<T>::new(config.clone())?;
    imager.set_vis_frequency(header.freq_start_hz, header.freq_inc_hz, header.num_channels)?;
    let (ra, dec) = header.phase_centre_deg;
    imager.set_vis_phase_centre(ra, dec)?;

    let blocks = blocks_in_range(config, &header);
    if blocks.len() < header.num_blocks() {
        info!(
            "Reading {} of {} blocks in time index range",
            blocks.len(),
            header.num_blocks()
        );
    }

    if config.requires_coordinate_pass() {
        print_header!("COORDINATE PASS");
        imager.begin_coordinate_pass()?;
        time_function!(
            "read coordinates",
            read_pass(reader.as_mut(), &header, &mut imager, &blocks, true)?
        );
        imager.end_coordinate_pass()?;
    }

    print_header!("FULL PASS");
    time_function!(
        "grid visibilities",
        read_pass(reader.as_mut(), &header, &mut imager, &blocks, false)?
    );
    reader.close()?;

    print_header!("FINALISE");
    let planes = imager.num_planes();
    let grid_count = if config.write_grids && config.algorithm.is_dft() {
        warn!("The {} algorithm makes no uv grids", config.algorithm);
        0
    } else if config.write_grids {
        planes
    } else {
        0
    };
    let finalized = time_function!("finalise planes", imager.finalize(planes, grid_count)?);

    let skipped = imager.skip_counts();
    if skipped.weights > 0 || skipped.points > 0 {
        print_param!("skipped weights", skipped.weights);
        print_param!("skipped points", skipped.points);
    }

    if let Some(root) = &config.output_root {
        time_function!(
            "write products",
            write_products(root, config, imager.image_frequencies().len(), &finalized)?
        );
    }

    Ok(finalized)
}

fn read_pass<T: ImagerFloat>(
    reader: &mut dyn VisReader,
    header: &VisHeader,
    imager: &mut Imager<T>,
    blocks: &[usize],
    coords_only: bool,
) -> Result<()> {
    let mut progress = Progress::new(blocks.len());
    for (done, &index) in blocks.iter().enumerate() {
        let block = reader.read_block(index, coords_only)?;
        imager.update_from_block(header, &block)?;
        progress.update(done + 1);
    }
    Ok(())
}

/// Indices of the blocks holding any time inside the configured index range.
fn blocks_in_range(config: &ImagerConfig, header: &VisHeader) -> Vec<usize> {
    let (first, last) = config.time_index_range;
    let per_block = header.max_times_per_block;
    (0..header.num_blocks())
        .filter(|&block| {
            let start = block * per_block;
            let end = ((block + 1) * per_block).min(header.num_times) - 1;
            end >= first && last.is_none_or(|last| start <= last)
        })
        .collect()
}

/// `{root}_{pol}[_ch{channel}]_{kind}.npy`
fn product_path(root: &Path, label: &str, channel: Option<usize>, kind: &str) -> PathBuf {
    let mut name = root.as_os_str().to_owned();
    name.push(format!("_{label}"));
    if let Some(channel) = channel {
        name.push(format!("_ch{channel}"));
    }
    name.push(format!("_{kind}.npy"));
    PathBuf::from(name)
}

fn write_products<T>(
    root: &Path,
    config: &ImagerConfig,
    num_channels: usize,
    finalized: &Finalized<T>,
) -> Result<()>
where
    T: WritableElement,
    Complex<T>: WritableElement,
{
    if let Some(parent) = root.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ImagerError::file_io(parent, e))?;
    }

    let num_pols = config.image_type.num_pols();
    for channel in 0..num_channels {
        for pol in 0..num_pols {
            let index = channel * num_pols + pol;
            let label = config.image_type.pol_label(pol);
            let channel = (num_channels > 1).then_some(channel);
            if config.write_images {
                if let Some(image) = finalized.images.get(index) {
                    let path = product_path(root, label, channel, "image");
                    write_npy(&path, image)?;
                    info!("Wrote {}", path.display());
                }
            }
            if let Some(grid) = finalized.grids.get(index) {
                let path = product_path(root, label, channel, "grid");
                write_npy(&path, grid)?;
                info!("Wrote {}", path.display());
            }
        }
    }
    Ok(())
}

fn print_parameters(config: &ImagerConfig) {
    print_header!("PARAMETERS");
    print_param!("algorithm", config.algorithm);
    print_param!("weighting", config.weighting);
    print_param!("image type", format!("{:?}", config.image_type));
    print_param!("precision", config.precision);
    print_param!("image size", config.image_size);
    print_param!(
        "cell size",
        format!("{:.3} arcsec", config.cellsize_rad.to_degrees() * 3600.0)
    );
    print_param!("field of view", format!("{:.3} deg", config.fov_rad().to_degrees()));
    if !config.algorithm.is_dft() {
        print_param!("grid size", config.plane_size());
    }
    if let DirectionMode::Rotate { ra_deg, dec_deg } = config.direction {
        print_param!("image centre", format!("({ra_deg:.4}, {dec_deg:.4}) deg"));
    }
    print_param!("channel snapshots", config.channel_snapshots);
}

fn print_dataset(path: &Path, header: &VisHeader) {
    print_header!("DATASET");
    print_param!("path", path.display());
    print_param!("channels", header.num_channels);
    print_param!("start frequency", format!("{:.3} MHz", header.freq_start_hz * 1e-6));
    print_param!("frequency increment", format!("{:.3} MHz", header.freq_inc_hz * 1e-6));
    print_param!("times", header.num_times);
    print_param!("time increment", format!("{} s", header.time_inc_sec));
    print_param!("baselines", header.num_baselines);
    print_param!("polarisations", header.num_pols);
    let (ra, dec) = header.phase_centre_deg;
    print_param!("phase centre", format!("({ra:.4}, {dec:.4}) deg"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{Algorithm, ImageType, Weighting},
        input::{Simulation, SimulationParams},
    };
    use approx::assert_abs_diff_eq;

    fn simulation() -> Simulation {
        Simulation::new(&SimulationParams {
            station_count: 8,
            timestep_count: 6,
            time_inc_sec: 60.0,
            channel_count: 3,
            start_frequency_hz: 150.0e6,
            frequency_increment_hz: 1.0e6,
            max_baseline_m: 300.0,
            ellipticity: None,
            w_fraction: 0.0,
            point_source_count: 1,
            max_offset_deg: 0.0,
            correlation_count: 4,
            random_seed: Some(3),
            time_start_mjd: 60000.0,
            phase_centre_deg: (10.0, -30.0),
        })
    }

    fn config(input: &Path, algorithm: Algorithm) -> ImagerConfig {
        let mut config = ImagerConfig::new(algorithm, 32, 4.0);
        config.input_path = Some(input.to_path_buf());
        config
    }

    #[test]
    fn binary_dataset_images_centred_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sim.vis");
        simulation()
            .write_binary(&path, 4, Precision::Single)
            .unwrap();

        let mut config = config(&path, Algorithm::Fft);
        config.weighting = Weighting::Uniform;
        let finalized = image_dataset::<f64>(&config).unwrap();
        assert_eq!(finalized.images.len(), 1);
        assert_abs_diff_eq!(finalized.images[0][(16, 16)], 1.0, epsilon = 1e-3);
    }

    #[test]
    fn npy_dataset_writes_snapshot_products() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("sim");
        simulation().write_npy(&data).unwrap();

        let mut config = config(&data, Algorithm::Dft2d);
        config.image_type = ImageType::Linear;
        config.channel_snapshots = true;
        config.output_root = Some(dir.path().join("out").join("sim"));
        let finalized = image_dataset::<f32>(&config).unwrap();
        assert_eq!(finalized.images.len(), 12);

        // XX carries the source, XY nothing.
        assert_abs_diff_eq!(finalized.images[0][(16, 16)], 1.0, epsilon = 1e-4);
        assert_abs_diff_eq!(finalized.images[1][(16, 16)], 0.0, epsilon = 1e-4);
        let written = dir.path().join("out").join("sim_YY_ch2_image.npy");
        assert!(written.is_file());
    }

    #[test]
    fn time_index_range_selects_blocks() {
        let header = VisHeader {
            num_channels: 1,
            freq_start_hz: 1.0e8,
            freq_inc_hz: 0.0,
            num_times: 10,
            time_start_mjd_utc: 0.0,
            time_inc_sec: 1.0,
            max_times_per_block: 4,
            num_stations: 3,
            num_baselines: 3,
            num_pols: 1,
            phase_centre_deg: (0.0, 0.0),
            precision: Precision::Double,
        };
        let mut config = ImagerConfig::default();
        assert_eq!(blocks_in_range(&config, &header), vec![0, 1, 2]);
        config.time_index_range = (5, Some(7));
        assert_eq!(blocks_in_range(&config, &header), vec![1]);
        config.time_index_range = (8, None);
        assert_eq!(blocks_in_range(&config, &header), vec![2]);
    }

    #[test]
    fn product_names_carry_pol_and_channel() {
        let root = Path::new("out/run");
        assert_eq!(
            product_path(root, "I", None, "image"),
            PathBuf::from("out/run_I_image.npy")
        );
        assert_eq!(
            product_path(root, "XY", Some(3), "grid"),
            PathBuf::from("out/run_XY_ch3_grid.npy")
        );
    }
}
