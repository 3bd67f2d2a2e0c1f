//! Simulated observations for the `generate` subcommand and for tests.

use std::path::Path;

use ndarray::prelude::*;

use crate::{
    dataset::{BinaryWriter, VisBlock, VisHeader, write_npy_dataset},
    error::Result,
    precision::{ComplexBuffer, ConvertPrecision, Precision, RealBuffer},
    types::*,
    util::{print_header, print_param, time_function},
};

#[derive(Clone, Debug, PartialEq)]
pub struct SimulationParams {
    pub station_count: usize,
    pub timestep_count: usize,
    pub time_inc_sec: f64,
    pub channel_count: usize,
    pub start_frequency_hz: f64,
    pub frequency_increment_hz: f64,
    pub max_baseline_m: f64,
    pub ellipticity: Option<f64>,
    pub w_fraction: f64,
    pub point_source_count: usize,
    /// Largest source offset from the phase centre on either axis.
    pub max_offset_deg: f64,
    pub correlation_count: usize,
    pub random_seed: Option<u64>,
    pub time_start_mjd: f64,
    pub phase_centre_deg: (f64, f64),
}

impl SimulationParams {
    pub fn baseline_count(&self) -> usize {
        self.station_count * self.station_count.saturating_sub(1) / 2
    }

    pub fn print_parameters(&self) {
        print_header!("PARAMETERS");
        print_param!("stations", self.station_count);
        print_param!("baselines", self.baseline_count());
        print_param!("timesteps", self.timestep_count);
        print_param!("channels", self.channel_count);
        print_param!("start frequency", self.start_frequency_hz * 1e-6);
        print_param!("frequency increment", self.frequency_increment_hz * 1e-6);
        print_param!("point sources", self.point_source_count);
        print_param!("correlations", self.correlation_count);
    }
}

pub struct Simulation {
    pub uvw: UvwArray,
    pub frequencies: FrequencyArray,
    pub visibilities: VisibilityArray,
    pub station_count: usize,
    pub time_inc_sec: f64,
    pub time_start_mjd: f64,
    pub phase_centre_deg: (f64, f64),
}

impl Simulation {
    pub fn new(params: &SimulationParams) -> Self {
        print_header!("GENERATING INPUT DATA");
        let seed = params.random_seed.unwrap_or(2);

        let uvw: UvwArray = time_function!(
            "generate uvws",
            UvwArray::generate(&UvwTracks {
                baseline_count: params.baseline_count(),
                timestep_count: params.timestep_count,
                time_inc_sec: params.time_inc_sec,
                max_baseline_m: params.max_baseline_m,
                ellipticity: params.ellipticity,
                w_fraction: params.w_fraction,
                random_seed: Some(seed),
            })
        );

        let frequencies: FrequencyArray = time_function!(
            "generate frequencies",
            FrequencyArray::generate(
                params.start_frequency_hz,
                params.frequency_increment_hz,
                params.channel_count,
            )
        );

        let sources = PointSource::random(
            params.point_source_count,
            params.max_offset_deg.to_radians(),
            seed,
        );
        let visibilities: VisibilityArray = time_function!(
            "generate visibilities",
            VisibilityArray::generate(&sources, params.correlation_count, &frequencies, &uvw)
        );

        Self {
            uvw,
            frequencies,
            visibilities,
            station_count: params.station_count,
            time_inc_sec: params.time_inc_sec,
            time_start_mjd: params.time_start_mjd,
            phase_centre_deg: params.phase_centre_deg,
        }
    }

    pub fn write_npy(&self, dir: &Path) -> Result<()> {
        write_npy_dataset(
            dir,
            &self.uvw,
            &self.frequencies,
            &self.visibilities,
            self.time_start_mjd,
            self.time_inc_sec,
            self.phase_centre_deg,
        )
    }

    pub fn header(&self, max_times_per_block: usize, precision: Precision) -> VisHeader {
        let (num_baselines, num_times, num_channels, num_pols) = self.visibilities.dim();
        let freq_inc_hz = if num_channels > 1 {
            self.frequencies[1] - self.frequencies[0]
        } else {
            0.0
        };
        VisHeader {
            num_channels,
            freq_start_hz: self.frequencies.first().copied().unwrap_or(0.0),
            freq_inc_hz,
            num_times,
            time_start_mjd_utc: self.time_start_mjd,
            time_inc_sec: self.time_inc_sec,
            max_times_per_block: max_times_per_block.max(1),
            num_stations: self.station_count,
            num_baselines,
            num_pols,
            phase_centre_deg: self.phase_centre_deg,
            precision,
        }
    }

    /// Cut the simulation into blocks of up to `max_times_per_block` times.
    pub fn blocks(&self, max_times_per_block: usize, precision: Precision) -> Vec<VisBlock> {
        let header = self.header(max_times_per_block, precision);
        (0..header.num_blocks())
            .map(|index| {
                let start = index * header.max_times_per_block;
                let end = (start + header.max_times_per_block).min(header.num_times);
                self.block(start..end, precision)
            })
            .collect()
    }

    fn block(&self, times: std::ops::Range<usize>, precision: Precision) -> VisBlock {
        let (num_baselines, _, num_channels, num_pols) = self.visibilities.dim();
        // [time][baseline]
        let coords = self.uvw.slice(s![.., times.clone()]).reversed_axes();
        let uu = coords.iter().map(|c| c.u).collect();
        let vv = coords.iter().map(|c| c.v).collect();
        let ww = coords.iter().map(|c| c.w).collect();

        // [time][channel][baseline][pol]
        let amplitudes = self
            .visibilities
            .slice(s![.., times.clone(), .., ..])
            .permuted_axes([1, 2, 0, 3])
            .iter()
            .copied()
            .collect();

        VisBlock {
            start_time_index: times.start,
            start_channel: 0,
            num_times: times.len(),
            num_channels,
            num_baselines,
            num_pols,
            uu: RealBuffer::Double(uu).convert_precision(precision),
            vv: RealBuffer::Double(vv).convert_precision(precision),
            ww: RealBuffer::Double(ww).convert_precision(precision),
            amplitudes: Some(ComplexBuffer::Single(amplitudes).convert_precision(precision)),
            weights: None,
        }
    }

    pub fn write_binary(
        &self,
        path: &Path,
        max_times_per_block: usize,
        precision: Precision,
    ) -> Result<()> {
        let header = self.header(max_times_per_block, precision);
        let mut writer = BinaryWriter::create(path, &header)?;
        for block in self.blocks(max_times_per_block, precision) {
            writer.write_block(&block)?;
        }
        writer.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{VisReader, open_dataset};

    fn params() -> SimulationParams {
        SimulationParams {
            station_count: 4,
            timestep_count: 5,
            time_inc_sec: 30.0,
            channel_count: 2,
            start_frequency_hz: 100.0e6,
            frequency_increment_hz: 2.0e6,
            max_baseline_m: 500.0,
            ellipticity: Some(0.0),
            w_fraction: 0.2,
            point_source_count: 2,
            max_offset_deg: 1.0,
            correlation_count: 4,
            random_seed: Some(11),
            time_start_mjd: 59000.5,
            phase_centre_deg: (45.0, 20.0),
        }
    }

    #[test]
    fn blocks_follow_reader_layout() {
        let simulation = Simulation::new(&params());
        let blocks = simulation.blocks(2, Precision::Double);
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[2].num_times, 1);
        assert_eq!(blocks[2].start_time_index, 4);

        let block = &blocks[1];
        let (t, c, b, p) = (1, 1, 5, 3);
        let RealBuffer::Double(uu) = &block.uu else {
            panic!("expected double coordinates");
        };
        assert_eq!(uu[t * 6 + b], simulation.uvw[(b, 2 + t)].u);
        let Some(ComplexBuffer::Double(amps)) = &block.amplitudes else {
            panic!("expected double amplitudes");
        };
        let expected = simulation.visibilities[(b, 2 + t, c, p)];
        let got = amps[((t * 2 + c) * 6 + b) * 4 + p];
        assert_eq!(got.re as f32, expected.re);
        assert_eq!(got.im as f32, expected.im);
    }

    #[test]
    fn binary_container_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sim.vis");
        let simulation = Simulation::new(&params());
        simulation.write_binary(&path, 2, Precision::Single).unwrap();

        let mut reader = open_dataset(&path, "DATA").unwrap();
        assert_eq!(
            reader.header(),
            &simulation.header(2, Precision::Single)
        );
        let block = reader.read_block(2, false).unwrap();
        assert_eq!(block, simulation.blocks(2, Precision::Single)[2]);
    }
}
