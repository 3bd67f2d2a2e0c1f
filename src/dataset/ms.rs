//! Measurement Set input.
//!
//! Rows are read in chunks of one time sample across all baselines, so the
//! main table must hold cross-correlations only, ordered by time then
//! baseline.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use log::debug;
use num_complex::Complex32;
use rubbl_casatables::{Table, TableOpenMode};

use super::{VisBlock, VisHeader, VisReader};
use crate::{
    constants::SECONDS_PER_DAY,
    error::{ImagerError, Result},
    precision::{ComplexBuffer, Precision, RealBuffer},
};

pub struct MsReader {
    path: PathBuf,
    main: Table,
    column: String,
    header: VisHeader,
}

impl MsReader {
    pub fn open(path: &Path, column: &str) -> Result<Self> {
        let open = |name: &str| {
            Table::open(path.join(name), TableOpenMode::Read).map_err(casa_error(path))
        };

        let mut spw = open("SPECTRAL_WINDOW")?;
        let freqs: Vec<f64> = spw.get_cell_as_vec("CHAN_FREQ", 0).map_err(casa_error(path))?;
        let mut field = open("FIELD")?;
        let phase_dir: Vec<f64> = field.get_cell_as_vec("PHASE_DIR", 0).map_err(casa_error(path))?;
        let num_stations = open("ANTENNA")?.n_rows() as usize;

        let mut main = Table::open(path, TableOpenMode::Read).map_err(casa_error(path))?;
        let num_baselines = num_stations * num_stations.saturating_sub(1) / 2;
        let num_rows = main.n_rows() as usize;
        if num_baselines == 0 || num_rows % num_baselines != 0 {
            return Err(ImagerError::file_io(
                path,
                format!(
                    "{num_rows} rows do not split into time samples of {num_baselines} baselines"
                ),
            ));
        }
        if phase_dir.len() < 2 || freqs.is_empty() {
            return Err(ImagerError::file_io(path, "missing frequency or phase centre"));
        }

        let first_time: f64 = main.get_cell("TIME", 0).map_err(casa_error(path))?;
        let interval: f64 = main.get_cell("INTERVAL", 0).map_err(casa_error(path))?;
        let weights: Vec<f32> = main.get_cell_as_vec("WEIGHT", 0).map_err(casa_error(path))?;

        let header = VisHeader {
            num_channels: freqs.len(),
            freq_start_hz: freqs[0],
            freq_inc_hz: if freqs.len() > 1 { freqs[1] - freqs[0] } else { 0.0 },
            num_times: num_rows / num_baselines,
            time_start_mjd_utc: (first_time - 0.5 * interval) / SECONDS_PER_DAY,
            time_inc_sec: interval,
            max_times_per_block: 1,
            num_stations,
            num_baselines,
            num_pols: weights.len(),
            phase_centre_deg: (phase_dir[0].to_degrees(), phase_dir[1].to_degrees()),
            precision: Precision::Single,
        };
        debug!(
            "{}: {} times x {num_baselines} baselines, column {column}",
            path.display(),
            header.num_times
        );

        Ok(MsReader {
            path: path.to_path_buf(),
            main,
            column: column.to_string(),
            header,
        })
    }
}

impl VisReader for MsReader {
    fn header(&self) -> &VisHeader {
        &self.header
    }

    fn read_block(&mut self, index: usize, coords_only: bool) -> Result<VisBlock> {
        let path = &self.path;
        let VisHeader {
            num_baselines,
            num_channels,
            num_pols,
            ..
        } = self.header;

        let mut uu = Vec::with_capacity(num_baselines);
        let mut vv = Vec::with_capacity(num_baselines);
        let mut ww = Vec::with_capacity(num_baselines);
        let mut weights = Vec::with_capacity(num_baselines * num_pols);
        let mut amps = vec![Complex32::default(); num_baselines * num_channels * num_pols];

        for b in 0..num_baselines {
            let row = (index * num_baselines + b) as u64;
            let uvw: Vec<f64> = self
                .main
                .get_cell_as_vec("UVW", row)
                .map_err(casa_error(path))?;
            let [u, v, w] = uvw[..] else {
                return Err(ImagerError::file_io(path, format!("row {row}: UVW needs 3 values")));
            };
            uu.push(u);
            vv.push(v);
            ww.push(w);

            let weight: Vec<f32> = self
                .main
                .get_cell_as_vec("WEIGHT", row)
                .map_err(casa_error(path))?;
            check_cell_len(path, row, "WEIGHT", weight.len(), num_pols)?;
            weights.extend_from_slice(&weight);

            if !coords_only {
                // Cells are [channel][pol]; blocks are [channel][baseline][pol]
                let data: Vec<Complex32> = self
                    .main
                    .get_cell_as_vec(&self.column, row)
                    .map_err(casa_error(path))?;
                check_cell_len(path, row, &self.column, data.len(), num_channels * num_pols)?;
                for (c, chunk) in data.chunks_exact(num_pols).enumerate() {
                    let start = (c * num_baselines + b) * num_pols;
                    amps[start..start + num_pols].copy_from_slice(chunk);
                }
            }
        }

        Ok(VisBlock {
            start_time_index: index,
            start_channel: 0,
            num_times: 1,
            num_channels,
            num_baselines,
            num_pols,
            uu: RealBuffer::Double(uu),
            vv: RealBuffer::Double(vv),
            ww: RealBuffer::Double(ww),
            amplitudes: (!coords_only).then_some(ComplexBuffer::Single(amps)),
            weights: Some(RealBuffer::Single(weights)),
        })
    }
}

fn casa_error<E: fmt::Display>(path: &Path) -> impl Fn(E) -> ImagerError + '_ {
    move |e| ImagerError::file_io(path, e)
}

fn check_cell_len(path: &Path, row: u64, column: &str, len: usize, expected: usize) -> Result<()> {
    if len == expected {
        Ok(())
    } else {
        Err(ImagerError::file_io(
            path,
            format!("row {row}: {column} has {len} values, expected {expected}"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn weight_cells_must_match_the_polarisations() {
        let path = Path::new("obs.ms");
        assert!(check_cell_len(path, 7, "WEIGHT", 4, 4).is_ok());
        let err = check_cell_len(path, 7, "WEIGHT", 2, 4).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileIo);
        assert!(err.to_string().contains("row 7: WEIGHT has 2 values"));
    }
}
