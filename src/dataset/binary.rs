//! Tagged-block binary visibility container.
//!
//! Layout: an 8-byte magic, a `u32` version and a reserved `u32`, followed by
//! tagged chunks. Each chunk starts with `b"TG"`, then group, tag and data
//! type bytes, three pad bytes, an `i32` index and a `u64` payload length.
//! All values are little-endian. Header chunks come first; block chunks use
//! the block number as their index.

use std::{
    collections::HashMap,
    fs::File,
    io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use log::debug;
use num_complex::{Complex32, Complex64};

use super::{VisBlock, VisHeader, VisReader};
use crate::{
    error::{ImagerError, Result},
    precision::{ComplexBuffer, Precision, RealBuffer},
};

const MAGIC: &[u8; 8] = b"VISTAG\0\0";
const VERSION: u32 = 1;
const CHUNK_MAGIC: &[u8; 2] = b"TG";

const GROUP_HEADER: u8 = 1;
const GROUP_BLOCK: u8 = 2;

mod header_tag {
    pub const FREQ_START_HZ: u8 = 1;
    pub const FREQ_INC_HZ: u8 = 2;
    pub const NUM_CHANNELS: u8 = 3;
    pub const TIME_START_MJD_UTC: u8 = 4;
    pub const TIME_INC_SEC: u8 = 5;
    pub const NUM_TIMES: u8 = 6;
    pub const MAX_TIMES_PER_BLOCK: u8 = 7;
    pub const NUM_STATIONS: u8 = 8;
    pub const NUM_POLS: u8 = 9;
    pub const PHASE_CENTRE_DEG: u8 = 10;
    pub const PRECISION: u8 = 11;
}

mod block_tag {
    pub const DIM_START_AND_SIZE: u8 = 1;
    pub const BASELINE_UU: u8 = 2;
    pub const BASELINE_VV: u8 = 3;
    pub const BASELINE_WW: u8 = 4;
    pub const CROSS_CORRELATIONS: u8 = 5;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DataType {
    Int,
    Float,
    Double,
    ComplexFloat,
    ComplexDouble,
}

impl DataType {
    fn code(self) -> u8 {
        match self {
            DataType::Int => 1,
            DataType::Float => 2,
            DataType::Double => 3,
            DataType::ComplexFloat => 4,
            DataType::ComplexDouble => 5,
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(DataType::Int),
            2 => Some(DataType::Float),
            3 => Some(DataType::Double),
            4 => Some(DataType::ComplexFloat),
            5 => Some(DataType::ComplexDouble),
            _ => None,
        }
    }

    fn element_size(self) -> usize {
        match self {
            DataType::Int | DataType::Float => 4,
            DataType::Double | DataType::ComplexFloat => 8,
            DataType::ComplexDouble => 16,
        }
    }
}

type ChunkKey = (u8, u8, i32);

#[derive(Clone, Copy, Debug)]
struct ChunkInfo {
    data_type: DataType,
    offset: u64,
    len: u64,
}

pub struct BinaryReader {
    path: PathBuf,
    file: BufReader<File>,
    chunks: HashMap<ChunkKey, ChunkInfo>,
    header: VisHeader,
}

impl BinaryReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| ImagerError::file_io(path, e))?;
        let file_len = file.metadata()?.len();
        let mut file = BufReader::new(file);

        let mut magic = [0u8; 8];
        file.read_exact(&mut magic)
            .map_err(|e| ImagerError::file_io(path, e))?;
        if &magic != MAGIC {
            return Err(ImagerError::file_io(path, "not a tagged visibility container"));
        }
        let version = file.read_u32::<LittleEndian>()?;
        if version != VERSION {
            return Err(ImagerError::file_io(
                path,
                format!("unsupported container version {version}"),
            ));
        }
        let _reserved = file.read_u32::<LittleEndian>()?;

        let chunks = scan_chunks(path, &mut file, file_len)?;
        debug!("{}: {} chunks", path.display(), chunks.len());

        let mut reader = BinaryReader {
            path: path.to_path_buf(),
            file,
            chunks,
            header: empty_header(),
        };
        reader.header = reader.read_header()?;
        Ok(reader)
    }

    fn read_header(&mut self) -> Result<VisHeader> {
        let int = |reader: &mut Self, tag| -> Result<usize> {
            let values = reader.read_ints((GROUP_HEADER, tag, 0))?;
            match values.first() {
                Some(&v) if v >= 0 => Ok(v as usize),
                _ => Err(reader.error(format!("bad header value for tag {tag}"))),
            }
        };
        let double = |reader: &mut Self, tag| -> Result<f64> {
            reader.read_doubles((GROUP_HEADER, tag, 0))?
                .first()
                .copied()
                .ok_or_else(|| reader.error(format!("empty header value for tag {tag}")))
        };

        let num_stations = int(self, header_tag::NUM_STATIONS)?;
        let phase_centre = self.read_doubles((GROUP_HEADER, header_tag::PHASE_CENTRE_DEG, 0))?;
        if phase_centre.len() != 2 {
            return Err(self.error("phase centre needs two values"));
        }
        let precision = match int(self, header_tag::PRECISION)? {
            2 => Precision::Single,
            3 => Precision::Double,
            other => return Err(self.error(format!("unknown precision code {other}"))),
        };

        Ok(VisHeader {
            num_channels: int(self, header_tag::NUM_CHANNELS)?,
            freq_start_hz: double(self, header_tag::FREQ_START_HZ)?,
            freq_inc_hz: double(self, header_tag::FREQ_INC_HZ)?,
            num_times: int(self, header_tag::NUM_TIMES)?,
            time_start_mjd_utc: double(self, header_tag::TIME_START_MJD_UTC)?,
            time_inc_sec: double(self, header_tag::TIME_INC_SEC)?,
            max_times_per_block: int(self, header_tag::MAX_TIMES_PER_BLOCK)?,
            num_stations,
            num_baselines: num_stations * num_stations.saturating_sub(1) / 2,
            num_pols: int(self, header_tag::NUM_POLS)?,
            phase_centre_deg: (phase_centre[0], phase_centre[1]),
            precision,
        })
    }

    fn error(&self, message: impl ToString) -> ImagerError {
        ImagerError::file_io(&self.path, message)
    }

    fn read_chunk(&mut self, key: ChunkKey) -> Result<(DataType, Vec<u8>)> {
        let info = *self.chunks.get(&key).ok_or_else(|| {
            self.error(format!(
                "missing chunk (group {}, tag {}, index {})",
                key.0, key.1, key.2
            ))
        })?;
        if info.len % info.data_type.element_size() as u64 != 0 {
            return Err(self.error(format!(
                "chunk (group {}, tag {}) has a partial element",
                key.0, key.1
            )));
        }
        let mut bytes = vec![0u8; info.len as usize];
        self.file.seek(SeekFrom::Start(info.offset))?;
        self.file
            .read_exact(&mut bytes)
            .map_err(|e| ImagerError::file_io(&self.path, e))?;
        Ok((info.data_type, bytes))
    }

    fn read_ints(&mut self, key: ChunkKey) -> Result<Vec<i32>> {
        match self.read_chunk(key)? {
            (DataType::Int, bytes) => {
                let mut values = vec![0; bytes.len() / 4];
                LittleEndian::read_i32_into(&bytes, &mut values);
                Ok(values)
            }
            (other, _) => Err(self.error(format!("expected integers, found {other:?}"))),
        }
    }

    fn read_doubles(&mut self, key: ChunkKey) -> Result<Vec<f64>> {
        match self.read_real(key)? {
            RealBuffer::Single(v) => Ok(v.into_iter().map(f64::from).collect()),
            RealBuffer::Double(v) => Ok(v),
        }
    }

    fn read_real(&mut self, key: ChunkKey) -> Result<RealBuffer> {
        match self.read_chunk(key)? {
            (DataType::Float, bytes) => {
                let mut values = vec![0.0; bytes.len() / 4];
                LittleEndian::read_f32_into(&bytes, &mut values);
                Ok(RealBuffer::Single(values))
            }
            (DataType::Double, bytes) => {
                let mut values = vec![0.0; bytes.len() / 8];
                LittleEndian::read_f64_into(&bytes, &mut values);
                Ok(RealBuffer::Double(values))
            }
            (other, _) => Err(self.error(format!("expected real values, found {other:?}"))),
        }
    }

    fn read_complex(&mut self, key: ChunkKey) -> Result<ComplexBuffer> {
        match self.read_chunk(key)? {
            (DataType::ComplexFloat, bytes) => {
                let mut values = vec![0.0; bytes.len() / 4];
                LittleEndian::read_f32_into(&bytes, &mut values);
                Ok(ComplexBuffer::Single(
                    values
                        .chunks_exact(2)
                        .map(|c| Complex32::new(c[0], c[1]))
                        .collect(),
                ))
            }
            (DataType::ComplexDouble, bytes) => {
                let mut values = vec![0.0; bytes.len() / 8];
                LittleEndian::read_f64_into(&bytes, &mut values);
                Ok(ComplexBuffer::Double(
                    values
                        .chunks_exact(2)
                        .map(|c| Complex64::new(c[0], c[1]))
                        .collect(),
                ))
            }
            (other, _) => Err(self.error(format!("expected complex values, found {other:?}"))),
        }
    }
}

impl VisReader for BinaryReader {
    fn header(&self) -> &VisHeader {
        &self.header
    }

    fn read_block(&mut self, index: usize, coords_only: bool) -> Result<VisBlock> {
        let i = i32::try_from(index)
            .map_err(|_| ImagerError::InvalidArgument(format!("block index {index}")))?;
        let dims = self.read_ints((GROUP_BLOCK, block_tag::DIM_START_AND_SIZE, i))?;
        let dims: Vec<usize> = dims
            .iter()
            .map(|&d| usize::try_from(d))
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| self.error(format!("block {index} has negative dimensions")))?;
        let [start_time_index, start_channel, num_times, num_channels] = dims[..] else {
            return Err(self.error(format!("block {index} needs four dimensions")));
        };

        let num_baselines = self.header.num_baselines;
        let num_pols = self.header.num_pols;
        let uu = self.read_real((GROUP_BLOCK, block_tag::BASELINE_UU, i))?;
        let vv = self.read_real((GROUP_BLOCK, block_tag::BASELINE_VV, i))?;
        let ww = self.read_real((GROUP_BLOCK, block_tag::BASELINE_WW, i))?;
        let num_rows = num_times * num_baselines;
        if uu.len() != num_rows || vv.len() != num_rows || ww.len() != num_rows {
            return Err(self.error(format!(
                "block {index}: expected {num_rows} baseline coordinates"
            )));
        }

        let amplitudes = if coords_only {
            None
        } else {
            let amps = self.read_complex((GROUP_BLOCK, block_tag::CROSS_CORRELATIONS, i))?;
            let expected = num_rows * num_channels * num_pols;
            if amps.len() != expected {
                return Err(self.error(format!(
                    "block {index}: expected {expected} cross-correlations, found {}",
                    amps.len()
                )));
            }
            Some(amps)
        };

        Ok(VisBlock {
            start_time_index,
            start_channel,
            num_times,
            num_channels,
            num_baselines,
            num_pols,
            uu,
            vv,
            ww,
            amplitudes,
            weights: None,
        })
    }
}

fn scan_chunks<R: Read + Seek>(
    path: &Path,
    file: &mut R,
    file_len: u64,
) -> Result<HashMap<ChunkKey, ChunkInfo>> {
    let mut chunks = HashMap::new();
    loop {
        let mut marker = [0u8; 2];
        if file.read(&mut marker[..1])? == 0 {
            break;
        }
        file.read_exact(&mut marker[1..])?;
        if &marker != CHUNK_MAGIC {
            let at = file.stream_position()? - 2;
            return Err(ImagerError::file_io(path, format!("bad chunk marker at byte {at}")));
        }
        let group = file.read_u8()?;
        let tag = file.read_u8()?;
        let code = file.read_u8()?;
        let mut pad = [0u8; 3];
        file.read_exact(&mut pad)?;
        let index = file.read_i32::<LittleEndian>()?;
        let len = file.read_u64::<LittleEndian>()?;

        let data_type = DataType::from_code(code)
            .ok_or_else(|| ImagerError::file_io(path, format!("unknown data type {code}")))?;
        let offset = file.stream_position()?;
        let end = offset
            .checked_add(len)
            .filter(|end| *end <= file_len)
            .ok_or_else(|| {
                ImagerError::file_io(
                    path,
                    format!("chunk (group {group}, tag {tag}, index {index}) is truncated"),
                )
            })?;
        chunks.insert(
            (group, tag, index),
            ChunkInfo {
                data_type,
                offset,
                len,
            },
        );
        file.seek(SeekFrom::Start(end))?;
    }
    Ok(chunks)
}

fn empty_header() -> VisHeader {
    VisHeader {
        num_channels: 0,
        freq_start_hz: 0.0,
        freq_inc_hz: 0.0,
        num_times: 0,
        time_start_mjd_utc: 0.0,
        time_inc_sec: 0.0,
        max_times_per_block: 0,
        num_stations: 0,
        num_baselines: 0,
        num_pols: 0,
        phase_centre_deg: (0.0, 0.0),
        precision: Precision::Double,
    }
}

/// Writes a tagged-block container: the header on creation, then one block
/// per [`write_block`](BinaryWriter::write_block) call.
pub struct BinaryWriter {
    file: BufWriter<File>,
    num_blocks: i32,
}

impl BinaryWriter {
    pub fn create(path: &Path, header: &VisHeader) -> Result<Self> {
        let file = File::create(path).map_err(|e| ImagerError::file_io(path, e))?;
        let mut writer = BinaryWriter {
            file: BufWriter::new(file),
            num_blocks: 0,
        };

        writer.file.write_all(MAGIC)?;
        writer.file.write_u32::<LittleEndian>(VERSION)?;
        writer.file.write_u32::<LittleEndian>(0)?;

        let precision_code = match header.precision {
            Precision::Single => DataType::Float.code(),
            Precision::Double => DataType::Double.code(),
        };
        let ints = [
            (header_tag::NUM_CHANNELS, header.num_channels),
            (header_tag::NUM_TIMES, header.num_times),
            (header_tag::MAX_TIMES_PER_BLOCK, header.max_times_per_block),
            (header_tag::NUM_STATIONS, header.num_stations),
            (header_tag::NUM_POLS, header.num_pols),
            (header_tag::PRECISION, usize::from(precision_code)),
        ];
        for (tag, value) in ints {
            writer.write_ints(GROUP_HEADER, tag, 0, &[to_i32(value)?])?;
        }
        let doubles = [
            (header_tag::FREQ_START_HZ, header.freq_start_hz),
            (header_tag::FREQ_INC_HZ, header.freq_inc_hz),
            (header_tag::TIME_START_MJD_UTC, header.time_start_mjd_utc),
            (header_tag::TIME_INC_SEC, header.time_inc_sec),
        ];
        for (tag, value) in doubles {
            writer.write_real(GROUP_HEADER, tag, 0, &RealBuffer::Double(vec![value]))?;
        }
        let (ra, dec) = header.phase_centre_deg;
        writer.write_real(
            GROUP_HEADER,
            header_tag::PHASE_CENTRE_DEG,
            0,
            &RealBuffer::Double(vec![ra, dec]),
        )?;

        Ok(writer)
    }

    pub fn write_block(&mut self, block: &VisBlock) -> Result<()> {
        let index = self.num_blocks;
        let dims = [
            to_i32(block.start_time_index)?,
            to_i32(block.start_channel)?,
            to_i32(block.num_times)?,
            to_i32(block.num_channels)?,
        ];
        self.write_ints(GROUP_BLOCK, block_tag::DIM_START_AND_SIZE, index, &dims)?;
        self.write_real(GROUP_BLOCK, block_tag::BASELINE_UU, index, &block.uu)?;
        self.write_real(GROUP_BLOCK, block_tag::BASELINE_VV, index, &block.vv)?;
        self.write_real(GROUP_BLOCK, block_tag::BASELINE_WW, index, &block.ww)?;
        let amplitudes = block.amplitudes.as_ref().ok_or_else(|| {
            ImagerError::InvalidArgument("cannot write a block without amplitudes".into())
        })?;
        self.write_complex(GROUP_BLOCK, block_tag::CROSS_CORRELATIONS, index, amplitudes)?;
        self.num_blocks += 1;
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }

    fn write_chunk(
        &mut self,
        group: u8,
        tag: u8,
        index: i32,
        data_type: DataType,
        payload: &[u8],
    ) -> Result<()> {
        self.file.write_all(CHUNK_MAGIC)?;
        self.file.write_u8(group)?;
        self.file.write_u8(tag)?;
        self.file.write_u8(data_type.code())?;
        self.file.write_all(&[0u8; 3])?;
        self.file.write_i32::<LittleEndian>(index)?;
        self.file.write_u64::<LittleEndian>(payload.len() as u64)?;
        self.file.write_all(payload)?;
        Ok(())
    }

    fn write_ints(&mut self, group: u8, tag: u8, index: i32, values: &[i32]) -> Result<()> {
        let mut payload = vec![0u8; values.len() * 4];
        LittleEndian::write_i32_into(values, &mut payload);
        self.write_chunk(group, tag, index, DataType::Int, &payload)
    }

    fn write_real(&mut self, group: u8, tag: u8, index: i32, values: &RealBuffer) -> Result<()> {
        match values {
            RealBuffer::Single(v) => {
                let mut payload = vec![0u8; v.len() * 4];
                LittleEndian::write_f32_into(v, &mut payload);
                self.write_chunk(group, tag, index, DataType::Float, &payload)
            }
            RealBuffer::Double(v) => {
                let mut payload = vec![0u8; v.len() * 8];
                LittleEndian::write_f64_into(v, &mut payload);
                self.write_chunk(group, tag, index, DataType::Double, &payload)
            }
        }
    }

    fn write_complex(
        &mut self,
        group: u8,
        tag: u8,
        index: i32,
        values: &ComplexBuffer,
    ) -> Result<()> {
        match values {
            ComplexBuffer::Single(v) => {
                let flat: Vec<f32> = v.iter().flat_map(|c| [c.re, c.im]).collect();
                let mut payload = vec![0u8; flat.len() * 4];
                LittleEndian::write_f32_into(&flat, &mut payload);
                self.write_chunk(group, tag, index, DataType::ComplexFloat, &payload)
            }
            ComplexBuffer::Double(v) => {
                let flat: Vec<f64> = v.iter().flat_map(|c| [c.re, c.im]).collect();
                let mut payload = vec![0u8; flat.len() * 8];
                LittleEndian::write_f64_into(&flat, &mut payload);
                self.write_chunk(group, tag, index, DataType::ComplexDouble, &payload)
            }
        }
    }
}

fn to_i32(value: usize) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| ImagerError::InvalidArgument(format!("{value} does not fit the container")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn header() -> VisHeader {
        VisHeader {
            num_channels: 2,
            freq_start_hz: 100e6,
            freq_inc_hz: 1e6,
            num_times: 3,
            time_start_mjd_utc: 59_000.5,
            time_inc_sec: 10.0,
            max_times_per_block: 2,
            num_stations: 3,
            num_baselines: 3,
            num_pols: 1,
            phase_centre_deg: (20.0, -30.0),
            precision: Precision::Single,
        }
    }

    fn block(start_time_index: usize, num_times: usize) -> VisBlock {
        let rows = num_times * 3;
        VisBlock {
            start_time_index,
            start_channel: 0,
            num_times,
            num_channels: 2,
            num_baselines: 3,
            num_pols: 1,
            uu: RealBuffer::Single((0..rows).map(|r| r as f32).collect()),
            vv: RealBuffer::Single((0..rows).map(|r| -(r as f32)).collect()),
            ww: RealBuffer::Single(vec![0.5; rows]),
            amplitudes: Some(ComplexBuffer::Single(
                (0..rows * 2)
                    .map(|i| Complex32::new(i as f32, 1.0))
                    .collect(),
            )),
            weights: None,
        }
    }

    #[test]
    fn container_keeps_header_and_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vis.bin");
        let mut writer = BinaryWriter::create(&path, &header()).unwrap();
        writer.write_block(&block(0, 2)).unwrap();
        writer.write_block(&block(2, 1)).unwrap();
        writer.finish().unwrap();

        let mut reader = BinaryReader::open(&path).unwrap();
        assert_eq!(reader.header(), &header());
        assert_eq!(reader.num_blocks(), 2);

        let second = reader.read_block(1, false).unwrap();
        assert_eq!(second, block(2, 1));

        let coords = reader.read_block(0, true).unwrap();
        assert!(coords.amplitudes.is_none());
        assert_eq!(coords.uu, block(0, 2).uu);
    }

    #[test]
    fn missing_block_is_a_file_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vis.bin");
        let mut writer = BinaryWriter::create(&path, &header()).unwrap();
        writer.write_block(&block(0, 2)).unwrap();
        writer.finish().unwrap();

        let mut reader = BinaryReader::open(&path).unwrap();
        let err = reader.read_block(1, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileIo);
    }

    #[test]
    fn rejects_foreign_and_truncated_files() {
        let dir = tempfile::tempdir().unwrap();
        let foreign = dir.path().join("foreign.bin");
        std::fs::write(&foreign, b"SIMPLE  =                    T").unwrap();
        assert_eq!(
            BinaryReader::open(&foreign).err().map(|e| e.kind()),
            Some(ErrorKind::FileIo)
        );

        let path = dir.path().join("vis.bin");
        let mut writer = BinaryWriter::create(&path, &header()).unwrap();
        writer.write_block(&block(0, 2)).unwrap();
        writer.finish().unwrap();
        let bytes = std::fs::read(&path).unwrap();
        let truncated = dir.path().join("truncated.bin");
        std::fs::write(&truncated, &bytes[..bytes.len() - 5]).unwrap();
        assert_eq!(
            BinaryReader::open(&truncated).err().map(|e| e.kind()),
            Some(ErrorKind::FileIo)
        );
    }

    #[test]
    fn huge_chunk_length_is_a_file_error() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(MAGIC);
        bytes.write_u32::<LittleEndian>(VERSION).unwrap();
        bytes.write_u32::<LittleEndian>(0).unwrap();
        bytes.extend_from_slice(CHUNK_MAGIC);
        bytes.extend_from_slice(&[GROUP_HEADER, header_tag::NUM_POLS, DataType::Int.code()]);
        bytes.extend_from_slice(&[0u8; 3]);
        bytes.write_i32::<LittleEndian>(0).unwrap();
        bytes.write_u64::<LittleEndian>(u64::MAX).unwrap();
        bytes.extend_from_slice(&[1, 0, 0, 0]);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.bin");
        std::fs::write(&path, &bytes).unwrap();
        assert_eq!(
            BinaryReader::open(&path).err().map(|e| e.kind()),
            Some(ErrorKind::FileIo)
        );
    }
}
