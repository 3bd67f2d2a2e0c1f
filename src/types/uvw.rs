use std::{io, ops::Add, path::Path};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use ndarray::prelude::*;
use ndarray_npy::{ReadDataError, ReadableElement, WritableElement};
use ndarray_rand::{
    RandomExt,
    rand::{SeedableRng, rngs::StdRng},
    rand_distr::{Beta, Uniform},
};
use num_traits::Zero;
use py_literal::Value;

const UVW_DESC_F4: &str = "[('u', '<f4'), ('v', '<f4'), ('w', '<f4')]";
const UVW_DESC_F8: &str = "[('u', '<f8'), ('v', '<f8'), ('w', '<f8')]";

/// Baseline coordinates in metres
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Uvw {
    pub u: f64,
    pub v: f64,
    pub w: f64,
}

impl Uvw {
    pub fn new(u: f64, v: f64, w: f64) -> Self {
        Uvw { u, v, w }
    }
}

impl Add for Uvw {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Uvw {
            u: self.u + rhs.u,
            v: self.v + rhs.v,
            w: self.w + rhs.w,
        }
    }
}

impl Zero for Uvw {
    fn zero() -> Self {
        Self {
            u: 0.0,
            v: 0.0,
            w: 0.0,
        }
    }

    fn is_zero(&self) -> bool {
        self.u == 0.0 && self.v == 0.0 && self.w == 0.0
    }
}

/// Byte width of the fields of a `u`, `v`, `w` record descriptor.
fn field_width(type_desc: &Value) -> Result<usize, ReadDataError> {
    match type_desc.to_string().as_str() {
        UVW_DESC_F4 => Ok(4),
        UVW_DESC_F8 => Ok(8),
        _ => Err(ReadDataError::WrongDescriptor(type_desc.clone())),
    }
}

fn read_field<R: io::Read>(reader: &mut R, width: usize) -> io::Result<f64> {
    if width == 4 {
        reader.read_f32::<LittleEndian>().map(f64::from)
    } else {
        reader.read_f64::<LittleEndian>()
    }
}

/// Records written in single precision are widened on read.
impl ReadableElement for Uvw {
    fn read_to_end_exact_vec<R: io::Read>(
        mut reader: R,
        type_desc: &Value,
        len: usize,
    ) -> Result<Vec<Self>, ReadDataError> {
        let width = field_width(type_desc)?;
        let records = (0..len)
            .map(|_| {
                let u = read_field(&mut reader, width)?;
                let v = read_field(&mut reader, width)?;
                let w = read_field(&mut reader, width)?;
                Ok(Uvw::new(u, v, w))
            })
            .collect::<io::Result<Vec<_>>>()?;

        let mut rest = Vec::new();
        match reader.read_to_end(&mut rest)? {
            0 => Ok(records),
            extra => Err(ReadDataError::ExtraBytes(extra)),
        }
    }
}

impl WritableElement for Uvw {
    fn type_descriptor() -> Value {
        Value::List(vec![
            Value::Tuple(vec![Value::String("u".into()), Value::String("<f8".into())]),
            Value::Tuple(vec![Value::String("v".into()), Value::String("<f8".into())]),
            Value::Tuple(vec![Value::String("w".into()), Value::String("<f8".into())]),
        ])
    }

    fn write<W: io::Write>(&self, mut writer: W) -> Result<(), ndarray_npy::WriteDataError> {
        writer.write_f64::<LittleEndian>(self.u)?;
        writer.write_f64::<LittleEndian>(self.v)?;
        writer.write_f64::<LittleEndian>(self.w)?;
        Ok(())
    }

    fn write_slice<W: io::Write>(
        slice: &[Self],
        mut writer: W,
    ) -> Result<(), ndarray_npy::WriteDataError> {
        for item in slice {
            WritableElement::write(item, &mut writer)?;
        }
        Ok(())
    }
}

/// Baseline coordinates, shape (`baseline_count`, `timestep_count`)
pub type UvwArray = Array2<Uvw>;

/// Parameters of the simulated baseline tracks.
#[derive(Clone, Copy, Debug)]
pub struct UvwTracks {
    pub baseline_count: usize,
    pub timestep_count: usize,
    pub time_inc_sec: f64,
    /// Length of the longest baseline in metres
    pub max_baseline_m: f64,
    /// Amount of ellipticity (0 = circular, 1 = highly elliptical)
    pub ellipticity: Option<f64>,
    /// Size of w relative to the projected baseline length
    pub w_fraction: f64,
    pub random_seed: Option<u64>,
}

pub trait UvwArrayExtension {
    fn generate(tracks: &UvwTracks) -> Self;
    fn from_file(path: &Path) -> Result<Self, ndarray_npy::ReadNpyError>
    where
        Self: Sized;
}

impl UvwArrayExtension for UvwArray {
    /// Generate simulated UVW tracks in metres.
    ///
    /// Returns a UVW array of size (`baseline_count` * `timestep_count`)
    fn generate(tracks: &UvwTracks) -> Self {
        let ellipticity = tracks.ellipticity.unwrap_or(0.1);
        let seed = tracks.random_seed.unwrap_or(2);
        let mut rng = StdRng::seed_from_u64(seed);

        let time_samples =
            Array::from_iter(0..tracks.timestep_count).mapv(|x| x as f64 * tracks.time_inc_sec);

        let mut uvw = UvwArray::zeros((tracks.baseline_count, tracks.timestep_count));

        // More short baselines than long ones: Beta(1, 3) peaks at 0
        let beta_distribution = Beta::new(1.0, 3.0).expect("Should be a valid distribution.");
        let baseline_ratios =
            Array::random_using(tracks.baseline_count, beta_distribution, &mut rng);

        let start_angles = Array::random_using(
            tracks.baseline_count,
            Uniform::new(0.0, 2.0 * std::f64::consts::PI),
            &mut rng,
        );

        for (baseline, ratio) in baseline_ratios.iter().enumerate() {
            let mut u_radius = ratio * tracks.max_baseline_m;
            let mut v_radius = ratio * tracks.max_baseline_m;

            if ellipticity > 0.0 {
                // Longer baselines have more ellipticity
                let ellipse_factor = 1.0 + ellipticity * ratio;
                u_radius *= ellipse_factor;
                v_radius /= ellipse_factor;
            }

            // A full circle takes a day; shorter observations trace an arc
            let angular_velocity = (2.0 * std::f64::consts::PI) / f64::from(24 * 3600);

            let angle = start_angles[baseline] + angular_velocity * &time_samples;
            let u_coords = u_radius * angle.cos();
            let v_coords = v_radius * angle.sin();

            for t in 0..tracks.timestep_count {
                let (u, v) = (u_coords[t], v_coords[t]);
                uvw[(baseline, t)] = Uvw::new(u, v, tracks.w_fraction * (0.6 * u + 0.8 * v));
            }
        }

        uvw
    }

    /// Read UVW data from npy file
    ///
    ///  Returns a UVW array of size (`baseline_count` * `timestep_count`)
    fn from_file(path: &Path) -> Result<Self, ndarray_npy::ReadNpyError> {
        ndarray_npy::read_npy(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracks() -> UvwTracks {
        UvwTracks {
            baseline_count: 6,
            timestep_count: 10,
            time_inc_sec: 60.0,
            max_baseline_m: 1000.0,
            ellipticity: None,
            w_fraction: 0.1,
            random_seed: Some(7),
        }
    }

    #[test]
    fn generated_tracks_are_seeded() {
        let a = UvwArray::generate(&tracks());
        let b = UvwArray::generate(&tracks());
        assert_eq!(a.dim(), (6, 10));
        assert_eq!(a, b);
        for uvw in a.iter() {
            assert!(uvw.u.abs() <= 1100.0 && uvw.v.abs() <= 1100.0);
        }
    }

    #[test]
    fn npy_file_keeps_coordinates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uvw.npy");
        let uvw = UvwArray::generate(&tracks());
        ndarray_npy::write_npy(&path, &uvw).unwrap();
        let read = UvwArray::from_file(&path).unwrap();
        assert_eq!(read, uvw);
    }

    #[test]
    fn add_is_componentwise() {
        let sum = Uvw::new(1.0, 2.0, 3.0) + Uvw::new(10.0, 20.0, 30.0);
        assert_eq!(sum, Uvw::new(11.0, 22.0, 33.0));
    }
}
