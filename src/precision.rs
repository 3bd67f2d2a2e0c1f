//! Numeric precision handling.
//!
//! Input data may arrive in single or double precision independently of the
//! precision the imager works in. Buffers carry their precision as an enum tag
//! and are converted explicitly with [`convert_precision`] or borrowed in the
//! working precision through [`ImagerFloat`].

use std::{borrow::Cow, fmt, iter::Sum, str::FromStr};

use fftw::{
    array::AlignedVec,
    plan::{C2CPlan, C2CPlan32, C2CPlan64},
    types::{Flag, Sign},
};
use ndarray::prelude::*;
use num_complex::{Complex, Complex32, Complex64};
use num_traits::{Float, FloatConst, NumAssign};

use crate::error::{ImagerError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Precision {
    Single,
    #[default]
    Double,
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Precision::Single => write!(f, "single"),
            Precision::Double => write!(f, "double"),
        }
    }
}

impl FromStr for Precision {
    type Err = ImagerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "single" | "f32" | "float" => Ok(Precision::Single),
            "double" | "f64" => Ok(Precision::Double),
            other => Err(ImagerError::InvalidArgument(format!(
                "unknown precision '{other}'"
            ))),
        }
    }
}

/// Real-valued buffer in either precision.
#[derive(Clone, Debug, PartialEq)]
pub enum RealBuffer {
    Single(Vec<f32>),
    Double(Vec<f64>),
}

/// Complex-valued buffer in either precision.
#[derive(Clone, Debug, PartialEq)]
pub enum ComplexBuffer {
    Single(Vec<Complex32>),
    Double(Vec<Complex64>),
}

impl RealBuffer {
    pub fn filled(precision: Precision, len: usize, value: f64) -> Self {
        match precision {
            Precision::Single => RealBuffer::Single(vec![value as f32; len]),
            Precision::Double => RealBuffer::Double(vec![value; len]),
        }
    }

    pub fn precision(&self) -> Precision {
        match self {
            RealBuffer::Single(_) => Precision::Single,
            RealBuffer::Double(_) => Precision::Double,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RealBuffer::Single(v) => v.len(),
            RealBuffer::Double(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ComplexBuffer {
    pub fn precision(&self) -> Precision {
        match self {
            ComplexBuffer::Single(_) => Precision::Single,
            ComplexBuffer::Double(_) => Precision::Double,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ComplexBuffer::Single(v) => v.len(),
            ComplexBuffer::Double(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Types that can be converted between precisions without touching the
/// source.
pub trait ConvertPrecision: Sized {
    fn convert_precision(&self, target: Precision) -> Self;
}

impl ConvertPrecision for RealBuffer {
    fn convert_precision(&self, target: Precision) -> Self {
        match (self, target) {
            (RealBuffer::Single(v), Precision::Double) => {
                RealBuffer::Double(v.iter().map(|&x| f64::from(x)).collect())
            }
            (RealBuffer::Double(v), Precision::Single) => {
                RealBuffer::Single(v.iter().map(|&x| x as f32).collect())
            }
            _ => self.clone(),
        }
    }
}

impl ConvertPrecision for ComplexBuffer {
    fn convert_precision(&self, target: Precision) -> Self {
        match (self, target) {
            (ComplexBuffer::Single(v), Precision::Double) => ComplexBuffer::Double(
                v.iter()
                    .map(|c| Complex64::new(f64::from(c.re), f64::from(c.im)))
                    .collect(),
            ),
            (ComplexBuffer::Double(v), Precision::Single) => ComplexBuffer::Single(
                v.iter()
                    .map(|c| Complex32::new(c.re as f32, c.im as f32))
                    .collect(),
            ),
            _ => self.clone(),
        }
    }
}

/// Produce a copy of `buffer` in the `target` precision.
pub fn convert_precision<B: ConvertPrecision>(buffer: &B, target: Precision) -> B {
    buffer.convert_precision(target)
}

/// Floating-point type the imager can work in.
pub trait ImagerFloat:
    Float + FloatConst + NumAssign + Sum + Default + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    const PRECISION: Precision;

    fn cast(value: f64) -> Self;

    fn as_f64(self) -> f64;

    /// Borrow `buffer` in this precision, converting only if needed.
    fn real_slice(buffer: &RealBuffer) -> Cow<'_, [Self]>;

    /// Borrow `buffer` in this precision, converting only if needed.
    fn complex_slice(buffer: &ComplexBuffer) -> Cow<'_, [Complex<Self>]>;

    /// Unnormalised in-place 2-D FFT of `data`.
    fn fft_2d(data: &mut Array2<Complex<Self>>, sign: Sign) -> Result<()>;
}

macro_rules! impl_imager_float {
    ($float:ty, $precision:ident, $plan:ty) => {
        impl ImagerFloat for $float {
            const PRECISION: Precision = Precision::$precision;

            #[inline]
            fn cast(value: f64) -> Self {
                value as $float
            }

            #[inline]
            fn as_f64(self) -> f64 {
                self as f64
            }

            fn real_slice(buffer: &RealBuffer) -> Cow<'_, [Self]> {
                #[allow(unreachable_patterns)]
                match buffer {
                    RealBuffer::$precision(v) => Cow::Borrowed(v.as_slice()),
                    RealBuffer::Single(v) => Cow::Owned(v.iter().map(|&x| x as $float).collect()),
                    RealBuffer::Double(v) => Cow::Owned(v.iter().map(|&x| x as $float).collect()),
                }
            }

            fn complex_slice(buffer: &ComplexBuffer) -> Cow<'_, [Complex<Self>]> {
                #[allow(unreachable_patterns)]
                match buffer {
                    ComplexBuffer::$precision(v) => Cow::Borrowed(v.as_slice()),
                    ComplexBuffer::Single(v) => Cow::Owned(
                        v.iter()
                            .map(|c| Complex::new(c.re as $float, c.im as $float))
                            .collect(),
                    ),
                    ComplexBuffer::Double(v) => Cow::Owned(
                        v.iter()
                            .map(|c| Complex::new(c.re as $float, c.im as $float))
                            .collect(),
                    ),
                }
            }

            fn fft_2d(data: &mut Array2<Complex<Self>>, sign: Sign) -> Result<()> {
                let (height, width) = data.dim();
                let mut plan: $plan = C2CPlan::aligned(&[height, width], sign, Flag::ESTIMATE)
                    .map_err(|e| ImagerError::Fft(format!("{e:?}")))?;

                let mut input: AlignedVec<Complex<Self>> = AlignedVec::new(height * width);
                let mut output: AlignedVec<Complex<Self>> = AlignedVec::new(height * width);
                for (dst, src) in input.iter_mut().zip(data.iter()) {
                    *dst = *src;
                }

                plan.c2c(&mut input, &mut output)
                    .map_err(|e| ImagerError::Fft(format!("{e:?}")))?;

                for (dst, src) in data.iter_mut().zip(output.iter()) {
                    *dst = *src;
                }
                Ok(())
            }
        }
    };
}

impl_imager_float!(f32, Single, C2CPlan32);
impl_imager_float!(f64, Double, C2CPlan64);

/// 2-D FFT of a centred array: the zero frequency/pixel sits at `(h/2, w/2)`
/// on both input and output.
pub fn fft_centred<T: ImagerFloat>(data: &mut Array2<Complex<T>>, sign: Sign) -> Result<()> {
    let (height, width) = data.dim();
    let mut shifted = Array2::<Complex<T>>::zeros((height, width));
    for ((y, x), src) in data.indexed_iter() {
        shifted[((y + height / 2) % height, (x + width / 2) % width)] = *src;
    }

    T::fft_2d(&mut shifted, sign)?;

    for ((y, x), dst) in data.indexed_iter_mut() {
        *dst = shifted[((y + height / 2) % height, (x + width / 2) % width)];
    }
    Ok(())
}
