use ndarray::prelude::*;
use num_complex::Complex;

/// One accumulation plane: an image for direct transforms, a uv grid for
/// gridding algorithms. Indexed `[y, x]`.
pub type Plane<T> = Array2<Complex<T>>;

/// Summed natural weights per uv cell, used for uniform weighting.
pub type WeightsGrid<T> = Array2<T>;

pub trait PlaneExtension {
    fn initialize(size: usize) -> Self;
}

impl<T: Clone + num_traits::Zero> PlaneExtension for Array2<T> {
    fn initialize(size: usize) -> Self {
        Array2::zeros((size, size))
    }
}
