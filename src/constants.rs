pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Half-width, in grid cells, of the FFT gridding kernels.
pub const FFT_KERNEL_SUPPORT: usize = 3;
/// Samples per grid cell in the FFT gridding kernel tables.
pub const FFT_KERNEL_OVERSAMPLE: usize = 100;

/// Samples per grid cell in the W-projection kernels.
pub const W_KERNEL_OVERSAMPLE: usize = 4;
pub const MIN_W_SUPPORT: usize = 3;
pub const MAX_W_SUPPORT: usize = 32;
pub const MAX_W_PLANES: usize = 64;

/// Below this value a gridding-correction sample is treated as zero.
pub const MIN_CORRECTION: f64 = 1e-3;

pub const DEFAULT_GRID_PADDING: f64 = 1.2;
