use crate::{
    error::{ImagerError, Result},
    precision::ImagerFloat,
    types::{Plane, PlaneExtension, WeightsGrid},
};

/// Accumulation planes, their normalisation sums and the uniform-weighting
/// grids. Everything is allocated on first use and keeps its size until the
/// store is cleared.
#[derive(Debug)]
pub(crate) struct PlaneStore<T: ImagerFloat> {
    size: Option<usize>,
    pub(crate) planes: Vec<Plane<T>>,
    pub(crate) norms: Vec<f64>,
    pub(crate) weights_grids: Vec<WeightsGrid<T>>,
}

impl<T: ImagerFloat> PlaneStore<T> {
    pub(crate) fn new() -> Self {
        Self {
            size: None,
            planes: Vec::new(),
            norms: Vec::new(),
            weights_grids: Vec::new(),
        }
    }

    fn fix_size(&mut self, size: usize) -> Result<()> {
        match self.size {
            Some(existing) if existing != size => Err(ImagerError::InvalidArgument(format!(
                "planes were allocated at {existing} pixels, cannot resize to {size}"
            ))),
            _ => {
                self.size = Some(size);
                Ok(())
            }
        }
    }

    pub(crate) fn ensure_planes(&mut self, count: usize, size: usize) -> Result<()> {
        self.fix_size(size)?;
        if self.planes.is_empty() {
            self.planes = (0..count).map(|_| Plane::initialize(size)).collect();
            self.norms = vec![0.0; count];
        } else if self.planes.len() != count {
            return Err(ImagerError::InvalidArgument(format!(
                "{} planes are allocated, {count} requested",
                self.planes.len()
            )));
        }
        Ok(())
    }

    pub(crate) fn ensure_weights_grids(&mut self, count: usize, size: usize) -> Result<()> {
        self.fix_size(size)?;
        if self.weights_grids.is_empty() {
            self.weights_grids = (0..count).map(|_| WeightsGrid::initialize(size)).collect();
        } else if self.weights_grids.len() != count {
            return Err(ImagerError::InvalidArgument(format!(
                "{} weights grids are allocated, {count} requested",
                self.weights_grids.len()
            )));
        }
        Ok(())
    }

    pub(crate) fn clear_weights_grids(&mut self) {
        for grid in &mut self.weights_grids {
            grid.fill(T::zero());
        }
    }

    pub(crate) fn has_planes(&self) -> bool {
        !self.planes.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::new();
    }
}

/// Running statistics of |w| in wavelengths, gathered in the coordinate
/// pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WStats {
    pub min: f64,
    pub max: f64,
    pub sum_sq: f64,
    pub count: usize,
}

impl Default for WStats {
    fn default() -> Self {
        Self {
            min: f64::MAX,
            max: 0.0,
            sum_sq: 0.0,
            count: 0,
        }
    }
}

impl WStats {
    pub(crate) fn update<T: ImagerFloat>(&mut self, ww: &[T]) {
        for w in ww {
            let val = w.abs().as_f64();
            self.sum_sq += val * val;
            self.min = self.min.min(val);
            self.max = self.max.max(val);
        }
        self.count += ww.len();
    }

    pub fn rms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.sum_sq / self.count as f64).sqrt()
        }
    }
}

/// Visibilities left out of gridding or weighting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SkipCounts {
    /// Uniform-weighting bins outside the grid, or empty at lookup.
    pub weights: usize,
    /// Visibilities whose kernel support left the grid.
    pub points: usize,
}

impl<T: ImagerFloat> PlaneStore<T> {
    /// Sum of all complex samples; used by tests to detect mutation.
    #[cfg(test)]
    pub(crate) fn checksum(&self) -> (f64, f64) {
        let planes: f64 = self
            .planes
            .iter()
            .flat_map(|p| p.iter())
            .map(|c| c.norm().as_f64())
            .sum();
        let grids: f64 = self
            .weights_grids
            .iter()
            .flat_map(|g| g.iter())
            .map(|w| w.as_f64())
            .sum::<f64>()
            + self.norms.iter().sum::<f64>();
        (planes, grids)
    }
}
