// ============================================================
// Layer 3 — CtVolume Domain Type
// ============================================================
// A 3-D CT scan held in memory.
//
// Voxels are stored in NIfTI order: x varies fastest, then y,
// then z. An axial slice `z` is returned as an image whose rows
// are x and whose columns are y, which is how the preprocessed
// training slices were laid out.

use anyhow::{bail, Result};

/// Divisor that maps Hounsfield units into roughly [-0.33, 1.0].
pub const HU_SCALE: f32 = 3071.0;

/// Number of leading axial slices dropped before training/inference.
/// The lower slices of these scans contain no lung.
pub const SKIPPED_SLICES: usize = 30;

#[derive(Debug, Clone)]
pub struct CtVolume {
    /// [x, y, z] voxel counts
    dims:   [usize; 3],
    voxels: Vec<f32>,
}

impl CtVolume {
    pub fn new(dims: [usize; 3], voxels: Vec<f32>) -> Result<Self> {
        let expected = dims.iter().product::<usize>();
        if voxels.len() != expected {
            bail!(
                "volume {:?} needs {} voxels, got {}",
                dims, expected, voxels.len()
            );
        }
        Ok(Self { dims, voxels })
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// Number of axial slices.
    pub fn depth(&self) -> usize {
        self.dims[2]
    }

    /// Divide every voxel by `divisor` (HU normalisation).
    pub fn normalised(mut self, divisor: f32) -> Self {
        self.voxels.iter_mut().for_each(|v| *v /= divisor);
        self
    }

    /// Axial slice `z` as a row-major (x rows, y columns) image.
    pub fn axial_slice(&self, z: usize) -> Option<Vec<f32>> {
        let [nx, ny, nz] = self.dims;
        if z >= nz {
            return None;
        }
        let plane = &self.voxels[z * nx * ny..(z + 1) * nx * ny];

        let mut out = Vec::with_capacity(nx * ny);
        for x in 0..nx {
            for y in 0..ny {
                out.push(plane[x + nx * y]);
            }
        }
        Some(out)
    }

    /// Indices of the slices kept after dropping the first `skip`.
    pub fn kept_slices(&self, skip: usize) -> std::ops::Range<usize> {
        skip.min(self.depth())..self.depth()
    }
}
