// ============================================================
// Layer 4 — NIfTI Volume Reader
// ============================================================
// Loads `.nii` / `.nii.gz` CT scans and label maps with the
// `nifti` crate. Gzip is detected from the file extension.
//
// Voxel values go through `get_f32`, which applies the header's
// scl_slope / scl_inter, so CT intensities come out in Hounsfield
// units regardless of the on-disk data type.
//
// 4-D files (e.g. with a singleton time axis) are accepted; only
// the first frame is read.

use anyhow::{bail, Context, Result};
use nifti::{NiftiObject, NiftiVolume, RandomAccessNiftiVolume, ReaderOptions};
use std::path::Path;

use crate::domain::traits::VolumeSource;
use crate::domain::volume::CtVolume;

#[derive(Debug, Clone, Copy, Default)]
pub struct NiftiReader;

impl NiftiReader {
    pub fn new() -> Self {
        Self
    }
}

impl VolumeSource for NiftiReader {
    fn load_volume(&self, path: &Path) -> Result<CtVolume> {
        let obj = ReaderOptions::new()
            .read_file(path)
            .with_context(|| format!("Cannot read NIfTI file '{}'", path.display()))?;
        let volume = obj.volume();

        let dim = volume.dim().to_vec();
        if dim.len() < 3 {
            bail!(
                "'{}' has {} dimensions; a CT volume needs 3",
                path.display(), dim.len()
            );
        }
        let (nx, ny, nz) = (dim[0], dim[1], dim[2]);

        // Extra axes stay pinned at index 0
        let mut coords = vec![0u16; dim.len()];
        let mut voxels = Vec::with_capacity(nx as usize * ny as usize * nz as usize);

        for z in 0..nz {
            for y in 0..ny {
                for x in 0..nx {
                    coords[0] = x;
                    coords[1] = y;
                    coords[2] = z;
                    voxels.push(volume.get_f32(&coords)?);
                }
            }
        }

        tracing::debug!(
            "Loaded '{}': {}x{}x{} voxels",
            path.display(), nx, ny, nz
        );

        CtVolume::new([nx as usize, ny as usize, nz as usize], voxels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    /// Minimal little-endian NIfTI-1 file: float32 voxels 0, 1, 2, ...
    /// in x-fastest order, with the given intensity scaling.
    fn write_nii(path: &Path, dims: [u16; 3], slope: f32, inter: f32) {
        let mut bytes = vec![0u8; 352];
        bytes[0..4].copy_from_slice(&348i32.to_le_bytes());
        let dim: [i16; 8] = [3, dims[0] as i16, dims[1] as i16, dims[2] as i16, 1, 1, 1, 1];
        for (i, d) in dim.iter().enumerate() {
            bytes[40 + 2 * i..42 + 2 * i].copy_from_slice(&d.to_le_bytes());
        }
        bytes[70..72].copy_from_slice(&16i16.to_le_bytes()); // float32
        bytes[72..74].copy_from_slice(&32i16.to_le_bytes());
        for i in 0..8 {
            bytes[76 + 4 * i..80 + 4 * i].copy_from_slice(&1.0f32.to_le_bytes());
        }
        bytes[108..112].copy_from_slice(&352.0f32.to_le_bytes());
        bytes[112..116].copy_from_slice(&slope.to_le_bytes());
        bytes[116..120].copy_from_slice(&inter.to_le_bytes());
        bytes[344..348].copy_from_slice(b"n+1\0");

        let count = dims.iter().map(|&d| d as usize).product::<usize>();
        for v in 0..count {
            bytes.extend_from_slice(&(v as f32).to_le_bytes());
        }
        fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_reads_scaled_voxels() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("lung_001.nii");
        write_nii(&path, [2, 3, 2], 2.0, -1.0);

        let volume = NiftiReader::new().load_volume(&path).unwrap();
        assert_eq!(volume.dims(), [2, 3, 2]);
        // raw 6..12 on the second plane, scaled by 2x - 1
        assert_eq!(
            volume.axial_slice(1).unwrap(),
            vec![11.0, 15.0, 19.0, 13.0, 17.0, 21.0]
        );
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = NiftiReader::new().load_volume(&dir.path().join("none.nii")).unwrap_err();
        assert!(err.to_string().contains("Cannot read NIfTI file"));
    }
}
