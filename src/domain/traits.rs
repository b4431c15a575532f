// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The application layer programs against these traits so the
// concrete file formats (.npy trees, NIfTI volumes) and the
// concrete model (a Burn U-Net on some backend) stay swappable.
//
//   SliceSource  → implemented by data::loader::NpyTreeLoader
//   VolumeSource → implemented by data::volume_reader::NiftiReader
//   Segmenter    → implemented by ml::inferencer::Inferencer

use anyhow::Result;
use std::path::Path;

use crate::domain::slice::SliceEntry;
use crate::domain::volume::CtVolume;

// ─── SliceSource ──────────────────────────────────────────────────────────────
/// Anything that can enumerate preprocessed image/mask slice pairs.
pub trait SliceSource {
    fn entries(&self) -> Result<Vec<SliceEntry>>;
}

// ─── VolumeSource ─────────────────────────────────────────────────────────────
/// Anything that can load a full CT volume from a path.
pub trait VolumeSource {
    fn load_volume(&self, path: &Path) -> Result<CtVolume>;
}

// ─── Segmenter ────────────────────────────────────────────────────────────────
/// Anything that turns one slice into per-pixel tumour probabilities.
pub trait Segmenter {
    /// `image` is row-major `height * width`; the result has the same layout
    /// with values in [0, 1].
    fn probabilities(&self, image: &[f32], height: usize, width: usize) -> Result<Vec<f32>>;

    /// Side length the model expects slices to be resized to.
    fn input_size(&self) -> usize;
}
