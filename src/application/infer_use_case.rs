// ============================================================
// Layer 2 — Infer Use Case
// ============================================================
// Segments a whole CT volume and renders it:
//
//   Step 1: Load the NIfTI volume           (Layer 4 - data)
//   Step 2: Scale HU by 1/3071              (Layer 3 - domain)
//   Step 3: Drop the leading slices         (Layer 3 - domain)
//   Step 4: Resize + predict + threshold    (Layer 4 / 5)
//   Step 5: PNG per slice + animated GIF    (Layer 6 - infra)
//
// Frames show the CT slice in the bone colour map with the
// predicted tumour overlaid in yellow.

use anyhow::{bail, Result};
use image::RgbImage;
use std::{fs, path::{Path, PathBuf}};

use crate::data::{resize::resize_image, volume_reader::NiftiReader};
use crate::domain::{
    traits::{Segmenter, VolumeSource},
    volume::{CtVolume, HU_SCALE},
};
use crate::infra::{
    checkpoint::CheckpointManager,
    render::{render_overlay, save_png, write_gif},
};
use crate::ml::{inferencer::load_segmenter, BackendKind};

#[derive(Debug, Clone)]
pub struct InferConfig {
    pub volume:         String,
    pub checkpoint_dir: String,
    pub output_dir:     String,
    pub backend:        BackendKind,
    pub epoch:          Option<usize>,
    pub threshold:      f32,
    pub skip_slices:    usize,
    pub fps:            u32,
}

/// One segmented axial slice at model resolution.
#[derive(Debug, Clone)]
pub struct SegmentedSlice {
    /// Index in the original volume
    pub z:     usize,
    pub image: Vec<f32>,
    /// Thresholded prediction, 0.0 or 1.0
    pub mask:  Vec<f32>,
    pub size:  usize,
}

impl SegmentedSlice {
    pub fn tumour_pixels(&self) -> usize {
        self.mask.iter().filter(|&&m| m > 0.0).count()
    }
}

#[derive(Debug, Clone)]
pub struct InferReport {
    pub frames:        usize,
    pub tumour_slices: usize,
    pub gif_path:      PathBuf,
}

pub struct InferUseCase {
    config: InferConfig,
}

impl InferUseCase {
    pub fn new(config: InferConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<InferReport> {
        let cfg = &self.config;

        // ── Step 1-3: Volume ──────────────────────────────────────────────────
        tracing::info!("Reading volume '{}'", cfg.volume);
        let volume = NiftiReader::new()
            .load_volume(Path::new(&cfg.volume))?
            .normalised(HU_SCALE);

        // ── Step 4: Predict ───────────────────────────────────────────────────
        let ckpt      = CheckpointManager::new(&cfg.checkpoint_dir);
        let segmenter = load_segmenter(&ckpt, cfg.backend, cfg.epoch)?;
        let slices    = segment_volume(segmenter.as_ref(), &volume, cfg.skip_slices, cfg.threshold)?;

        // ── Step 5: Render ────────────────────────────────────────────────────
        render_slices(&slices, Path::new(&cfg.output_dir), cfg.fps)
    }
}

/// Predict a thresholded mask for every kept axial slice of `volume`.
pub fn segment_volume(
    segmenter:   &dyn Segmenter,
    volume:      &CtVolume,
    skip_slices: usize,
    threshold:   f32,
) -> Result<Vec<SegmentedSlice>> {
    let [nx, ny, _] = volume.dims();
    let size = segmenter.input_size();
    let kept = volume.kept_slices(skip_slices);

    if kept.is_empty() {
        bail!(
            "volume has {} slices; nothing left after skipping {}",
            volume.depth(), skip_slices
        );
    }
    tracing::info!("Segmenting slices {}..{} at {}x{}", kept.start, kept.end, size, size);

    let mut out = Vec::with_capacity(kept.len());
    for z in kept {
        let Some(raw) = volume.axial_slice(z) else { continue };
        let image = resize_image(&raw, nx, ny, size, size)?;

        let mask = segmenter
            .probabilities(&image, size, size)?
            .into_iter()
            .map(|p| if p > threshold { 1.0 } else { 0.0 })
            .collect();

        out.push(SegmentedSlice { z, image, mask, size });
    }
    Ok(out)
}

/// Write `frame_<z>.png` for each slice and `segmentation.gif` for all of them.
pub fn render_slices(slices: &[SegmentedSlice], output_dir: &Path, fps: u32) -> Result<InferReport> {
    fs::create_dir_all(output_dir)?;

    let mut frames: Vec<RgbImage> = Vec::with_capacity(slices.len());
    for s in slices {
        let frame = render_overlay(&s.image, s.size, s.size, None, Some(&s.mask))?;
        save_png(&frame, &output_dir.join(format!("frame_{:04}.png", s.z)))?;
        frames.push(frame);
    }

    let gif_path = output_dir.join("segmentation.gif");
    write_gif(&frames, &gif_path, fps)?;

    let tumour_slices = slices.iter().filter(|s| s.tumour_pixels() > 0).count();
    tracing::info!(
        "Wrote {} frames ({} with tumour) to '{}'",
        frames.len(), tumour_slices, output_dir.display()
    );

    Ok(InferReport { frames: frames.len(), tumour_slices, gif_path })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Marks the left half of every slice as tumour.
    struct HalfSegmenter;

    impl Segmenter for HalfSegmenter {
        fn probabilities(&self, _image: &[f32], h: usize, w: usize) -> Result<Vec<f32>> {
            Ok((0..h * w).map(|i| if i % w < w / 2 { 0.8 } else { 0.2 }).collect())
        }
        fn input_size(&self) -> usize {
            8
        }
    }

    fn volume(depth: usize) -> CtVolume {
        CtVolume::new([16, 16, depth], vec![0.3; 16 * 16 * depth]).unwrap()
    }

    #[test]
    fn test_skips_leading_slices_and_resizes() {
        let slices = segment_volume(&HalfSegmenter, &volume(5), 2, 0.5).unwrap();
        let zs: Vec<usize> = slices.iter().map(|s| s.z).collect();
        assert_eq!(zs, vec![2, 3, 4]);
        assert!(slices.iter().all(|s| s.image.len() == 64 && s.tumour_pixels() == 32));
    }

    #[test]
    fn test_too_few_slices_is_error() {
        assert!(segment_volume(&HalfSegmenter, &volume(3), 30, 0.5).is_err());
    }

    #[test]
    fn test_render_writes_frames_and_gif() {
        let dir = tempfile::tempdir().unwrap();
        let slices = segment_volume(&HalfSegmenter, &volume(3), 1, 0.5).unwrap();
        let report = render_slices(&slices, dir.path(), 5).unwrap();

        assert_eq!(report.frames, 2);
        assert_eq!(report.tumour_slices, 2);
        assert!(report.gif_path.exists());
        assert!(dir.path().join("frame_0001.png").exists());
        assert!(dir.path().join("frame_0002.png").exists());
    }
}
