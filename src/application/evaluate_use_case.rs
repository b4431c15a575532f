// ============================================================
// Layer 2 — Evaluate Use Case
// ============================================================
// Scores a trained checkpoint on a preprocessed split:
//
//   soft Dice — sigmoid probabilities vs. masks
//   hard Dice — predictions thresholded at `threshold`
//
// Both are computed over the whole split as one flattened
// array, not averaged per slice, so slices without tumour
// only contribute false positives.

use anyhow::{bail, Result};
use std::path::Path;

use crate::data::{
    loader::{read_pair, NpyTreeLoader},
    resize::{resize_image, resize_mask},
};
use crate::domain::{
    dice::{format_dice, DiceAccumulator},
    slice::SliceEntry,
    traits::{Segmenter, SliceSource},
};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::{inferencer::load_segmenter, BackendKind};

#[derive(Debug, Clone)]
pub struct EvalConfig {
    pub data_root:      String,
    /// Sub-directory of `data_root` to score, usually "val"
    pub split:          String,
    pub checkpoint_dir: String,
    pub backend:        BackendKind,
    /// None = best retained checkpoint
    pub epoch:          Option<usize>,
    pub threshold:      f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvalReport {
    pub slices:          usize,
    pub positive_slices: usize,
    pub soft_dice:       Option<f64>,
    pub hard_dice:       Option<f64>,
}

impl std::fmt::Display for EvalReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "slices={} (with tumour: {}) | soft_dice={} | hard_dice={}",
            self.slices,
            self.positive_slices,
            format_dice(self.soft_dice),
            format_dice(self.hard_dice),
        )
    }
}

pub struct EvaluateUseCase {
    config: EvalConfig,
}

impl EvaluateUseCase {
    pub fn new(config: EvalConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<EvalReport> {
        let cfg = &self.config;
        let split_dir = Path::new(&cfg.data_root).join(&cfg.split);

        let entries = NpyTreeLoader::new(&split_dir).entries()?;
        if entries.is_empty() {
            bail!("No slices found under '{}'", split_dir.display());
        }

        let ckpt      = CheckpointManager::new(&cfg.checkpoint_dir);
        let segmenter = load_segmenter(&ckpt, cfg.backend, cfg.epoch)?;

        tracing::info!("Evaluating {} slices from '{}'", entries.len(), split_dir.display());
        evaluate_slices(segmenter.as_ref(), &entries, cfg.threshold)
    }
}

/// Run `segmenter` over every entry and accumulate soft and hard Dice.
/// Slices whose size differs from the model input are resized first.
pub fn evaluate_slices(
    segmenter: &dyn Segmenter,
    entries:   &[SliceEntry],
    threshold: f32,
) -> Result<EvalReport> {
    let size = segmenter.input_size();
    let mut soft = DiceAccumulator::default();
    let mut hard = DiceAccumulator::default();
    let mut positive_slices = 0usize;

    for (i, entry) in entries.iter().enumerate() {
        let pair = read_pair(entry)?;
        let (image, mask) = if pair.height == size && pair.width == size {
            (pair.image, pair.mask)
        } else {
            (
                resize_image(&pair.image, pair.height, pair.width, size, size)?,
                resize_mask(&pair.mask, pair.height, pair.width, size, size)?,
            )
        };

        if mask.iter().any(|&m| m > 0.0) {
            positive_slices += 1;
        }

        let probs = segmenter.probabilities(&image, size, size)?;
        let binary: Vec<f32> = probs
            .iter()
            .map(|&p| if p > threshold { 1.0 } else { 0.0 })
            .collect();

        soft.add(&probs, &mask)?;
        hard.add(&binary, &mask)?;

        if (i + 1) % 500 == 0 {
            tracing::info!("  {}/{} slices scored", i + 1, entries.len());
        }
    }

    Ok(EvalReport {
        slices: entries.len(),
        positive_slices,
        soft_dice: soft.score(),
        hard_dice: hard.score(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::npy::write_2d;
    use std::fs;

    /// Predicts 0.9 wherever the image is bright.
    struct BrightSegmenter;

    impl Segmenter for BrightSegmenter {
        fn probabilities(&self, image: &[f32], _h: usize, _w: usize) -> Result<Vec<f32>> {
            Ok(image.iter().map(|&v| if v > 0.5 { 0.9 } else { 0.1 }).collect())
        }
        fn input_size(&self) -> usize {
            4
        }
    }

    fn entry(dir: &Path, idx: usize, image: &[f32], mask: &[f32], side: usize) -> SliceEntry {
        let image_path = dir.join("data").join(format!("{idx}.npy"));
        let mask_path  = dir.join("masks").join(format!("{idx}.npy"));
        fs::create_dir_all(image_path.parent().unwrap()).unwrap();
        fs::create_dir_all(mask_path.parent().unwrap()).unwrap();
        write_2d(&image_path, image, side, side).unwrap();
        write_2d(&mask_path, mask, side, side).unwrap();
        SliceEntry { subject: "s".into(), index: idx, image_path, mask_path }
    }

    #[test]
    fn test_perfect_hard_dice() {
        let dir = tempfile::tempdir().unwrap();
        let mut mask = [0.0f32; 16];
        mask[5] = 1.0;
        mask[6] = 1.0;
        let image: Vec<f32> = mask.iter().map(|m| m * 0.8).collect();

        let entries = vec![
            entry(dir.path(), 0, &image, &mask, 4),
            entry(dir.path(), 1, &[0.0; 16], &[0.0; 16], 4),
        ];
        let report = evaluate_slices(&BrightSegmenter, &entries, 0.5).unwrap();

        assert_eq!(report.slices, 2);
        assert_eq!(report.positive_slices, 1);
        assert_eq!(report.hard_dice, Some(1.0));
        // soft predictions are never exactly 0/1
        let soft = report.soft_dice.unwrap();
        assert!(soft > 0.0 && soft < 1.0);
    }

    #[test]
    fn test_all_empty_is_undefined_hard_dice() {
        let dir = tempfile::tempdir().unwrap();
        let entries = vec![entry(dir.path(), 0, &[0.0; 16], &[0.0; 16], 4)];
        let report = evaluate_slices(&BrightSegmenter, &entries, 0.5).unwrap();
        assert_eq!(report.hard_dice, None);
        assert!(report.to_string().contains("hard_dice=undefined"));
    }

    #[test]
    fn test_larger_slices_are_resized() {
        let dir = tempfile::tempdir().unwrap();
        let entries = vec![entry(dir.path(), 0, &[1.0; 64], &[1.0; 64], 8)];
        let report = evaluate_slices(&BrightSegmenter, &entries, 0.5).unwrap();
        assert_eq!(report.hard_dice, Some(1.0));
    }
}
