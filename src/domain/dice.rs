// ============================================================
// Layer 3 — Dice Coefficient
// ============================================================
// Overlap between a prediction and a binary ground truth:
//
//   dice = 2 · Σ(pred · mask) / (Σ pred + Σ mask)
//
// Range [0, 1]: 1 for identical regions, 0 for disjoint ones.
//
// The prediction may be thresholded (0/1) or soft (sigmoid
// probabilities); the formula is the same.
//
// When both arrays are entirely empty the formula is 0 / 0.
// That case is returned as `None` ("undefined") rather than
// NaN, so callers have to decide what an empty slice means.

use anyhow::{bail, Result};

/// Dice score of one prediction/mask pair.
///
/// Returns `Ok(None)` when both inputs are entirely empty.
pub fn dice_coefficient(pred: &[f32], mask: &[f32]) -> Result<Option<f64>> {
    let mut acc = DiceAccumulator::default();
    acc.add(pred, mask)?;
    Ok(acc.score())
}

/// Running sums for a Dice score over many slices.
///
/// Adding slices one by one gives exactly the score of the
/// concatenated (flattened) arrays.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DiceAccumulator {
    intersection: f64,
    pred_sum:     f64,
    mask_sum:     f64,
    slices:       usize,
}

impl DiceAccumulator {
    pub fn add(&mut self, pred: &[f32], mask: &[f32]) -> Result<()> {
        if pred.len() != mask.len() {
            bail!(
                "prediction has {} values but mask has {}",
                pred.len(), mask.len()
            );
        }
        for (&p, &m) in pred.iter().zip(mask) {
            self.intersection += (p * m) as f64;
            self.pred_sum     += p as f64;
            self.mask_sum     += m as f64;
        }
        self.slices += 1;
        Ok(())
    }

    /// Fold in sums already reduced elsewhere (e.g. on the GPU).
    pub fn add_sums(&mut self, intersection: f64, pred_sum: f64, mask_sum: f64, slices: usize) {
        self.intersection += intersection;
        self.pred_sum     += pred_sum;
        self.mask_sum     += mask_sum;
        self.slices       += slices;
    }

    /// `None` while the denominator is zero.
    pub fn score(&self) -> Option<f64> {
        let denom = self.pred_sum + self.mask_sum;
        if denom == 0.0 {
            None
        } else {
            Some(2.0 * self.intersection / denom)
        }
    }

    pub fn slices(&self) -> usize {
        self.slices
    }
}

/// Human-readable form used in logs and CLI output.
pub fn format_dice(score: Option<f64>) -> String {
    match score {
        Some(d) => format!("{d:.4}"),
        None    => "undefined (both empty)".to_string(),
    }
}
