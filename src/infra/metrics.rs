// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Records training metrics to a CSV file after each epoch.
//
// Metrics recorded per epoch:
//   - epoch:      the epoch number (1, 2, 3, ...)
//   - train_loss: mean BCE loss over the oversampled training batches
//   - val_loss:   mean BCE loss on the validation split
//   - val_dice:   Dice of thresholded predictions over the whole
//                 validation split (empty when undefined)
//
// Output file: <checkpoint_dir>/metrics.csv
//
//   epoch,train_loss,val_loss,val_dice
//   1,0.213400,0.051200,0.412300
//   2,0.088100,0.043300,0.518800
//
// How to read the metrics:
//   - Oversampling makes train_loss look worse than val_loss;
//     compare each against its own history, not each other
//   - Rising val_loss with falling train_loss → overfitting
//   - val_dice is the number that matters for segmentation

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::PathBuf,
};

/// One row of metrics for a single training epoch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub train_loss: f64,
    /// NaN when there is no validation split
    pub val_loss: f64,
    /// None when undefined (no validation split, or nothing to overlap)
    pub val_dice: Option<f64>,
}

impl EpochMetrics {
    pub fn new(epoch: usize, train_loss: f64, val_loss: f64, val_dice: Option<f64>) -> Self {
        Self { epoch, train_loss, val_loss, val_dice }
    }

    /// Loss used to rank checkpoints: validation when available.
    pub fn monitored_loss(&self) -> f64 {
        if self.val_loss.is_finite() { self.val_loss } else { self.train_loss }
    }

    /// Returns true if this epoch improved over the previous best
    pub fn is_improvement(&self, best_loss: f64) -> bool {
        self.monitored_loss() < best_loss
    }
}

/// Logs epoch metrics to a CSV file for later analysis.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Writes the CSV header if the file doesn't exist yet, so
    /// repeated runs append to the same log.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir: PathBuf = dir.into();
        fs::create_dir_all(&dir)?;

        let csv_path = dir.join("metrics.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            writeln!(f, "epoch,train_loss,val_loss,val_dice")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    /// Append one epoch's metrics as a new CSV row.
    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new().append(true).open(&self.csv_path)?;

        let dice = m.val_dice.map(|d| format!("{d:.6}")).unwrap_or_default();
        writeln!(f, "{},{:.6},{:.6},{}", m.epoch, m.train_loss, m.val_loss, dice)?;

        tracing::debug!(
            "Logged epoch {} metrics: train_loss={:.4}, val_loss={:.4}",
            m.epoch, m.train_loss, m.val_loss,
        );
        Ok(())
    }

    pub fn csv_path(&self) -> &PathBuf {
        &self.csv_path
    }
}
