// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Discover train/val slices     (Layer 4 - data)
//   Step 2: Check slice size vs. U-Net    (Layer 5 - ml)
//   Step 3: Build datasets                (Layer 4 - data)
//   Step 4: Validate slices, weights      (Layer 4 - data)
//   Step 5: Reset checkpoints, save config (Layer 6 - infra)
//   Step 6: Run training loop             (Layer 5 - ml)
//
// Reference: Burn Book §5 (Training)

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::data::{
    augment::AffineAugment,
    dataset::SliceDataset,
    loader::NpyTreeLoader,
    sampler::oversampling_weights,
};
use crate::domain::traits::SliceSource;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::{
    model::check_input_size,
    trainer::{run_training, TrainSummary},
    BackendKind,
};

// ─── Training Configuration ──────────────────────────────────────────────────
// All hyperparameters for a training run.
// Saved next to the checkpoints so inference can rebuild the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Preprocessed tree containing `train/` and `val/`
    pub data_root:      String,
    pub checkpoint_dir: String,
    pub backend:        BackendKind,
    pub epochs:         usize,
    pub batch_size:     usize,
    pub lr:             f64,
    pub num_workers:    usize,
    pub base_channels:  usize,
    /// Checkpoints kept, ranked by validation loss
    pub top_k:          usize,
    pub seed:           u64,
    pub augment:        bool,
    /// Preview PNG every N training batches (0 = never)
    pub preview_every:  usize,
    /// Slice side length the model was trained on
    pub input_size:     usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data_root:      "Task06_Lung/Preprocessed".to_string(),
            checkpoint_dir: "checkpoints".to_string(),
            backend:        BackendKind::Wgpu,
            epochs:         30,
            batch_size:     8,
            lr:             1e-4,
            num_workers:    4,
            base_channels:  64,
            top_k:          10,
            seed:           42,
            augment:        true,
            preview_every:  50,
            input_size:     256,
        }
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline end to end
    pub fn execute(&self) -> Result<TrainSummary> {
        let mut cfg = self.config.clone();
        let root = Path::new(&cfg.data_root);

        // ── Step 1: Discover slices ───────────────────────────────────────────
        tracing::info!("Loading slices from '{}'", root.display());
        let train_entries = NpyTreeLoader::new(root.join("train")).entries()?;
        let val_entries   = NpyTreeLoader::new(root.join("val")).entries()?;
        tracing::info!(
            "Found {} train and {} validation slices",
            train_entries.len(),
            val_entries.len()
        );

        if train_entries.is_empty() {
            bail!("No training slices found under '{}'", root.join("train").display());
        }
        if val_entries.is_empty() {
            tracing::warn!("No validation slices; checkpoints will be ranked by training loss");
        }

        // ── Step 2: Slice size ────────────────────────────────────────────────
        let train_dataset = SliceDataset::new(
            train_entries,
            cfg.augment.then(AffineAugment::default),
        );
        let first = train_dataset.load_raw(0)?;
        check_input_size(first.height, first.width)?;
        if first.height != first.width {
            tracing::warn!("Non-square slices ({}x{})", first.height, first.width);
        }
        cfg.input_size = first.height;

        // ── Step 3 + 4: Datasets and oversampling weights ─────────────────────
        // Both splits are read in full here: corrupt files and slices of
        // another size fail before the first epoch starts
        let (height, width) = (first.height, first.width);
        let flags   = train_dataset.foreground_flags(height, width)?;
        let weights = oversampling_weights(&flags)?;
        let val_dataset = SliceDataset::new(val_entries, None);
        val_dataset.foreground_flags(height, width)?;

        // ── Step 5: Fresh checkpoint index, config for inference ──────────────
        let ckpt_manager = CheckpointManager::new(&cfg.checkpoint_dir).with_top_k(cfg.top_k);
        ckpt_manager.reset()?;
        ckpt_manager.save_config(&cfg)?;

        // ── Step 6: Run training loop (Layer 5) ───────────────────────────────
        run_training(&cfg, train_dataset, weights, val_dataset, ckpt_manager)
    }
}
