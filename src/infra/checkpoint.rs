// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores U-Net weights using Burn's CompactRecorder
// and keeps only the best `top_k` epochs by monitored loss
// (validation loss, or training loss when there is no
// validation split).
//
// Files in the checkpoint directory:
//
//   checkpoints/
//     model_epoch_3.<ext>    ← weights after epoch 3 (ext set by the recorder)
//     model_epoch_7.<ext>
//     ...
//     checkpoints.json       ← retained epochs and their monitored loss
//     latest_epoch.json      ← last epoch written
//     train_config.json      ← model + training hyperparameters
//
// Why save the config separately?
//   Inference has to rebuild the exact architecture
//   (base_channels, input size) before loading weights into it.
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};
use serde::{Deserialize, Serialize};
use std::{fs, path::{Path, PathBuf}};

use crate::application::train_use_case::TrainConfig;
use crate::ml::model::UNet;

const INDEX_FILE:  &str = "checkpoints.json";
const LATEST_FILE: &str = "latest_epoch.json";
const CONFIG_FILE: &str = "train_config.json";

/// One retained checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CheckpointEntry {
    pub epoch: usize,
    pub monitored_loss: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CheckpointIndex {
    entries: Vec<CheckpointEntry>,
}

/// Insert `entry`, keep the `k` lowest losses, and return the epochs
/// that fell out. Ties keep the earlier epoch.
pub fn retain_top_k(entries: &mut Vec<CheckpointEntry>, entry: CheckpointEntry, k: usize) -> Vec<usize> {
    entries.retain(|e| e.epoch != entry.epoch);
    entries.push(entry);
    entries.sort_by(|a, b| {
        a.monitored_loss
            .total_cmp(&b.monitored_loss)
            .then(a.epoch.cmp(&b.epoch))
    });

    let keep = k.max(1);
    if entries.len() <= keep {
        return Vec::new();
    }
    entries.split_off(keep).into_iter().map(|e| e.epoch).collect()
}

/// Manages saving and loading of model checkpoints.
pub struct CheckpointManager {
    dir:   PathBuf,
    top_k: usize,
}

impl CheckpointManager {
    /// Create the manager, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        // `mkdir -p`; an existing directory is fine
        fs::create_dir_all(&dir).ok();
        Self { dir, top_k: 10 }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save weights for `epoch` and prune checkpoints that are no longer
    /// among the best `top_k`.
    pub fn save_model<B: Backend>(
        &self,
        model: &UNet<B>,
        epoch: usize,
        monitored_loss: f64,
    ) -> Result<()> {
        let path = self.model_path(epoch);

        CompactRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;

        fs::write(self.dir.join(LATEST_FILE), serde_json::to_string(&epoch)?)
            .with_context(|| format!("Failed to write {LATEST_FILE}"))?;

        // serde_json cannot store NaN/inf; rank those last
        let monitored_loss = if monitored_loss.is_finite() { monitored_loss } else { f64::MAX };

        let mut index = self.read_index()?;
        let evicted = retain_top_k(
            &mut index.entries,
            CheckpointEntry { epoch, monitored_loss },
            self.top_k,
        );
        self.write_index(&index)?;

        for old in evicted {
            self.remove_epoch_files(old)?;
            tracing::debug!("Pruned checkpoint for epoch {}", old);
        }

        tracing::debug!("Saved checkpoint: epoch {} (loss {:.5})", epoch, monitored_loss);
        Ok(())
    }

    /// Forget a previous run: drop the index, the latest-epoch marker and
    /// every `model_epoch_*` file. Other files (metrics, previews) stay.
    pub fn reset(&self) -> Result<()> {
        for name in [INDEX_FILE, LATEST_FILE] {
            let path = self.dir.join(name);
            if path.exists() {
                fs::remove_file(&path)
                    .with_context(|| format!("Cannot remove '{}'", path.display()))?;
            }
        }
        self.remove_model_files("model_epoch_")
    }

    /// Load weights for `epoch`, or for the best retained epoch when `None`.
    pub fn load_model<B: Backend>(
        &self,
        model:  UNet<B>,
        epoch:  Option<usize>,
        device: &B::Device,
    ) -> Result<UNet<B>> {
        let epoch = match epoch {
            Some(e) => e,
            None    => self.best_epoch()?,
        };
        let path = self.model_path(epoch);

        tracing::info!("Loading checkpoint from epoch {}", epoch);

        let record = CompactRecorder::new()
            .load(path.clone(), device)
            .with_context(|| {
                format!(
                    "Cannot load checkpoint '{}'. Have you trained the model first?",
                    path.display()
                )
            })?;

        Ok(model.load_record(record))
    }

    /// Retained checkpoints, best first.
    pub fn retained(&self) -> Result<Vec<CheckpointEntry>> {
        Ok(self.read_index()?.entries)
    }

    /// Epoch with the lowest monitored loss; falls back to the latest epoch.
    pub fn best_epoch(&self) -> Result<usize> {
        match self.read_index()?.entries.first() {
            Some(best) => Ok(best.epoch),
            None       => self.latest_epoch(),
        }
    }

    /// Save the training configuration so inference can rebuild the model.
    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(cfg)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        let path = self.dir.join(CONFIG_FILE);
        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot read config from '{}'. \
                 Make sure you have run 'train' first.",
                path.display()
            )
        })?;
        Ok(serde_json::from_str(&json)?)
    }

    fn latest_epoch(&self) -> Result<usize> {
        let path = self.dir.join(LATEST_FILE);
        let s = fs::read_to_string(&path)
            .with_context(|| format!("Cannot find '{LATEST_FILE}'. Have you run 'train' first?"))?;
        Ok(serde_json::from_str::<usize>(&s)?)
    }

    // The recorder appends its own extension
    fn model_path(&self, epoch: usize) -> PathBuf {
        self.dir.join(format!("model_epoch_{epoch}"))
    }

    fn read_index(&self) -> Result<CheckpointIndex> {
        let path = self.dir.join(INDEX_FILE);
        if !path.exists() {
            return Ok(CheckpointIndex::default());
        }
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read '{}'", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Corrupt checkpoint index '{}'", path.display()))
    }

    fn write_index(&self, index: &CheckpointIndex) -> Result<()> {
        let path = self.dir.join(INDEX_FILE);
        fs::write(&path, serde_json::to_string_pretty(index)?)
            .with_context(|| format!("Cannot write '{}'", path.display()))
    }

    fn remove_epoch_files(&self, epoch: usize) -> Result<()> {
        self.remove_model_files(&format!("model_epoch_{epoch}."))
    }

    fn remove_model_files(&self, prefix: &str) -> Result<()> {
        if !self.dir.exists() {
            return Ok(());
        }
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let matches = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(prefix));
            if matches {
                fs::remove_file(&path)
                    .with_context(|| format!("Cannot remove '{}'", path.display()))?;
            }
        }
        Ok(())
    }
}
