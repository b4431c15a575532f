// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Train + validation loop using Burn's DataLoader and Adam.
//
// Per epoch:
//   1. Redraw the oversampled training indices (seed + epoch)
//   2. Train over them with BCE-with-logits, writing a preview
//      PNG every `preview_every` batches
//   3. Validate on the un-augmented split: mean loss and Dice
//      of thresholded predictions over the whole split
//   4. Log metrics and save a checkpoint (top-k by val loss)
//
// Key Burn 0.20 points:
//   - Training runs on Autodiff<Backend> for gradients
//   - model.valid() returns the model on the inner backend,
//     so the validation loader is built for B::InnerBackend
//   - sigmoid(x) > 0.5  ⇔  x > 0, so validation thresholds
//     logits directly
//   - the loader stops at the first item the dataset fails to
//     return, so every pass checks it saw the whole dataset
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use anyhow::{anyhow, bail, Result};
use burn::{
    backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, Autodiff, NdArray, Wgpu},
    data::{dataloader::DataLoaderBuilder, dataset::Dataset},
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::{activation::sigmoid, backend::AutodiffBackend},
};
use std::{fs, path::Path};

use crate::application::train_use_case::TrainConfig;
use crate::data::{
    batcher::{SliceBatch, SliceBatcher},
    dataset::SliceDataset,
    sampler::OversampledDataset,
};
use crate::domain::{
    dice::{format_dice, DiceAccumulator},
    slice::SlicePair,
};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::{EpochMetrics, MetricsLogger},
    render::{render_preview, save_png},
};
use crate::ml::{model::{UNet, UNetConfig}, BackendKind};

/// What a finished run reports back to the use case.
#[derive(Debug, Clone)]
pub struct TrainSummary {
    pub epochs_run: usize,
    pub best_epoch: usize,
    pub best_loss:  f64,
    pub last:       Option<EpochMetrics>,
}

pub fn run_training(
    cfg:           &TrainConfig,
    train_dataset: SliceDataset,
    train_weights: Vec<f64>,
    val_dataset:   SliceDataset,
    ckpt_manager:  CheckpointManager,
) -> Result<TrainSummary> {
    match cfg.backend {
        BackendKind::Wgpu => {
            let device = WgpuDevice::default();
            tracing::info!("Using WGPU device: {:?}", device);
            train_loop::<Autodiff<Wgpu>>(cfg, train_dataset, train_weights, val_dataset, ckpt_manager, device)
        }
        BackendKind::NdArray => {
            let device = NdArrayDevice::default();
            tracing::info!("Using NdArray device: {:?}", device);
            train_loop::<Autodiff<NdArray>>(cfg, train_dataset, train_weights, val_dataset, ckpt_manager, device)
        }
    }
}

fn train_loop<B: AutodiffBackend>(
    cfg:           &TrainConfig,
    train_dataset: SliceDataset,
    train_weights: Vec<f64>,
    val_dataset:   SliceDataset,
    ckpt_manager:  CheckpointManager,
    device:        B::Device,
) -> Result<TrainSummary> {

    // ── Build model ───────────────────────────────────────────────────────────
    let mut model: UNet<B> = UNetConfig::new()
        .with_base_channels(cfg.base_channels)
        .init(&device);
    tracing::info!(
        "U-Net ready: base_channels={}, {} parameters",
        cfg.base_channels, model.num_params()
    );

    // ── Adam optimiser ────────────────────────────────────────────────────────
    let mut optim = AdamConfig::new().with_epsilon(1e-8).init::<B, UNet<B>>();

    // ── Validation data loader (InnerBackend — no autodiff overhead) ──────────
    let val_len = val_dataset.len();
    let val_loader = DataLoaderBuilder::<B::InnerBackend, SlicePair, SliceBatch<B::InnerBackend>>::new(SliceBatcher::new())
        .batch_size(cfg.batch_size)
        .num_workers(cfg.num_workers)
        .set_device(device.clone())
        .build(val_dataset);

    let metrics = MetricsLogger::new(ckpt_manager.dir())?;
    let preview_dir = ckpt_manager.dir().join("previews");
    if cfg.preview_every > 0 {
        fs::create_dir_all(&preview_dir)?;
    }

    let mut best_loss  = f64::INFINITY;
    let mut best_epoch = 0usize;
    let mut last       = None;
    let mut global_step = 0usize;

    // ── Epoch loop ────────────────────────────────────────────────────────────
    for epoch in 1..=cfg.epochs {

        // Fresh weighted draw each epoch
        let sampled = OversampledDataset::new(
            train_dataset.clone(),
            &train_weights,
            cfg.seed.wrapping_add(epoch as u64),
        )?;
        let train_len = sampled.len();
        let train_loader = DataLoaderBuilder::<B, SlicePair, SliceBatch<B>>::new(SliceBatcher::new())
            .batch_size(cfg.batch_size)
            .num_workers(cfg.num_workers)
            .set_device(device.clone())
            .build(sampled);

        // ── Training phase ────────────────────────────────────────────────────
        let mut train_loss_sum = 0.0f64;
        let mut train_batches  = 0usize;
        let mut train_seen     = 0usize;

        for batch in train_loader.iter() {
            train_seen += batch.images.dims()[0];
            let (loss, logits) = model.forward_loss(batch.images.clone(), batch.masks.clone());

            let loss_val: f64 = loss.clone().into_scalar().elem::<f64>();
            train_loss_sum += loss_val;
            train_batches  += 1;
            global_step    += 1;

            if cfg.preview_every > 0 && global_step % cfg.preview_every == 0 {
                let path = preview_dir.join(format!("epoch{epoch:03}_step{global_step:06}.png"));
                write_preview(&path, batch.images, batch.masks, logits.detach())?;
                tracing::debug!("Wrote preview '{}'", path.display());
            }

            // Backward pass + Adam update
            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(cfg.lr, model, grads);
        }

        check_pass_complete("training", epoch, train_seen, train_len)?;

        let avg_train_loss = if train_batches > 0 {
            train_loss_sum / train_batches as f64
        } else { f64::NAN };

        // ── Validation phase ──────────────────────────────────────────────────
        let model_valid = model.valid();

        let mut val_loss_sum = 0.0f64;
        let mut val_batches  = 0usize;
        let mut dice         = DiceAccumulator::default();
        let mut val_seen     = 0usize;

        for batch in val_loader.iter() {
            let (loss, logits) = model_valid.forward_loss(batch.images, batch.masks.clone());
            val_loss_sum += loss.into_scalar().elem::<f64>();
            val_batches  += 1;

            let slices = logits.dims()[0];
            val_seen  += slices;
            let pred   = logits.greater_elem(0.0).float();
            let truth  = batch.masks.float();

            let intersection: f64 = (pred.clone() * truth.clone()).sum().into_scalar().elem::<f64>();
            let pred_sum: f64     = pred.sum().into_scalar().elem::<f64>();
            let mask_sum: f64     = truth.sum().into_scalar().elem::<f64>();
            dice.add_sums(intersection, pred_sum, mask_sum, slices);
        }

        check_pass_complete("validation", epoch, val_seen, val_len)?;

        let avg_val_loss = if val_batches > 0 { val_loss_sum / val_batches as f64 } else { f64::NAN };

        let epoch_metrics = EpochMetrics::new(epoch, avg_train_loss, avg_val_loss, dice.score());
        metrics.log(&epoch_metrics)?;

        println!(
            "Epoch {:>3}/{} | train_loss={:.4} | val_loss={:.4} | val_dice={}",
            epoch, cfg.epochs, avg_train_loss, avg_val_loss, format_dice(dice.score()),
        );

        if epoch_metrics.is_improvement(best_loss) {
            best_loss  = epoch_metrics.monitored_loss();
            best_epoch = epoch;
        }

        ckpt_manager.save_model(&model, epoch, epoch_metrics.monitored_loss())?;
        tracing::info!("Checkpoint saved for epoch {}", epoch);
        last = Some(epoch_metrics);
    }

    tracing::info!("Training complete! Best epoch {} (loss {:.4})", best_epoch, best_loss);
    Ok(TrainSummary { epochs_run: cfg.epochs, best_epoch, best_loss, last })
}

/// Error out when a loader yielded fewer slices than its dataset holds.
fn check_pass_complete(phase: &str, epoch: usize, seen: usize, expected: usize) -> Result<()> {
    if seen < expected {
        bail!(
            "Epoch {epoch}: {phase} pass saw {seen} of {expected} slices; \
             a slice failed to load (see the error log)"
        );
    }
    Ok(())
}

/// First slice of the batch as image | truth | prediction.
fn write_preview<B: Backend>(
    path:   &Path,
    images: Tensor<B, 4>,
    masks:  Tensor<B, 4, Int>,
    logits: Tensor<B, 4>,
) -> Result<()> {
    let [_, _, height, width] = images.dims();
    let first = |t: Tensor<B, 4>| -> Result<Vec<f32>> {
        t.slice([0..1, 0..1, 0..height, 0..width])
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| anyhow!("Cannot read preview tensor: {e:?}"))
    };

    let image = first(images)?;
    let truth = first(masks.float())?;
    let pred  = first(sigmoid(logits))?;

    save_png(&render_preview(&image, &truth, &pred, height, width)?, path)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{loader::NpyTreeLoader, npy::write_2d, sampler::oversampling_weights};
    use crate::domain::traits::SliceSource;

    // Two 8x8 subjects: one slice with a tumour square, one without.
    fn write_split(root: &Path) {
        for subject in ["s1", "s2"] {
            let data  = root.join(subject).join("data");
            let masks = root.join(subject).join("masks");
            fs::create_dir_all(&data).unwrap();
            fs::create_dir_all(&masks).unwrap();

            let mut mask = vec![0.0f32; 64];
            for y in 2..5 {
                for x in 2..5 {
                    mask[y * 8 + x] = 1.0;
                }
            }
            let image: Vec<f32> = mask.iter().map(|m| 0.2 + 0.6 * m).collect();

            write_2d(&data.join("0.npy"), &image, 8, 8).unwrap();
            write_2d(&masks.join("0.npy"), &mask, 8, 8).unwrap();
            write_2d(&data.join("1.npy"), &[0.2; 64], 8, 8).unwrap();
            write_2d(&masks.join("1.npy"), &[0.0; 64], 8, 8).unwrap();
        }
    }

    #[test]
    fn test_one_epoch_smoke_run() {
        let dir = tempfile::tempdir().unwrap();
        let data_root = dir.path().join("npy");
        write_split(&data_root.join("train"));
        write_split(&data_root.join("val"));

        let cfg = TrainConfig {
            data_root:      data_root.to_string_lossy().into_owned(),
            checkpoint_dir: dir.path().join("ckpt").to_string_lossy().into_owned(),
            backend:        BackendKind::NdArray,
            epochs:         2,
            batch_size:     2,
            num_workers:    1,
            base_channels:  2,
            input_size:     8,
            preview_every:  1,
            top_k:          1,
            ..TrainConfig::default()
        };

        let train = SliceDataset::new(
            NpyTreeLoader::new(data_root.join("train")).entries().unwrap(),
            None,
        );
        let val = SliceDataset::new(
            NpyTreeLoader::new(data_root.join("val")).entries().unwrap(),
            None,
        );
        let weights = oversampling_weights(&train.foreground_flags(8, 8).unwrap()).unwrap();
        let ckpt = CheckpointManager::new(&cfg.checkpoint_dir).with_top_k(cfg.top_k);

        let summary = run_training(&cfg, train, weights, val, ckpt).unwrap();
        assert_eq!(summary.epochs_run, 2);
        assert!(summary.best_loss.is_finite());
        assert!(summary.last.unwrap().val_dice.is_some());

        let ckpt = CheckpointManager::new(&cfg.checkpoint_dir);
        assert_eq!(ckpt.retained().unwrap().len(), 1);
        assert_eq!(ckpt.best_epoch().unwrap(), summary.best_epoch);

        let csv = fs::read_to_string(ckpt.dir().join("metrics.csv")).unwrap();
        assert_eq!(csv.lines().count(), 3);

        let previews = fs::read_dir(ckpt.dir().join("previews")).unwrap().count();
        assert_eq!(previews, 4);
    }

    #[test]
    fn test_missing_val_slice_fails_the_epoch() {
        let dir = tempfile::tempdir().unwrap();
        let data_root = dir.path().join("npy");
        write_split(&data_root.join("train"));
        write_split(&data_root.join("val"));

        let cfg = TrainConfig {
            data_root:      data_root.to_string_lossy().into_owned(),
            checkpoint_dir: dir.path().join("ckpt").to_string_lossy().into_owned(),
            backend:        BackendKind::NdArray,
            epochs:         1,
            batch_size:     2,
            num_workers:    1,
            base_channels:  2,
            input_size:     8,
            preview_every:  0,
            ..TrainConfig::default()
        };

        let train = SliceDataset::new(
            NpyTreeLoader::new(data_root.join("train")).entries().unwrap(),
            None,
        );
        let val = SliceDataset::new(
            NpyTreeLoader::new(data_root.join("val")).entries().unwrap(),
            None,
        );
        let weights = oversampling_weights(&train.foreground_flags(8, 8).unwrap()).unwrap();
        // disappears after the split was listed
        fs::remove_file(data_root.join("val/s1/masks/1.npy")).unwrap();
        let ckpt = CheckpointManager::new(&cfg.checkpoint_dir);

        let err = run_training(&cfg, train, weights, val, ckpt).unwrap_err().to_string();
        assert!(err.contains("validation pass saw"), "{err}");
        assert!(err.contains("of 4 slices"), "{err}");
        assert!(CheckpointManager::new(&cfg.checkpoint_dir).retained().unwrap().is_empty());
    }
}
