// ============================================================
// Layer 5 — Inferencer
// ============================================================
// Rebuilds the U-Net from the saved TrainConfig, loads its
// weights and segments one slice at a time.
use anyhow::{anyhow, bail, Result};
use burn::{
    backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, NdArray, Wgpu},
    prelude::*,
};

use crate::domain::traits::Segmenter;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::{model::{check_input_size, UNet, UNetConfig}, BackendKind};

pub struct Inferencer<B: Backend> {
    model:      UNet<B>,
    input_size: usize,
    device:     B::Device,
}

impl<B: Backend> Inferencer<B> {
    /// `epoch = None` loads the best retained checkpoint.
    pub fn from_checkpoint(
        ckpt_manager: &CheckpointManager,
        epoch:        Option<usize>,
        device:       B::Device,
    ) -> Result<Self> {
        let cfg = ckpt_manager.load_config()?;
        let model: UNet<B> = UNetConfig::new()
            .with_base_channels(cfg.base_channels)
            .init(&device);
        let model = ckpt_manager.load_model(model, epoch, &device)?;
        tracing::info!("Model loaded from checkpoint (input {}x{})", cfg.input_size, cfg.input_size);
        Ok(Self { model, input_size: cfg.input_size, device })
    }
}

impl<B: Backend> Segmenter for Inferencer<B> {
    fn probabilities(&self, image: &[f32], height: usize, width: usize) -> Result<Vec<f32>> {
        if image.len() != height * width {
            bail!("slice has {} values, expected {}x{}", image.len(), height, width);
        }
        check_input_size(height, width)?;

        let input = Tensor::<B, 1>::from_floats(image, &self.device)
            .reshape([1, 1, height, width]);

        self.model
            .probabilities(input)
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| anyhow!("Cannot read model output: {e:?}"))
    }

    fn input_size(&self) -> usize {
        self.input_size
    }
}

/// Load a checkpoint onto the requested backend behind the Segmenter trait.
pub fn load_segmenter(
    ckpt_manager: &CheckpointManager,
    backend:      BackendKind,
    epoch:        Option<usize>,
) -> Result<Box<dyn Segmenter>> {
    Ok(match backend {
        BackendKind::Wgpu => Box::new(Inferencer::<Wgpu>::from_checkpoint(
            ckpt_manager, epoch, WgpuDevice::default(),
        )?),
        BackendKind::NdArray => Box::new(Inferencer::<NdArray>::from_checkpoint(
            ckpt_manager, epoch, NdArrayDevice::default(),
        )?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::train_use_case::TrainConfig;

    fn saved_checkpoint(dir: &std::path::Path) -> CheckpointManager {
        let device = NdArrayDevice::default();
        let cfg = TrainConfig { base_channels: 2, input_size: 8, ..TrainConfig::default() };
        let model: UNet<NdArray> = UNetConfig::new().with_base_channels(2).init(&device);

        let ckpt = CheckpointManager::new(dir);
        ckpt.save_config(&cfg).unwrap();
        ckpt.save_model(&model, 1, 0.5).unwrap();
        ckpt
    }

    #[test]
    fn test_reload_and_segment() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = saved_checkpoint(dir.path());

        let seg = load_segmenter(&ckpt, BackendKind::NdArray, None).unwrap();
        assert_eq!(seg.input_size(), 8);

        let probs = seg.probabilities(&[0.1; 64], 8, 8).unwrap();
        assert_eq!(probs.len(), 64);
        assert!(probs.iter().all(|&p| (0.0..=1.0).contains(&p)));
    }

    #[test]
    fn test_rejects_bad_slice() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = saved_checkpoint(dir.path());
        let seg = Inferencer::<NdArray>::from_checkpoint(&ckpt, Some(1), NdArrayDevice::default()).unwrap();

        assert!(seg.probabilities(&[0.0; 10], 8, 8).is_err());
        assert!(seg.probabilities(&[0.0; 36], 6, 6).is_err());
    }

    #[test]
    fn test_missing_epoch_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = saved_checkpoint(dir.path());
        assert!(load_segmenter(&ckpt, BackendKind::NdArray, Some(7)).is_err());
    }
}
