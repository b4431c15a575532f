// ============================================================
// Layer 4 — Slice Batcher
// ============================================================
// Implements Burn's Batcher trait to stack a Vec<SlicePair>
// into one tensor batch.
//
//   Input:  N slices of H x W
//   Output: images [N, 1, H, W] (float)
//           masks  [N, 1, H, W] (int, 0 or 1)
//
// The single channel axis is what the U-Net's first conv layer
// expects. Masks stay integer because the BCE loss takes integer
// targets.
//
// All slices in a batch must share one H x W, which holds for the
// preprocessed data since every slice is resized to one size.

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::domain::slice::SlicePair;

#[derive(Debug, Clone)]
pub struct SliceBatch<B: Backend> {
    /// CT intensities — shape [batch, 1, height, width]
    pub images: Tensor<B, 4>,
    /// Tumour labels — shape [batch, 1, height, width]
    pub masks: Tensor<B, 4, Int>,
}

#[derive(Clone, Debug, Default)]
pub struct SliceBatcher;

impl SliceBatcher {
    pub fn new() -> Self {
        Self
    }
}

impl<B: Backend> Batcher<B, SlicePair, SliceBatch<B>> for SliceBatcher {
    fn batch(&self, items: Vec<SlicePair>, device: &B::Device) -> SliceBatch<B> {
        let batch_size = items.len();
        let (height, width) = (items[0].height, items[0].width);

        let image_flat: Vec<f32> = items
            .iter()
            .flat_map(|s| s.image.iter().copied())
            .collect();

        let mask_flat: Vec<i32> = items
            .iter()
            .flat_map(|s| s.mask.iter().map(|&m| m as i32))
            .collect();

        let images = Tensor::<B, 1>::from_floats(image_flat.as_slice(), device)
            .reshape([batch_size, 1, height, width]);

        let masks = Tensor::<B, 1, Int>::from_ints(mask_flat.as_slice(), device)
            .reshape([batch_size, 1, height, width]);

        SliceBatch { images, masks }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{ndarray::NdArrayDevice, NdArray};

    #[test]
    fn test_batch_shapes_and_values() {
        let device = NdArrayDevice::default();
        let a = SlicePair::new(vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6], vec![0.0, 1.0, 0.0, 0.0, 0.0, 0.0], 2, 3).unwrap();
        let b = SlicePair::new(vec![0.0; 6], vec![1.0; 6], 2, 3).unwrap();

        let batch: SliceBatch<NdArray> = SliceBatcher::new().batch(vec![a, b], &device);

        assert_eq!(batch.images.dims(), [2, 1, 2, 3]);
        assert_eq!(batch.masks.dims(), [2, 1, 2, 3]);

        let mask_sum: i64 = batch.masks.sum().into_scalar().elem::<i64>();
        assert_eq!(mask_sum, 7);

        let first = batch.images.into_data().to_vec::<f32>().unwrap();
        assert!((first[1] - 0.2).abs() < 1e-6);
    }
}
