// ============================================================
// Layer 3 — SlicePair Domain Type
// ============================================================
// One axial CT slice and its segmentation mask.
//
// Both are stored row-major as flat Vecs of height * width values.
// The mask is always normalised to 0.0 / 1.0 on construction, so
// downstream code (batcher, Dice, rendering) never has to care
// whether the file on disk stored labels as u8, f32 or f64.

use anyhow::{bail, Result};
use std::path::PathBuf;

/// Location of one preprocessed slice and its mask on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceEntry {
    /// Subject (patient) directory name
    pub subject:    String,
    /// Slice number parsed from the file stem
    pub index:      usize,
    pub image_path: PathBuf,
    pub mask_path:  PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlicePair {
    pub image:  Vec<f32>,
    pub mask:   Vec<f32>,
    pub height: usize,
    pub width:  usize,
}

impl SlicePair {
    /// Build a pair, rejecting any shape mismatch between image and mask.
    pub fn new(image: Vec<f32>, mask: Vec<f32>, height: usize, width: usize) -> Result<Self> {
        let expected = height * width;
        if image.len() != expected {
            bail!(
                "image has {} values but a {}x{} slice needs {}",
                image.len(), height, width, expected
            );
        }
        if mask.len() != expected {
            bail!(
                "mask has {} values but a {}x{} slice needs {}",
                mask.len(), height, width, expected
            );
        }

        // Any non-zero label counts as tumour
        let mask = mask
            .into_iter()
            .map(|v| if v != 0.0 { 1.0 } else { 0.0 })
            .collect();

        Ok(Self { image, mask, height, width })
    }

    /// True when at least one mask pixel is foreground.
    pub fn has_foreground(&self) -> bool {
        self.mask.iter().any(|&v| v > 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_mask_shape_mismatch() {
        let err = SlicePair::new(vec![0.0; 4], vec![0.0; 3], 2, 2);
        assert!(err.is_err());
    }

    #[test]
    fn test_rejects_image_shape_mismatch() {
        let err = SlicePair::new(vec![0.0; 6], vec![0.0; 4], 2, 2);
        assert!(err.is_err());
    }

    #[test]
    fn test_mask_is_binarised() {
        let pair = SlicePair::new(vec![0.0; 4], vec![0.0, 2.0, 1.0, 0.0], 2, 2).unwrap();
        assert_eq!(pair.mask, vec![0.0, 1.0, 1.0, 0.0]);
        assert!(pair.has_foreground());
    }

    #[test]
    fn test_empty_mask_has_no_foreground() {
        let pair = SlicePair::new(vec![0.5; 4], vec![0.0; 4], 2, 2).unwrap();
        assert!(!pair.has_foreground());
    }
}
