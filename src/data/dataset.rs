use anyhow::{bail, Result};
use burn::data::dataset::Dataset;
use std::sync::Arc;

use crate::data::{augment::AffineAugment, loader::read_pair};
use crate::domain::slice::{SliceEntry, SlicePair};

/// Lazily-loaded CT slices. Each `get` reads one image/mask pair from
/// disk and, for training data, applies a random affine augmentation.
#[derive(Debug, Clone)]
pub struct SliceDataset {
    entries: Arc<Vec<SliceEntry>>,
    augment: Option<AffineAugment>,
}

impl SliceDataset {
    pub fn new(entries: Vec<SliceEntry>, augment: Option<AffineAugment>) -> Self {
        Self { entries: Arc::new(entries), augment }
    }

    /// Read slice `index` without augmentation.
    pub fn load_raw(&self, index: usize) -> Result<SlicePair> {
        let entry = self
            .entries
            .get(index)
            .ok_or_else(|| anyhow::anyhow!("slice index {index} out of range"))?;
        read_pair(entry)
    }

    /// Whether each slice's mask contains at least one tumour pixel.
    /// Reads every pair once, so unreadable files and slices that are
    /// not `height x width` fail here instead of mid-epoch.
    pub fn foreground_flags(&self, height: usize, width: usize) -> Result<Vec<bool>> {
        self.entries
            .iter()
            .map(|entry| {
                let pair = read_pair(entry)?;
                if (pair.height, pair.width) != (height, width) {
                    bail!(
                        "Slice {} of '{}' is {}x{}, expected {}x{}",
                        entry.index, entry.subject, pair.height, pair.width, height, width
                    );
                }
                Ok(pair.has_foreground())
            })
            .collect()
    }
}

impl Dataset<SlicePair> for SliceDataset {
    // Burn's loader treats `None` as the end of the dataset, so a
    // failed read is logged loudly before being dropped.
    fn get(&self, index: usize) -> Option<SlicePair> {
        let pair = match self.load_raw(index) {
            Ok(pair) => pair,
            Err(e) => {
                tracing::error!("Failed to load slice {index}: {e:#}");
                return None;
            }
        };

        Some(match &self.augment {
            Some(aug) => aug.apply(&pair),
            None      => pair,
        })
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::NpyTreeLoader;
    use crate::data::npy;
    use crate::domain::traits::SliceSource;
    use std::{fs, path::Path};

    fn write_split(root: &Path, masks: &[[f32; 4]]) {
        let data = root.join("0").join("data");
        let mdir = root.join("0").join("masks");
        fs::create_dir_all(&data).unwrap();
        fs::create_dir_all(&mdir).unwrap();
        for (i, m) in masks.iter().enumerate() {
            npy::write_2d(&data.join(format!("{i}.npy")), &[0.25; 4], 2, 2).unwrap();
            npy::write_2d(&mdir.join(format!("{i}.npy")), m, 2, 2).unwrap();
        }
    }

    #[test]
    fn test_get_reads_pair() {
        let dir = tempfile::tempdir().unwrap();
        write_split(dir.path(), &[[0.0, 1.0, 0.0, 0.0]]);
        let ds = SliceDataset::new(NpyTreeLoader::new(dir.path()).entries().unwrap(), None);

        let item = ds.get(0).unwrap();
        assert_eq!(item.image, vec![0.25; 4]);
        assert_eq!(ds.len(), 1);
        assert!(ds.get(1).is_none());
    }

    #[test]
    fn test_foreground_flags() {
        let dir = tempfile::tempdir().unwrap();
        write_split(dir.path(), &[[0.0; 4], [0.0, 0.0, 1.0, 0.0], [0.0; 4]]);
        let ds = SliceDataset::new(NpyTreeLoader::new(dir.path()).entries().unwrap(), None);

        assert_eq!(ds.foreground_flags(2, 2).unwrap(), vec![false, true, false]);
    }

    #[test]
    fn test_mixed_slice_sizes_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_split(dir.path(), &[[0.0; 4], [1.0; 4]]);
        let odd = dir.path().join("0");
        npy::write_2d(&odd.join("data/1.npy"), &[0.0; 6], 2, 3).unwrap();
        npy::write_2d(&odd.join("masks/1.npy"), &[0.0; 6], 2, 3).unwrap();
        let ds = SliceDataset::new(NpyTreeLoader::new(dir.path()).entries().unwrap(), None);

        let err = ds.foreground_flags(2, 2).unwrap_err().to_string();
        assert!(err.contains("2x3"), "{err}");
    }

    #[test]
    fn test_unreadable_mask_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_split(dir.path(), &[[0.0; 4]]);
        let ds = SliceDataset::new(NpyTreeLoader::new(dir.path()).entries().unwrap(), None);
        fs::write(dir.path().join("0/masks/0.npy"), b"not npy").unwrap();

        assert!(ds.foreground_flags(2, 2).is_err());
    }

    #[test]
    fn test_augmented_item_keeps_shape() {
        let dir = tempfile::tempdir().unwrap();
        write_split(dir.path(), &[[1.0, 0.0, 0.0, 0.0]]);
        let ds = SliceDataset::new(
            NpyTreeLoader::new(dir.path()).entries().unwrap(),
            Some(AffineAugment::default()),
        );

        let item = ds.get(0).unwrap();
        assert_eq!((item.height, item.width), (2, 2));
        assert_eq!(item.mask.len(), 4);
    }
}
