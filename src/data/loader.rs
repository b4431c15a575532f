// ============================================================
// Layer 4 — Slice Loader
// ============================================================
// Discovers preprocessed slices in a split directory laid out as:
//
//   <root>/
//     <subject>/
//       data/   0.npy 1.npy 2.npy ...   ← CT intensities
//       masks/  0.npy 1.npy 2.npy ...   ← tumour labels
//
// The mask for `<subject>/data/<i>.npy` is `<subject>/masks/<i>.npy`.
// Images without a mask are skipped with a warning rather than
// failing the whole split.
//
// Entries are sorted by subject name and numeric slice index so
// "10.npy" comes after "9.npy" and every run sees the same order.

use anyhow::{bail, Context, Result};
use std::{fs, path::{Path, PathBuf}};

use crate::data::npy;
use crate::domain::slice::{SliceEntry, SlicePair};
use crate::domain::traits::SliceSource;

pub const IMAGE_DIR: &str = "data";
pub const MASK_DIR:  &str = "masks";

/// Walks one split directory (e.g. `Preprocessed/train`).
pub struct NpyTreeLoader {
    root: PathBuf,
}

impl NpyTreeLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl SliceSource for NpyTreeLoader {
    fn entries(&self) -> Result<Vec<SliceEntry>> {
        // Same leniency as an empty corpus: warn, return nothing.
        // Callers decide whether an empty split is fatal.
        if !self.root.exists() {
            tracing::warn!(
                "Slice directory '{}' does not exist, returning no slices",
                self.root.display()
            );
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();

        for subject in fs::read_dir(&self.root)
            .with_context(|| format!("Cannot read directory '{}'", self.root.display()))?
        {
            let subject_path = subject?.path();
            if !subject_path.is_dir() {
                continue;
            }
            let subject_name = subject_path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("unknown")
                .to_string();

            let image_dir = subject_path.join(IMAGE_DIR);
            if !image_dir.is_dir() {
                tracing::debug!("No '{}' folder under '{}'", IMAGE_DIR, subject_path.display());
                continue;
            }

            for file in fs::read_dir(&image_dir)
                .with_context(|| format!("Cannot read directory '{}'", image_dir.display()))?
            {
                let image_path = file?.path();
                if image_path.extension().and_then(|e| e.to_str()) != Some("npy") {
                    continue;
                }

                let Some(index) = slice_index(&image_path) else {
                    tracing::warn!("Skipping '{}': file stem is not a slice number", image_path.display());
                    continue;
                };

                let mask_path = mask_path_for(&image_path);
                if !mask_path.exists() {
                    tracing::warn!("Skipping '{}': no mask at '{}'", image_path.display(), mask_path.display());
                    continue;
                }

                entries.push(SliceEntry {
                    subject: subject_name.clone(),
                    index,
                    image_path,
                    mask_path,
                });
            }
        }

        entries.sort_by(|a, b| (&a.subject, a.index).cmp(&(&b.subject, b.index)));

        tracing::info!(
            "Found {} slices under '{}'",
            entries.len(),
            self.root.display()
        );
        Ok(entries)
    }
}

/// Read the image and mask of one entry, checking that their shapes agree.
pub fn read_pair(entry: &SliceEntry) -> Result<SlicePair> {
    let image = npy::read_2d(&entry.image_path)?;
    let mask  = npy::read_2d(&entry.mask_path)?;

    if (image.height, image.width) != (mask.height, mask.width) {
        bail!(
            "Shape mismatch for subject {} slice {}: image {}x{}, mask {}x{}",
            entry.subject, entry.index,
            image.height, image.width, mask.height, mask.width
        );
    }

    SlicePair::new(image.values, mask.values, image.height, image.width)
}

/// `<subject>/data/<i>.npy` → `<subject>/masks/<i>.npy`
fn mask_path_for(image_path: &Path) -> PathBuf {
    let file_name = image_path.file_name().unwrap_or_default();
    image_path
        .parent()
        .and_then(|data_dir| data_dir.parent())
        .map(|subject_dir| subject_dir.join(MASK_DIR).join(file_name))
        .unwrap_or_else(|| PathBuf::from(MASK_DIR).join(file_name))
}

fn slice_index(path: &Path) -> Option<usize> {
    path.file_stem()?.to_str()?.parse().ok()
}
