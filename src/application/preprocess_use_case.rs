// ============================================================
// Layer 2 — Preprocess Use Case
// ============================================================
// Turns a Decathlon-style lung dataset into per-slice .npy files:
//
//   <input>/imagesTr/lung_001.nii.gz   ─┐
//   <input>/labelsTr/lung_001.nii.gz   ─┴─►  <output>/train/lung_001/data/<z>.npy
//                                            <output>/train/lung_001/masks/<z>.npy
//
// For every subject:
//   - CT intensities divided by 3071
//   - the first 30 axial slices dropped (no lung there)
//   - images resized bilinear, masks nearest, to size x size
//   - the first `train_subjects` (sorted by file name) go to
//     train/, the rest to val/
//
// Slice files keep their index `z` in the original volume.

use anyhow::{bail, Context, Result};
use std::{fs, path::{Path, PathBuf}};

use crate::data::{
    loader::{IMAGE_DIR, MASK_DIR},
    npy::write_2d,
    resize::{resize_image, resize_mask},
    volume_reader::NiftiReader,
};
use crate::domain::{
    traits::VolumeSource,
    volume::{CtVolume, HU_SCALE, SKIPPED_SLICES},
};

#[derive(Debug, Clone)]
pub struct PreprocessConfig {
    /// Directory containing `imagesTr/` and `labelsTr/`
    pub input_dir:      String,
    pub output_dir:     String,
    pub size:           usize,
    pub train_subjects: usize,
    pub skip_slices:    usize,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            input_dir:      "Task06_Lung".to_string(),
            output_dir:     "Task06_Lung/Preprocessed".to_string(),
            size:           256,
            train_subjects: 57,
            skip_slices:    SKIPPED_SLICES,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreprocessReport {
    pub train_subjects:  usize,
    pub val_subjects:    usize,
    pub slices_written:  usize,
    pub tumour_slices:   usize,
}

pub struct PreprocessUseCase<S: VolumeSource = NiftiReader> {
    config: PreprocessConfig,
    reader: S,
}

impl PreprocessUseCase<NiftiReader> {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config, reader: NiftiReader::new() }
    }
}

impl<S: VolumeSource> PreprocessUseCase<S> {
    pub fn with_reader(config: PreprocessConfig, reader: S) -> Self {
        Self { config, reader }
    }

    pub fn execute(&self) -> Result<PreprocessReport> {
        let cfg = &self.config;
        let input = Path::new(&cfg.input_dir);
        let images_dir = input.join("imagesTr");
        let labels_dir = input.join("labelsTr");

        let subjects = list_volumes(&images_dir)?;
        if subjects.is_empty() {
            bail!("No .nii/.nii.gz volumes found in '{}'", images_dir.display());
        }
        tracing::info!("Found {} CT volumes in '{}'", subjects.len(), images_dir.display());

        let mut report = PreprocessReport::default();

        for (i, image_path) in subjects.iter().enumerate() {
            let Some(file_name) = image_path.file_name() else { continue };
            let label_path = labels_dir.join(file_name);
            if !label_path.exists() {
                tracing::warn!("No label for '{}', skipping", image_path.display());
                continue;
            }

            let subject = subject_name(image_path);
            let split = if i < cfg.train_subjects { "train" } else { "val" };

            let ct    = self.reader.load_volume(image_path)?.normalised(HU_SCALE);
            let label = self.reader.load_volume(&label_path)?;

            let subject_dir = Path::new(&cfg.output_dir).join(split).join(&subject);
            let (written, tumour) = self.write_subject(&ct, &label, &subject_dir)
                .with_context(|| format!("Failed to preprocess '{}'", image_path.display()))?;

            report.slices_written += written;
            report.tumour_slices  += tumour;
            if split == "train" {
                report.train_subjects += 1;
            } else {
                report.val_subjects += 1;
            }

            tracing::info!("{} → {}/{}: {} slices ({} with tumour)", subject, split, subject, written, tumour);
        }

        Ok(report)
    }

    /// Returns (slices written, slices with tumour).
    fn write_subject(&self, ct: &CtVolume, label: &CtVolume, dir: &Path) -> Result<(usize, usize)> {
        if ct.dims() != label.dims() {
            bail!("CT {:?} and label {:?} dimensions differ", ct.dims(), label.dims());
        }
        let [nx, ny, _] = ct.dims();
        let size = self.config.size;

        let data_dir = dir.join(IMAGE_DIR);
        let mask_dir = dir.join(MASK_DIR);
        fs::create_dir_all(&data_dir)?;
        fs::create_dir_all(&mask_dir)?;

        let mut written = 0;
        let mut tumour  = 0;

        for z in ct.kept_slices(self.config.skip_slices) {
            let (Some(image), Some(mask)) = (ct.axial_slice(z), label.axial_slice(z)) else {
                continue;
            };

            let image = resize_image(&image, nx, ny, size, size)?;
            let mask: Vec<f32> = resize_mask(&mask, nx, ny, size, size)?
                .into_iter()
                .map(|m| if m != 0.0 { 1.0 } else { 0.0 })
                .collect();

            if mask.iter().any(|&m| m > 0.0) {
                tumour += 1;
            }

            write_2d(&data_dir.join(format!("{z}.npy")), &image, size, size)?;
            write_2d(&mask_dir.join(format!("{z}.npy")), &mask, size, size)?;
            written += 1;
        }

        Ok((written, tumour))
    }
}

/// `.nii` / `.nii.gz` files in `dir`, sorted by name. Hidden files
/// (e.g. `._lung_001.nii.gz` resource forks) are ignored.
fn list_volumes(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Cannot read directory '{}'", dir.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| !n.starts_with('.') && (n.ends_with(".nii") || n.ends_with(".nii.gz")))
        })
        .collect();
    out.sort();
    Ok(out)
}

/// "lung_001.nii.gz" → "lung_001"
fn subject_name(path: &Path) -> String {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    name.trim_end_matches(".gz").trim_end_matches(".nii").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::npy::read_2d;

    /// Serves synthetic volumes: labels have a tumour voxel on slice 3.
    struct FakeReader;

    impl VolumeSource for FakeReader {
        fn load_volume(&self, path: &Path) -> Result<CtVolume> {
            let is_label = path.to_string_lossy().contains("labelsTr");
            let mut voxels = vec![if is_label { 0.0 } else { 3071.0 }; 4 * 4 * 5];
            if is_label {
                voxels[3 * 16 + 5] = 1.0;
            }
            CtVolume::new([4, 4, 5], voxels)
        }
    }

    fn touch(dir: &Path, name: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(name), b"").unwrap();
    }

    #[test]
    fn test_subject_name() {
        assert_eq!(subject_name(Path::new("a/lung_004.nii.gz")), "lung_004");
        assert_eq!(subject_name(Path::new("lung_9.nii")), "lung_9");
    }

    #[test]
    fn test_split_and_slice_files() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("Task06_Lung");
        for name in ["lung_001.nii.gz", "lung_002.nii.gz", "lung_003.nii.gz"] {
            touch(&input.join("imagesTr"), name);
            touch(&input.join("labelsTr"), name);
        }
        touch(&input.join("imagesTr"), "._lung_001.nii.gz");
        // no label → skipped
        touch(&input.join("imagesTr"), "lung_004.nii.gz");

        let out = dir.path().join("out");
        let cfg = PreprocessConfig {
            input_dir:      input.to_string_lossy().into_owned(),
            output_dir:     out.to_string_lossy().into_owned(),
            size:           8,
            train_subjects: 2,
            skip_slices:    2,
        };
        let report = PreprocessUseCase::with_reader(cfg, FakeReader).execute().unwrap();

        assert_eq!(report.train_subjects, 2);
        assert_eq!(report.val_subjects, 1);
        assert_eq!(report.slices_written, 9);
        assert_eq!(report.tumour_slices, 3);

        let first = out.join("train/lung_001");
        assert!(!first.join("data/1.npy").exists());
        let image = read_2d(&first.join("data/2.npy")).unwrap();
        assert_eq!((image.height, image.width), (8, 8));
        assert!(image.values.iter().all(|&v| (v - 1.0).abs() < 1e-5));

        let mask = read_2d(&first.join("masks/3.npy")).unwrap();
        assert!(mask.values.iter().all(|&m| m == 0.0 || m == 1.0));
        assert!(mask.values.iter().any(|&m| m == 1.0));

        assert!(out.join("val/lung_003/masks/4.npy").exists());
    }
}
