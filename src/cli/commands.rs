// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the four subcommands and all their flags:
//
//   preprocess → NIfTI volumes into a per-slice .npy tree
//   train      → U-Net training with oversampling
//   evaluate   → Dice of a checkpoint on a split
//   infer      → segment one volume, write PNG frames + GIF
//
// Each *Args struct converts into the matching application
// config via From, so the application layer never sees clap.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};

use crate::application::{
    evaluate_use_case::EvalConfig,
    infer_use_case::InferConfig,
    preprocess_use_case::PreprocessConfig,
    train_use_case::TrainConfig,
};
use crate::domain::volume::SKIPPED_SLICES;
use crate::ml::BackendKind;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Convert imagesTr/labelsTr NIfTI volumes into .npy slices
    Preprocess(PreprocessArgs),

    /// Train the U-Net on preprocessed slices
    Train(TrainArgs),

    /// Report Dice scores of a checkpoint on a preprocessed split
    Evaluate(EvaluateArgs),

    /// Segment a CT volume and render an animation
    Infer(InferArgs),
}

// ─── preprocess ───────────────────────────────────────────────────────────────
#[derive(Args, Debug)]
pub struct PreprocessArgs {
    /// Dataset root containing imagesTr/ and labelsTr/
    #[arg(long, default_value = "Task06_Lung")]
    pub input_dir: String,

    /// Where train/ and val/ slice trees are written
    #[arg(long, default_value = "Task06_Lung/Preprocessed")]
    pub output_dir: String,

    /// Side length slices are resized to
    #[arg(long, default_value_t = 256)]
    pub size: usize,

    /// Number of subjects (sorted by file name) used for training
    #[arg(long, default_value_t = 57)]
    pub train_subjects: usize,

    /// Leading axial slices to drop
    #[arg(long, default_value_t = SKIPPED_SLICES)]
    pub skip_slices: usize,
}

impl From<PreprocessArgs> for PreprocessConfig {
    fn from(a: PreprocessArgs) -> Self {
        PreprocessConfig {
            input_dir:      a.input_dir,
            output_dir:     a.output_dir,
            size:           a.size,
            train_subjects: a.train_subjects,
            skip_slices:    a.skip_slices,
        }
    }
}

// ─── train ────────────────────────────────────────────────────────────────────
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Preprocessed tree containing train/ and val/
    #[arg(long, default_value = "Task06_Lung/Preprocessed")]
    pub data_root: String,

    /// Directory for checkpoints, metrics.csv and previews
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    #[arg(long, value_enum, default_value_t = BackendKind::Wgpu)]
    pub backend: BackendKind,

    /// Number of full passes through the (oversampled) training data
    #[arg(long, default_value_t = 30)]
    pub epochs: usize,

    #[arg(long, default_value_t = 8)]
    pub batch_size: usize,

    /// Adam learning rate
    #[arg(long, default_value_t = 1e-4)]
    pub lr: f64,

    /// Data loader worker threads
    #[arg(long, default_value_t = 4)]
    pub num_workers: usize,

    /// Channels of the first U-Net block; deeper blocks double it
    #[arg(long, default_value_t = 64)]
    pub base_channels: usize,

    /// How many checkpoints to keep, ranked by validation loss
    #[arg(long, default_value_t = 10)]
    pub top_k: usize,

    /// Seed for the oversampling draw
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Disable random affine augmentation of training slices
    #[arg(long)]
    pub no_augment: bool,

    /// Write a preview PNG every N training batches (0 disables)
    #[arg(long, default_value_t = 50)]
    pub preview_every: usize,
}

impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            data_root:      a.data_root,
            checkpoint_dir: a.checkpoint_dir,
            backend:        a.backend,
            epochs:         a.epochs,
            batch_size:     a.batch_size,
            lr:             a.lr,
            num_workers:    a.num_workers,
            base_channels:  a.base_channels,
            top_k:          a.top_k,
            seed:           a.seed,
            augment:        !a.no_augment,
            preview_every:  a.preview_every,
            // replaced by the actual slice size at training time
            ..TrainConfig::default()
        }
    }
}

// ─── evaluate ─────────────────────────────────────────────────────────────────
#[derive(Args, Debug)]
pub struct EvaluateArgs {
    #[arg(long, default_value = "Task06_Lung/Preprocessed")]
    pub data_root: String,

    /// Split directory under data_root
    #[arg(long, default_value = "val")]
    pub split: String,

    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    #[arg(long, value_enum, default_value_t = BackendKind::Wgpu)]
    pub backend: BackendKind,

    /// Checkpoint epoch to load (default: best by validation loss)
    #[arg(long)]
    pub epoch: Option<usize>,

    /// Probability above which a pixel counts as tumour
    #[arg(long, default_value_t = 0.5)]
    pub threshold: f32,
}

impl From<EvaluateArgs> for EvalConfig {
    fn from(a: EvaluateArgs) -> Self {
        EvalConfig {
            data_root:      a.data_root,
            split:          a.split,
            checkpoint_dir: a.checkpoint_dir,
            backend:        a.backend,
            epoch:          a.epoch,
            threshold:      a.threshold,
        }
    }
}

// ─── infer ────────────────────────────────────────────────────────────────────
#[derive(Args, Debug)]
pub struct InferArgs {
    /// CT volume to segment (.nii or .nii.gz)
    #[arg(long)]
    pub volume: String,

    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Directory for frame PNGs and segmentation.gif
    #[arg(long, default_value = "inference")]
    pub output_dir: String,

    #[arg(long, value_enum, default_value_t = BackendKind::Wgpu)]
    pub backend: BackendKind,

    /// Checkpoint epoch to load (default: best by validation loss)
    #[arg(long)]
    pub epoch: Option<usize>,

    #[arg(long, default_value_t = 0.5)]
    pub threshold: f32,

    /// Leading axial slices to drop
    #[arg(long, default_value_t = SKIPPED_SLICES)]
    pub skip_slices: usize,

    /// Animation frame rate
    #[arg(long, default_value_t = 10)]
    pub fps: u32,
}

impl From<InferArgs> for InferConfig {
    fn from(a: InferArgs) -> Self {
        InferConfig {
            volume:         a.volume,
            checkpoint_dir: a.checkpoint_dir,
            output_dir:     a.output_dir,
            backend:        a.backend,
            epoch:          a.epoch,
            threshold:      a.threshold,
            skip_slices:    a.skip_slices,
            fps:            a.fps,
        }
    }
}
