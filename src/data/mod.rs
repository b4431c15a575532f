// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything between files on disk and GPU-ready tensor batches.
//
// Training flows in this order:
//
//   <root>/<subject>/data/*.npy + masks/*.npy
//       │
//       ▼
//   NpyTreeLoader      → discovers image/mask pairs
//       │
//       ▼
//   SliceDataset       → implements Burn's Dataset trait,
//       │                reads + augments one slice per get()
//       ▼
//   OversampledDataset → redraws indices each epoch, weighted
//       │                so tumour slices are seen more often
//       ▼
//   SliceBatcher       → stacks slices into [N, 1, H, W] tensors
//       │
//       ▼
//   DataLoader         → feeds batches to the training loop
//
// Inference and preprocessing start from NIfTI volumes instead
// (volume_reader + resize).

/// Reads and writes 2-D .npy arrays
pub mod npy;

/// Discovers preprocessed slice pairs on disk
pub mod loader;

/// Implements Burn's Dataset trait for CT slices
pub mod dataset;

/// Implements Burn's Batcher trait for slice batches
pub mod batcher;

/// Class-imbalance weights and weighted resampling
pub mod sampler;

/// Random affine augmentation of slice pairs
pub mod augment;

/// Bilinear / nearest-neighbour slice resizing
pub mod resize;

/// Loads NIfTI CT volumes
pub mod volume_reader;
