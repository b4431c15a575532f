// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All Burn model, optimiser and backend code lives here.
// The data layer only touches Burn's Dataset/Batcher traits;
// everything that needs a backend type is in this layer.
//
// What's in this layer:
//
//   model.rs      — The U-Net
//                   • four double-conv encoder blocks (max-pool between)
//                   • 2x2 transposed-conv upsampling + skip concatenation
//                   • 1x1 head producing one logit per pixel
//                   • BCE-with-logits loss
//
//   trainer.rs    — The training loop
//                   Oversampled training epochs, validation
//                   loss + Dice, top-k checkpointing, previews
//
//   inferencer.rs — Loads a checkpoint and implements the
//                   Segmenter trait for the application layer
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Ronneberger et al. (2015) U-Net

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// U-Net architecture and loss
pub mod model;

/// Training loop with validation and checkpointing
pub mod trainer;

/// Inference engine — loads a checkpoint and segments slices
pub mod inferencer;

/// Which Burn backend runs the model.
#[derive(ValueEnum, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// GPU via WGPU (Vulkan / Metal / DX12)
    #[default]
    Wgpu,
    /// CPU
    #[value(name = "ndarray")]
    NdArray,
}
