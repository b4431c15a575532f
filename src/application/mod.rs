// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer orchestrates all the other layers to accomplish
// one goal per CLI subcommand.
//
// Rules for this layer:
//   - No ML math or model code here
//   - No printing here (that's Layer 1)
//   - Only workflow coordination
//
// The inference-side use cases program against the Segmenter
// and VolumeSource traits, so they are tested with small fakes
// instead of a trained network.
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// NIfTI volumes → per-slice .npy tree
pub mod preprocess_use_case;

// The training workflow
pub mod train_use_case;

// Dice scores of a checkpoint on a split
pub mod evaluate_use_case;

// Volume segmentation and animation
pub mod infer_use_case;
