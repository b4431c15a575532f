// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns used by the training loop and the
// use cases:
//
//   checkpoint.rs — Saving and loading model weights
//                   Uses Burn's CompactRecorder, keeps the best
//                   `top_k` epochs by validation loss, and stores
//                   TrainConfig as JSON so inference can rebuild
//                   the model.
//
//   metrics.rs    — Per-epoch loss and Dice appended to a CSV
//                   file for later plotting.
//
//   render.rs     — Bone colour map, tumour overlays, training
//                   preview PNGs and the animated GIF written by
//                   inference.
//
// Reference: Rust Book §9 (Error Handling with anyhow)
//            Burn Book §5 (Checkpointing)

/// Model checkpoint saving, top-k retention and loading
pub mod checkpoint;

/// Training metrics CSV logger
pub mod metrics;

/// Slice rendering to PNG and GIF
pub mod render;
