// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Pure Rust types and arithmetic that define what the system
// works on: CT slices, CT volumes and the Dice overlap metric.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain structs, functions and traits
//
// Everything here is testable without a GPU or any data on disk.

/// An image slice paired with its binary tumour mask
pub mod slice;

/// A 3-D CT volume and axial slice extraction
pub mod volume;

/// The Dice overlap coefficient
pub mod dice;

/// Abstractions implemented by the data and ml layers
pub mod traits;
