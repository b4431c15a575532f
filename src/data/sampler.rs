// ============================================================
// Layer 4 — Oversampling Sampler
// ============================================================
// Tumours appear in only a small fraction of CT slices. Trained
// on the raw distribution, the network learns that predicting
// "no tumour" everywhere is almost always right.
//
// Fix: sample slices with replacement, weighted so that the
// tumour-bearing slices are drawn as often, in total, as the
// empty ones.
//
//   n0 = slices with no tumour pixel   → weight 1
//   n1 = slices with ≥1 tumour pixel   → weight n0 / n1
//
// With those weights both groups carry total mass n0, so each
// epoch is roughly 50/50.
//
// n1 = 0 makes the ratio undefined and is rejected.
// n0 = 0 (every slice positive) would make every weight 0, so
// all slices get weight 1 instead and sampling is uniform.

use anyhow::{bail, Context, Result};
use burn::data::dataset::Dataset;
use rand::{
    distributions::{Distribution, WeightedIndex},
    rngs::StdRng,
    SeedableRng,
};

/// Per-slice sampling weights from foreground flags.
pub fn oversampling_weights(has_foreground: &[bool]) -> Result<Vec<f64>> {
    if has_foreground.is_empty() {
        return Ok(Vec::new());
    }

    let positives = has_foreground.iter().filter(|&&p| p).count();
    let negatives = has_foreground.len() - positives;

    if positives == 0 {
        bail!(
            "cannot oversample: none of the {} slices contains a tumour pixel",
            negatives
        );
    }

    let pos_weight = if negatives == 0 {
        1.0
    } else {
        negatives as f64 / positives as f64
    };

    tracing::info!(
        "Oversampling: {} negative, {} positive slices (positive weight {:.3})",
        negatives, positives, pos_weight
    );

    Ok(has_foreground
        .iter()
        .map(|&p| if p { pos_weight } else { 1.0 })
        .collect())
}

/// Draw `count` indices with replacement, proportional to `weights`.
pub fn draw_indices(weights: &[f64], count: usize, seed: u64) -> Result<Vec<usize>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    let dist = WeightedIndex::new(weights).context("invalid sampling weights")?;
    let mut rng = StdRng::seed_from_u64(seed);
    Ok((0..count).map(|_| dist.sample(&mut rng)).collect())
}

// ─── OversampledDataset ───────────────────────────────────────────────────────
/// A view of `inner` whose i-th item is `inner[indices[i]]`, with the
/// indices drawn by weight. Rebuild it every epoch (with a new seed) to
/// get a fresh draw, the way a weighted random sampler would.
pub struct OversampledDataset<D> {
    inner:   D,
    indices: Vec<usize>,
}

impl<D> OversampledDataset<D> {
    /// Same length as the inner dataset, so one epoch still means
    /// "as many slices as there are on disk".
    pub fn new(inner: D, weights: &[f64], seed: u64) -> Result<Self> {
        let indices = draw_indices(weights, weights.len(), seed)?;
        Ok(Self { inner, indices })
    }
}

impl<D, I> Dataset<I> for OversampledDataset<D>
where
    D: Dataset<I>,
{
    fn get(&self, index: usize) -> Option<I> {
        self.indices.get(index).and_then(|&i| self.inner.get(i))
    }

    fn len(&self) -> usize {
        self.indices.len()
    }
}
