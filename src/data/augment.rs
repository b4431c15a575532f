// ============================================================
// Layer 4 — Affine Augmentation
// ============================================================
// Random scale + rotation about the slice centre, drawn fresh
// for every training item.
//
// The same transform is applied to the image (bilinear sampling)
// and the mask (nearest-neighbour, so it stays binary). Pixels
// that map outside the source slice become zero.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::domain::slice::SlicePair;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffineAugment {
    /// Smallest zoom factor drawn.
    pub scale_min: f32,
    /// Largest zoom factor drawn.
    pub scale_max: f32,
    /// Rotation is drawn uniformly from [-max, max] degrees.
    pub max_rotation_deg: f32,
}

impl Default for AffineAugment {
    fn default() -> Self {
        Self {
            scale_min: 0.85,
            scale_max: 1.15,
            max_rotation_deg: 45.0,
        }
    }
}

/// One concrete draw of the augmentation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineParams {
    pub scale: f32,
    pub rotation_deg: f32,
}

impl AffineParams {
    pub const IDENTITY: Self = Self { scale: 1.0, rotation_deg: 0.0 };
}

impl AffineAugment {
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> AffineParams {
        let scale = if self.scale_max > self.scale_min {
            rng.gen_range(self.scale_min..=self.scale_max)
        } else {
            self.scale_min
        };
        let rotation_deg = if self.max_rotation_deg > 0.0 {
            rng.gen_range(-self.max_rotation_deg..=self.max_rotation_deg)
        } else {
            0.0
        };
        AffineParams { scale, rotation_deg }
    }

    /// Draw parameters from the thread RNG and warp the pair.
    pub fn apply(&self, pair: &SlicePair) -> SlicePair {
        let params = self.sample(&mut rand::thread_rng());
        warp(pair, params)
    }
}

/// Warp a slice pair about its centre.
pub fn warp(pair: &SlicePair, params: AffineParams) -> SlicePair {
    let (h, w) = (pair.height, pair.width);
    let cy = (h as f32 - 1.0) / 2.0;
    let cx = (w as f32 - 1.0) / 2.0;

    // Inverse map: output pixel → source pixel
    let theta = params.rotation_deg.to_radians();
    let (sin, cos) = theta.sin_cos();
    let inv_scale = 1.0 / params.scale;

    let mut image = Vec::with_capacity(h * w);
    let mut mask  = Vec::with_capacity(h * w);

    for r in 0..h {
        for c in 0..w {
            let dy = r as f32 - cy;
            let dx = c as f32 - cx;
            let sy = ( cos * dy + sin * dx) * inv_scale + cy;
            let sx = (-sin * dy + cos * dx) * inv_scale + cx;

            image.push(bilinear(&pair.image, h, w, sy, sx));
            mask.push(nearest(&pair.mask, h, w, sy, sx));
        }
    }

    SlicePair { image, mask, height: h, width: w }
}

fn pixel(data: &[f32], h: usize, w: usize, y: i64, x: i64) -> f32 {
    if y < 0 || x < 0 || y >= h as i64 || x >= w as i64 {
        0.0
    } else {
        data[y as usize * w + x as usize]
    }
}

fn bilinear(data: &[f32], h: usize, w: usize, y: f32, x: f32) -> f32 {
    let y0 = y.floor();
    let x0 = x.floor();
    let fy = y - y0;
    let fx = x - x0;
    let (y0, x0) = (y0 as i64, x0 as i64);

    let top    = pixel(data, h, w, y0,     x0) * (1.0 - fx) + pixel(data, h, w, y0,     x0 + 1) * fx;
    let bottom = pixel(data, h, w, y0 + 1, x0) * (1.0 - fx) + pixel(data, h, w, y0 + 1, x0 + 1) * fx;
    top * (1.0 - fy) + bottom * fy
}

fn nearest(data: &[f32], h: usize, w: usize, y: f32, x: f32) -> f32 {
    pixel(data, h, w, y.round() as i64, x.round() as i64)
}
