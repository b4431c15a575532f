// ============================================================
// Layer 6 — Rendering
// ============================================================
// Turns slices and masks into pictures with the `image` crate:
//
//   bone colour map    ← grey CT intensities, slightly blue
//   mask overlays      ← prediction and ground truth blended on top
//   PNG frames         ← training previews, inference frames
//   animated GIF       ← one frame per segmented slice

use anyhow::{bail, Context, Result};
use image::{
    codecs::gif::{GifEncoder, Repeat},
    Delay, DynamicImage, Frame, Rgb, RgbImage,
};
use std::{fs::File, io::BufWriter, path::Path};

/// Prediction overlay colour (top of an "autumn" ramp).
pub const PREDICTION_COLOR: [u8; 3] = [255, 255, 0];
/// Ground-truth overlay colour.
pub const TRUTH_COLOR: [u8; 3] = [255, 0, 0];
pub const OVERLAY_ALPHA: f32 = 0.5;

/// Matplotlib's "bone": 7/8 gray plus 1/8 of "hot" with the channels reversed.
pub fn bone(v: f32) -> [u8; 3] {
    let x = v.clamp(0.0, 1.0);
    let hot_r = (x / 0.365).clamp(0.0, 1.0);
    let hot_g = ((x - 0.365) / 0.381).clamp(0.0, 1.0);
    let hot_b = ((x - 0.746) / 0.254).clamp(0.0, 1.0);
    let mix = |h: f32| ((7.0 * x + h) / 8.0 * 255.0).round() as u8;
    [mix(hot_b), mix(hot_g), mix(hot_r)]
}

/// Min-max scale to [0, 1]; a constant slice maps to zero.
pub fn normalise_for_display(values: &[f32]) -> Vec<f32> {
    let (lo, hi) = values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = hi - lo;
    if !range.is_finite() || range <= 0.0 {
        return vec![0.0; values.len()];
    }
    values.iter().map(|&v| (v - lo) / range).collect()
}

/// CT slice in bone colours with optional truth and prediction overlays.
/// Overlay pixels are those with value > 0.5.
pub fn render_overlay(
    image:      &[f32],
    height:     usize,
    width:      usize,
    truth:      Option<&[f32]>,
    prediction: Option<&[f32]>,
) -> Result<RgbImage> {
    let n = height * width;
    if image.len() != n
        || truth.is_some_and(|t| t.len() != n)
        || prediction.is_some_and(|p| p.len() != n)
    {
        bail!("overlay inputs do not match a {}x{} slice", height, width);
    }

    let gray = normalise_for_display(image);
    let mut out = RgbImage::new(width as u32, height as u32);

    for (i, &g) in gray.iter().enumerate() {
        let mut px = bone(g);
        if truth.is_some_and(|t| t[i] > 0.5) {
            px = blend(px, TRUTH_COLOR, OVERLAY_ALPHA);
        }
        if prediction.is_some_and(|p| p[i] > 0.5) {
            px = blend(px, PREDICTION_COLOR, OVERLAY_ALPHA);
        }
        out.put_pixel((i % width) as u32, (i / width) as u32, Rgb(px));
    }
    Ok(out)
}

/// Three panels side by side: CT | CT + truth | CT + prediction.
pub fn render_preview(
    image:      &[f32],
    truth:      &[f32],
    prediction: &[f32],
    height:     usize,
    width:      usize,
) -> Result<RgbImage> {
    let panels = [
        render_overlay(image, height, width, None, None)?,
        render_overlay(image, height, width, Some(truth), None)?,
        render_overlay(image, height, width, None, Some(prediction))?,
    ];

    let mut out = RgbImage::new(3 * width as u32, height as u32);
    for (k, panel) in panels.iter().enumerate() {
        image::imageops::replace(&mut out, panel, (k * width) as i64, 0);
    }
    Ok(out)
}

pub fn save_png(img: &RgbImage, path: &Path) -> Result<()> {
    img.save(path)
        .with_context(|| format!("Cannot write image '{}'", path.display()))
}

/// Write all frames as a looping GIF at `fps` frames per second.
pub fn write_gif(frames: &[RgbImage], path: &Path, fps: u32) -> Result<()> {
    if frames.is_empty() {
        bail!("no frames to animate");
    }
    let file = File::create(path)
        .with_context(|| format!("Cannot create '{}'", path.display()))?;

    let mut encoder = GifEncoder::new_with_speed(BufWriter::new(file), 10);
    encoder.set_repeat(Repeat::Infinite)?;

    let delay = Delay::from_numer_denom_ms(1000, fps.max(1));
    for frame in frames {
        let rgba = DynamicImage::ImageRgb8(frame.clone()).into_rgba8();
        encoder
            .encode_frame(Frame::from_parts(rgba, 0, 0, delay))
            .with_context(|| format!("Cannot encode frame into '{}'", path.display()))?;
    }
    Ok(())
}

fn blend(base: [u8; 3], over: [u8; 3], alpha: f32) -> [u8; 3] {
    let mut out = [0u8; 3];
    for c in 0..3 {
        out[c] = (base[c] as f32 * (1.0 - alpha) + over[c] as f32 * alpha).round() as u8;
    }
    out
}
