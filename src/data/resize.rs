// ============================================================
// Layer 4 — Slice Resizing
// ============================================================
// CT slices come out of the scanner at 512x512 (sometimes other
// sizes); the model is trained on 256x256. Images are resized
// with a triangle (bilinear) filter, masks with nearest-neighbour
// so labels never get blended into fractional values.
//
// Both go through the `image` crate using single-channel f32
// buffers, so no precision is lost to 8-bit quantisation.

use anyhow::{anyhow, Result};
use image::{imageops::{self, FilterType}, ImageBuffer, Luma};

type GrayF32 = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Bilinear resize of a row-major image.
pub fn resize_image(
    data:   &[f32],
    height: usize,
    width:  usize,
    out_h:  usize,
    out_w:  usize,
) -> Result<Vec<f32>> {
    resize_with(data, height, width, out_h, out_w, FilterType::Triangle)
}

/// Nearest-neighbour resize of a row-major mask.
pub fn resize_mask(
    data:   &[f32],
    height: usize,
    width:  usize,
    out_h:  usize,
    out_w:  usize,
) -> Result<Vec<f32>> {
    resize_with(data, height, width, out_h, out_w, FilterType::Nearest)
}

fn resize_with(
    data:   &[f32],
    height: usize,
    width:  usize,
    out_h:  usize,
    out_w:  usize,
    filter: FilterType,
) -> Result<Vec<f32>> {
    if (height, width) == (out_h, out_w) {
        return Ok(data.to_vec());
    }

    // ImageBuffer is (width, height) with rows of `width` pixels
    let buf = GrayF32::from_raw(width as u32, height as u32, data.to_vec())
        .ok_or_else(|| anyhow!(
            "{} values do not form a {}x{} slice",
            data.len(), height, width
        ))?;

    let resized = imageops::resize(&buf, out_w as u32, out_h as u32, filter);
    Ok(resized.into_raw())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_size_is_copy() {
        let data = vec![1.0, 2.0, 3.0, 4.0];
        assert_eq!(resize_image(&data, 2, 2, 2, 2).unwrap(), data);
    }

    #[test]
    fn test_output_shape() {
        let data = vec![0.5; 8 * 6];
        let out  = resize_image(&data, 8, 6, 4, 3).unwrap();
        assert_eq!(out.len(), 12);
        for v in out {
            assert!((v - 0.5).abs() < 1e-5);
        }
    }

    #[test]
    fn test_mask_resize_keeps_labels() {
        let mut data = vec![0.0; 16];
        data[0] = 1.0;
        data[5] = 1.0;
        let out = resize_mask(&data, 4, 4, 8, 8).unwrap();
        assert_eq!(out.len(), 64);
        assert!(out.iter().all(|&v| v == 0.0 || v == 1.0));
        assert!(out.iter().any(|&v| v == 1.0));
    }

    #[test]
    fn test_wrong_length_is_error() {
        assert!(resize_image(&[0.0; 3], 2, 2, 4, 4).is_err());
    }
}
