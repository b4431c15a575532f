// ============================================================
// Layer 4 — .npy Arrays
// ============================================================
// Preprocessed slices are stored one per file in NumPy's .npy
// format. Depending on which tool wrote them the element type is
// float64 (np.save of a float array), float32 (our own preprocess
// command) or uint8 (label maps), so reading tries each in turn
// and converts to f32.
//
// Accepted shapes: [H, W] or [1, H, W]. Fortran-ordered files
// (np.save of a transposed view) are reordered to row-major.

use anyhow::{bail, Context, Result};
use npyz::{NpyFile, Order, WriterBuilder};
use std::{
    fs::{self, File},
    io::BufWriter,
    path::Path,
};

/// A 2-D array read from disk, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Array2 {
    pub values: Vec<f32>,
    pub height: usize,
    pub width:  usize,
}

/// Read a 2-D .npy file as f32.
pub fn read_2d(path: &Path) -> Result<Array2> {
    let bytes = fs::read(path)
        .with_context(|| format!("Cannot read '{}'", path.display()))?;

    let npy = NpyFile::new(&bytes[..])
        .with_context(|| format!("'{}' is not a valid .npy file", path.display()))?;

    let (height, width) = match npy.shape() {
        [h, w]    => (*h as usize, *w as usize),
        [1, h, w] => (*h as usize, *w as usize),
        other     => bail!(
            "'{}' has shape {:?}; expected a 2-D slice",
            path.display(), other
        ),
    };

    let order = npy.order();
    let values = decode_as_f32(&bytes)
        .with_context(|| format!("Unsupported element type in '{}'", path.display()))?;

    if values.len() != height * width {
        bail!(
            "'{}' holds {} values for shape {}x{}",
            path.display(), values.len(), height, width
        );
    }

    let values = match order {
        Order::C       => values,
        Order::Fortran => fortran_to_row_major(&values, height, width),
    };

    Ok(Array2 { values, height, width })
}

// Column-major element (r, c) sits at c * height + r.
fn fortran_to_row_major(values: &[f32], height: usize, width: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(values.len());
    for r in 0..height {
        for c in 0..width {
            out.push(values[c * height + r]);
        }
    }
    out
}

/// Write a row-major f32 slice as a 2-D .npy file.
pub fn write_2d(path: &Path, values: &[f32], height: usize, width: usize) -> Result<()> {
    if values.len() != height * width {
        bail!("{} values do not fit a {}x{} array", values.len(), height, width);
    }

    let file = File::create(path)
        .with_context(|| format!("Cannot create '{}'", path.display()))?;

    let mut writer = npyz::WriteOptions::new()
        .default_dtype()
        .shape(&[height as u64, width as u64])
        .writer(BufWriter::new(file))
        .begin_nd()?;
    writer.extend(values.iter().copied())?;
    writer.finish()?;

    Ok(())
}

// npyz refuses to read a file as the wrong element type, so the
// header is re-parsed for each candidate until one fits.
fn decode_as_f32(bytes: &[u8]) -> Result<Vec<f32>> {
    if let Ok(v) = NpyFile::new(bytes)?.into_vec::<f64>() {
        return Ok(v.into_iter().map(|x| x as f32).collect());
    }
    if let Ok(v) = NpyFile::new(bytes)?.into_vec::<f32>() {
        return Ok(v);
    }
    if let Ok(v) = NpyFile::new(bytes)?.into_vec::<u8>() {
        return Ok(v.into_iter().map(f32::from).collect());
    }
    if let Ok(v) = NpyFile::new(bytes)?.into_vec::<i64>() {
        return Ok(v.into_iter().map(|x| x as f32).collect());
    }
    bail!("element type is not one of f64, f32, u8, i64")
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn write_typed<T: npyz::AutoSerialize + Copy>(path: &Path, shape: &[u64], data: &[T]) {
        let mut writer = npyz::WriteOptions::new()
            .default_dtype()
            .shape(shape)
            .writer(BufWriter::new(File::create(path).unwrap()))
            .begin_nd()
            .unwrap();
        writer.extend(data.iter().copied()).unwrap();
        writer.finish().unwrap();
    }

    #[test]
    fn test_reads_fortran_order_as_row_major() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("0.npy");
        let mut writer = npyz::WriteOptions::new()
            .default_dtype()
            .order(Order::Fortran)
            .shape(&[2, 3])
            .writer(BufWriter::new(File::create(&path).unwrap()))
            .begin_nd()
            .unwrap();
        writer.extend([1.0f32, 4.0, 2.0, 5.0, 3.0, 6.0]).unwrap();
        writer.finish().unwrap();

        let arr = read_2d(&path).unwrap();
        assert_eq!((arr.height, arr.width), (2, 3));
        assert_eq!(arr.values, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_reads_float64_slice() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("0.npy");
        write_typed::<f64>(&path, &[2, 3], &[0.0, 0.5, 1.0, -0.25, 0.125, 2.0]);

        let arr = read_2d(&path).unwrap();
        assert_eq!((arr.height, arr.width), (2, 3));
        assert_eq!(arr.values, vec![0.0, 0.5, 1.0, -0.25, 0.125, 2.0]);
    }

    #[test]
    fn test_reads_uint8_mask() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("0.npy");
        write_typed::<u8>(&path, &[2, 2], &[0, 1, 0, 1]);

        let arr = read_2d(&path).unwrap();
        assert_eq!(arr.values, vec![0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_accepts_leading_channel() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("0.npy");
        write_typed::<f32>(&path, &[1, 2, 2], &[1.0, 2.0, 3.0, 4.0]);

        let arr = read_2d(&path).unwrap();
        assert_eq!((arr.height, arr.width), (2, 2));
    }

    #[test]
    fn test_rejects_3d_volume() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("0.npy");
        write_typed::<f32>(&path, &[2, 2, 2], &[0.0; 8]);

        assert!(read_2d(&path).is_err());
    }

    #[test]
    fn test_write_then_read_f32() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("slice.npy");
        write_2d(&path, &[0.1, 0.2, 0.3, 0.4], 2, 2).unwrap();

        let arr = read_2d(&path).unwrap();
        assert_eq!(arr.values, vec![0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(read_2d(Path::new("/definitely/not/here.npy")).is_err());
    }
}
