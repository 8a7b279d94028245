use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ImageError {
    #[error("Image dimensions differ: {rows_a}x{cols_a} vs {rows_b}x{cols_b}")]
    DimensionMismatch {
        rows_a: usize,
        cols_a: usize,
        rows_b: usize,
        cols_b: usize,
    },

    #[error("Image data length {len} does not match {rows}x{cols} grid")]
    ShapeInvalid { len: usize, rows: usize, cols: usize },

    #[error("Image has zero variance; correlation is undefined")]
    ConstantImage,

    #[error("Image is empty")]
    Empty,
}

/// A row-major 2D grid of sampled heights, as produced by an AFM image
/// simulator.
#[derive(Debug, Clone, PartialEq)]
pub struct HeightMap {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl HeightMap {
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self, ImageError> {
        if rows == 0 || cols == 0 || data.is_empty() {
            return Err(ImageError::Empty);
        }
        if data.len() != rows * cols {
            return Err(ImageError::ShapeInvalid {
                len: data.len(),
                rows,
                cols,
            });
        }
        Ok(Self { rows, cols, data })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    fn min(&self) -> f64 {
        self.data.iter().cloned().fold(f64::INFINITY, f64::min)
    }

    fn max(&self) -> f64 {
        self.data.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
    }

    /// Shifts heights so the minimum sits at zero, then divides by the
    /// original maximum. Scores computed on the result are invariant to
    /// absolute height-scale differences between renderer outputs.
    fn normalized(&self) -> Vec<f64> {
        let min = self.min();
        let max = self.max();
        let scale = if max == 0.0 { 1.0 } else { max };
        self.data.iter().map(|&h| (h - min) / scale).collect()
    }
}

/// Computes the Pearson correlation coefficient between two height maps of
/// identical sampled dimensions, after normalizing each image independently.
///
/// Deterministic and side-effect free. This is the sole fitness signal of the
/// fitting loop.
pub fn similarity(a: &HeightMap, b: &HeightMap) -> Result<f64, ImageError> {
    if a.rows != b.rows || a.cols != b.cols {
        return Err(ImageError::DimensionMismatch {
            rows_a: a.rows,
            cols_a: a.cols,
            rows_b: b.rows,
            cols_b: b.cols,
        });
    }

    let xs = a.normalized();
    let ys = b.normalized();
    pearson(&xs, &ys)
}

fn pearson(xs: &[f64], ys: &[f64]) -> Result<f64, ImageError> {
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (&x, &y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x == 0.0 || var_y == 0.0 {
        return Err(ImageError::ConstantImage);
    }

    Ok(cov / (var_x.sqrt() * var_y.sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(rows: usize, cols: usize, data: Vec<f64>) -> HeightMap {
        HeightMap::new(rows, cols, data).unwrap()
    }

    #[test]
    fn identical_images_correlate_perfectly() {
        let img = map(2, 3, vec![0.5, 1.0, 2.0, 3.5, 0.1, 4.2]);
        let cc = similarity(&img, &img).unwrap();
        assert!((cc - 1.0).abs() < 1e-12);
    }

    #[test]
    fn similarity_is_invariant_to_positive_affine_rescale() {
        let base = vec![0.5, 1.0, 2.0, 3.5, 0.1, 4.2];
        let a = map(2, 3, base.clone());
        let b = map(2, 3, base.iter().map(|h| 3.0 * h + 7.0).collect());
        let target = map(2, 3, vec![1.0, 0.0, 2.0, 0.5, 3.0, 1.5]);

        let cc_a = similarity(&a, &target).unwrap();
        let cc_b = similarity(&b, &target).unwrap();
        assert!((cc_a - cc_b).abs() < 1e-12);
    }

    #[test]
    fn anticorrelated_images_score_negative_one() {
        let a = map(1, 4, vec![0.0, 1.0, 2.0, 3.0]);
        let b = map(1, 4, vec![3.0, 2.0, 1.0, 0.0]);
        let cc = similarity(&a, &b).unwrap();
        assert!((cc + 1.0).abs() < 1e-12);
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let a = map(2, 2, vec![0.0, 1.0, 2.0, 3.0]);
        let b = map(1, 4, vec![0.0, 1.0, 2.0, 3.0]);
        let err = similarity(&a, &b).unwrap_err();
        assert!(matches!(err, ImageError::DimensionMismatch { .. }));
    }

    #[test]
    fn constant_image_is_rejected() {
        let a = map(1, 3, vec![2.0, 2.0, 2.0]);
        let b = map(1, 3, vec![0.0, 1.0, 2.0]);
        assert_eq!(similarity(&a, &b).unwrap_err(), ImageError::ConstantImage);
    }

    #[test]
    fn shape_invalid_data_is_rejected() {
        let err = HeightMap::new(2, 2, vec![1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(err, ImageError::ShapeInvalid { len: 3, .. }));
    }
}
