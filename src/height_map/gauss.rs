//! Gaussian smoothing for height fields.

use std::f32::consts::PI;

/// A square, normalized Gaussian kernel.
///
/// Sample offsets run from `-len/2` to `len/2 - 1` when used in
/// [`conv2d`], with the kernel values laid out row-major.
#[derive(Debug, Clone)]
pub struct GaussKernel {
    len: usize,
    values: Vec<f32>,
}

impl GaussKernel {
    /// Build a kernel for standard deviation `sigma`, truncated where the
    /// unnormalized density drops below `eps`.
    pub fn new(sigma: f32, eps: f32) -> Self {
        let sigma_sq = sigma * sigma;
        let radius = (-sigma_sq * (eps * PI * sigma_sq).ln()).sqrt();
        // Truncate like a C cast; a NaN radius (eps too large) yields the minimum.
        let half = if radius.is_finite() && radius > 0.0 {
            radius as usize + 1
        } else {
            1
        };
        let len = 2 * half;

        let divisor = 1.0 / (PI * sigma_sq);
        let d = len as f32 / (len - 1) as f32;
        let start = -((len / 2) as f32);

        let mut values = Vec::with_capacity(len * len);
        for i in 0..len {
            let y = start + d * i as f32;
            for j in 0..len {
                let x = start + d * j as f32;
                values.push((-(x * x + y * y) / sigma_sq).exp() * divisor);
            }
        }
        let volume: f32 = values.iter().sum();
        for v in &mut values {
            *v /= volume;
        }
        Self { len, values }
    }

    /// Side length in samples (always even).
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    fn at(&self, row: usize, col: usize) -> f32 {
        self.values[row * self.len + col]
    }
}

/// Convolve `src` (row-major, `width` x `height`) with `kernel` at `(x, y)`.
///
/// Only cells where `mask` is true contribute. The sum is divided by the
/// accumulated kernel weight so that masked neighbours do not pull the value
/// toward zero; below a weight of 0.001 the raw sum is returned.
pub fn conv2d(
    src: &[f32],
    width: usize,
    height: usize,
    kernel: &GaussKernel,
    x: usize,
    y: usize,
    mask: &[bool],
) -> f32 {
    let half = (kernel.len() / 2) as isize;
    let mut sum = 0.0;
    let mut weight = 0.0;
    for ky in 0..kernel.len() {
        let sy = y as isize - (ky as isize - half);
        if sy < 0 || sy >= height as isize {
            continue;
        }
        for kx in 0..kernel.len() {
            let sx = x as isize - (kx as isize - half);
            if sx < 0 || sx >= width as isize {
                continue;
            }
            let index = sy as usize * width + sx as usize;
            if !mask[index] {
                continue;
            }
            let k = kernel.at(ky, kx);
            sum += src[index] * k;
            weight += k;
        }
    }
    if weight < 0.001 {
        return sum;
    }
    sum / weight
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_length_and_normalization() {
        let kernel = GaussKernel::new(3.0, 0.001);
        assert_eq!(kernel.len(), 12);
        let total: f32 = kernel.values().iter().sum();
        assert!((total - 1.0).abs() < 1e-4, "total = {}", total);
    }

    #[test]
    fn test_kernel_is_symmetric() {
        let kernel = GaussKernel::new(1.5, 0.001);
        let n = kernel.len();
        for i in 0..n {
            for j in 0..n {
                let a = kernel.at(i, j);
                let b = kernel.at(n - 1 - i, n - 1 - j);
                assert!((a - b).abs() < 1e-6, "k[{},{}] = {} vs {}", i, j, a, b);
            }
        }
    }

    #[test]
    fn test_constant_field_is_preserved() {
        let kernel = GaussKernel::new(3.0, 0.001);
        let (w, h) = (8, 6);
        let src = vec![2.5; w * h];
        let mask = vec![true; w * h];
        for y in 0..h {
            for x in 0..w {
                let v = conv2d(&src, w, h, &kernel, x, y, &mask);
                assert!((v - 2.5).abs() < 1e-4, "v({}, {}) = {}", x, y, v);
            }
        }
    }

    #[test]
    fn test_masked_cells_do_not_contribute() {
        let kernel = GaussKernel::new(3.0, 0.001);
        let (w, h) = (5, 5);
        let mut src = vec![1.0; w * h];
        let mut mask = vec![true; w * h];
        // A huge value outside the mask must not leak in.
        src[0] = 1000.0;
        mask[0] = false;
        let v = conv2d(&src, w, h, &kernel, 2, 2, &mask);
        assert!((v - 1.0).abs() < 1e-4, "v = {}", v);
    }

    #[test]
    fn test_all_masked_returns_raw_sum() {
        let kernel = GaussKernel::new(3.0, 0.001);
        let src = vec![1.0; 9];
        let mask = vec![false; 9];
        assert_eq!(conv2d(&src, 3, 3, &kernel, 1, 1, &mask), 0.0);
    }
}
