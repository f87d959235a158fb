//! 2D correlation and convolution primitives
//!
//! `ndarray` covers allocation, reshaping, matrix products and reductions but
//! has no spatial correlation, so the two modes the layers need live here:
//!
//! - `correlate2d_valid`: slide the kernel over the input and keep only the
//!   positions where it overlaps completely (no padding, no kernel flip).
//! - `convolve2d_full`: flip the kernel and keep every position where kernel
//!   and input overlap at all, treating out-of-range input as zero.

use ndarray::{s, Array2, ArrayView2};

use crate::error::{Error, Result};

/// Valid-mode 2D cross-correlation.
///
/// `out[i, j] = Σ_m Σ_n input[i + m, j + n] * kernel[m, n]`
///
/// # Returns
///
/// An array of shape `(ih - kh + 1, iw - kw + 1)`, or `ShapeMismatch` if the
/// kernel is larger than the input along either axis.
pub fn correlate2d_valid(input: ArrayView2<f64>, kernel: ArrayView2<f64>) -> Result<Array2<f64>> {
    let (ih, iw) = input.dim();
    let (kh, kw) = kernel.dim();

    if kh > ih || kw > iw || kh == 0 || kw == 0 {
        return Err(Error::shape_mismatch(
            "correlate2d_valid kernel larger than input",
            &[ih, iw],
            &[kh, kw],
        ));
    }

    let out_h = ih - kh + 1;
    let out_w = iw - kw + 1;

    let out = Array2::from_shape_fn((out_h, out_w), |(i, j)| {
        let window = input.slice(s![i..i + kh, j..j + kw]);
        window
            .iter()
            .zip(kernel.iter())
            .map(|(x, k)| x * k)
            .sum::<f64>()
    });

    Ok(out)
}

/// Full-mode 2D convolution.
///
/// `out[i, j] = Σ_m Σ_n input[m, n] * kernel[i - m, j - n]` over all indices
/// that land inside the kernel. The result has shape
/// `(ih + kh - 1, iw + kw - 1)`.
pub fn convolve2d_full(input: ArrayView2<f64>, kernel: ArrayView2<f64>) -> Array2<f64> {
    let (ih, iw) = input.dim();
    let (kh, kw) = kernel.dim();

    if ih == 0 || iw == 0 || kh == 0 || kw == 0 {
        return Array2::zeros((0, 0));
    }

    let mut out = Array2::<f64>::zeros((ih + kh - 1, iw + kw - 1));

    // Scatter each input element against the whole kernel.
    for ((m, n), &x) in input.indexed_iter() {
        let mut target = out.slice_mut(s![m..m + kh, n..n + kw]);
        target.scaled_add(x, &kernel);
    }

    out
}
