//! Shape-adjustment helpers for the strided convolution gradient path.

use ndarray::{s, Array2, ArrayView2};

use crate::error::{Error, Result};

/// Spread a 2D array out by `stride`, inserting `stride - 1` zeros between
/// neighbouring elements along both axes.
///
/// An `h x w` array becomes `((h - 1) * stride + 1) x ((w - 1) * stride + 1)`
/// with the original values at every `stride`-th row and column. This undoes
/// the subsampling of a strided forward pass, placing each output gradient
/// back at the stride-1 position it was taken from. `stride == 1` returns a
/// copy of the input; a `1 x 1` array stays `1 x 1` for any stride.
///
/// # Errors
///
/// `Configuration` if `stride` is zero or the dilated array would exceed the
/// maximum array size.
pub fn dilate(array: ArrayView2<f64>, stride: usize) -> Result<Array2<f64>> {
    if stride == 0 {
        return Err(Error::Configuration("dilation stride must be at least 1".into()));
    }

    let (h, w) = array.dim();
    if stride == 1 || h * w <= 1 {
        return Ok(array.to_owned());
    }

    let spread = |n: usize| (n - 1).checked_mul(stride).and_then(|v| v.checked_add(1));
    let fits = |len: usize| len <= isize::MAX as usize;
    let (dh, dw) = match (spread(h), spread(w)) {
        (Some(dh), Some(dw)) if fits(stride) && dh.checked_mul(dw).map_or(false, fits) => (dh, dw),
        _ => {
            return Err(Error::Configuration(format!(
                "dilating a {}x{} array by stride {} exceeds the maximum array size",
                h, w, stride
            )))
        }
    };

    let mut dilated = Array2::<f64>::zeros((dh, dw));
    dilated
        .slice_mut(s![..;stride, ..;stride])
        .assign(&array);

    Ok(dilated)
}

/// Zero-extend a 2D array to exactly `target`, keeping the original values
/// anchored at the origin (top-left).
///
/// # Errors
///
/// `PaddingUnderflow` if `target` is smaller than the array along any axis;
/// the array is never truncated.
pub fn pad_to_shape(array: ArrayView2<f64>, target: (usize, usize)) -> Result<Array2<f64>> {
    let (h, w) = array.dim();
    let (th, tw) = target;

    if th < h || tw < w {
        return Err(Error::PaddingUnderflow {
            actual: vec![h, w],
            target: vec![th, tw],
        });
    }

    let mut padded = Array2::<f64>::zeros(target);
    padded.slice_mut(s![..h, ..w]).assign(&array);
    Ok(padded)
}
