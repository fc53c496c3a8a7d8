//! Patch extraction (im2col) over an NHWC input.
//!
//! Row `(n * out_h + oh) * out_w + ow` of the patch matrix holds the
//! receptive field of output position (n, oh, ow); column
//! `(kh * kernel_w + kw) * C + c` holds tap (kh, kw) of channel c. Taps that
//! land in the padding stay zero.

use ndarray::{s, Array2, ArrayView4, LinalgScalar};

use crate::config::ConvParams;

/// Input coordinate sampled by kernel tap `k` for output coordinate `out`,
/// or `None` if it falls in the padding.
#[inline]
fn source_index(
    out: usize,
    k: usize,
    stride: usize,
    dilation: usize,
    pad_before: usize,
    extent: usize,
) -> Option<usize> {
    (out * stride + k * dilation)
        .checked_sub(pad_before)
        .filter(|&i| i < extent)
}

/// Gather every receptive field of `input` (N, H, W, C) into a
/// (N * out_h * out_w, kH * kW * C) matrix.
pub fn extract_patches<T: LinalgScalar>(
    input: ArrayView4<'_, T>,
    params: &ConvParams,
    out_h: usize,
    out_w: usize,
) -> Array2<T> {
    let (batch, in_h, in_w, channels) = input.dim();
    let (kernel_h, kernel_w) = (params.kernel_h, params.kernel_w);
    let rows = batch * out_h * out_w;
    let cols = kernel_h * kernel_w * channels;

    let mut patches = Array2::<T>::zeros((rows, cols));
    if rows == 0 || cols == 0 {
        return patches;
    }

    for (row_idx, mut row) in patches.outer_iter_mut().enumerate() {
        let n = row_idx / (out_h * out_w);
        let oh = (row_idx / out_w) % out_h;
        let ow = row_idx % out_w;

        for kh in 0..kernel_h {
            let Some(ih) = source_index(
                oh,
                kh,
                params.stride_h,
                params.dilation_h,
                params.pad_top,
                in_h,
            ) else {
                continue;
            };
            for kw in 0..kernel_w {
                let Some(iw) = source_index(
                    ow,
                    kw,
                    params.stride_w,
                    params.dilation_w,
                    params.pad_left,
                    in_w,
                ) else {
                    continue;
                };
                let col = (kh * kernel_w + kw) * channels;
                row.slice_mut(s![col..col + channels])
                    .assign(&input.slice(s![n, ih, iw, ..]));
            }
        }
    }

    patches
}
