//! Copy-based permutation between NCHW and NHWC physical layouts.
//!
//! Every function here materializes a fresh standard-layout buffer (or writes
//! into a distinct caller buffer); nothing is permuted in place.

use ndarray::{Array4, ArrayView4, ArrayViewMut4};

use crate::error::{ConvError, Result};

/// (N, C, H, W) -> (N, H, W, C)
pub const NCHW_TO_NHWC: [usize; 4] = [0, 2, 3, 1];
/// (N, H, W, C) -> (N, C, H, W)
pub const NHWC_TO_NCHW: [usize; 4] = [0, 3, 1, 2];
/// Filter (M, C, kH, kW) -> (kH, kW, C, M)
pub const MCHW_TO_HWCM: [usize; 4] = [2, 3, 1, 0];

fn check_permutation(perm: [usize; 4]) -> Result<()> {
    let mut seen = [false; 4];
    for &axis in &perm {
        if axis >= 4 || seen[axis] {
            return Err(ConvError::InvalidPermutation(perm.to_vec()));
        }
        seen[axis] = true;
    }
    Ok(())
}

/// Dims of `dims` after applying `perm`: `out[i] = dims[perm[i]]`.
pub fn permuted_dims(dims: [usize; 4], perm: [usize; 4]) -> Result<[usize; 4]> {
    check_permutation(perm)?;
    Ok(perm.map(|axis| dims[axis]))
}

/// Copy `src` into a new standard-layout tensor whose axis `i` is axis
/// `perm[i]` of `src`.
pub fn permute<T: Clone>(src: ArrayView4<'_, T>, perm: [usize; 4]) -> Result<Array4<T>> {
    check_permutation(perm)?;
    log::trace!("permute {:?} by {perm:?}", src.shape());
    Ok(src.permuted_axes(perm).as_standard_layout().into_owned())
}

/// Like [`permute`], but writes into the caller's `dst`, whose shape must
/// already be the permuted shape.
pub fn permute_into<T: Clone>(
    src: ArrayView4<'_, T>,
    perm: [usize; 4],
    mut dst: ArrayViewMut4<'_, T>,
) -> Result<()> {
    let (d0, d1, d2, d3) = src.dim();
    let dims = permuted_dims([d0, d1, d2, d3], perm)?;
    if dst.shape() != dims {
        return Err(ConvError::InconsistentOutputSize {
            expected: dims.to_vec(),
            got: dst.shape().to_vec(),
        });
    }
    log::trace!("permute {:?} by {perm:?} into caller buffer", src.shape());
    dst.assign(&src.permuted_axes(perm));
    Ok(())
}
