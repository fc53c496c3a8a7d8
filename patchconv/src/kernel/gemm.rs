//! Contraction of the patch matrix with the filter matrix.

use ndarray::{linalg, Array2, ArrayView2, LinalgScalar};

use crate::error::{ConvError, Result};

/// `patches` (rows, K) x `filter` (K, M) -> (rows, M).
///
/// `filter` may be a transposed view; ndarray hands strided operands to the
/// GEMM backend without copying.
pub fn contract<T: LinalgScalar>(
    patches: ArrayView2<'_, T>,
    filter: ArrayView2<'_, T>,
) -> Result<Array2<T>> {
    let (rows, depth) = patches.dim();
    let (filter_depth, out_channels) = filter.dim();
    if depth != filter_depth {
        return Err(ConvError::shape("filter matrix rows", depth, filter_depth));
    }

    let mut raw = Array2::<T>::zeros((rows, out_channels));
    linalg::general_mat_mul(T::one(), &patches, &filter, T::zero(), &mut raw);
    Ok(raw)
}
