//! Per-output-channel bias add.

use ndarray::{ArrayView1, ArrayViewMut, Axis, LinalgScalar, RemoveAxis};

/// Add `bias[m]` to every element whose index along `channel_axis` is `m`.
///
/// Works for the (rows, M) contraction result with `Axis(1)` as well as for a
/// 4-D tensor in either storage order.
pub fn add_bias<T: LinalgScalar, D: RemoveAxis>(
    mut output: ArrayViewMut<'_, T, D>,
    bias: ArrayView1<'_, T>,
    channel_axis: Axis,
) {
    debug_assert_eq!(output.len_of(channel_axis), bias.len());
    for (mut lane, &b) in output.axis_iter_mut(channel_axis).zip(bias.iter()) {
        lane.mapv_inplace(|v| v + b);
    }
}
