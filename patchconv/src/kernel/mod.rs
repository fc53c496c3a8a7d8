//! 2-D convolution entry points.
//!
//! Both storage orders run the same NHWC pipeline: patch extraction,
//! one GEMM against a (kH * kW * C, M) filter matrix, then a per-channel bias
//! add. The NCHW entry point copies input and filter into channel-last form
//! first and copies the result back afterwards.

pub mod bias;
pub mod gemm;
pub mod patches;
pub mod shape;

use ndarray::{
    Array4, ArrayView1, ArrayView2, ArrayView4, ArrayViewD, ArrayViewMutD, Axis, Ix1, Ix4,
    LinalgScalar,
};

use crate::config::{ConvParams, StorageOrder};
use crate::error::Result;
use crate::layout::{self, MCHW_TO_HWCM, NCHW_TO_NHWC, NHWC_TO_NCHW};

use self::shape::ConvShape;

/// Convolve an NHWC `input` with an (M, kH, kW, C) `filter`, writing
/// (N, out_h, out_w, M) into `output`.
///
/// Nothing is written to `output` unless all shapes agree.
pub fn conv2d_nhwc<T: LinalgScalar>(
    input: ArrayViewD<'_, T>,
    filter: ArrayViewD<'_, T>,
    bias: ArrayViewD<'_, T>,
    params: &ConvParams,
    output: ArrayViewMutD<'_, T>,
) -> Result<()> {
    let order = StorageOrder::Nhwc;
    let shape = shape::validate(order, input.shape(), filter.shape(), bias.shape(), params)?;
    shape::check_output(&shape, order, output.shape())?;
    log_call(order, &shape, params);

    let input = input.into_dimensionality::<Ix4>()?;
    let bias = bias.into_dimensionality::<Ix1>()?;
    // Each filter row is already (kH, kW, C)-ordered: view it as (M, K) and
    // contract against its transpose.
    let filter = filter.to_shape((shape.out_channels, depth(&shape, params)))?;

    let result = channel_last(input, filter.t(), bias, params, &shape)?;
    output.into_dimensionality::<Ix4>()?.assign(&result);
    Ok(())
}

/// Convolve an NCHW `input` with an (M, C, kH, kW) `filter`, writing
/// (N, M, out_h, out_w) into `output`.
///
/// Nothing is written to `output` unless all shapes agree.
pub fn conv2d_nchw<T: LinalgScalar>(
    input: ArrayViewD<'_, T>,
    filter: ArrayViewD<'_, T>,
    bias: ArrayViewD<'_, T>,
    params: &ConvParams,
    output: ArrayViewMutD<'_, T>,
) -> Result<()> {
    let order = StorageOrder::Nchw;
    let shape = shape::validate(order, input.shape(), filter.shape(), bias.shape(), params)?;
    shape::check_output(&shape, order, output.shape())?;
    log_call(order, &shape, params);

    let input = layout::permute(input.into_dimensionality::<Ix4>()?, NCHW_TO_NHWC)?;
    let bias = bias.into_dimensionality::<Ix1>()?;
    let filter = layout::permute(filter.into_dimensionality::<Ix4>()?, MCHW_TO_HWCM)?
        .into_shape_with_order((depth(&shape, params), shape.out_channels))?;

    let result = channel_last(input.view(), filter.view(), bias, params, &shape)?;
    layout::permute_into(
        result.view(),
        NHWC_TO_NCHW,
        output.into_dimensionality::<Ix4>()?,
    )
}

/// Dispatch on `order`.
pub fn conv2d<T: LinalgScalar>(
    order: StorageOrder,
    input: ArrayViewD<'_, T>,
    filter: ArrayViewD<'_, T>,
    bias: ArrayViewD<'_, T>,
    params: &ConvParams,
    output: ArrayViewMutD<'_, T>,
) -> Result<()> {
    match order {
        StorageOrder::Nchw => conv2d_nchw(input, filter, bias, params, output),
        StorageOrder::Nhwc => conv2d_nhwc(input, filter, bias, params, output),
    }
}

fn depth(shape: &ConvShape, params: &ConvParams) -> usize {
    params.kernel_h * params.kernel_w * shape.in_channels
}

/// Shared NHWC pipeline; `filter` is (kH * kW * C, M). Returns
/// (N, out_h, out_w, M).
fn channel_last<T: LinalgScalar>(
    input: ArrayView4<'_, T>,
    filter: ArrayView2<'_, T>,
    bias: ArrayView1<'_, T>,
    params: &ConvParams,
    shape: &ConvShape,
) -> Result<Array4<T>> {
    let mut raw = {
        let patches = patches::extract_patches(input, params, shape.out_h, shape.out_w);
        gemm::contract(patches.view(), filter)?
    };
    bias::add_bias(raw.view_mut(), bias, Axis(1));
    Ok(raw.into_shape_with_order((
        shape.batch,
        shape.out_h,
        shape.out_w,
        shape.out_channels,
    ))?)
}

fn log_call(order: StorageOrder, shape: &ConvShape, params: &ConvParams) {
    log::debug!(
        "conv2d {order}: N={} C={} {}x{} -> M={} {}x{}, kernel {}x{}, patch matrix {}x{}",
        shape.batch,
        shape.in_channels,
        shape.in_h,
        shape.in_w,
        shape.out_channels,
        shape.out_h,
        shape.out_w,
        params.kernel_h,
        params.kernel_w,
        shape.patch_rows(),
        depth(shape, params),
    );
}
