//! Rank and dimension agreement between input, filter, bias and output.

use crate::config::{ConvParams, StorageOrder};
use crate::error::{ConvError, Result};

/// Dimensions of one validated convolution call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvShape {
    pub batch: usize,
    pub in_channels: usize,
    pub in_h: usize,
    pub in_w: usize,
    pub out_channels: usize,
    pub out_h: usize,
    pub out_w: usize,
}

impl ConvShape {
    /// Rows of the patch matrix: one per (batch, out row, out col).
    pub fn patch_rows(&self) -> usize {
        self.batch * self.out_h * self.out_w
    }

    /// Output dims laid out in `order`.
    pub fn output_dims(&self, order: StorageOrder) -> [usize; 4] {
        order.feature_dims(self.batch, self.out_channels, self.out_h, self.out_w)
    }
}

/// Check input/filter/bias dims against each other and `params`.
///
/// Filter dims are read as (M, C, kH, kW) for NCHW and (M, kH, kW, C) for
/// NHWC.
pub fn validate(
    order: StorageOrder,
    input: &[usize],
    filter: &[usize],
    bias: &[usize],
    params: &ConvParams,
) -> Result<ConvShape> {
    params.validate()?;
    if input.len() != 4 {
        return Err(ConvError::shape("input rank", 4, input.len()));
    }
    if filter.len() != 4 {
        return Err(ConvError::shape("filter rank", 4, filter.len()));
    }
    if bias.len() != 1 {
        return Err(ConvError::shape("bias rank", 1, bias.len()));
    }

    let (batch, in_channels, in_h, in_w) = order.split_feature(input);
    let (out_channels, filter_channels, kernel_h, kernel_w) = order.split_filter(filter);
    if filter_channels != in_channels {
        return Err(ConvError::shape(
            "filter channels",
            in_channels,
            filter_channels,
        ));
    }
    if kernel_h != params.kernel_h {
        return Err(ConvError::shape("filter kernel height", params.kernel_h, kernel_h));
    }
    if kernel_w != params.kernel_w {
        return Err(ConvError::shape("filter kernel width", params.kernel_w, kernel_w));
    }
    if bias[0] != out_channels {
        return Err(ConvError::shape("bias length", out_channels, bias[0]));
    }

    let (out_h, out_w) = params.output_hw(in_h, in_w)?;
    Ok(ConvShape {
        batch,
        in_channels,
        in_h,
        in_w,
        out_channels,
        out_h,
        out_w,
    })
}

/// The caller's output buffer must match the computed shape exactly.
pub fn check_output(shape: &ConvShape, order: StorageOrder, output: &[usize]) -> Result<()> {
    let expected = shape.output_dims(order);
    if output != expected {
        return Err(ConvError::InconsistentOutputSize {
            expected: expected.to_vec(),
            got: output.to_vec(),
        });
    }
    Ok(())
}
