use std::fs;
use std::path::Path;
use std::str::FromStr;

use anyhow::Context;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{ConvError, Result};

/// Physical dimension order of a 4-D feature tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StorageOrder {
    /// (batch, channel, height, width); filters are (M, C, kH, kW).
    #[serde(alias = "nchw")]
    Nchw,
    /// (batch, height, width, channel); filters are (M, kH, kW, C).
    #[serde(alias = "nhwc")]
    Nhwc,
}

impl StorageOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nchw => "NCHW",
            Self::Nhwc => "NHWC",
        }
    }

    /// Split feature dims into (N, C, H, W). `dims` must have length 4.
    pub fn split_feature(&self, dims: &[usize]) -> (usize, usize, usize, usize) {
        match self {
            Self::Nchw => (dims[0], dims[1], dims[2], dims[3]),
            Self::Nhwc => (dims[0], dims[3], dims[1], dims[2]),
        }
    }

    pub fn feature_dims(&self, n: usize, c: usize, h: usize, w: usize) -> [usize; 4] {
        match self {
            Self::Nchw => [n, c, h, w],
            Self::Nhwc => [n, h, w, c],
        }
    }

    /// Split filter dims into (M, C, kH, kW). `dims` must have length 4.
    pub fn split_filter(&self, dims: &[usize]) -> (usize, usize, usize, usize) {
        match self {
            Self::Nchw => (dims[0], dims[1], dims[2], dims[3]),
            Self::Nhwc => (dims[0], dims[3], dims[1], dims[2]),
        }
    }
}

impl std::fmt::Display for StorageOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageOrder {
    type Err = ConvError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "NCHW" => Ok(Self::Nchw),
            "NHWC" => Ok(Self::Nhwc),
            other => Err(ConvError::InvalidParams(format!(
                "unknown storage order {other:?}, expected NCHW or NHWC"
            ))),
        }
    }
}

fn one() -> usize {
    1
}

/// Kernel geometry for one convolution call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvParams {
    pub kernel_h: usize,
    pub kernel_w: usize,
    #[serde(default = "one")]
    pub stride_h: usize,
    #[serde(default = "one")]
    pub stride_w: usize,
    #[serde(default = "one")]
    pub dilation_h: usize,
    #[serde(default = "one")]
    pub dilation_w: usize,
    #[serde(default)]
    pub pad_left: usize,
    #[serde(default)]
    pub pad_right: usize,
    #[serde(default)]
    pub pad_top: usize,
    #[serde(default)]
    pub pad_bottom: usize,
}

impl Default for ConvParams {
    fn default() -> Self {
        Self::new(1, 1)
    }
}

impl ConvParams {
    /// Unit stride, unit dilation, no padding.
    pub fn new(kernel_h: usize, kernel_w: usize) -> Self {
        Self {
            kernel_h,
            kernel_w,
            stride_h: 1,
            stride_w: 1,
            dilation_h: 1,
            dilation_w: 1,
            pad_left: 0,
            pad_right: 0,
            pad_top: 0,
            pad_bottom: 0,
        }
    }

    pub fn with_stride(mut self, stride_h: usize, stride_w: usize) -> Self {
        self.stride_h = stride_h;
        self.stride_w = stride_w;
        self
    }

    pub fn with_dilation(mut self, dilation_h: usize, dilation_w: usize) -> Self {
        self.dilation_h = dilation_h;
        self.dilation_w = dilation_w;
        self
    }

    /// Same padding on all four sides.
    pub fn with_pad(self, pad: usize) -> Self {
        self.with_pads(pad, pad, pad, pad)
    }

    pub fn with_pads(mut self, top: usize, left: usize, bottom: usize, right: usize) -> Self {
        self.pad_top = top;
        self.pad_left = left;
        self.pad_bottom = bottom;
        self.pad_right = right;
        self
    }

    /// Load parameters from a JSON file. Omitted fields other than the
    /// kernel size take their defaults.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("cannot read params file {}", path.display()))?;
        let params: Self = serde_json::from_str(&text)
            .with_context(|| format!("invalid params file {}", path.display()))?;
        params.validate()?;
        Ok(params)
    }

    /// Kernel, stride and dilation must all be at least 1.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("kernel_h", self.kernel_h),
            ("kernel_w", self.kernel_w),
            ("stride_h", self.stride_h),
            ("stride_w", self.stride_w),
            ("dilation_h", self.dilation_h),
            ("dilation_w", self.dilation_w),
        ];
        for (name, value) in fields {
            if value == 0 {
                return Err(ConvError::InvalidParams(format!(
                    "{name} must be at least 1, got 0"
                )));
            }
        }
        Ok(())
    }

    /// Output (height, width) for an input of `in_h` x `in_w`.
    pub fn output_hw(&self, in_h: usize, in_w: usize) -> Result<(usize, usize)> {
        self.validate()?;
        let out_h = output_extent(
            "padded input height",
            in_h,
            self.kernel_h,
            self.stride_h,
            self.dilation_h,
            (self.pad_top, self.pad_bottom),
        )?;
        let out_w = output_extent(
            "padded input width",
            in_w,
            self.kernel_w,
            self.stride_w,
            self.dilation_w,
            (self.pad_left, self.pad_right),
        )?;
        Ok((out_h, out_w))
    }

    /// Full output shape for a feature tensor of `input_dims` in `order`.
    pub fn output_dims(
        &self,
        order: StorageOrder,
        input_dims: &[usize],
        out_channels: usize,
    ) -> Result<[usize; 4]> {
        if input_dims.len() != 4 {
            return Err(ConvError::shape("input rank", 4, input_dims.len()));
        }
        let (n, _, h, w) = order.split_feature(input_dims);
        let (out_h, out_w) = self.output_hw(h, w)?;
        Ok(order.feature_dims(n, out_channels, out_h, out_w))
    }
}

/// `floor((input + pads - dilation * (kernel - 1) - 1) / stride) + 1`
fn output_extent(
    axis: &'static str,
    input: usize,
    kernel: usize,
    stride: usize,
    dilation: usize,
    (pad_before, pad_after): (usize, usize),
) -> Result<usize> {
    let overflow = || ConvError::InvalidParams(format!("{axis} overflows usize"));
    let padded = input
        .checked_add(pad_before)
        .and_then(|v| v.checked_add(pad_after))
        .ok_or_else(overflow)?;
    let span = dilation
        .checked_mul(kernel - 1)
        .and_then(|v| v.checked_add(1))
        .ok_or_else(overflow)?;
    if padded < span {
        return Err(ConvError::shape(axis, span, padded));
    }
    Ok((padded - span) / stride + 1)
}
