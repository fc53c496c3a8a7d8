//! 2-D convolution over NCHW and NHWC tensors.
//!
//! The kernel gathers receptive fields into a patch matrix, contracts it with
//! the filter in a single GEMM and adds one bias per output channel. NCHW
//! calls are served by the same channel-last pipeline through copy-based
//! transposes at the boundary, so both orders produce the same values.

pub mod config;
pub mod error;
pub mod kernel;
pub mod layout;
pub mod operator;
pub mod tensor_file;

pub use config::{ConvParams, StorageOrder};
pub use error::{ConvError, Result};
pub use kernel::{conv2d, conv2d_nchw, conv2d_nhwc};
pub use operator::Conv2d;
