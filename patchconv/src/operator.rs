//! Conv operator bound to one storage order and one set of parameters.

use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, IxDyn, LinalgScalar};
use serde::{Deserialize, Serialize};

use crate::config::{ConvParams, StorageOrder};
use crate::error::Result;
use crate::kernel::{self, shape};

/// A stateless 2-D convolution. Holds only immutable configuration, so one
/// instance can serve any number of calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conv2d {
    pub params: ConvParams,
    pub order: StorageOrder,
}

impl Conv2d {
    pub fn new(params: ConvParams, order: StorageOrder) -> Self {
        Self { params, order }
    }

    /// Output dims for the given input and filter dims.
    pub fn output_dims(&self, input: &[usize], filter: &[usize], bias: &[usize]) -> Result<[usize; 4]> {
        let shape = shape::validate(self.order, input, filter, bias, &self.params)?;
        Ok(shape.output_dims(self.order))
    }

    /// Run into a caller-allocated output buffer.
    pub fn run<T: LinalgScalar>(
        &self,
        input: ArrayViewD<'_, T>,
        filter: ArrayViewD<'_, T>,
        bias: ArrayViewD<'_, T>,
        output: ArrayViewMutD<'_, T>,
    ) -> Result<()> {
        kernel::conv2d(self.order, input, filter, bias, &self.params, output)
    }

    /// Allocate the output and run.
    pub fn forward<T: LinalgScalar>(
        &self,
        input: ArrayViewD<'_, T>,
        filter: ArrayViewD<'_, T>,
        bias: ArrayViewD<'_, T>,
    ) -> Result<ArrayD<T>> {
        let dims = self.output_dims(input.shape(), filter.shape(), bias.shape())?;
        let mut output = ArrayD::<T>::zeros(IxDyn(&dims));
        self.run(input, filter, bias, output.view_mut())?;
        Ok(output)
    }
}
