use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConvError {
    #[error("invalid shape: {what} expected {expected}, got {got}")]
    InvalidShape {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("inconsistent output size: expected {expected:?}, got {got:?}")]
    InconsistentOutputSize {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("invalid convolution parameters: {0}")]
    InvalidParams(String),

    #[error("invalid axis permutation {0:?}")]
    InvalidPermutation(Vec<usize>),

    #[error("layout error: {0}")]
    Layout(#[from] ndarray::ShapeError),
}

impl ConvError {
    pub(crate) fn shape(what: &'static str, expected: usize, got: usize) -> Self {
        Self::InvalidShape {
            what,
            expected,
            got,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConvError>;
