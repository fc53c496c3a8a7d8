//! Binary container for dense tensors exchanged with the CLI.
//!
//! Format (all multi-byte values are big-endian):
//! ```text
//! [magic:   4 bytes]  0x50 0x43 0x54 0x00  ("PCT\0")
//! [version: 1 byte ]  0x01
//! [dtype:   1 byte ]  0 = f32, 1 = f64
//! [rank:    4 bytes]
//! [dims:    rank x 8 bytes]
//! [data:    product(dims) elements, row-major]
//! ```

use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::Path;

use anyhow::{bail, ensure, Context, Result};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use ndarray::{ArrayD, IxDyn};

const MAGIC: [u8; 4] = [0x50, 0x43, 0x54, 0x00]; // "PCT\0"
const VERSION: u8 = 1;
const MAX_RANK: u32 = 8;

const DTYPE_F32: u8 = 0;
const DTYPE_F64: u8 = 1;

/// A tensor of one of the supported element types.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorFile {
    F32(ArrayD<f32>),
    F64(ArrayD<f64>),
}

/// Value range of a tensor, for display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl TensorFile {
    pub fn dtype_name(&self) -> &'static str {
        match self {
            Self::F32(_) => "f32",
            Self::F64(_) => "f64",
        }
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            Self::F32(a) => a.shape(),
            Self::F64(a) => a.shape(),
        }
    }

    pub fn summary(&self) -> Option<Summary> {
        let values: Vec<f64> = match self {
            Self::F32(a) => a.iter().map(|&v| v as f64).collect(),
            Self::F64(a) => a.iter().copied().collect(),
        };
        if values.is_empty() {
            return None;
        }
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        Some(Summary { min, max, mean })
    }

    /// Serialize to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let shape = self.shape();
        let mut buf = Vec::new();
        buf.write_all(&MAGIC)?;
        buf.write_u8(VERSION)?;
        buf.write_u8(match self {
            Self::F32(_) => DTYPE_F32,
            Self::F64(_) => DTYPE_F64,
        })?;
        buf.write_u32::<BigEndian>(shape.len() as u32)?;
        for &dim in shape {
            buf.write_u64::<BigEndian>(dim as u64)?;
        }
        match self {
            Self::F32(a) => {
                for &v in a.iter() {
                    buf.write_f32::<BigEndian>(v)?;
                }
            }
            Self::F64(a) => {
                for &v in a.iter() {
                    buf.write_f64::<BigEndian>(v)?;
                }
            }
        }
        Ok(buf)
    }

    /// Deserialize from bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(data);

        let mut magic = [0u8; 4];
        cur.read_exact(&mut magic)
            .context("failed to read tensor magic")?;
        ensure!(magic == MAGIC, "invalid tensor magic: expected PCT\\0");

        let version = cur.read_u8().context("failed to read tensor version")?;
        ensure!(
            version == VERSION,
            "unsupported tensor version {version}, expected {VERSION}"
        );

        let dtype = cur.read_u8().context("failed to read dtype")?;
        let rank = cur
            .read_u32::<BigEndian>()
            .context("failed to read rank")?;
        if rank > MAX_RANK {
            bail!("unreasonable tensor rank: {rank}");
        }

        let mut dims = Vec::with_capacity(rank as usize);
        for i in 0..rank {
            let dim = cur
                .read_u64::<BigEndian>()
                .with_context(|| format!("failed to read dim {i}"))?;
            dims.push(usize::try_from(dim).with_context(|| format!("dim {i} too large: {dim}"))?);
        }
        let count = dims
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
            .context("element count overflows")?;

        let elem_size = match dtype {
            DTYPE_F32 => 4,
            DTYPE_F64 => 8,
            other => bail!("unknown dtype tag {other}"),
        };
        let remaining = data.len() - cur.position() as usize;
        ensure!(
            count.checked_mul(elem_size) == Some(remaining),
            "tensor {dims:?} needs {count} elements of {elem_size} bytes, found {remaining} bytes"
        );

        let tensor = match dtype {
            DTYPE_F32 => {
                let mut values = vec![0f32; count];
                cur.read_f32_into::<BigEndian>(&mut values)
                    .context("failed to read f32 data")?;
                Self::F32(ArrayD::from_shape_vec(IxDyn(&dims), values)?)
            }
            _ => {
                let mut values = vec![0f64; count];
                cur.read_f64_into::<BigEndian>(&mut values)
                    .context("failed to read f64 data")?;
                Self::F64(ArrayD::from_shape_vec(IxDyn(&dims), values)?)
            }
        };
        Ok(tensor)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let bytes =
            fs::read(path).with_context(|| format!("cannot read tensor {}", path.display()))?;
        Self::from_bytes(&bytes).with_context(|| format!("invalid tensor file {}", path.display()))
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_bytes()?)
            .with_context(|| format!("failed to write tensor to {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    #[test]
    fn header_layout() {
        let t = TensorFile::F32(ArrayD::from_elem(IxDyn(&[2, 3]), 1.5f32));
        let bytes = t.to_bytes().unwrap();
        assert_eq!(&bytes[..4], b"PCT\0");
        assert_eq!(bytes[4], VERSION);
        assert_eq!(bytes[5], DTYPE_F32);
        assert_eq!(&bytes[6..10], &[0, 0, 0, 2]);
        assert_eq!(bytes.len(), 10 + 2 * 8 + 6 * 4);
        assert_eq!(TensorFile::from_bytes(&bytes).unwrap(), t);
    }

    #[test]
    fn non_standard_layout_is_written_in_logical_order() {
        let a = Array4::from_shape_fn((1, 2, 2, 3), |(_, c, h, w)| (c * 6 + h * 3 + w) as f64);
        let permuted = a.view().permuted_axes([0, 2, 3, 1]).to_owned().into_dyn();
        let decoded = TensorFile::from_bytes(&TensorFile::F64(permuted.clone()).to_bytes().unwrap())
            .unwrap();
        match decoded {
            TensorFile::F64(b) => assert_eq!(b, permuted),
            other => panic!("wrong dtype {}", other.dtype_name()),
        }
    }

    #[test]
    fn truncated_data_rejected() {
        let t = TensorFile::F64(ArrayD::zeros(IxDyn(&[4])));
        let bytes = t.to_bytes().unwrap();
        let err = TensorFile::from_bytes(&bytes[..bytes.len() - 3]).unwrap_err();
        assert!(err.to_string().contains("needs 4 elements"));
    }

    #[test]
    fn bad_magic_and_dtype() {
        assert!(TensorFile::from_bytes(b"NOPE\x01\x00\x00\x00\x00\x00").is_err());
        let mut bytes = TensorFile::F32(ArrayD::zeros(IxDyn(&[1]))).to_bytes().unwrap();
        bytes[5] = 9;
        assert!(TensorFile::from_bytes(&bytes).is_err());
    }

    #[test]
    fn summary_values() {
        let t = TensorFile::F32(ArrayD::from_shape_vec(IxDyn(&[4]), vec![-1.0, 0.0, 2.0, 3.0]).unwrap());
        let s = t.summary().unwrap();
        assert_eq!((s.min, s.max, s.mean), (-1.0, 3.0, 1.0));
        assert!(TensorFile::F64(ArrayD::zeros(IxDyn(&[0, 3]))).summary().is_none());
    }
}
