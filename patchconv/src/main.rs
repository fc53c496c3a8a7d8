use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use patchconv::tensor_file::TensorFile;
use patchconv::{Conv2d, ConvParams, StorageOrder};

/// 2-D convolution over tensor files.
///
/// Tensors are exchanged in the PCT binary format (see `tensor_file`). The
/// filter layout follows the storage order: (M, C, kH, kW) for NCHW,
/// (M, kH, kW, C) for NHWC.
#[derive(Parser)]
#[command(name = "patchconv", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convolve an input tensor with a filter and bias.
    Run {
        /// Input feature tensor.
        #[arg(long)]
        input: PathBuf,

        /// Filter tensor.
        #[arg(long)]
        filter: PathBuf,

        /// Bias vector, one value per output channel.
        #[arg(long)]
        bias: PathBuf,

        /// Output tensor file.
        #[arg(short, long, default_value = "./output.pct")]
        output: PathBuf,

        /// Storage order of input, filter and output.
        #[arg(long, default_value = "nchw", value_enum)]
        order: StorageOrder,

        #[command(flatten)]
        geometry: GeometryArgs,
    },

    /// Print the output shape for an input shape.
    Shape {
        /// Input dims in storage order, e.g. 1,3,224,224.
        #[arg(long, value_delimiter = ',', required = true)]
        input_dims: Vec<usize>,

        /// Number of output channels (filters).
        #[arg(long)]
        out_channels: usize,

        /// Storage order of the input.
        #[arg(long, default_value = "nchw", value_enum)]
        order: StorageOrder,

        #[command(flatten)]
        geometry: GeometryArgs,
    },

    /// Show the dtype, dims and value range of a tensor file.
    Inspect {
        /// Tensor file.
        path: PathBuf,
    },
}

/// Kernel geometry flags. A `--params` JSON file takes precedence.
#[derive(Args)]
struct GeometryArgs {
    /// JSON file with convolution parameters.
    #[arg(long)]
    params: Option<PathBuf>,

    /// Kernel size as `k` or `kh,kw`. Inferred from the filter if omitted.
    #[arg(long, value_delimiter = ',')]
    kernel: Option<Vec<usize>>,

    /// Stride as `s` or `sh,sw`.
    #[arg(long, value_delimiter = ',', default_value = "1")]
    stride: Vec<usize>,

    /// Dilation as `d` or `dh,dw`.
    #[arg(long, value_delimiter = ',', default_value = "1")]
    dilation: Vec<usize>,

    /// Padding as `p` or `top,left,bottom,right`.
    #[arg(long, value_delimiter = ',', default_value = "0")]
    pad: Vec<usize>,
}

impl GeometryArgs {
    fn resolve(&self, inferred_kernel: Option<(usize, usize)>) -> Result<ConvParams> {
        if let Some(path) = &self.params {
            return ConvParams::from_json_file(path);
        }
        let (kernel_h, kernel_w) = match &self.kernel {
            Some(values) => pair("kernel", values)?,
            None => inferred_kernel.context("kernel size required (--kernel or --params)")?,
        };
        let (stride_h, stride_w) = pair("stride", &self.stride)?;
        let (dilation_h, dilation_w) = pair("dilation", &self.dilation)?;
        let params = match self.pad.as_slice() {
            &[p] => ConvParams::new(kernel_h, kernel_w).with_pad(p),
            &[top, left, bottom, right] => {
                ConvParams::new(kernel_h, kernel_w).with_pads(top, left, bottom, right)
            }
            other => bail!("--pad takes 1 or 4 values, got {}", other.len()),
        }
        .with_stride(stride_h, stride_w)
        .with_dilation(dilation_h, dilation_w);
        params.validate()?;
        Ok(params)
    }
}

fn pair(name: &str, values: &[usize]) -> Result<(usize, usize)> {
    match values {
        &[v] => Ok((v, v)),
        &[h, w] => Ok((h, w)),
        other => bail!("--{name} takes 1 or 2 values, got {}", other.len()),
    }
}

fn run_conv(
    order: StorageOrder,
    input: &Path,
    filter: &Path,
    bias: &Path,
    output: &Path,
    geometry: &GeometryArgs,
) -> Result<()> {
    let input = TensorFile::read(input)?;
    let filter = TensorFile::read(filter)?;
    let bias = TensorFile::read(bias)?;

    let inferred = (filter.shape().len() == 4).then(|| {
        let (_, _, kh, kw) = order.split_filter(filter.shape());
        (kh, kw)
    });
    let conv = Conv2d::new(geometry.resolve(inferred)?, order);
    log::info!("running {conv:?}");

    let t0 = Instant::now();
    let result = match (input, filter, bias) {
        (TensorFile::F32(x), TensorFile::F32(w), TensorFile::F32(b)) => {
            TensorFile::F32(conv.forward(x.view(), w.view(), b.view())?)
        }
        (TensorFile::F64(x), TensorFile::F64(w), TensorFile::F64(b)) => {
            TensorFile::F64(conv.forward(x.view(), w.view(), b.view())?)
        }
        (x, w, b) => bail!(
            "mixed element types: input {}, filter {}, bias {}",
            x.dtype_name(),
            w.dtype_name(),
            b.dtype_name()
        ),
    };
    eprintln!("  convolved in {:.3}s", t0.elapsed().as_secs_f64());

    result.write(output)?;
    println!(
        "Wrote {} {:?} ({}) to {}",
        result.dtype_name(),
        result.shape(),
        order,
        output.display()
    );
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            input,
            filter,
            bias,
            output,
            order,
            geometry,
        } => {
            run_conv(order, &input, &filter, &bias, &output, &geometry)?;
        }

        Commands::Shape {
            input_dims,
            out_channels,
            order,
            geometry,
        } => {
            let params = geometry.resolve(None)?;
            let dims = params.output_dims(order, &input_dims, out_channels)?;
            println!("{dims:?}");
        }

        Commands::Inspect { path } => {
            let tensor = TensorFile::read(&path)?;
            println!("{}", path.display());
            println!("  dtype: {}", tensor.dtype_name());
            println!("  dims:  {:?}", tensor.shape());
            match tensor.summary() {
                Some(s) => {
                    println!("  min:   {}", s.min);
                    println!("  max:   {}", s.max);
                    println!("  mean:  {}", s.mean);
                }
                None => println!("  (empty)"),
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry(kernel: Option<Vec<usize>>, pad: Vec<usize>) -> GeometryArgs {
        GeometryArgs {
            params: None,
            kernel,
            stride: vec![2, 1],
            dilation: vec![1],
            pad,
        }
    }

    #[test]
    fn kernel_inferred_from_filter() {
        let params = geometry(None, vec![1]).resolve(Some((3, 5))).unwrap();
        assert_eq!((params.kernel_h, params.kernel_w), (3, 5));
        assert_eq!((params.stride_h, params.stride_w), (2, 1));
        assert_eq!(params.pad_right, 1);
    }

    #[test]
    fn explicit_pads() {
        let params = geometry(Some(vec![3]), vec![1, 2, 3, 4]).resolve(None).unwrap();
        assert_eq!(
            (params.pad_top, params.pad_left, params.pad_bottom, params.pad_right),
            (1, 2, 3, 4)
        );
    }

    #[test]
    fn bad_flag_arity() {
        assert!(geometry(Some(vec![3]), vec![1, 2]).resolve(None).is_err());
        assert!(geometry(None, vec![0]).resolve(None).is_err());
    }

    #[test]
    fn cli_parses() {
        Cli::try_parse_from([
            "patchconv", "run", "--input", "x.pct", "--filter", "w.pct", "--bias", "b.pct",
            "--order", "nhwc", "--stride", "2,2", "--pad", "1,0,1,0",
        ])
        .unwrap();
    }
}
