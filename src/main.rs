//! Command-line front end: `onnx2mpsx --input model.onnx --output model.mpsx [--half]`.

use std::borrow::Cow;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use onnx2mpsx::convert::{self, FloatKind};
use onnx2mpsx::{ModelExporter, ModelLoader, OnnxExporter, OnnxLoader};

/// Convert an ONNX model to MPSX format
#[derive(Parser, Debug)]
#[command(name = "onnx2mpsx")]
#[command(about = "Convert an ONNX model to MPSX format")]
#[command(version)]
struct Args {
    /// Path to ONNX model
    #[arg(long)]
    input: PathBuf,

    /// Path to MPSX model
    #[arg(long)]
    output: PathBuf,

    /// Use FP16 weights
    #[arg(long)]
    half: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let target = if args.half { FloatKind::F16 } else { FloatKind::F32 };

    let mut model = OnnxLoader::load(&args.input)
        .with_context(|| format!("Failed to load ONNX model: {}", args.input.display()))?;
    model.strip_doc_strings();

    match convert::run(&model, target).context("Conversion failed")? {
        Cow::Borrowed(_) => {
            tracing::info!("{} is already an MPSX model, nothing to do", args.input.display());
        }
        Cow::Owned(converted) => {
            OnnxExporter::export(&converted, &args.output)
                .with_context(|| format!("Failed to write MPSX model: {}", args.output.display()))?;
            println!("Done! {} -> {} ({})", args.input.display(), args.output.display(), target);
        }
    }

    Ok(())
}
