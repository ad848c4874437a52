use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use image::{GrayImage, Luma};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use tracing::info;

use barriergen::{write_document, FieldConfig, NoiseField};

#[derive(Parser, Debug)]
#[command(name = "barriergen")]
#[command(about = "Generate a PHOTON ASCII barrier universe from 2D coherent noise")]
struct Args {
    /// Universe width in cells
    #[arg(long, default_value_t = 600)]
    width: u32,

    /// Universe height in cells
    #[arg(long, default_value_t = 400)]
    height: u32,

    /// Noise-space step per cell along x
    #[arg(long, default_value_t = 0.04)]
    zoom_x: f64,

    /// Noise-space step per cell along y
    #[arg(long, default_value_t = 0.04)]
    zoom_y: f64,

    /// Cells shaded strictly above this become barriers
    #[arg(long, default_value_t = 160)]
    threshold: i32,

    /// Coordinates per BARRIER group
    #[arg(long, default_value_t = 1000)]
    batch_size: u64,

    /// RNG seed; drawn from entropy when omitted
    #[arg(long)]
    seed: Option<u64>,

    /// Write the universe to this file instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Also render the shade field to a grayscale image (e.g. a PNG)
    #[arg(long)]
    preview: Option<PathBuf>,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let config = FieldConfig {
        width: args.width,
        height: args.height,
        zoom_x: args.zoom_x,
        zoom_y: args.zoom_y,
        threshold: args.threshold,
        batch_size: args.batch_size,
    };
    config.validate()?;

    let mut rng = match args.seed {
        Some(seed) => SmallRng::seed_from_u64(seed),
        None => SmallRng::from_entropy(),
    };
    let field = NoiseField::generate(&config, &mut rng);

    let count = match &args.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("cannot create {}", path.display()))?;
            let mut out = BufWriter::new(file);
            let count = write_document(&mut out, &field, &config)?;
            out.flush()?;
            count
        }
        None => {
            let stdout = io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            let count = write_document(&mut out, &field, &config)?;
            out.flush()?;
            count
        }
    };
    info!(
        width = config.width,
        height = config.height,
        barriers = count,
        "universe written"
    );

    if let Some(path) = &args.preview {
        render_preview(&field, &config)
            .save(path)
            .with_context(|| format!("cannot write preview {}", path.display()))?;
        info!(path = %path.display(), "preview rendered");
    }

    Ok(())
}

// diagnostics go to stderr so the document on stdout stays clean
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .try_init();
}

/// Render the shade field for visual inspection, clamped to 8-bit gray.
/// The clamp is display-only; thresholding always sees the raw shade.
fn render_preview(field: &NoiseField, config: &FieldConfig) -> GrayImage {
    let mut img = GrayImage::new(config.width, config.height);
    for j in 0..config.height {
        for i in 0..config.width {
            let shade = field.shade(f64::from(i) * config.zoom_x, f64::from(j) * config.zoom_y);
            img.put_pixel(i, j, Luma([shade.clamp(0, 255) as u8]));
        }
    }
    img
}
