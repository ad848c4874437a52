//! # barriergen
//!
//! Barrier maps for the PHOTON ASCII universe format, generated from a 2D
//! coherent-noise field. A grid of pseudo-random unit gradients is sampled
//! with smoothed bilinear interpolation, every raster cell whose shade passes
//! a threshold is flagged, and the flagged coordinates are streamed out in
//! fixed-size `BARRIER` groups ready for import by the simulator's New
//! Universe dialog.

use std::io::{self, Write};

use rand::Rng;
use thiserror::Error;
use tracing::debug;

/// Raster and sweep parameters for one generated universe.
///
/// The defaults produce the stock barrier map: a 600x400 universe swept at
/// 0.04 noise-space units per cell, flagging cells shaded strictly darker
/// than 160, batched 1000 coordinates per group.
#[derive(Debug, Clone, Copy)]
pub struct FieldConfig {
    pub width: u32,
    pub height: u32,
    pub zoom_x: f64,
    pub zoom_y: f64,
    pub threshold: i32,
    pub batch_size: u64,
}

impl Default for FieldConfig {
    fn default() -> FieldConfig {
        FieldConfig {
            width: 600,
            height: 400,
            zoom_x: 0.04,
            zoom_y: 0.04,
            threshold: 160,
            batch_size: 1000,
        }
    }
}

impl FieldConfig {
    /// Reject parameter combinations the sweep cannot run with.
    pub fn validate(&self) -> Result<(), FieldError> {
        if self.width == 0 || self.height == 0 {
            return Err(FieldError::EmptyRaster(self.width, self.height));
        }
        if self.batch_size == 0 {
            return Err(FieldError::ZeroBatch);
        }
        // the lattice covers [0, W] x [0, H]; the farthest sample is
        // ((W-1) * zoom_x, (H-1) * zoom_y) and must stay strictly inside
        let inside = |extent: u32, zoom: f64| {
            zoom.is_finite() && zoom >= 0.0 && f64::from(extent - 1) * zoom < f64::from(extent)
        };
        if !inside(self.width, self.zoom_x) || !inside(self.height, self.zoom_y) {
            return Err(FieldError::ZoomOutOfRange(self.zoom_x, self.zoom_y));
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum FieldError {
    #[error("raster dimensions must be at least 1x1, got {0}x{1}")]
    EmptyRaster(u32, u32),
    #[error("barrier batch size must be nonzero")]
    ZeroBatch,
    #[error("zoom factors {0} x {1} sweep samples outside the gradient lattice")]
    ZoomOutOfRange(f64, f64),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Dense lattice of pseudo-random unit gradients covering the raster.
///
/// The grid carries one extra row and column beyond the raster dimensions so
/// that corner lookups at x == width or y == height stay in bounds. Each
/// stored vector has unit length, except for the degenerate draw that lands
/// exactly on the origin, which is kept as the zero vector.
#[derive(Debug)]
pub struct GradientField {
    data: Vec<[f64; 2]>,
    columns: usize,
    rows: usize,
}

impl GradientField {
    /// Populates the lattice from `rng`, once; lookups afterwards always
    /// return the identical vector. Dimensions must be nonzero.
    pub fn generate<R: Rng + ?Sized>(width: u32, height: u32, rng: &mut R) -> GradientField {
        assert!(width > 0 && height > 0);
        let columns = width as usize + 1;
        let rows = height as usize + 1;
        let mut data = Vec::with_capacity(columns * rows);
        for _ in 0..columns * rows {
            data.push(random_gradient(width, height, rng));
        }
        debug!(columns, rows, "gradient field generated");
        GradientField {
            data,
            columns,
            rows,
        }
    }

    fn get(&self, x: usize, y: usize) -> [f64; 2] {
        debug_assert!(x < self.columns && y < self.rows);
        self.data[y * self.columns + x]
    }
}

// the candidate direction is a rescaled-uniform point in a rectangle, not a
// uniform point on the circle
fn random_gradient<R: Rng + ?Sized>(width: u32, height: u32, rng: &mut R) -> [f64; 2] {
    let w = i64::from(width);
    let h = i64::from(height);
    let x = (rng.gen_range(1..=2 * w) - w) as f64 / width as f64;
    let y = (rng.gen_range(1..=2 * h) - h) as f64 / height as f64;
    normalize(x, y)
}

fn normalize(x: f64, y: f64) -> [f64; 2] {
    let norm = (x * x + y * y).sqrt();
    if norm == 0.0 {
        // a draw of exactly (W, H) rescales to the origin; keep the zero
        // vector, it contributes nothing at this cell
        [0.0, 0.0]
    } else {
        [x / norm, y / norm]
    }
}

fn dot(a: [f64; 2], b: [f64; 2]) -> f64 {
    a[0] * b[0] + a[1] * b[1]
}

// ease curve: zero first derivative at both cell boundaries
fn s_curve(t: f64) -> f64 {
    3.0 * t * t - 2.0 * t * t * t
}

/// Smooth scalar noise over a gradient lattice.
#[derive(Debug)]
pub struct NoiseField {
    gradients: GradientField,
}

impl NoiseField {
    pub fn new(gradients: GradientField) -> NoiseField {
        NoiseField { gradients }
    }

    /// Builds the gradient lattice sized for `config` and wraps it.
    pub fn generate<R: Rng + ?Sized>(config: &FieldConfig, rng: &mut R) -> NoiseField {
        NoiseField::new(GradientField::generate(config.width, config.height, rng))
    }

    /// Noise value at a continuous coordinate.
    ///
    /// The four lattice corners surrounding `(x, y)` each contribute the dot
    /// product of their gradient with the offset from that corner; the
    /// contributions are blended with eased weights along x, then along y.
    /// At an exact lattice point every contribution vanishes and the result
    /// is 0. Coordinates must lie inside the generated raster.
    pub fn sample(&self, x: f64, y: f64) -> f64 {
        debug_assert!(x >= 0.0 && y >= 0.0);
        let x0 = x.floor();
        let y0 = y.floor();
        let x1 = x0 + 1.0;
        let y1 = y0 + 1.0;

        let ix0 = x0 as usize;
        let iy0 = y0 as usize;
        let ix1 = ix0 + 1;
        let iy1 = iy0 + 1;

        let s = dot(self.gradients.get(ix0, iy0), [x - x0, y - y0]);
        let t = dot(self.gradients.get(ix1, iy0), [x - x1, y - y0]);
        let u = dot(self.gradients.get(ix0, iy1), [x - x0, y - y1]);
        let v = dot(self.gradients.get(ix1, iy1), [x - x1, y - y1]);

        let sx = s_curve(x - x0);
        let a = s + sx * (t - s);
        let b = u + sx * (v - u);

        let sy = s_curve(y - y0);
        a + sy * (b - a)
    }

    /// Inverted integer shade of the noise value: `round(128 - 128 * z)`.
    /// Values outside 0..=255 are possible and preserved; thresholding works
    /// on the unclamped shade.
    pub fn shade(&self, x: f64, y: f64) -> i32 {
        (128.0 - 128.0 * self.sample(x, y)).round() as i32
    }
}

/// Lazily sweeps the raster in row-major order and yields every cell whose
/// shade strictly exceeds the configured threshold.
pub fn barrier_cells<'a>(
    field: &'a NoiseField,
    config: &FieldConfig,
) -> impl Iterator<Item = (u32, u32)> + 'a {
    let FieldConfig {
        width,
        height,
        zoom_x,
        zoom_y,
        threshold,
        ..
    } = *config;
    (0..height).flat_map(move |j| {
        (0..width).filter_map(move |i| {
            let shade = field.shade(f64::from(i) * zoom_x, f64::from(j) * zoom_y);
            (shade > threshold).then_some((i, j))
        })
    })
}

const PROLOG_HEAD: &str = r#"# PHOTON ASCII
#
# this file contains a dummy universe, enough to define a
# set of barriers for import
# by the New Universe Dialog
#

struct UNIVERSE {
	SEED
	STEP
	AGE
	CURRENT_CELL { X Y }    # -1 -1 means NULL
	NEXT_ID
	NBORN
	NDIE
	WIDTH
	HEIGHT
	G0
	KEY
	MOUSE_X
	MOUSE_Y
	S0[N] { V }
}

struct BARRIER[N] {
	X
	Y
}

UNIVERSE 0          # seed
         0          # step
         0          # age
         -1 -1      # current cell location (x,y)
         0          # next id
         0 0      	# number births, deaths
"#;

const PROLOG_TAIL: &str = r#"         0          # global register G0
         0          # key
         -1         # mouse_x
         -1         # mouse_y
       { 0 0 0 0 0 0 0 0 }  # S0's for each strain

"#;

/// Writes the fixed universe header, parameterized only by the dimensions.
pub fn write_prolog<W: Write>(out: &mut W, width: u32, height: u32) -> io::Result<()> {
    out.write_all(PROLOG_HEAD.as_bytes())?;
    writeln!(out, "         {} {}    # dimensions: width x height", width, height)?;
    out.write_all(PROLOG_TAIL.as_bytes())
}

/// Streams coordinates into `BARRIER { ... }` groups of at most `batch_size`
/// lines and returns how many were written.
///
/// A single counter runs across the whole stream. A group is opened exactly
/// when the counter is a multiple of `batch_size` as a coordinate is about
/// to be written, and closed exactly when the counter reaches a multiple of
/// `batch_size` right after one. A partial final group is closed once at end
/// of stream; an empty stream produces no groups at all.
pub fn write_barriers<W, I>(out: &mut W, batch_size: u64, cells: I) -> io::Result<u64>
where
    W: Write,
    I: IntoIterator<Item = (u32, u32)>,
{
    assert!(batch_size > 0);
    let mut count: u64 = 0;
    for (i, j) in cells {
        if count % batch_size == 0 {
            out.write_all(b"BARRIER {\n")?;
        }
        writeln!(out, "\t{}\t{}", i, j)?;
        count += 1;
        if count % batch_size == 0 {
            out.write_all(b"}\n\n")?;
        }
    }
    if count % batch_size != 0 {
        out.write_all(b"}\n")?;
    }
    Ok(count)
}

/// Writes one complete universe document: header, then the thresholded
/// sweep of `field`, batched per `config`.
///
/// # Arguments
///
/// * `out` - destination stream; output is emitted incrementally, nothing is
///   buffered beyond what `out` itself buffers.
/// * `field` - the sampled noise field; its gradient lattice must have been
///   generated for the same raster dimensions `config` declares.
/// * `config` - raster, zoom, threshold and batching parameters.
///
/// Returns the number of barrier coordinates emitted.
pub fn write_document<W: Write>(
    out: &mut W,
    field: &NoiseField,
    config: &FieldConfig,
) -> Result<u64, FieldError> {
    config.validate()?;
    write_prolog(out, config.width, config.height)?;
    let count = write_barriers(out, config.batch_size, barrier_cells(field, config))?;
    Ok(count)
}

#[test]
fn generated_gradients_have_unit_norm() {
    let mut rng = rand::thread_rng();
    let field = GradientField::generate(32, 24, &mut rng);
    assert_eq!(field.data.len(), 33 * 25);
    for v in &field.data {
        let norm = (v[0] * v[0] + v[1] * v[1]).sqrt();
        assert!(norm == 0.0 || (norm - 1.0).abs() < 1e-12);
    }
}
