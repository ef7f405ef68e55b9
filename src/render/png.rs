use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use palette::Srgb;

use super::{cell_bounds, y_range, PlotRequest, Renderer};
use crate::color::{DisplayAttrs, MarkerStyle};
use crate::container::Histogram;

// ---------------------------------------------------------------------------
// Overlay plot (per-bin series + sum, log y)
// ---------------------------------------------------------------------------

const MARGIN_LEFT: i64 = 70;
const MARGIN_RIGHT: i64 = 20;
const MARGIN_TOP: i64 = 20;
const MARGIN_BOTTOM: i64 = 50;
const MARKER_RADIUS: i64 = 4;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const FRAME: Rgb<u8> = Rgb([0, 0, 0]);
const GRID: Rgb<u8> = Rgb([225, 225, 225]);

/// Raster overlay of every series and the sum on a logarithmic y axis.
#[derive(Debug, Clone, Copy)]
pub struct PngOverlay {
    pub width: u32,
    pub height: u32,
}

impl Default for PngOverlay {
    fn default() -> Self {
        PngOverlay {
            width: 900,
            height: 700,
        }
    }
}

/// Maps data coordinates into the plot frame.
struct Frame {
    left: i64,
    right: i64,
    top: i64,
    bottom: i64,
    x_min: f64,
    x_max: f64,
    log_lo: f64,
    log_hi: f64,
}

impl Frame {
    fn x(&self, x: f64) -> i64 {
        let t = (x - self.x_min) / (self.x_max - self.x_min);
        self.left + (t * (self.right - self.left) as f64).round() as i64
    }

    /// `None` for values that cannot appear on a log axis.
    fn y(&self, y: f64) -> Option<i64> {
        if !(y > 0.0) {
            return None;
        }
        let t = (y.log10() - self.log_lo) / (self.log_hi - self.log_lo);
        let t = t.clamp(0.0, 1.0);
        Some(self.bottom - (t * (self.bottom - self.top) as f64).round() as i64)
    }
}

impl PngOverlay {
    /// Draw into an in-memory image.
    pub fn draw(&self, request: &PlotRequest<'_>) -> RgbImage {
        let mut img = RgbImage::from_pixel(self.width, self.height, WHITE);

        let bounds = cell_bounds(request.sum);
        let x_min = bounds.first().map_or(0.0, |b| b.0);
        let x_max = bounds.last().map_or(1.0, |b| b.1);
        let (y_lo, y_hi) = y_range(request.series, request.sum);

        let frame = Frame {
            left: MARGIN_LEFT,
            right: self.width as i64 - MARGIN_RIGHT,
            top: MARGIN_TOP,
            bottom: self.height as i64 - MARGIN_BOTTOM,
            x_min,
            x_max: if x_max > x_min { x_max } else { x_min + 1.0 },
            log_lo: y_lo.log10(),
            log_hi: y_hi.log10(),
        };

        draw_grid(&mut img, &frame);
        for s in request.series {
            draw_series(&mut img, &frame, &s.histogram, &s.display);
        }
        draw_series(&mut img, &frame, request.sum, &DisplayAttrs::sum());
        draw_frame(&mut img, &frame);
        draw_legend_swatches(&mut img, &frame, request);
        img
    }
}

impl Renderer for PngOverlay {
    fn render(&self, request: &PlotRequest<'_>) -> Result<()> {
        if let Some(parent) = request.target.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        self.draw(request)
            .save(request.target)
            .with_context(|| format!("writing plot {}", request.target.display()))?;
        log::info!(
            "plotted '{}' ({} series) to {}",
            request.histogram_path,
            request.series.len(),
            request.target.display()
        );
        Ok(())
    }
}

// -- drawing primitives --

fn rgb(c: Srgb<u8>) -> Rgb<u8> {
    Rgb([c.red, c.green, c.blue])
}

fn put(img: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, color);
    }
}

fn hline(img: &mut RgbImage, x0: i64, x1: i64, y: i64, color: Rgb<u8>) {
    for x in x0.min(x1)..=x0.max(x1) {
        put(img, x, y, color);
    }
}

fn vline(img: &mut RgbImage, x: i64, y0: i64, y1: i64, color: Rgb<u8>) {
    for y in y0.min(y1)..=y0.max(y1) {
        put(img, x, y, color);
    }
}

fn marker(img: &mut RgbImage, cx: i64, cy: i64, style: MarkerStyle, color: Rgb<u8>) {
    let r2 = MARKER_RADIUS * MARKER_RADIUS;
    let inner = (MARKER_RADIUS - 1) * (MARKER_RADIUS - 1);
    for dy in -MARKER_RADIUS..=MARKER_RADIUS {
        for dx in -MARKER_RADIUS..=MARKER_RADIUS {
            let d2 = dx * dx + dy * dy;
            let on = match style {
                MarkerStyle::FilledCircle => d2 <= r2,
                MarkerStyle::OpenCircle => d2 <= r2 && d2 >= inner,
            };
            if on {
                put(img, cx + dx, cy + dy, color);
            }
        }
    }
}

fn draw_series(img: &mut RgbImage, frame: &Frame, hist: &Histogram, display: &DisplayAttrs) {
    let color = rgb(display.color);
    let bar = rgb(display.error_bar_color());
    let half_width = display.line_width as i64 / 2;

    for ((lo, hi), (&value, err)) in cell_bounds(hist)
        .into_iter()
        .zip(hist.contents.iter().zip(hist.errors()))
    {
        let Some(cy) = frame.y(value) else {
            continue;
        };
        let cx = frame.x(0.5 * (lo + hi));

        // vertical error bar, clipped at the axis floor
        let top = frame.y(value + err).unwrap_or(cy);
        let bottom = frame.y(value - err).unwrap_or(frame.bottom);
        for off in -half_width..=half_width {
            vline(img, cx + off, top, bottom, bar);
        }
        // horizontal extent of the bin
        hline(img, frame.x(lo), frame.x(hi), cy, color);
        marker(img, cx, cy, display.marker, color);
    }
}

fn draw_grid(img: &mut RgbImage, frame: &Frame) {
    let first = frame.log_lo.ceil() as i32;
    let last = frame.log_hi.floor() as i32;
    for decade in first..=last {
        if let Some(y) = frame.y(10f64.powi(decade)) {
            hline(img, frame.left, frame.right, y, GRID);
            hline(img, frame.left - 6, frame.left, y, FRAME);
        }
    }
}

fn draw_frame(img: &mut RgbImage, frame: &Frame) {
    hline(img, frame.left, frame.right, frame.top, FRAME);
    hline(img, frame.left, frame.right, frame.bottom, FRAME);
    vline(img, frame.left, frame.top, frame.bottom, FRAME);
    vline(img, frame.right, frame.top, frame.bottom, FRAME);
}

/// One marker per series in the top-right corner, in drawing order, with the
/// sum last. Labels live in the CSV table.
fn draw_legend_swatches(img: &mut RgbImage, frame: &Frame, request: &PlotRequest<'_>) {
    let x = frame.right - 20;
    let mut y = frame.top + 16;
    let sum = DisplayAttrs::sum();
    let entries = request.series.iter().map(|s| &s.display).chain(std::iter::once(&sum));
    for display in entries {
        marker(img, x, y, display.marker, rgb(display.color));
        y += 2 * MARKER_RADIUS + 6;
    }
}
