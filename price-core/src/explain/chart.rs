//! Waterfall chart
//!
//! Horizontal bars chained from the baseline E[f(X)] to the prediction f(x),
//! largest absolute contribution on top. Red bars raise the price, blue bars
//! lower it.

use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use image::RgbImage;
use plotters::prelude::*;
use plotters::style::{register_font, FontStyle};
use thiserror::Error;

use super::{Contribution, Explanation};

pub const DEFAULT_WIDTH: u32 = 1000;
pub const DEFAULT_HEIGHT: u32 = 500;

const BUNDLED_FAMILY: &str = "price-sans";
const CUSTOM_FAMILY: &str = "price-custom";
static BUNDLED_TTF: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans.ttf");
const POSITIVE: RGBColor = RGBColor(255, 0, 81);
const NEGATIVE: RGBColor = RGBColor(0, 139, 251);
const MARKER: RGBColor = RGBColor(136, 136, 136);

#[derive(Debug, Error)]
pub enum ChartError {
    #[error("Chart font unusable: {0}")]
    Font(String),

    #[error("Chart rendering failed: {0}")]
    Draw(String),
}

fn draw_err<E: std::fmt::Display>(e: E) -> ChartError {
    ChartError::Draw(e.to_string())
}

/// Proof that a TrueType font was registered for chart text
#[derive(Debug, Clone, Copy)]
pub struct ChartFont {
    family: &'static str,
}

/// DejaVu Sans, compiled in and registered on first use
pub fn bundled_font() -> Result<ChartFont, ChartError> {
    static REGISTERED: OnceLock<Result<ChartFont, String>> = OnceLock::new();

    REGISTERED
        .get_or_init(|| {
            register_font(BUNDLED_FAMILY, FontStyle::Normal, BUNDLED_TTF)
                .map(|_| ChartFont { family: BUNDLED_FAMILY })
                .map_err(|_| "bundled font is not a valid TrueType font".to_string())
        })
        .clone()
        .map_err(ChartError::Font)
}

/// Register a TTF/OTF file as the chart font in place of the bundled one.
/// Call once at startup; the font bytes live for the rest of the process.
pub fn load_font(path: &Path) -> Result<ChartFont, ChartError> {
    let bytes = fs::read(path)
        .map_err(|e| ChartError::Font(format!("{}: {}", path.display(), e)))?;
    let bytes: &'static [u8] = Box::leak(bytes.into_boxed_slice());

    register_font(CUSTOM_FAMILY, FontStyle::Normal, bytes)
        .map_err(|_| ChartError::Font(format!("{}: not a valid TrueType font", path.display())))?;

    log::info!("Chart font loaded from {}", path.display());
    Ok(ChartFont { family: CUSTOM_FAMILY })
}

#[derive(Debug, Clone, Copy)]
pub struct ChartRenderer {
    width: u32,
    height: u32,
    font: Option<ChartFont>,
}

impl Default for ChartRenderer {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Start and end of each bar, bottom row first
struct WaterfallBar<'a> {
    contribution: &'a Contribution,
    start: f64,
    end: f64,
}

fn waterfall<'a>(explanation: &'a Explanation) -> Vec<WaterfallBar<'a>> {
    let mut running = explanation.base_value;
    explanation
        .by_magnitude()
        .into_iter()
        .rev()
        .map(|contribution| {
            let start = running;
            running += contribution.shap;
            WaterfallBar { contribution, start, end: running }
        })
        .collect()
}

fn x_range(explanation: &Explanation, bars: &[WaterfallBar<'_>]) -> (f64, f64) {
    let points = bars
        .iter()
        .flat_map(|b| [b.start, b.end])
        .chain([explanation.base_value, explanation.prediction])
        .filter(|v| v.is_finite());

    let (lo, hi) = points.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !lo.is_finite() || !hi.is_finite() {
        return (-1.0, 1.0);
    }

    let span = hi - lo;
    let pad = if span > 0.0 { span * 0.08 } else { lo.abs().max(1.0) * 0.1 };
    (lo - pad, hi + pad)
}

impl ChartRenderer {
    /// `None` uses the bundled font
    pub fn new(font: Option<ChartFont>) -> Self {
        let font = font.or_else(|| match bundled_font() {
            Ok(font) => Some(font),
            Err(e) => {
                log::warn!("{}; charts are drawn without labels", e);
                None
            }
        });
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            font,
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn render(&self, explanation: &Explanation) -> Result<RgbImage, ChartError> {
        let (w, h) = (self.width, self.height);
        let mut buf = vec![0u8; (w as usize) * (h as usize) * 3];

        {
            let root = BitMapBackend::with_buffer(&mut buf, (w, h)).into_drawing_area();
            root.fill(&WHITE).map_err(draw_err)?;

            let bars = waterfall(explanation);
            let rows = bars.len().max(1) as f64;
            let (x_min, x_max) = x_range(explanation, &bars);

            let mut builder = ChartBuilder::on(&root);
            builder.margin(20);
            if let Some(font) = self.font {
                builder
                    .caption(
                        format!(
                            "f(x) = {:.2}    E[f(X)] = {:.2}",
                            explanation.prediction, explanation.base_value
                        ),
                        (font.family, 18.0).into_font(),
                    )
                    .x_label_area_size((h / 12).max(24))
                    .y_label_area_size(w * 11 / 50);
            }
            let mut chart = builder
                .build_cartesian_2d(x_min..x_max, 0f64..rows)
                .map_err(draw_err)?;

            if let Some(font) = self.font {
                chart
                    .configure_mesh()
                    .y_labels(0)
                    .disable_y_mesh()
                    .x_desc("Contribution to predicted price")
                    .label_style((font.family, 13.0).into_font())
                    .draw()
                    .map_err(draw_err)?;
            }

            chart
                .draw_series(bars.iter().enumerate().map(|(row, bar)| {
                    let color = if bar.contribution.increases_price() { POSITIVE } else { NEGATIVE };
                    let y = row as f64;
                    Rectangle::new([(bar.start, y + 0.15), (bar.end, y + 0.85)], color.filled())
                }))
                .map_err(draw_err)?;

            // Dashed baseline and prediction markers
            for x in [explanation.base_value, explanation.prediction] {
                if !(x_min..x_max).contains(&x) {
                    continue;
                }
                let dashes = (0..(rows as usize * 8)).step_by(2).map(|i| {
                    let y0 = i as f64 / 8.0;
                    PathElement::new(vec![(x, y0), (x, y0 + 0.125)], MARKER.stroke_width(1))
                });
                chart.draw_series(dashes).map_err(draw_err)?;
            }

            if let Some(font) = self.font {
                let label_style = (font.family, 13.0).into_font().color(&BLACK);
                for (row, bar) in bars.iter().enumerate() {
                    let c = bar.contribution;
                    let name = match &c.label {
                        Some(label) => format!("{} = {}", c.feature, label),
                        None => format!("{} = {}", c.feature, c.value),
                    };
                    let (_, py) = chart.backend_coord(&(x_min, row as f64 + 0.5));
                    root.draw(&Text::new(name, (25, py - 7), label_style.clone()))
                        .map_err(draw_err)?;

                    let (px, _) = chart.backend_coord(&(bar.start.max(bar.end), row as f64 + 0.5));
                    let value = format!("{:+.2}", c.shap);
                    root.draw(&Text::new(value, (px + 4, py - 7), label_style.clone()))
                        .map_err(draw_err)?;
                }
            }

            root.present().map_err(draw_err)?;
        }

        RgbImage::from_raw(w, h, buf)
            .ok_or_else(|| ChartError::Draw("pixel buffer size mismatch".to_string()))
    }
}
