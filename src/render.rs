use std::error::Error;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::DateTime;
use image::{ImageFormat, Rgb, RgbImage};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::series::DashedLineSeries;
use plotters::style::colors::TRANSPARENT;
use plotters::style::text_anchor::{HPos, Pos, VPos};

use crate::analysis::{Analysis, LoopResult};
use crate::color::{generate_palette, rgb};
use crate::config::{LineDash, ReportConfig, MAX_FIGURE_PIXELS};
use crate::data::model::{TimeAxis, TimeKind};
use crate::error::ReportError;
use crate::summary::format_stat;

type DrawResult = std::result::Result<(), Box<dyn Error>>;

const GRID_GRAY: RGBColor = RGBColor(176, 176, 176);

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// Grid arrangement of the panels, filled row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FigureLayout {
    pub rows: usize,
    pub cols: usize,
    /// `(row, col)` of each panel, in loop order.
    pub slots: Vec<(usize, usize)>,
}

impl FigureLayout {
    pub fn new(n_panels: usize, max_cols: usize) -> Self {
        let cols = max_cols.min(n_panels).max(1);
        let rows = n_panels.div_ceil(cols).max(1);
        let slots = (0..n_panels).map(|i| (i / cols, i % cols)).collect();
        FigureLayout { rows, cols, slots }
    }
}

/// Converts typographic points to pixels at the figure DPI.
struct Scale {
    dpi: f64,
}

impl Scale {
    fn pt(&self, points: f64) -> f64 {
        points * self.dpi / 72.0
    }

    fn px(&self, points: f64) -> u32 {
        self.pt(points).round().max(1.0) as u32
    }
}

// ---------------------------------------------------------------------------
// Series preparation
// ---------------------------------------------------------------------------

/// Split `(x, y)` pairs into runs of finite points. Non-finite values leave gaps.
pub fn finite_segments(xs: &[f64], ys: &[f64]) -> Vec<Vec<(f64, f64)>> {
    let mut segments = Vec::new();
    let mut current = Vec::new();
    for (&x, &y) in xs.iter().zip(ys) {
        if x.is_finite() && y.is_finite() {
            current.push((x, y));
        } else if !current.is_empty() {
            segments.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

/// Clip one line segment to `lo <= y <= hi`, returning the visible part and
/// whether it reaches the segment's end point.
fn clip_segment(
    a: (f64, f64),
    b: (f64, f64),
    lo: f64,
    hi: f64,
) -> Option<((f64, f64), (f64, f64), bool)> {
    let dy = b.1 - a.1;
    let (mut t0, mut t1) = (0.0_f64, 1.0_f64);
    if dy == 0.0 {
        if a.1 < lo || a.1 > hi {
            return None;
        }
    } else {
        let ta = (lo - a.1) / dy;
        let tb = (hi - a.1) / dy;
        t0 = t0.max(ta.min(tb));
        t1 = t1.min(ta.max(tb));
        if t0 > t1 {
            return None;
        }
    }
    let at = |t: f64| (a.0 + (b.0 - a.0) * t, a.1 + dy * t);
    Some((at(t0), at(t1), t1 >= 1.0))
}

/// Clip a polyline to the y view, splitting it where it leaves the view.
pub fn clip_polyline(points: &[(f64, f64)], lo: f64, hi: f64) -> Vec<Vec<(f64, f64)>> {
    let mut runs: Vec<Vec<(f64, f64)>> = Vec::new();
    let mut open = false;
    for pair in points.windows(2) {
        match clip_segment(pair[0], pair[1], lo, hi) {
            Some((p, q, reaches_end)) => {
                let continues = open && p == pair[0];
                match runs.last_mut() {
                    Some(run) if continues => run.push(q),
                    _ => runs.push(vec![p, q]),
                }
                open = reaches_end;
            }
            None => open = false,
        }
    }
    runs
}

fn x_range(time: &TimeAxis) -> (f64, f64) {
    match time.finite_range() {
        None => (0.0, 1.0),
        Some((lo, hi)) if lo == hi => (lo - 0.5, hi + 0.5),
        Some(r) => r,
    }
}

fn format_tick(x: f64, kind: TimeKind) -> String {
    match kind {
        TimeKind::DateTime => {
            let secs = x.floor();
            let nanos = ((x - secs) * 1e9) as u32;
            DateTime::from_timestamp(secs as i64, nanos)
                .map(|d| d.format("%m-%d %H:%M").to_string())
                .unwrap_or_default()
        }
        TimeKind::Numeric => {
            let s = format!("{x:.3}");
            s.trim_end_matches('0').trim_end_matches('.').to_string()
        }
    }
}

/// Two-line panel heading.
pub fn panel_title(result: &LoopResult) -> String {
    format!(
        "{}\n(Mean: {}, Std: {})",
        result.spec.label,
        format_stat(result.stats.mean),
        format_stat(result.stats.std)
    )
}

// ---------------------------------------------------------------------------
// Drawing
// ---------------------------------------------------------------------------

fn draw_panel(
    area: &DrawingArea<BitMapBackend<'_>, Shift>,
    result: &LoopResult,
    time: &TimeAxis,
    color: RGBColor,
    config: &ReportConfig,
    scale: &Scale,
) -> DrawResult {
    let (width, _) = area.dim_in_pixel();
    let title_size = scale.pt(12.0);
    let line_height = (title_size * 1.25).round() as i32;
    let (head, body) = area.split_vertically(line_height as u32 * 2 + scale.px(6.0));

    let title_style = ("sans-serif", title_size)
        .into_font()
        .color(&BLACK)
        .pos(Pos::new(HPos::Center, VPos::Top));
    for (i, line) in panel_title(result).lines().enumerate() {
        head.draw_text(
            line,
            &title_style,
            (width as i32 / 2, scale.px(3.0) as i32 + i as i32 * line_height),
        )?;
    }

    let (x_lo, x_hi) = x_range(time);
    let [y_lo, y_hi] = config.y_limits;
    let font_size = scale.pt(10.0);

    let mut chart = ChartBuilder::on(&body)
        .margin(scale.px(6.0))
        .x_label_area_size(scale.px(34.0))
        .y_label_area_size(scale.px(40.0))
        .build_cartesian_2d(x_lo..x_hi, y_lo..y_hi)?;

    let kind = time.kind;
    let tick = move |x: &f64| format_tick(*x, kind);
    chart
        .configure_mesh()
        .x_desc("Time")
        .y_desc("Standardized Residual")
        .x_labels(6)
        .y_labels(9)
        .x_label_formatter(&tick)
        .label_style(("sans-serif", font_size))
        .axis_desc_style(("sans-serif", font_size))
        .bold_line_style(GRID_GRAY.mix(0.3))
        .light_line_style(TRANSPARENT)
        .draw()?;

    let series_style = color.mix(0.8).stroke_width(scale.px(0.8));
    for segment in finite_segments(&time.values, &result.standardized) {
        for run in clip_polyline(&segment, y_lo, y_hi) {
            chart.draw_series(LineSeries::new(run, series_style))?;
        }
    }

    for line in &config.reference_lines {
        if line.y < y_lo || line.y > y_hi {
            continue;
        }
        let style = rgb(line.color).mix(line.alpha).stroke_width(scale.px(1.0));
        let points = vec![(x_lo, line.y), (x_hi, line.y)];
        match line.dash {
            LineDash::Solid => {
                chart.draw_series(LineSeries::new(points, style))?;
            }
            LineDash::Dashed => {
                chart.draw_series(DashedLineSeries::new(
                    points,
                    scale.px(3.7),
                    scale.px(1.6),
                    style,
                ))?;
            }
            LineDash::Dotted => {
                chart.draw_series(DashedLineSeries::new(
                    points,
                    scale.px(1.0),
                    scale.px(1.65),
                    style,
                ))?;
            }
        }
    }
    Ok(())
}

fn draw_figure(
    root: &DrawingArea<BitMapBackend<'_>, Shift>,
    analysis: &Analysis,
    config: &ReportConfig,
) -> DrawResult {
    let scale = Scale {
        dpi: config.dpi as f64,
    };
    root.fill(&WHITE)?;

    let (width, _) = root.dim_in_pixel();
    let title_height = scale.px(14.0 * 2.4);
    let (title_area, body) = root.split_vertically(title_height);
    let title_style = ("sans-serif", scale.pt(14.0))
        .into_font()
        .style(FontStyle::Bold)
        .color(&BLACK)
        .pos(Pos::new(HPos::Center, VPos::Center));
    title_area.draw_text(
        &config.title,
        &title_style,
        (width as i32 / 2, title_height as i32 / 2),
    )?;

    let layout = FigureLayout::new(analysis.loops.len(), config.grid_columns);
    let pad = scale.px(4.0);
    let cells = body.margin(0, pad, pad, pad).split_evenly((layout.rows, layout.cols));
    let colors = generate_palette(analysis.loops.len());

    for ((result, &(row, col)), color) in analysis.loops.iter().zip(&layout.slots).zip(colors) {
        log::debug!("Drawing panel ({row}, {col}): {}", result.spec.label);
        draw_panel(
            &cells[row * layout.cols + col],
            result,
            &analysis.time,
            color,
            config,
            &scale,
        )?;
    }
    Ok(())
}

/// Draw the full figure into an in-memory RGB image.
pub fn render_figure(analysis: &Analysis, config: &ReportConfig) -> Result<RgbImage, ReportError> {
    let (w, h) = config.pixel_size();
    let too_large = || ReportError::Render(format!("figure of {w}x{h} pixels is too large"));
    if w as f64 > MAX_FIGURE_PIXELS || h as f64 > MAX_FIGURE_PIXELS {
        return Err(too_large());
    }
    let len = (w as usize)
        .checked_mul(h as usize)
        .and_then(|n| n.checked_mul(3))
        .ok_or_else(too_large)?;
    let mut buffer = vec![255u8; len];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (w, h)).into_drawing_area();
        draw_figure(&root, analysis, config).map_err(|e| ReportError::Render(e.to_string()))?;
        root.present()
            .map_err(|e| ReportError::Render(e.to_string()))?;
    }
    RgbImage::from_raw(w, h, buffer)
        .ok_or_else(|| ReportError::Render("pixel buffer size mismatch".into()))
}

/// Crop to the non-white content plus `pad` pixels on each side.
pub fn crop_to_content(img: &RgbImage, pad: u32) -> RgbImage {
    let background = Rgb([255u8, 255, 255]);
    let bounds = img
        .enumerate_pixels()
        .filter(|(_, _, p)| **p != background)
        .fold(None, |acc: Option<(u32, u32, u32, u32)>, (x, y, _)| match acc {
            None => Some((x, y, x, y)),
            Some((x0, y0, x1, y1)) => Some((x0.min(x), y0.min(y), x1.max(x), y1.max(y))),
        });

    let Some((x0, y0, x1, y1)) = bounds else {
        return img.clone();
    };
    let (w, h) = img.dimensions();
    let x0 = x0.saturating_sub(pad);
    let y0 = y0.saturating_sub(pad);
    let x1 = (x1 + pad).min(w - 1);
    let y1 = (y1 + pad).min(h - 1);
    image::imageops::crop_imm(img, x0, y0, x1 - x0 + 1, y1 - y0 + 1).to_image()
}

/// Render, crop tightly, and write the figure as PNG (overwriting).
pub fn save_figure(analysis: &Analysis, config: &ReportConfig, path: &Path) -> Result<()> {
    let figure = render_figure(analysis, config)?;
    let pad = (config.dpi as f64 * 0.1).round() as u32;
    let cropped = crop_to_content(&figure, pad);
    cropped
        .save_with_format(path, ImageFormat::Png)
        .with_context(|| format!("writing {}", path.display()))?;
    log::info!(
        "Wrote {}x{} figure to {}",
        cropped.width(),
        cropped.height(),
        path.display()
    );
    Ok(())
}
