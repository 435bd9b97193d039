//! Drawing a [`ScaleChart`] with plotters.
//!
//! The x axis is linear over `log2(value)` with `2^k` tick labels; rows are
//! drawn at `y = -row` so the first layer ends up at the top.

use super::chart::{Dash, LegendKey, MarkerShape, ScaleChart};
use super::color::{self, Rgb};
use super::PlotError;
use crate::metrics::Direction;
use log::info;
use plotters::coord::ranged1d::{DefaultFormatting, KeyPointHint, Ranged};
use plotters::coord::types::RangedCoordf64;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use std::ops::Range;
use std::path::Path;

const WIDTH: u32 = 1000;
const ROW_PX: u32 = 25;
const FONT: &str = "sans-serif";
/// Room below the last row for the reference-line labels, in rows.
const FOOTER_ROWS: f64 = 2.0;
const LABEL_LINE_SPACING: f64 = 0.5;
/// Length of one dash unit, in rows.
const DASH_UNIT: f64 = 0.08;
const MAX_X_TICKS: i64 = 12;

fn rgb(c: Rgb) -> RGBColor {
    let (r, g, b) = c.to_u8();
    RGBColor(r, g, b)
}

fn render_err(e: impl std::fmt::Display) -> PlotError {
    PlotError::Render(e.to_string())
}

/// A linear f64 axis that labels only the given tick positions.
struct TickedAxis {
    inner: RangedCoordf64,
    ticks: Vec<f64>,
}

impl TickedAxis {
    fn new(range: Range<f64>, ticks: Vec<f64>) -> Self {
        Self { inner: range.into(), ticks }
    }
}

impl Ranged for TickedAxis {
    type FormatOption = DefaultFormatting;
    type ValueType = f64;

    fn map(&self, value: &f64, limit: (i32, i32)) -> i32 {
        self.inner.map(value, limit)
    }

    fn key_points<Hint: KeyPointHint>(&self, hint: Hint) -> Vec<f64> {
        if hint.weight().allow_light_points() {
            Vec::new()
        } else {
            self.ticks.clone()
        }
    }

    fn range(&self) -> Range<f64> {
        self.inner.range()
    }
}

fn triangle_down() -> Vec<(i32, i32)> {
    vec![(-5, -4), (5, -4), (0, 5)]
}

/// Integer powers of two inside `[lo, hi]` (log2 units), thinned out to at
/// most `MAX_X_TICKS`.
fn log2_ticks(lo: f64, hi: f64) -> Vec<f64> {
    let (first, last) = (lo.ceil() as i64, hi.floor() as i64);
    if last < first {
        return Vec::new();
    }
    let step = ((last - first) / MAX_X_TICKS + 1).max(1);
    let start = first.div_euclid(step) * step;
    (start..=last)
        .step_by(step as usize)
        .filter(|&k| k >= first)
        .map(|k| k as f64)
        .collect()
}

fn dashes(from: f64, to: f64, dash: Dash) -> Vec<(f64, f64)> {
    let on = dash.on * DASH_UNIT;
    let period = (dash.on + dash.off) * DASH_UNIT;
    let mut out = Vec::new();
    let mut y = from;
    while y < to {
        out.push((y, (y + on).min(to)));
        y += period;
    }
    out
}

/// Arrowhead triangle at `to`, in pixels.
fn arrow_head(from: (i32, i32), to: (i32, i32)) -> Option<Vec<(i32, i32)>> {
    let (dx, dy) = (f64::from(to.0 - from.0), f64::from(to.1 - from.1));
    let len = dx.hypot(dy);
    if len < 1.0 {
        return None;
    }
    let (ux, uy) = (dx / len, dy / len);
    let (length, half_width) = (8.0, 3.5);
    let base = (f64::from(to.0) - ux * length, f64::from(to.1) - uy * length);
    let corner = |sign: f64| {
        (
            (base.0 - sign * uy * half_width).round() as i32,
            (base.1 + sign * ux * half_width).round() as i32,
        )
    };
    Some(vec![to, corner(1.0), corner(-1.0)])
}

fn row_label(labels: &[String], y: f64) -> String {
    let row = (-y).round();
    if row < 0.0 || (-y - row).abs() > 1e-6 {
        return String::new();
    }
    labels.get(row as usize).cloned().unwrap_or_default()
}

impl ScaleChart {
    /// Canvas size in pixels: fixed width, height growing with the rows.
    pub fn canvas_size(&self) -> (u32, u32) {
        (WIDTH, (self.height() as u32 * ROW_PX + 220).max(320))
    }

    pub fn render_svg(&self, path: impl AsRef<Path>) -> Result<(), PlotError> {
        let path = path.as_ref();
        let root = SVGBackend::new(path, self.canvas_size()).into_drawing_area();
        self.draw_on(&root)?;
        root.present().map_err(render_err)?;
        info!("scale chart written to {}", path.display());
        Ok(())
    }

    pub fn render_png(&self, path: impl AsRef<Path>) -> Result<(), PlotError> {
        let path = path.as_ref();
        let root = BitMapBackend::new(path, self.canvas_size()).into_drawing_area();
        self.draw_on(&root)?;
        root.present().map_err(render_err)?;
        info!("scale chart written to {}", path.display());
        Ok(())
    }

    pub fn render_svg_string(&self) -> Result<String, PlotError> {
        let mut out = String::new();
        {
            let root = SVGBackend::with_string(&mut out, self.canvas_size()).into_drawing_area();
            self.draw_on(&root)?;
            root.present().map_err(render_err)?;
        }
        Ok(out)
    }

    fn clamp_log(&self, x: f64) -> f64 {
        let (lo, hi) = (self.x_range.0.log2(), self.x_range.1.log2());
        if x.is_finite() && x > 0.0 {
            x.log2().min(hi).max(lo)
        } else {
            lo
        }
    }

    fn draw_on<DB: DrawingBackend>(&self, root: &DrawingArea<DB, Shift>) -> Result<(), PlotError> {
        root.fill(&WHITE).map_err(render_err)?;

        let (lo, hi) = (self.x_range.0.log2(), self.x_range.1.log2());
        let height = self.height() as f64;
        let (y_lo, y_hi) = (-(height + FOOTER_ROWS), 1.0);
        let y_ticks: Vec<f64> = (0..self.height()).map(|r| -(r as f64)).collect();
        let longest = self.row_labels.iter().map(String::len).max().unwrap_or(0);
        let label_width = longest as u32 * 7 + 20;

        let mut builder = ChartBuilder::on(root);
        builder.margin(20).top_x_label_area_size(40).y_label_area_size(label_width);
        if !self.title.is_empty() {
            builder.caption(&self.title, (FONT, 20).into_font().style(FontStyle::Bold));
        }
        let mut cc = builder
            .build_cartesian_2d(
                TickedAxis::new(lo..hi, log2_ticks(lo, hi)),
                TickedAxis::new(y_lo..y_hi, y_ticks),
            )
            .map_err(render_err)?;

        let row_labels = &self.row_labels;
        cc.configure_mesh()
            .disable_x_mesh()
            .x_desc(self.metric.full_name())
            .x_label_formatter(&|v: &f64| format!("2^{}", v.round() as i64))
            .y_label_formatter(&|v: &f64| row_label(row_labels, *v))
            .draw()
            .map_err(render_err)?;

        let grey = rgb(color::REFERENCE_LINE);
        for line in &self.reference_lines {
            let x = line.x.log2();
            if x < lo || x > hi {
                continue;
            }
            let style = grey.stroke_width(1);
            cc.draw_series(
                dashes(y_lo, y_hi, line.dash)
                    .into_iter()
                    .map(|(a, b)| PathElement::new(vec![(x, a), (x, b)], style)),
            )
            .map_err(render_err)?;
            let text_style = TextStyle::from((FONT, 11).into_font())
                .color(&grey)
                .pos(Pos::new(HPos::Center, VPos::Top));
            cc.draw_series(line.label.lines().enumerate().map(|(i, text)| {
                let y = -line.label_y - LABEL_LINE_SPACING * i as f64;
                Text::new(text.to_string(), (x, y), text_style.clone())
            }))
            .map_err(render_err)?;
        }

        for bar in &self.error_bars {
            let (x0, x1) = (self.clamp_log(bar.x_min), self.clamp_log(bar.x_max));
            let y = -bar.y;
            let style = rgb(bar.color).stroke_width(1);
            cc.draw_series([
                PathElement::new(vec![(x0, y), (x1, y)], style),
                PathElement::new(vec![(x0, y - bar.cap), (x0, y + bar.cap)], style),
                PathElement::new(vec![(x1, y - bar.cap), (x1, y + bar.cap)], style),
            ])
            .map_err(render_err)?;
        }

        for arrow in &self.arrows {
            let color = rgb(arrow.color);
            let from = (self.clamp_log(arrow.from.0), -arrow.from.1);
            let to = (self.clamp_log(arrow.to.0), -arrow.to.1);
            let shaft = PathElement::new(vec![from, to], color.stroke_width(1));
            cc.draw_series(std::iter::once(shaft)).map_err(render_err)?;
            if let Some(head) = arrow_head(cc.backend_coord(&from), cc.backend_coord(&to)) {
                root.draw(&Polygon::new(head, color.filled())).map_err(render_err)?;
            }
            if let Some(label) = &arrow.label {
                // next to the operand, the end that was zero
                let at = match arrow.direction {
                    Direction::Fwd => from,
                    Direction::Bwd => to,
                };
                let style = TextStyle::from((FONT, 12).into_font())
                    .color(&color)
                    .pos(Pos::new(HPos::Right, VPos::Center));
                cc.draw_series(std::iter::once(Text::new(label.clone(), at, style)))
                    .map_err(render_err)?;
            }
        }

        for series in &self.series {
            let style = rgb(series.color).filled();
            let points = series
                .points
                .iter()
                .map(|&(x, row)| (x.log2(), -(row as f64)))
                .filter(|&(x, _)| x >= lo && x <= hi);
            let drawn = match series.marker {
                MarkerShape::Dot => {
                    cc.draw_series(points.map(|c| Circle::new(c, 3, style))).map(|_| ())
                }
                MarkerShape::TriangleDown => cc
                    .draw_series(
                        points.map(|c| EmptyElement::at(c) + Polygon::new(triangle_down(), style)),
                    )
                    .map(|_| ()),
            };
            drawn.map_err(render_err)?;
        }

        for entry in &self.legend {
            let anno = cc
                .draw_series(std::iter::empty::<Circle<(f64, f64), i32>>())
                .map_err(render_err)?;
            anno.label(entry.label.clone());
            match entry.key {
                LegendKey::Line(c) => {
                    let c = rgb(c);
                    anno.legend(move |(x, y)| {
                        PathElement::new(vec![(x, y), (x + 20, y)], c.stroke_width(2))
                    });
                }
                LegendKey::Marker(MarkerShape::Dot) => {
                    anno.legend(|(x, y)| Circle::new((x + 10, y), 3, BLACK.filled()));
                }
                LegendKey::Marker(MarkerShape::TriangleDown) => {
                    anno.legend(|(x, y)| {
                        let marker = Polygon::new(triangle_down(), BLACK.filled());
                        EmptyElement::at((x + 10, y)) + marker
                    });
                }
            }
        }
        cc.configure_series_labels()
            .position(SeriesLabelPosition::UpperRight)
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK)
            .draw()
            .map_err(render_err)?;

        Ok(())
    }
}
