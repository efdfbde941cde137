//! Rasterize a `Figure` into PNG bytes

use super::glyphs::{text_height, text_pixels, text_width};
use super::{Figure, Mark, MarkKind, Panel, Rgb};
use crate::table::format::py_float;
use crate::table::Cell;
use chrono::{Duration, NaiveDate};
use image::{ImageFormat, Rgb as Pixel, RgbImage};
use std::io::Cursor;

/// Pixels per figure inch
const DPI: f64 = 100.0;
const MIN_SIDE: u32 = 160;
const MAX_SIDE: u32 = 2400;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("figure has no drawable area")]
    EmptyCanvas,

    #[error("png encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// Render the figure and encode it as PNG
pub fn render_png(figure: &Figure) -> Result<Vec<u8>, RenderError> {
    let width = (figure.width_in * DPI).round().clamp(MIN_SIDE as f64, MAX_SIDE as f64) as u32;
    let height = (figure.height_in * DPI).round().clamp(MIN_SIDE as f64, MAX_SIDE as f64) as u32;
    if figure.panels.is_empty() {
        return Err(RenderError::EmptyCanvas);
    }

    let background = figure.facecolor.unwrap_or(Rgb::WHITE);
    let mut canvas = Canvas::new(width, height, background);

    let mut top = 0u32;
    if let Some(title) = &figure.suptitle {
        let color = contrast_text(background);
        let scale = title_scale(height);
        canvas.text_centered(title, width / 2, 8, scale, color);
        top = 8 + text_height(scale) + 6;
    }

    let cell_w = width / figure.cols as u32;
    let cell_h = (height - top) / figure.rows as u32;
    for (i, panel) in figure.panels.iter().enumerate() {
        let row = (i / figure.cols) as u32;
        let col = (i % figure.cols) as u32;
        let cell = Rect {
            x: col * cell_w,
            y: top + row * cell_h,
            w: cell_w,
            h: cell_h,
        };
        draw_panel(&mut canvas, panel, cell, background);
    }

    canvas.encode()
}

/* ===================== Canvas ===================== */

#[derive(Debug, Clone, Copy)]
struct Rect {
    x: u32,
    y: u32,
    w: u32,
    h: u32,
}

struct Canvas {
    image: RgbImage,
}

impl Canvas {
    fn new(width: u32, height: u32, background: Rgb) -> Self {
        Canvas {
            image: RgbImage::from_pixel(width, height, Pixel(background.0)),
        }
    }

    fn blend(&mut self, x: i64, y: i64, color: Rgb, alpha: f64) {
        if x < 0 || y < 0 || x >= self.image.width() as i64 || y >= self.image.height() as i64 {
            return;
        }
        let pixel = self.image.get_pixel_mut(x as u32, y as u32);
        let mixed = if alpha >= 1.0 {
            color
        } else {
            Rgb(pixel.0).mix(color, alpha)
        };
        *pixel = Pixel(mixed.0);
    }

    fn fill_rect(&mut self, x0: f64, y0: f64, x1: f64, y1: f64, color: Rgb, alpha: f64) {
        let (left, right) = (x0.min(x1).round() as i64, x0.max(x1).round() as i64);
        let (top, bottom) = (y0.min(y1).round() as i64, y0.max(y1).round() as i64);
        for y in top..=bottom {
            for x in left..=right {
                self.blend(x, y, color, alpha);
            }
        }
    }

    fn line(&mut self, from: (f64, f64), to: (f64, f64), color: Rgb, thickness: i64) {
        let (mut x0, mut y0) = (from.0.round() as i64, from.1.round() as i64);
        let (x1, y1) = (to.0.round() as i64, to.1.round() as i64);
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        let half = thickness / 2;
        loop {
            for oy in -half..thickness - half {
                for ox in -half..thickness - half {
                    self.blend(x0 + ox, y0 + oy, color, 1.0);
                }
            }
            if x0 == x1 && y0 == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x0 += sx;
            }
            if e2 <= dx {
                err += dx;
                y0 += sy;
            }
        }
    }

    fn dot(&mut self, cx: f64, cy: f64, radius: f64, color: Rgb, alpha: f64) {
        let r = radius.ceil() as i64;
        let (cx_i, cy_i) = (cx.round() as i64, cy.round() as i64);
        for dy in -r..=r {
            for dx in -r..=r {
                if ((dx * dx + dy * dy) as f64) <= radius * radius {
                    self.blend(cx_i + dx, cy_i + dy, color, alpha);
                }
            }
        }
    }

    fn text(&mut self, text: &str, x: i64, y: i64, scale: u32, color: Rgb) {
        for (px, py) in text_pixels(text, scale) {
            self.blend(x + px as i64, y + py as i64, color, 1.0);
        }
    }

    fn text_centered(&mut self, text: &str, cx: u32, y: u32, scale: u32, color: Rgb) {
        let w = text_width(text, scale) as i64;
        self.text(text, cx as i64 - w / 2, y as i64, scale, color);
    }

    /// Text rotated a quarter turn counter-clockwise, reading bottom to top
    fn text_vertical(&mut self, text: &str, x: i64, cy: i64, scale: u32, color: Rgb) {
        let w = text_width(text, scale) as i64;
        for (px, py) in text_pixels(text, scale) {
            self.blend(x + py as i64, cy + w / 2 - px as i64, color, 1.0);
        }
    }

    fn encode(self) -> Result<Vec<u8>, RenderError> {
        let mut bytes = Cursor::new(Vec::new());
        self.image.write_to(&mut bytes, ImageFormat::Png)?;
        Ok(bytes.into_inner())
    }
}

/* ===================== Scales ===================== */

fn title_scale(height: u32) -> u32 {
    if height >= 400 {
        2
    } else {
        1
    }
}

fn contrast_text(background: Rgb) -> Rgb {
    if background.is_dark() {
        Rgb::WHITE
    } else {
        Rgb([0x22, 0x22, 0x22])
    }
}

/// How positions along the category axis are derived from mark x values
#[derive(Debug, Clone)]
enum XAxis {
    Categories(Vec<Cell>),
    Numbers,
    Dates,
}

/// Numeric position of an x value under a numeric or date axis
fn x_number(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Time(t) => Some(t.and_utc().timestamp() as f64 / 86_400.0),
        Cell::Date(d) => Some(crate::table::midnight(*d).and_utc().timestamp() as f64 / 86_400.0),
        Cell::Delta(s) => Some(*s as f64),
        other if other.is_missing() => None,
        other => other.as_f64(),
    }
}

fn x_axis_for(marks: &[&Mark]) -> XAxis {
    let mut any_date = false;
    for cell in marks.iter().flat_map(|m| m.xs.iter()) {
        match cell {
            Cell::Str(_) | Cell::Tuple(_) | Cell::Bool(_) => {
                let mut categories: Vec<Cell> = Vec::new();
                for c in marks.iter().flat_map(|m| m.xs.iter()) {
                    if !categories.iter().any(|k| k.loose_eq(c) || k == c) {
                        categories.push(c.clone());
                    }
                }
                return XAxis::Categories(categories);
            }
            Cell::Time(_) | Cell::Date(_) => any_date = true,
            _ => {}
        }
    }
    if any_date {
        XAxis::Dates
    } else {
        XAxis::Numbers
    }
}

fn position(axis: &XAxis, cell: &Cell) -> Option<f64> {
    match axis {
        XAxis::Categories(categories) => categories
            .iter()
            .position(|k| k.loose_eq(cell) || k == cell)
            .map(|p| p as f64),
        _ => x_number(cell),
    }
}

/// Round tick step: 1, 2 or 5 times a power of ten
fn nice_step(span: f64, target: f64) -> f64 {
    if span <= 0.0 || !span.is_finite() {
        return 1.0;
    }
    let raw = span / target;
    let magnitude = 10f64.powf(raw.log10().floor());
    let normalized = raw / magnitude;
    let factor = if normalized < 1.5 {
        1.0
    } else if normalized < 3.5 {
        2.0
    } else if normalized < 7.5 {
        5.0
    } else {
        10.0
    };
    factor * magnitude
}

fn ticks(lo: f64, hi: f64, target: f64) -> Vec<f64> {
    let step = nice_step(hi - lo, target);
    let mut value = (lo / step).ceil() * step;
    let mut out = Vec::new();
    while value <= hi + step * 1e-9 && out.len() < 50 {
        out.push(if value.abs() < step * 1e-9 { 0.0 } else { value });
        value += step;
    }
    out
}

fn tick_label(value: f64, step: f64) -> String {
    if step >= 1.0 && value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        let decimals = (-step.log10().floor()).max(0.0) as usize;
        let text = format!("{:.*}", decimals, value);
        if text.contains('.') {
            text
        } else {
            py_float(value)
        }
    }
}

fn date_label(days: f64, span_days: f64) -> String {
    let shifted = Duration::try_days(days.floor() as i64).and_then(|d| NaiveDate::default().checked_add_signed(d));
    let Some(date) = shifted else {
        return py_float(days);
    };
    if span_days > 900.0 {
        date.format("%Y").to_string()
    } else if span_days > 60.0 {
        date.format("%Y-%m").to_string()
    } else {
        date.format("%m-%d").to_string()
    }
}

fn truncate_label(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('~');
    out
}

/* ===================== Panels ===================== */

fn draw_panel(canvas: &mut Canvas, panel: &Panel, cell: Rect, figure_bg: Rgb) {
    let title_scale = title_scale(cell.h.max(cell.w / 2));
    let face = panel.facecolor.unwrap_or(if figure_bg.is_dark() {
        figure_bg
    } else {
        Rgb::WHITE
    });
    let text_color = panel.text_color.unwrap_or_else(|| contrast_text(face));
    let tick_color = text_color.mix(face, 0.3);

    let top_margin = if panel.title.is_some() {
        12 + text_height(title_scale)
    } else {
        12
    };
    let bottom_margin = 22 + if panel.xlabel.is_some() { 14 } else { 0 };
    let left_margin = 50 + if panel.ylabel.is_some() { 14 } else { 0 };
    let plot = Rect {
        x: cell.x + left_margin,
        y: cell.y + top_margin,
        w: cell.w.saturating_sub(left_margin + 16).max(10),
        h: cell.h.saturating_sub(top_margin + bottom_margin).max(10),
    };

    canvas.fill_rect(
        plot.x as f64,
        plot.y as f64,
        (plot.x + plot.w) as f64,
        (plot.y + plot.h) as f64,
        face,
        1.0,
    );

    if let Some(title) = &panel.title {
        canvas.text_centered(title, plot.x + plot.w / 2, cell.y + 6, title_scale, text_color);
    }
    if let Some(label) = &panel.xlabel {
        canvas.text_centered(label, plot.x + plot.w / 2, plot.y + plot.h + 20, 1, text_color);
    }
    if let Some(label) = &panel.ylabel {
        canvas.text_vertical(label, cell.x as i64 + 4, (plot.y + plot.h / 2) as i64, 1, text_color);
    }

    let horizontal = panel.marks.iter().any(|m| m.kind == MarkKind::BarH);
    let data_marks: Vec<&Mark> = panel
        .marks
        .iter()
        .filter(|m| !matches!(m.kind, MarkKind::HLine | MarkKind::VLine))
        .collect();
    let axis = x_axis_for(&data_marks);

    // Category extent and value extent
    let mut cat_lo = f64::INFINITY;
    let mut cat_hi = f64::NEG_INFINITY;
    let mut val_lo = f64::INFINITY;
    let mut val_hi = f64::NEG_INFINITY;
    let mut baseline_zero = false;
    for mark in &data_marks {
        if matches!(mark.kind, MarkKind::Bar | MarkKind::BarH | MarkKind::Area { .. }) {
            baseline_zero = true;
        }
        let half = match mark.kind {
            MarkKind::Bar | MarkKind::BarH => mark.width.unwrap_or(0.8) / 2.0,
            _ => 0.0,
        };
        for (x, y) in mark.xs.iter().zip(&mark.ys) {
            if let Some(p) = position(&axis, x) {
                cat_lo = cat_lo.min(p - half);
                cat_hi = cat_hi.max(p + half);
            }
            if y.is_finite() {
                val_lo = val_lo.min(*y);
                val_hi = val_hi.max(*y);
            }
        }
        if let MarkKind::Area { lower } = &mark.kind {
            for y in lower.iter().filter(|y| y.is_finite()) {
                val_lo = val_lo.min(*y);
                val_hi = val_hi.max(*y);
            }
        }
    }
    for mark in &panel.marks {
        if mark.kind == MarkKind::HLine {
            for y in mark.ys.iter().filter(|y| y.is_finite()) {
                val_lo = val_lo.min(*y);
                val_hi = val_hi.max(*y);
            }
        }
    }
    if !cat_lo.is_finite() {
        cat_lo = 0.0;
        cat_hi = 1.0;
    }
    if !val_lo.is_finite() {
        val_lo = 0.0;
        val_hi = 1.0;
    }
    if baseline_zero {
        val_lo = val_lo.min(0.0);
        val_hi = val_hi.max(0.0);
    }
    if (cat_hi - cat_lo).abs() < 1e-12 {
        cat_lo -= 0.5;
        cat_hi += 0.5;
    }
    if (val_hi - val_lo).abs() < 1e-12 {
        val_lo -= 1.0;
        val_hi += 1.0;
    }
    let pad = (cat_hi - cat_lo) * 0.04;
    let (mut cat_lo, mut cat_hi) = (cat_lo - pad, cat_hi + pad);
    let pad = (val_hi - val_lo) * 0.05;
    let mut val_lo = if baseline_zero && val_lo >= 0.0 { val_lo } else { val_lo - pad };
    let mut val_hi = val_hi + pad;

    // Explicit limits use the axis they name
    let (cat_lim, val_lim) = if horizontal {
        (panel.ylim, panel.xlim)
    } else {
        (panel.xlim, panel.ylim)
    };
    if let Some((lo, hi)) = cat_lim {
        cat_lo = lo;
        cat_hi = hi;
    }
    if let Some((lo, hi)) = val_lim {
        val_lo = lo;
        val_hi = hi;
    }

    let map = Mapping {
        plot,
        horizontal,
        cat: (cat_lo, cat_hi),
        val: (val_lo, val_hi),
    };

    // Value ticks, grid and labels
    let value_ticks = ticks(val_lo, val_hi, 5.0);
    let value_step = nice_step(val_hi - val_lo, 5.0);
    for tick in &value_ticks {
        let label = tick_label(*tick, value_step);
        if horizontal {
            let (x, _) = map.point(cat_lo, *tick);
            if let Some(grid) = panel.grid {
                canvas.line((x, plot.y as f64), (x, (plot.y + plot.h) as f64), grid, 1);
            }
            canvas.text_centered(&label, x.round() as u32, plot.y + plot.h + 5, 1, tick_color);
        } else {
            let (_, y) = map.point(cat_lo, *tick);
            if let Some(grid) = panel.grid {
                canvas.line((plot.x as f64, y), ((plot.x + plot.w) as f64, y), grid, 1);
            }
            let w = text_width(&label, 1) as i64;
            canvas.text(&label, plot.x as i64 - 6 - w, y.round() as i64 - 3, 1, tick_color);
        }
    }

    // Category ticks
    match &axis {
        XAxis::Categories(categories) => {
            let room = if horizontal { plot.h } else { plot.w } as usize;
            let stride = (categories.len() * 30 / room.max(1)).max(1);
            let max_chars = if horizontal {
                (left_margin as usize / 6).saturating_sub(1).max(3)
            } else {
                ((room / categories.len().max(1)) * stride / 6).max(3)
            };
            for (i, category) in categories.iter().enumerate().step_by(stride) {
                let label = truncate_label(&category_text(category), max_chars);
                draw_category_tick(canvas, &map, i as f64, &label, tick_color);
            }
        }
        XAxis::Numbers | XAxis::Dates => {
            let step = nice_step(cat_hi - cat_lo, 5.0);
            for tick in ticks(cat_lo, cat_hi, 5.0) {
                let label = match axis {
                    XAxis::Dates => date_label(tick, cat_hi - cat_lo),
                    _ => tick_label(tick, step),
                };
                draw_category_tick(canvas, &map, tick, &label, tick_color);
            }
        }
    }

    for mark in &panel.marks {
        draw_mark(canvas, &map, &axis, mark, panel, face);
    }

    // Spines
    let spine = tick_color;
    let (x0, y0, x1, y1) = (
        plot.x as f64,
        plot.y as f64,
        (plot.x + plot.w) as f64,
        (plot.y + plot.h) as f64,
    );
    canvas.line((x0, y1), (x1, y1), spine, 1);
    canvas.line((x0, y0), (x0, y1), spine, 1);

    if panel.legend {
        draw_legend(canvas, panel, plot, face, text_color);
    }
}

fn category_text(cell: &Cell) -> String {
    match cell {
        Cell::Float(x) => py_float(*x),
        other => crate::table::format::label_text(other),
    }
}

fn draw_category_tick(canvas: &mut Canvas, map: &Mapping, at: f64, label: &str, color: Rgb) {
    let plot = map.plot;
    if map.horizontal {
        let (_, y) = map.point(at, map.val.0);
        let w = text_width(label, 1) as i64;
        canvas.text(label, plot.x as i64 - 6 - w, y.round() as i64 - 3, 1, color);
    } else {
        let (x, _) = map.point(at, map.val.0);
        canvas.text_centered(label, x.round().max(0.0) as u32, plot.y + plot.h + 5, 1, color);
    }
}

/// Data space to pixel space for one panel
struct Mapping {
    plot: Rect,
    horizontal: bool,
    cat: (f64, f64),
    val: (f64, f64),
}

impl Mapping {
    /// Pixel position of (category-axis value, value-axis value)
    fn point(&self, cat: f64, val: f64) -> (f64, f64) {
        let cat_t = (cat - self.cat.0) / (self.cat.1 - self.cat.0);
        let val_t = (val - self.val.0) / (self.val.1 - self.val.0);
        let plot = self.plot;
        if self.horizontal {
            (
                plot.x as f64 + val_t * plot.w as f64,
                (plot.y + plot.h) as f64 - cat_t * plot.h as f64,
            )
        } else {
            (
                plot.x as f64 + cat_t * plot.w as f64,
                (plot.y + plot.h) as f64 - val_t * plot.h as f64,
            )
        }
    }

    fn clamp(&self, point: (f64, f64)) -> (f64, f64) {
        let plot = self.plot;
        (
            point.0.clamp(plot.x as f64, (plot.x + plot.w) as f64),
            point.1.clamp(plot.y as f64, (plot.y + plot.h) as f64),
        )
    }
}

fn draw_mark(canvas: &mut Canvas, map: &Mapping, axis: &XAxis, mark: &Mark, panel: &Panel, face: Rgb) {
    let color = mark.color.unwrap_or_else(|| {
        let index = panel
            .marks
            .iter()
            .take_while(|m| !std::ptr::eq(*m, mark))
            .filter(|m| !matches!(m.kind, MarkKind::HLine | MarkKind::VLine))
            .count();
        super::CYCLE[index % super::CYCLE.len()]
    });
    let points: Vec<(f64, f64)> = mark
        .xs
        .iter()
        .zip(&mark.ys)
        .filter_map(|(x, y)| position(axis, x).filter(|_| y.is_finite()).map(|p| (p, *y)))
        .collect();

    match &mark.kind {
        MarkKind::Line => {
            let mut sorted = points.clone();
            if !matches!(axis, XAxis::Categories(_)) {
                sorted.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
            }
            for pair in sorted.windows(2) {
                let a = map.clamp(map.point(pair[0].0, pair[0].1));
                let b = map.clamp(map.point(pair[1].0, pair[1].1));
                canvas.line(a, b, color, 2);
            }
            if sorted.len() == 1 {
                let (x, y) = map.point(sorted[0].0, sorted[0].1);
                canvas.dot(x, y, 2.5, color, mark.alpha);
            }
        }
        MarkKind::Scatter => {
            for (x, y) in &points {
                let (px, py) = map.clamp(map.point(*x, *y));
                canvas.dot(px, py, 3.0, color, mark.alpha);
            }
        }
        MarkKind::Bar | MarkKind::BarH => {
            let half = mark.width.unwrap_or(0.8) / 2.0;
            for (x, y) in &points {
                let a = map.clamp(map.point(x - half, 0f64.max(map.val.0)));
                let b = map.clamp(map.point(x + half, *y));
                canvas.fill_rect(a.0, a.1, b.0, b.1, color, mark.alpha);
            }
        }
        MarkKind::Area { lower } => {
            let alpha = mark.alpha.min(1.0);
            for (i, pair) in points.windows(2).enumerate() {
                let lo0 = lower.get(i).copied().unwrap_or(0.0);
                let lo1 = lower.get(i + 1).copied().unwrap_or(lo0);
                let a = map.point(pair[0].0, pair[0].1);
                let b = map.point(pair[1].0, pair[1].1);
                let steps = (b.0 - a.0).abs().max(1.0) as usize;
                for s in 0..=steps {
                    let t = s as f64 / steps as f64;
                    let x = pair[0].0 + (pair[1].0 - pair[0].0) * t;
                    let top = pair[0].1 + (pair[1].1 - pair[0].1) * t;
                    let bottom = lo0 + (lo1 - lo0) * t;
                    let p = map.clamp(map.point(x, top));
                    let q = map.clamp(map.point(x, bottom));
                    canvas.fill_rect(p.0, p.1, q.0, q.1, color, alpha);
                }
            }
        }
        MarkKind::HLine | MarkKind::VLine => {
            let line_color = mark.color.unwrap_or_else(|| contrast_text(face));
            for value in mark.ys.iter().filter(|v| v.is_finite()) {
                let horizontal_line = (mark.kind == MarkKind::HLine) != map.horizontal;
                let (a, b) = if horizontal_line {
                    let y = map.point(map.cat.0, *value).1;
                    ((map.plot.x as f64, y), ((map.plot.x + map.plot.w) as f64, y))
                } else {
                    let x = map.point(map.cat.0, *value).0;
                    ((x, map.plot.y as f64), (x, (map.plot.y + map.plot.h) as f64))
                };
                if a.1 >= map.plot.y as f64 && a.1 <= (map.plot.y + map.plot.h) as f64 {
                    canvas.line(a, b, line_color, 1);
                }
            }
        }
    }
}

fn draw_legend(canvas: &mut Canvas, panel: &Panel, plot: Rect, face: Rgb, text_color: Rgb) {
    let entries: Vec<(Rgb, &str)> = panel
        .marks
        .iter()
        .enumerate()
        .filter_map(|(i, m)| {
            let label = m.label.as_deref()?;
            let color = m.color.unwrap_or(super::CYCLE[i % super::CYCLE.len()]);
            Some((color, label))
        })
        .collect();
    if entries.is_empty() {
        return;
    }
    let width = entries
        .iter()
        .map(|(_, label)| text_width(label, 1))
        .max()
        .unwrap_or(0)
        + 26;
    let height = entries.len() as u32 * 12 + 6;
    let x = (plot.x + plot.w).saturating_sub(width + 6);
    let y = plot.y + 6;
    canvas.fill_rect(
        x as f64,
        y as f64,
        (x + width) as f64,
        (y + height) as f64,
        face.mix(text_color, 0.08),
        1.0,
    );
    for (i, (color, label)) in entries.iter().enumerate() {
        let row = y + 5 + i as u32 * 12;
        canvas.fill_rect(
            (x + 5) as f64,
            row as f64,
            (x + 15) as f64,
            (row + 6) as f64,
            *color,
            1.0,
        );
        canvas.text(label, (x + 20) as i64, row as i64, 1, text_color);
    }
}
