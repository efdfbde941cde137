//! In-memory figure model for chart code
//!
//! Plotting calls made by analysis code accumulate into a `Figure` owned by a
//! single execution. `render` turns the figure into PNG bytes; nothing here
//! touches the filesystem.

use crate::table::Cell;

pub mod glyphs;
pub mod render;

#[cfg(test)]
mod tests;

pub use render::{render_png, RenderError};

/* ===================== Colors ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub [u8; 3]);

impl Rgb {
    pub const BLACK: Rgb = Rgb([0, 0, 0]);
    pub const WHITE: Rgb = Rgb([255, 255, 255]);

    /// Relative luminance in 0..=1
    pub fn luminance(&self) -> f64 {
        let [r, g, b] = self.0;
        (0.2126 * r as f64 + 0.7152 * g as f64 + 0.0722 * b as f64) / 255.0
    }

    pub fn is_dark(&self) -> bool {
        self.luminance() < 0.5
    }

    /// Mix towards `other` by `t` (0 keeps self)
    pub fn mix(&self, other: Rgb, t: f64) -> Rgb {
        let t = t.clamp(0.0, 1.0);
        let mut out = [0u8; 3];
        for (i, channel) in out.iter_mut().enumerate() {
            let a = self.0[i] as f64;
            let b = other.0[i] as f64;
            *channel = (a + (b - a) * t).round() as u8;
        }
        Rgb(out)
    }
}

/// matplotlib's default color cycle
pub const CYCLE: [Rgb; 10] = [
    Rgb([0x1f, 0x77, 0xb4]),
    Rgb([0xff, 0x7f, 0x0e]),
    Rgb([0x2c, 0xa0, 0x2c]),
    Rgb([0xd6, 0x27, 0x28]),
    Rgb([0x94, 0x67, 0xbd]),
    Rgb([0x8c, 0x56, 0x4b]),
    Rgb([0xe3, 0x77, 0xc2]),
    Rgb([0x7f, 0x7f, 0x7f]),
    Rgb([0xbc, 0xbd, 0x22]),
    Rgb([0x17, 0xbe, 0xcf]),
];

/// Parse hex (`#FC5200`, `#fff`), cycle (`C1`), single-letter and common named colors
pub fn parse_color(text: &str) -> Option<Rgb> {
    let text = text.trim().to_ascii_lowercase();
    if let Some(hex) = text.strip_prefix('#') {
        return parse_hex(hex);
    }
    if let Some(n) = text.strip_prefix('c').and_then(|n| n.parse::<usize>().ok()) {
        return Some(CYCLE[n % CYCLE.len()]);
    }
    if let Some(name) = text.strip_prefix("tab:") {
        const TABLEAU: [&str; 10] = [
            "blue", "orange", "green", "red", "purple", "brown", "pink", "gray", "olive", "cyan",
        ];
        return TABLEAU.iter().position(|n| *n == name).map(|i| CYCLE[i]);
    }
    let rgb = match text.as_str() {
        "k" | "black" => [0, 0, 0],
        "w" | "white" => [255, 255, 255],
        "r" | "red" => [255, 0, 0],
        "g" | "green" => [0, 128, 0],
        "b" | "blue" => [0, 0, 255],
        "y" | "yellow" => [255, 255, 0],
        "c" | "cyan" => [0, 255, 255],
        "m" | "magenta" => [255, 0, 255],
        "orange" => [255, 165, 0],
        "darkorange" => [255, 140, 0],
        "orangered" => [255, 69, 0],
        "gray" | "grey" => [128, 128, 128],
        "lightgray" | "lightgrey" => [211, 211, 211],
        "darkgray" | "darkgrey" => [169, 169, 169],
        "dimgray" | "dimgrey" => [105, 105, 105],
        "silver" => [192, 192, 192],
        "skyblue" => [135, 206, 235],
        "steelblue" => [70, 130, 180],
        "navy" => [0, 0, 128],
        "purple" => [128, 0, 128],
        "pink" => [255, 192, 203],
        "brown" => [165, 42, 42],
        "gold" => [255, 215, 0],
        "teal" => [0, 128, 128],
        "coral" => [255, 127, 80],
        "tomato" => [255, 99, 71],
        "crimson" => [220, 20, 60],
        "limegreen" => [50, 205, 50],
        "forestgreen" => [34, 139, 34],
        "royalblue" => [65, 105, 225],
        "dodgerblue" => [30, 144, 255],
        _ => return None,
    };
    Some(Rgb(rgb))
}

fn parse_hex(hex: &str) -> Option<Rgb> {
    let digits: Vec<u8> = hex
        .chars()
        .map(|c| c.to_digit(16).map(|d| d as u8))
        .collect::<Option<Vec<_>>>()?;
    match digits.len() {
        3 | 4 => Some(Rgb([digits[0] * 17, digits[1] * 17, digits[2] * 17])),
        6 | 8 => Some(Rgb([
            digits[0] * 16 + digits[1],
            digits[2] * 16 + digits[3],
            digits[4] * 16 + digits[5],
        ])),
        _ => None,
    }
}

/* ===================== Marks ===================== */

#[derive(Debug, Clone, PartialEq)]
pub enum MarkKind {
    Line,
    Bar,
    /// Horizontal bars: `xs` are categories along y, `ys` the bar lengths
    BarH,
    Scatter,
    /// Band between `ys` and `lower`
    Area { lower: Vec<f64> },
    HLine,
    VLine,
}

/// One plotted series
#[derive(Debug, Clone, PartialEq)]
pub struct Mark {
    pub kind: MarkKind,
    pub xs: Vec<Cell>,
    pub ys: Vec<f64>,
    pub color: Option<Rgb>,
    pub label: Option<String>,
    /// Bar width in data units (categories are 1 apart)
    pub width: Option<f64>,
    pub alpha: f64,
}

impl Mark {
    pub fn new(kind: MarkKind, xs: Vec<Cell>, ys: Vec<f64>) -> Self {
        Mark {
            kind,
            xs,
            ys,
            color: None,
            label: None,
            width: None,
            alpha: 1.0,
        }
    }
}

/* ===================== Panels & Figures ===================== */

/// One set of axes
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Panel {
    pub title: Option<String>,
    pub xlabel: Option<String>,
    pub ylabel: Option<String>,
    pub facecolor: Option<Rgb>,
    pub text_color: Option<Rgb>,
    pub grid: Option<Rgb>,
    pub xlim: Option<(f64, f64)>,
    pub ylim: Option<(f64, f64)>,
    pub legend: bool,
    pub marks: Vec<Mark>,
}

impl Panel {
    /// Next automatic color for this panel
    pub fn next_color(&self) -> Rgb {
        let used = self
            .marks
            .iter()
            .filter(|m| !matches!(m.kind, MarkKind::HLine | MarkKind::VLine))
            .count();
        CYCLE[used % CYCLE.len()]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Figure {
    pub width_in: f64,
    pub height_in: f64,
    pub facecolor: Option<Rgb>,
    pub suptitle: Option<String>,
    pub rows: usize,
    pub cols: usize,
    pub panels: Vec<Panel>,
    pub current: usize,
}

impl Default for Figure {
    fn default() -> Self {
        Figure::new(6.4, 4.8)
    }
}

impl Figure {
    pub fn new(width_in: f64, height_in: f64) -> Self {
        Figure {
            width_in,
            height_in,
            facecolor: None,
            suptitle: None,
            rows: 1,
            cols: 1,
            panels: vec![Panel::default()],
            current: 0,
        }
    }

    /// Start over with a `rows` x `cols` grid of empty panels
    pub fn reset(&mut self, width_in: f64, height_in: f64, rows: usize, cols: usize) {
        let rows = rows.max(1);
        let cols = cols.max(1);
        *self = Figure {
            rows,
            cols,
            panels: vec![Panel::default(); rows * cols],
            ..Figure::new(width_in, height_in)
        };
    }

    pub fn panel_mut(&mut self, index: usize) -> &mut Panel {
        let index = index.min(self.panels.len().saturating_sub(1));
        self.current = index;
        &mut self.panels[index]
    }

    pub fn current_panel_mut(&mut self) -> &mut Panel {
        let index = self.current;
        self.panel_mut(index)
    }

    /// Nothing has been drawn or labelled yet
    pub fn is_blank(&self) -> bool {
        self.suptitle.is_none()
            && self
                .panels
                .iter()
                .all(|p| p.marks.is_empty() && p.title.is_none())
    }
}
