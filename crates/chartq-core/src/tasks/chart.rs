//! SVG rendering for the built-in chart tasks.
//!
//! 出力は外部フォントや画像に依存しない単一の SVG 文書です。

use std::fmt::{self, Write};

const WIDTH: f64 = 800.0;
const HEIGHT: f64 = 500.0;
const MARGIN_TOP: f64 = 80.0;
const MARGIN_BOTTOM: f64 = 120.0;
const MARGIN_LEFT: f64 = 80.0;
const Y_TICKS: usize = 5;

const PALETTE: [&str; 8] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
];

/// Escape text for use inside SVG element content or attribute values.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Y axis upper bound that divides evenly into `Y_TICKS` whole steps.
fn axis_max(max: usize) -> usize {
    let step = max.div_ceil(Y_TICKS).max(1);
    step * Y_TICKS
}

struct Frame<'a> {
    title: &'a str,
    subtitle: Option<&'a str>,
    x_label: &'a str,
    y_label: &'a str,
    margin_right: f64,
    y_max: usize,
}

impl Frame<'_> {
    fn plot_width(&self) -> f64 {
        WIDTH - MARGIN_LEFT - self.margin_right
    }

    fn plot_height(&self) -> f64 {
        HEIGHT - MARGIN_TOP - MARGIN_BOTTOM
    }

    fn y_of(&self, value: usize) -> f64 {
        let bottom = HEIGHT - MARGIN_BOTTOM;
        bottom - self.plot_height() * value as f64 / self.y_max as f64
    }

    fn open(&self, out: &mut String) -> fmt::Result {
        writeln!(
            out,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{WIDTH}" height="{HEIGHT}" viewBox="0 0 {WIDTH} {HEIGHT}" font-family="sans-serif">"#
        )?;
        writeln!(out, r#"<rect width="100%" height="100%" fill="white"/>"#)?;
        writeln!(
            out,
            r#"<text x="{}" y="30" text-anchor="middle" font-size="20">{}</text>"#,
            WIDTH / 2.0,
            escape(self.title)
        )?;
        if let Some(subtitle) = self.subtitle {
            writeln!(
                out,
                r##"<text x="{}" y="52" text-anchor="middle" font-size="12" fill="#555">{}</text>"##,
                WIDTH / 2.0,
                escape(subtitle)
            )?;
        }
        self.axes(out)
    }

    fn axes(&self, out: &mut String) -> fmt::Result {
        let left = MARGIN_LEFT;
        let right = MARGIN_LEFT + self.plot_width();
        let bottom = HEIGHT - MARGIN_BOTTOM;

        writeln!(
            out,
            r#"<line x1="{left}" y1="{MARGIN_TOP}" x2="{left}" y2="{bottom}" stroke="black"/>"#
        )?;
        writeln!(
            out,
            r#"<line x1="{left}" y1="{bottom}" x2="{right}" y2="{bottom}" stroke="black"/>"#
        )?;

        let step = self.y_max / Y_TICKS;
        for i in 0..=Y_TICKS {
            let value = step * i;
            let y = self.y_of(value);
            writeln!(
                out,
                r##"<line x1="{}" y1="{y:.1}" x2="{right}" y2="{y:.1}" stroke="#ddd"/>"##,
                left
            )?;
            writeln!(
                out,
                r#"<text x="{}" y="{:.1}" text-anchor="end" font-size="11">{value}</text>"#,
                left - 8.0,
                y + 4.0
            )?;
        }

        writeln!(
            out,
            r#"<text x="{}" y="{}" text-anchor="middle" font-size="13">{}</text>"#,
            left + self.plot_width() / 2.0,
            HEIGHT - 15.0,
            escape(self.x_label)
        )?;
        writeln!(
            out,
            r#"<text x="20" y="{y}" text-anchor="middle" font-size="13" transform="rotate(-90 20 {y})">{}</text>"#,
            escape(self.y_label),
            y = MARGIN_TOP + self.plot_height() / 2.0
        )
    }

    fn close(out: &mut String) -> fmt::Result {
        writeln!(out, "</svg>")
    }
}

/// Vertical bar chart, bars drawn in the given order.
#[derive(Debug, Clone)]
pub struct BarChart {
    pub title: String,
    pub subtitle: Option<String>,
    pub x_label: String,
    pub y_label: String,
    pub bars: Vec<(String, usize)>,
}

impl BarChart {
    pub fn render(&self) -> Result<String, fmt::Error> {
        let max = self.bars.iter().map(|(_, n)| *n).max().unwrap_or(0);
        let frame = Frame {
            title: &self.title,
            subtitle: self.subtitle.as_deref(),
            x_label: &self.x_label,
            y_label: &self.y_label,
            margin_right: 40.0,
            y_max: axis_max(max),
        };

        let mut out = String::new();
        frame.open(&mut out)?;

        let bottom = HEIGHT - MARGIN_BOTTOM;
        let slot = frame.plot_width() / self.bars.len().max(1) as f64;
        let bar_width = slot * 0.6;
        for (i, (label, count)) in self.bars.iter().enumerate() {
            let center = MARGIN_LEFT + slot * (i as f64 + 0.5);
            let top = frame.y_of(*count);
            writeln!(
                out,
                r#"<rect x="{:.1}" y="{top:.1}" width="{bar_width:.1}" height="{:.1}" fill="skyblue" stroke="black"><title>{}: {count}</title></rect>"#,
                center - bar_width / 2.0,
                bottom - top,
                escape(label)
            )?;
            writeln!(
                out,
                r#"<text x="{center:.1}" y="{:.1}" text-anchor="middle" font-size="11">{count}</text>"#,
                top - 4.0
            )?;
            writeln!(
                out,
                r#"<text x="{center:.1}" y="{y:.1}" text-anchor="end" font-size="11" transform="rotate(-45 {center:.1} {y:.1})">{}</text>"#,
                escape(label),
                y = bottom + 16.0
            )?;
        }

        Frame::close(&mut out)?;
        Ok(out)
    }
}

/// One named line of a `LineChart`; `points[i]` is the value at `x_values[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub name: String,
    pub points: Vec<usize>,
}

/// Multi-series line chart with a legend on the right.
#[derive(Debug, Clone)]
pub struct LineChart {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub x_values: Vec<i32>,
    pub series: Vec<Series>,
}

impl LineChart {
    pub fn render(&self) -> Result<String, fmt::Error> {
        let max = self
            .series
            .iter()
            .flat_map(|s| s.points.iter().copied())
            .max()
            .unwrap_or(0);
        let frame = Frame {
            title: &self.title,
            subtitle: None,
            x_label: &self.x_label,
            y_label: &self.y_label,
            margin_right: 180.0,
            y_max: axis_max(max),
        };

        let mut out = String::new();
        frame.open(&mut out)?;

        let bottom = HEIGHT - MARGIN_BOTTOM;
        let x_of = |i: usize| -> f64 {
            match self.x_values.len() {
                0 | 1 => MARGIN_LEFT + frame.plot_width() / 2.0,
                n => MARGIN_LEFT + frame.plot_width() * i as f64 / (n - 1) as f64,
            }
        };

        for (i, x) in self.x_values.iter().enumerate() {
            writeln!(
                out,
                r#"<text x="{:.1}" y="{:.1}" text-anchor="middle" font-size="11">{x}</text>"#,
                x_of(i),
                bottom + 18.0
            )?;
        }

        for (n, series) in self.series.iter().enumerate() {
            let color = PALETTE[n % PALETTE.len()];
            let points: Vec<String> = series
                .points
                .iter()
                .enumerate()
                .map(|(i, v)| format!("{:.1},{:.1}", x_of(i), frame.y_of(*v)))
                .collect();
            writeln!(
                out,
                r#"<polyline fill="none" stroke="{color}" stroke-width="2" points="{}"/>"#,
                points.join(" ")
            )?;
            for (i, v) in series.points.iter().enumerate() {
                writeln!(
                    out,
                    r#"<circle cx="{:.1}" cy="{:.1}" r="3" fill="{color}"><title>{} {}: {v}</title></circle>"#,
                    x_of(i),
                    frame.y_of(*v),
                    escape(&series.name),
                    self.x_values.get(i).copied().unwrap_or_default()
                )?;
            }

            let legend_x = MARGIN_LEFT + frame.plot_width() + 20.0;
            let legend_y = MARGIN_TOP + 20.0 * n as f64;
            writeln!(
                out,
                r#"<rect x="{legend_x}" y="{legend_y}" width="12" height="12" fill="{color}"/>"#
            )?;
            writeln!(
                out,
                r#"<text x="{}" y="{}" font-size="12">{}</text>"#,
                legend_x + 18.0,
                legend_y + 11.0,
                escape(&series.name)
            )?;
        }

        Frame::close(&mut out)?;
        Ok(out)
    }
}
