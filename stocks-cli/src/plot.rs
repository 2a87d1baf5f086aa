//! Self-contained SVG line chart of a stored series' Close.

use std::fmt::Write as _;
use stocks_core::domain::{PriceRecord, Symbol};

const WIDTH: f64 = 960.0;
const HEIGHT: f64 = 480.0;
const MARGIN: f64 = 56.0;

/// Render Close values as an SVG polyline. `None` when no row has a Close.
pub fn render_close_svg(symbol: &Symbol, records: &[PriceRecord]) -> Option<String> {
    let points: Vec<(&PriceRecord, f64)> = records
        .iter()
        .filter_map(|r| r.close.filter(|c| c.is_finite()).map(|c| (r, c)))
        .collect();
    let (first, last) = (points.first()?.0, points.last()?.0);

    let y_min = points.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
    let y_max = points.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);
    let y_range = y_max - y_min;
    let y_pad = if y_range > 0.0 { y_range * 0.05 } else { 1.0 };
    let (y_lower, y_upper) = (y_min - y_pad, y_max + y_pad);

    let plot_w = WIDTH - 2.0 * MARGIN;
    let plot_h = HEIGHT - 2.0 * MARGIN;
    let x_step = if points.len() > 1 {
        plot_w / (points.len() - 1) as f64
    } else {
        0.0
    };
    let y_of = |v: f64| MARGIN + plot_h * (y_upper - v) / (y_upper - y_lower);

    let polyline = points
        .iter()
        .enumerate()
        .map(|(i, (_, close))| format!("{:.1},{:.1}", MARGIN + i as f64 * x_step, y_of(*close)))
        .collect::<Vec<_>>()
        .join(" ");

    let mut svg = String::new();
    // Writing to a String cannot fail.
    let _ = write!(
        svg,
        concat!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            "\n",
            r##"<rect width="100%" height="100%" fill="#ffffff"/>"##,
            "\n",
            r#"<text x="{m}" y="{title_y}" font-family="sans-serif" font-size="16">{symbol} Close</text>"#,
            "\n",
            r##"<line x1="{m}" y1="{bottom}" x2="{right}" y2="{bottom}" stroke="#888"/>"##,
            "\n",
            r##"<line x1="{m}" y1="{m}" x2="{m}" y2="{bottom}" stroke="#888"/>"##,
            "\n",
            r#"<text x="4" y="{top_label}" font-family="sans-serif" font-size="11">{y_hi:.2}</text>"#,
            "\n",
            r#"<text x="4" y="{bottom}" font-family="sans-serif" font-size="11">{y_lo:.2}</text>"#,
            "\n",
            r#"<text x="{m}" y="{x_label_y}" font-family="sans-serif" font-size="11">{start}</text>"#,
            "\n",
            r#"<text x="{right}" y="{x_label_y}" font-family="sans-serif" font-size="11" text-anchor="end">{end}</text>"#,
            "\n",
            r##"<polyline fill="none" stroke="#1f77b4" stroke-width="1.5" points="{points}"/>"##,
            "\n</svg>\n"
        ),
        w = WIDTH,
        h = HEIGHT,
        m = MARGIN,
        title_y = MARGIN / 2.0,
        bottom = HEIGHT - MARGIN,
        right = WIDTH - MARGIN,
        top_label = MARGIN + 4.0,
        x_label_y = HEIGHT - MARGIN + 18.0,
        y_hi = y_upper,
        y_lo = y_lower,
        symbol = xml_escape(symbol.as_str()),
        start = first.date,
        end = last.date,
        points = polyline,
    );
    Some(svg)
}

/// Escape text placed inside SVG elements.
fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
