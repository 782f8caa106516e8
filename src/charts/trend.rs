use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};

use super::canvas::{self, Canvas, CAPTION_FONT, LABEL_FONT};
use super::{epoch_seconds, score_axis, time_label, time_range, ChartKind};
use crate::error::InsightError;
use crate::insights::{moving_average, trend_means, TREND_WINDOW};
use crate::models::NormalizedTable;

const SIZE: (u32, u32) = (1200, 560);
const LINE_COLOR: RGBColor = RGBColor(46, 139, 87);

/// Trailing mean of the per-timestamp average score. Points before the
/// window fills are not drawn.
pub fn render_score_trend(table: &NormalizedTable) -> Result<String, InsightError> {
    let kind = ChartKind::ScoreTrend;
    canvas::ensure_rows(kind.key(), table)?;

    let grouped = trend_means(table);
    let means: Vec<f64> = grouped.iter().map(|(_, mean)| *mean).collect();
    let smoothed = moving_average(&means, TREND_WINDOW);
    let points: Vec<(f64, f64)> = grouped
        .iter()
        .skip(TREND_WINDOW - 1)
        .zip(&smoothed)
        .map(|((at, _), value)| (epoch_seconds(*at), *value))
        .collect();

    let x_range = time_range(grouped.iter().map(|(at, _)| at));
    let y_range = score_axis(smoothed.iter().copied());
    tracing::debug!(
        grouped = grouped.len(),
        plotted = points.len(),
        "score trend points"
    );

    canvas::render_base64(kind.key(), SIZE, |root| {
        draw(root, kind.title(), &points, x_range, y_range)
    })
}

fn draw(
    root: &Canvas<'_>,
    caption: &str,
    points: &[(f64, f64)],
    x_range: std::ops::Range<f64>,
    y_range: std::ops::Range<f64>,
) -> anyhow::Result<()> {
    let axis = x_range.clone();
    let mut chart = ChartBuilder::on(root)
        .caption(caption, CAPTION_FONT)
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(x_range, y_range)?;

    chart
        .configure_mesh()
        .x_labels(8)
        .x_label_formatter(&|x| time_label(*x, &axis))
        .y_label_formatter(&|y| format!("{y:.0}"))
        .x_desc("Date")
        .y_desc("Average Score")
        .label_style(LABEL_FONT)
        .light_line_style(BLACK.mix(0.05))
        .draw()?;

    if points.is_empty() {
        let (width, height) = root.dim_in_pixel();
        let ink = BLACK.mix(0.6);
        let notice = TextStyle::from(LABEL_FONT.into_font())
            .color(&ink)
            .pos(Pos::new(HPos::Center, VPos::Center));
        root.draw_text(
            &format!("Need at least {TREND_WINDOW} distinct submission times for a trend"),
            &notice,
            (width as i32 / 2, height as i32 / 2),
        )?;
        return Ok(());
    }

    chart.draw_series(LineSeries::new(
        points.iter().copied(),
        LINE_COLOR.stroke_width(2),
    ))?;
    chart.draw_series(
        points
            .iter()
            .map(|point| Circle::new(*point, 4, LINE_COLOR.filled())),
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charts::canvas::tests::decode;
    use crate::normalize::normalize_payload;

    fn history(days: u32) -> NormalizedTable {
        let records: Vec<String> = (1..=days)
            .map(|day| {
                format!(
                    r#"{{"quiz": {{"title": "Algebra"}}, "score": {}, "submitted_at": "2024-01-{day:02}"}}"#,
                    50 + day
                )
            })
            .collect();
        normalize_payload(format!("[{}]", records.join(",")).as_bytes()).unwrap()
    }

    fn has_line_colour(pixels: &[u8]) -> bool {
        pixels
            .chunks(3)
            .any(|px| px == [LINE_COLOR.0, LINE_COLOR.1, LINE_COLOR.2])
    }

    #[test]
    fn draws_line_once_window_fills() {
        let image = render_score_trend(&history(10)).unwrap();
        let (width, height, pixels) = decode(&image);
        assert_eq!((width, height), SIZE);
        assert!(has_line_colour(&pixels));
    }

    #[test]
    fn short_history_renders_without_line() {
        let image = render_score_trend(&history(3)).unwrap();
        let (_, _, pixels) = decode(&image);
        assert!(!has_line_colour(&pixels));
    }
}
