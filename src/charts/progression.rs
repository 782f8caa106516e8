use std::collections::BTreeMap;

use plotters::prelude::*;

use super::canvas::{self, Canvas, CAPTION_FONT, LABEL_FONT};
use super::{epoch_seconds, score_axis, time_label, time_range, ChartKind};
use crate::error::InsightError;
use crate::models::NormalizedTable;

const SIZE: (u32, u32) = (1000, 600);

/// One line per topic, in submission order.
pub fn render_score_progression(table: &NormalizedTable) -> Result<String, InsightError> {
    let kind = ChartKind::ScoreProgression;
    canvas::ensure_rows(kind.key(), table)?;

    let mut series: BTreeMap<&str, Vec<(f64, f64)>> = BTreeMap::new();
    for row in table.rows() {
        series
            .entry(row.title.as_str())
            .or_default()
            .push((epoch_seconds(row.submitted_at), row.score));
    }
    let x_range = time_range(table.rows().iter().map(|row| &row.submitted_at));
    let y_range = score_axis(table.rows().iter().map(|row| row.score));

    canvas::render_base64(kind.key(), SIZE, |root| {
        draw(root, kind.title(), &series, x_range, y_range)
    })
}

fn draw(
    root: &Canvas<'_>,
    caption: &str,
    series: &BTreeMap<&str, Vec<(f64, f64)>>,
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
        .x_labels(6)
        .x_label_formatter(&|x| time_label(*x, &axis))
        .y_label_formatter(&|y| format!("{y:.0}"))
        .x_desc("Date")
        .y_desc("Score")
        .label_style(LABEL_FONT)
        .light_line_style(BLACK.mix(0.05))
        .draw()?;

    for (index, (title, points)) in series.iter().enumerate() {
        let color = canvas::series_color(index);
        chart
            .draw_series(LineSeries::new(points.iter().copied(), color.stroke_width(2)))?
            .label(format!("Topic: {title}"))
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
        chart.draw_series(
            points
                .iter()
                .map(|point| Circle::new(*point, 5, color.filled())),
        )?;
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK.mix(0.4))
        .label_font(LABEL_FONT)
        .position(SeriesLabelPosition::UpperRight)
        .draw()?;

    Ok(())
}
