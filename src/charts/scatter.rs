use plotters::prelude::*;

use super::canvas::{self, Canvas, CAPTION_FONT, LABEL_FONT};
use super::{epoch_seconds, score_axis, time_label, time_range, ChartKind};
use crate::error::InsightError;
use crate::models::NormalizedTable;

const SIZE: (u32, u32) = (1200, 600);
const MARKER: RGBColor = RGBColor(128, 0, 128);

/// Every submission as one (time, score) point.
pub fn render_score_scatter(table: &NormalizedTable) -> Result<String, InsightError> {
    let kind = ChartKind::ScoreScatter;
    canvas::ensure_rows(kind.key(), table)?;

    let points: Vec<(f64, f64)> = table
        .rows()
        .iter()
        .map(|row| (epoch_seconds(row.submitted_at), row.score))
        .collect();
    let x_range = time_range(table.rows().iter().map(|row| &row.submitted_at));
    let y_range = score_axis(points.iter().map(|(_, score)| *score));

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
        .x_desc("Submission Time")
        .y_desc("Score")
        .label_style(LABEL_FONT)
        .light_line_style(BLACK.mix(0.05))
        .draw()?;

    chart.draw_series(
        points
            .iter()
            .map(|point| Circle::new(*point, 6, MARKER.mix(0.5).filled())),
    )?;

    Ok(())
}
