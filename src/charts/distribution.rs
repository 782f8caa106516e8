use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};

use super::canvas::{self, Canvas, CAPTION_FONT, LABEL_FONT};
use super::ChartKind;
use crate::error::InsightError;
use crate::insights::mean_by_title;
use crate::models::{NormalizedTable, ScoreBand};

const WIDTH: u32 = 1000;
const ROW_HEIGHT: u32 = 48;

/// Horizontal bars of the mean score per topic, best topic on top.
pub fn render_score_distribution(table: &NormalizedTable) -> Result<String, InsightError> {
    let kind = ChartKind::ScoreDistribution;
    canvas::ensure_rows(kind.key(), table)?;

    let means = mean_by_title(table);
    let height = canvas::fitted_extent(means.len(), ROW_HEIGHT, 160, 360);
    canvas::render_base64(kind.key(), (WIDTH, height), |root| {
        draw(root, kind.title(), &means)
    })
}

pub(crate) fn band_color(band: ScoreBand) -> RGBColor {
    match band {
        ScoreBand::High => RGBColor(46, 139, 87),
        ScoreBand::Mid => RGBColor(255, 165, 0),
        ScoreBand::Low => RGBColor(214, 39, 40),
    }
}

fn draw(root: &Canvas<'_>, caption: &str, means: &[(String, f64)]) -> anyhow::Result<()> {
    let label_style = TextStyle::from(LABEL_FONT.into_font())
        .color(&BLACK)
        .pos(Pos::new(HPos::Right, VPos::Center));
    let value_style = TextStyle::from(LABEL_FONT.into_font())
        .color(&BLACK)
        .pos(Pos::new(HPos::Left, VPos::Center));

    let labels: Vec<String> = means.iter().map(|(title, _)| canvas::shorten(title)).collect();
    let mut label_width = 80;
    for label in &labels {
        let (width, _) = root.estimate_text_size(label, &label_style)?;
        label_width = label_width.max(width + 24);
    }

    let x_min = means.iter().map(|(_, mean)| *mean).fold(0.0f64, f64::min);
    let x_max = means.iter().map(|(_, mean)| *mean).fold(100.0f64, f64::max) * 1.12;
    let rows = means.len() as f64;

    let mut chart = ChartBuilder::on(root)
        .caption(caption, CAPTION_FONT)
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(label_width)
        .build_cartesian_2d(x_min..x_max, 0.0..rows)?;

    chart
        .configure_mesh()
        .disable_y_mesh()
        .y_label_formatter(&|_| String::new())
        .x_label_formatter(&|x| format!("{x:.0}"))
        .x_desc("Average Score")
        .label_style(LABEL_FONT)
        .light_line_style(BLACK.mix(0.05))
        .draw()?;

    let (_, top) = chart.backend_coord(&(x_min, rows));
    let (_, bottom) = chart.backend_coord(&(x_min, 0.0));
    let stride = canvas::label_stride(f64::from(bottom - top) / rows, canvas::LABEL_PITCH);

    // Highest mean goes in the top row.
    let pad = (x_max - x_min) * 0.01;
    for (index, (label, (_, mean))) in labels.iter().zip(means).enumerate() {
        let row = rows - 1.0 - index as f64;
        let color = band_color(ScoreBand::of(*mean));
        chart.draw_series(std::iter::once(Rectangle::new(
            [(0.0, row + 0.15), (*mean, row + 0.85)],
            color.filled(),
        )))?;
        if index % stride != 0 {
            continue;
        }
        chart.draw_series(std::iter::once(Text::new(
            format!("{mean:.2}"),
            (mean.max(0.0) + pad, row + 0.5),
            value_style.clone(),
        )))?;

        let (x, y) = chart.backend_coord(&(x_min, row + 0.5));
        root.draw_text(label, &label_style, (x - 8, y))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charts::canvas::tests::decode;
    use crate::normalize::normalize_payload;

    #[test]
    fn bars_use_band_colours() {
        let table = normalize_payload(
            br#"[
                {"quiz": {"title": "Geometry"}, "score": 95, "submitted_at": "2024-01-01"},
                {"quiz": {"title": "Statistics"}, "score": 70, "submitted_at": "2024-01-02"},
                {"quiz": {"title": "Calculus"}, "score": 30, "submitted_at": "2024-01-03"}
            ]"#,
        )
        .unwrap();

        let image = render_score_distribution(&table).unwrap();
        let (width, _, pixels) = decode(&image);
        assert_eq!(width, WIDTH);
        for band in [ScoreBand::High, ScoreBand::Mid, ScoreBand::Low] {
            let color = band_color(band);
            assert!(
                pixels.chunks(3).any(|px| px == [color.0, color.1, color.2]),
                "{band:?} bar missing"
            );
        }
    }

    #[test]
    fn many_topics_fit_a_capped_canvas() {
        let records: Vec<String> = (0..400)
            .map(|topic| {
                format!(
                    r#"{{"quiz": {{"title": "Topic {topic}"}}, "score": {}, "submitted_at": "2024-01-01"}}"#,
                    topic % 100
                )
            })
            .collect();
        let table = normalize_payload(format!("[{}]", records.join(",")).as_bytes()).unwrap();

        let image = render_score_distribution(&table).unwrap();
        let (width, height, _) = decode(&image);
        assert_eq!(width, WIDTH);
        assert_eq!(height, canvas::MAX_EXTENT);
    }
}
