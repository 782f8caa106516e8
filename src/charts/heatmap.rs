use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};

use super::canvas::{self, Canvas, CAPTION_FONT, LABEL_FONT};
use super::ChartKind;
use crate::error::InsightError;
use crate::insights::{mistake_pivot, MistakePivot};
use crate::models::NormalizedTable;

const CELL_WIDTH: u32 = 90;
const CELL_HEIGHT: u32 = 56;
const COLORBAR_WIDTH: u32 = 110;

/// Yellow-green-blue ramp, light to dark.
const YL_GN_BU: [RGBColor; 9] = [
    RGBColor(255, 255, 217),
    RGBColor(237, 248, 177),
    RGBColor(199, 233, 180),
    RGBColor(127, 205, 187),
    RGBColor(65, 182, 196),
    RGBColor(29, 145, 192),
    RGBColor(34, 94, 168),
    RGBColor(37, 52, 148),
    RGBColor(8, 29, 88),
];

/// Corrected mistakes per topic and attempt number, annotated with the sums.
pub fn render_mistake_heatmap(table: &NormalizedTable) -> Result<String, InsightError> {
    let kind = ChartKind::MistakeHeatmap;
    canvas::ensure_rows(kind.key(), table)?;

    let pivot = mistake_pivot(table);
    let width = canvas::fitted_extent(pivot.attempts.len(), CELL_WIDTH, 420 + COLORBAR_WIDTH, 800);
    let height = canvas::fitted_extent(pivot.titles.len(), CELL_HEIGHT, 200, 400);
    canvas::render_base64(kind.key(), (width, height), |root| {
        draw(root, kind.title(), &pivot)
    })
}

/// Colour for `t` in [0, 1], linearly interpolated along the ramp.
pub(crate) fn ramp(t: f64) -> RGBColor {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    let scaled = t * (YL_GN_BU.len() - 1) as f64;
    let low = scaled.floor() as usize;
    let high = (low + 1).min(YL_GN_BU.len() - 1);
    let frac = scaled - low as f64;
    let mix = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * frac).round() as u8;
    let (a, b) = (YL_GN_BU[low], YL_GN_BU[high]);
    RGBColor(mix(a.0, b.0), mix(a.1, b.1), mix(a.2, b.2))
}

fn normalise(value: i64, min: i64, max: i64) -> f64 {
    if max == min {
        0.0
    } else {
        (value as f64 - min as f64) / (max as f64 - min as f64)
    }
}

fn draw(root: &Canvas<'_>, caption: &str, pivot: &MistakePivot) -> anyhow::Result<()> {
    let (width, _) = root.dim_in_pixel();
    let (grid_area, bar_area) = root.split_horizontally(width - COLORBAR_WIDTH);

    let row_label = TextStyle::from(LABEL_FONT.into_font())
        .color(&BLACK)
        .pos(Pos::new(HPos::Right, VPos::Center));
    let column_label = TextStyle::from(LABEL_FONT.into_font())
        .color(&BLACK)
        .pos(Pos::new(HPos::Center, VPos::Top));

    let labels: Vec<String> = pivot.titles.iter().map(|title| canvas::shorten(title)).collect();
    let mut label_width = 80;
    for label in &labels {
        let (text_width, _) = grid_area.estimate_text_size(label, &row_label)?;
        label_width = label_width.max(text_width + 24);
    }

    let columns = pivot.attempts.len() as f64;
    let rows = pivot.titles.len() as f64;
    let mut chart = ChartBuilder::on(&grid_area)
        .caption(caption, CAPTION_FONT)
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(label_width)
        .build_cartesian_2d(0.0..columns, 0.0..rows)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_label_formatter(&|_| String::new())
        .y_label_formatter(&|_| String::new())
        .x_desc("Attempt Number")
        .y_desc("Quiz Title")
        .label_style(LABEL_FONT)
        .axis_desc_style(LABEL_FONT)
        .draw()?;

    let (min, max) = (pivot.min_cell(), pivot.max_cell());
    let (min_width, _) = grid_area.estimate_text_size(&min.to_string(), &column_label)?;
    let (max_width, _) = grid_area.estimate_text_size(&max.to_string(), &column_label)?;
    let widest = min_width.max(max_width);

    let (left, bottom) = chart.backend_coord(&(0.0, 0.0));
    let (right, top) = chart.backend_coord(&(columns, rows));
    let cell_width = f64::from(right - left) / columns;
    let cell_height = f64::from(bottom - top) / rows;
    let annotate = cell_width >= f64::from(widest) + 4.0 && cell_height >= canvas::LABEL_PITCH;
    let row_stride = canvas::label_stride(cell_height, canvas::LABEL_PITCH);
    let (attempt_width, _) = grid_area.estimate_text_size(
        &pivot.attempts.last().copied().unwrap_or(0).to_string(),
        &column_label,
    )?;
    let column_stride = canvas::label_stride(cell_width, f64::from(attempt_width) + 8.0);

    for (row_index, (label, cells)) in labels.iter().zip(&pivot.cells).enumerate() {
        // First title on the top row.
        let row = rows - 1.0 - row_index as f64;
        for (column, value) in cells.iter().enumerate() {
            let x = column as f64;
            let shade = normalise(*value, min, max);
            chart.draw_series(std::iter::once(Rectangle::new(
                [(x, row), (x + 1.0, row + 1.0)],
                ramp(shade).filled(),
            )))?;
            if !annotate {
                continue;
            }
            chart.draw_series(std::iter::once(Rectangle::new(
                [(x, row), (x + 1.0, row + 1.0)],
                WHITE.stroke_width(1),
            )))?;

            let ink = if shade > 0.6 { WHITE } else { BLACK };
            let annotation = TextStyle::from(LABEL_FONT.into_font())
                .color(&ink)
                .pos(Pos::new(HPos::Center, VPos::Center));
            chart.draw_series(std::iter::once(Text::new(
                value.to_string(),
                (x + 0.5, row + 0.5),
                annotation,
            )))?;
        }

        if row_index % row_stride == 0 {
            let (x, y) = chart.backend_coord(&(0.0, row + 0.5));
            root.draw_text(label, &row_label, (x - 8, y))?;
        }
    }

    for (column, attempt) in pivot.attempts.iter().enumerate().step_by(column_stride) {
        let (x, y) = chart.backend_coord(&(column as f64 + 0.5, 0.0));
        root.draw_text(&attempt.to_string(), &column_label, (x, y + 8))?;
    }

    draw_colorbar(&bar_area, min, max)
}

fn draw_colorbar<DB: DrawingBackend>(
    area: &DrawingArea<DB, plotters::coord::Shift>,
    min: i64,
    max: i64,
) -> anyhow::Result<()>
where
    DB::ErrorType: 'static,
{
    let (_, height) = area.dim_in_pixel();
    let top = 80i32;
    let bottom = height as i32 - 80;
    let (left, right) = (20i32, 44i32);
    let steps = (bottom - top).max(1);

    for step in 0..steps {
        let t = 1.0 - step as f64 / steps as f64;
        area.draw(&Rectangle::new(
            [(left, top + step), (right, top + step + 1)],
            ramp(t).filled(),
        ))?;
    }
    area.draw(&Rectangle::new([(left, top), (right, bottom)], BLACK.stroke_width(1)))?;

    let tick = TextStyle::from(LABEL_FONT.into_font())
        .color(&BLACK)
        .pos(Pos::new(HPos::Left, VPos::Center));
    area.draw_text(&max.to_string(), &tick, (right + 6, top))?;
    area.draw_text(&min.to_string(), &tick, (right + 6, bottom))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charts::canvas::tests::decode;
    use crate::normalize::normalize_payload;

    #[test]
    fn ramp_hits_both_ends() {
        assert_eq!(ramp(0.0), YL_GN_BU[0]);
        assert_eq!(ramp(1.0), YL_GN_BU[8]);
        assert_eq!(ramp(f64::NAN), YL_GN_BU[0]);
        assert_eq!(ramp(2.0), YL_GN_BU[8]);
    }

    #[test]
    fn flat_pivot_uses_lightest_shade() {
        assert_eq!(normalise(4, 4, 4), 0.0);
        assert_eq!(normalise(5, 0, 10), 0.5);
    }

    #[test]
    fn shades_span_full_integer_range() {
        assert_eq!(normalise(i64::MIN, i64::MIN, i64::MAX), 0.0);
        assert_eq!(normalise(i64::MAX, i64::MIN, i64::MAX), 1.0);
    }

    #[test]
    fn extreme_mistake_counts_still_render() {
        let table = normalize_payload(
            br#"[
                {"quiz": {"title": "A"}, "score": 50, "mistakes_corrected": 9223372036854775807, "submitted_at": "2024-01-01"},
                {"quiz": {"title": "A"}, "score": 60, "mistakes_corrected": 9223372036854775807, "submitted_at": "2024-01-01"},
                {"quiz": {"title": "B"}, "score": 70, "mistakes_corrected": -9223372036854775808, "submitted_at": "2024-01-02"}
            ]"#,
        )
        .unwrap();

        let image = render_mistake_heatmap(&table).unwrap();
        let (width, height, _) = decode(&image);
        assert_eq!((width, height), (800, 400));
    }

    #[test]
    fn many_topics_and_attempts_fit_a_capped_canvas() {
        let mut records = Vec::new();
        for topic in 0..80 {
            for day in 1..=45 {
                records.push(format!(
                    r#"{{"quiz": {{"title": "Topic {topic}"}}, "score": 70, "mistakes_corrected": {day}, "submitted_at": "2024-03-{:02}T{:02}:00:00"}}"#,
                    day % 28 + 1,
                    day % 24
                ));
            }
        }
        let table = normalize_payload(format!("[{}]", records.join(",")).as_bytes()).unwrap();

        let image = render_mistake_heatmap(&table).unwrap();
        let (width, height, _) = decode(&image);
        assert_eq!((width, height), (canvas::MAX_EXTENT, canvas::MAX_EXTENT));
    }

    #[test]
    fn renders_grid_sized_to_pivot() {
        let table = normalize_payload(
            br#"[
                {"quiz": {"title": "Algebra"}, "score": 55, "mistakes_corrected": 4, "submitted_at": "2024-01-01"},
                {"quiz": {"title": "Algebra"}, "score": 75, "mistakes_corrected": 1, "submitted_at": "2024-01-08"},
                {"quiz": {"title": "Algebra"}, "score": 80, "mistakes_corrected": 0, "submitted_at": "2024-01-09"},
                {"quiz": {"title": "Optics"}, "score": 91, "mistakes_corrected": 2, "submitted_at": "2024-01-04"}
            ]"#,
        )
        .unwrap();

        let image = render_mistake_heatmap(&table).unwrap();
        let (width, height, pixels) = decode(&image);
        assert_eq!(width, 800);
        assert_eq!(height, 400);
        let darkest = YL_GN_BU[8];
        assert!(pixels
            .chunks(3)
            .any(|px| px == [darkest.0, darkest.1, darkest.2]));
    }
}
