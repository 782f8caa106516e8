use std::collections::BTreeMap;
use std::f64::consts::{FRAC_PI_2, TAU};

use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};

use super::canvas::{self, Canvas, CAPTION_FONT, LABEL_FONT};
use super::ChartKind;
use crate::error::InsightError;
use crate::insights::score_range_counts;
use crate::models::{NormalizedTable, ScoreRange};

const SIZE: (u32, u32) = (800, 800);
const RADIUS: f64 = 260.0;

pub(crate) fn range_color(range: ScoreRange) -> RGBColor {
    match range {
        ScoreRange::Poor => RGBColor(0xFF, 0x4C, 0x4C),
        ScoreRange::Average => RGBColor(0xFF, 0xB7, 0x4D),
        ScoreRange::Good => RGBColor(0xFF, 0xEB, 0x3B),
        ScoreRange::Excellent => RGBColor(0x38, 0x8E, 0x3C),
    }
}

/// A wedge of the pie: angles in radians, counter-clockwise from +x.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Wedge {
    pub range: ScoreRange,
    pub start: f64,
    pub sweep: f64,
    pub share: f64,
}

/// Wedges for the non-empty buckets, starting at twelve o'clock and running
/// counter-clockwise in bucket order.
pub(crate) fn wedges(counts: &BTreeMap<ScoreRange, usize>) -> Vec<Wedge> {
    let total: usize = counts.values().sum();
    if total == 0 {
        return Vec::new();
    }

    let mut start = FRAC_PI_2;
    let mut out = Vec::new();
    for (range, count) in counts {
        if *count == 0 {
            continue;
        }
        let share = *count as f64 / total as f64;
        let sweep = share * TAU;
        out.push(Wedge {
            range: *range,
            start,
            sweep,
            share,
        });
        start += sweep;
    }
    out
}

/// Share of submissions in each fixed score range.
pub fn render_score_range_pie(table: &NormalizedTable) -> Result<String, InsightError> {
    let kind = ChartKind::ScoreRangePie;
    canvas::ensure_rows(kind.key(), table)?;

    let wedges = wedges(&score_range_counts(table));
    canvas::render_base64(kind.key(), SIZE, |root| draw(root, kind.title(), &wedges))
}

fn point_at(center: (i32, i32), radius: f64, angle: f64) -> (i32, i32) {
    (
        center.0 + (radius * angle.cos()).round() as i32,
        center.1 - (radius * angle.sin()).round() as i32,
    )
}

fn draw(root: &Canvas<'_>, caption: &str, wedges: &[Wedge]) -> anyhow::Result<()> {
    let root = root.titled(caption, CAPTION_FONT)?;
    let (width, height) = root.dim_in_pixel();
    let center = (width as i32 / 2, height as i32 / 2);

    if wedges.is_empty() {
        let ink = BLACK.mix(0.6);
        let notice = TextStyle::from(LABEL_FONT.into_font())
            .color(&ink)
            .pos(Pos::new(HPos::Center, VPos::Center));
        root.draw_text("No scores within 0-100", &notice, center)?;
        return Ok(());
    }

    for wedge in wedges {
        let steps = ((wedge.sweep.to_degrees()).ceil() as usize).max(2);
        let mut outline = Vec::with_capacity(steps + 2);
        outline.push(center);
        for step in 0..=steps {
            let angle = wedge.start + wedge.sweep * step as f64 / steps as f64;
            outline.push(point_at(center, RADIUS, angle));
        }

        root.draw(&Polygon::new(outline.clone(), range_color(wedge.range).filled()))?;
        outline.push(center);
        root.draw(&PathElement::new(outline, BLACK.stroke_width(1)))?;
    }

    let share_style = TextStyle::from(LABEL_FONT.into_font())
        .color(&BLACK)
        .pos(Pos::new(HPos::Center, VPos::Center));
    for wedge in wedges {
        let middle = wedge.start + wedge.sweep / 2.0;
        root.draw_text(
            &format!("{:.1}%", wedge.share * 100.0),
            &share_style,
            point_at(center, RADIUS * 0.6, middle),
        )?;

        let h_pos = if middle.cos() >= 0.0 { HPos::Left } else { HPos::Right };
        let label_style = TextStyle::from(LABEL_FONT.into_font())
            .color(&BLACK)
            .pos(Pos::new(h_pos, VPos::Center));
        root.draw_text(
            wedge.range.label(),
            &label_style,
            point_at(center, RADIUS * 1.1, middle),
        )?;
    }

    Ok(())
}
