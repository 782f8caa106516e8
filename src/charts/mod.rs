//! The six chart renderers. Each one owns its drawing surface for the
//! duration of the call and returns a base64 PNG.

mod canvas;
mod distribution;
mod glyphs;
mod heatmap;
mod pie;
mod progression;
mod scatter;
mod trend;

use std::ops::Range;
use std::time::Instant;

use chrono::{DateTime, NaiveDateTime};

use crate::error::InsightError;
use crate::models::NormalizedTable;

pub use distribution::render_score_distribution;
pub use heatmap::render_mistake_heatmap;
pub use pie::render_score_range_pie;
pub use progression::render_score_progression;
pub use scatter::render_score_scatter;
pub use trend::render_score_trend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChartKind {
    ScoreProgression,
    ScoreDistribution,
    ScoreTrend,
    ScoreRangePie,
    MistakeHeatmap,
    ScoreScatter,
}

impl ChartKind {
    pub const ALL: [ChartKind; 6] = [
        ChartKind::ScoreProgression,
        ChartKind::ScoreDistribution,
        ChartKind::ScoreTrend,
        ChartKind::ScoreRangePie,
        ChartKind::MistakeHeatmap,
        ChartKind::ScoreScatter,
    ];

    /// Field name of the chart in the response document.
    pub fn key(self) -> &'static str {
        match self {
            ChartKind::ScoreProgression => "score_progression_chart",
            ChartKind::ScoreDistribution => "score_distribution_chart",
            ChartKind::ScoreTrend => "score_trend_chart",
            ChartKind::ScoreRangePie => "score_range_pie_chart",
            ChartKind::MistakeHeatmap => "mistake_correction_heatmap",
            ChartKind::ScoreScatter => "score_improvement_plot",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            ChartKind::ScoreProgression => "Score Progression by Topic",
            ChartKind::ScoreDistribution => "Average Score by Topic",
            ChartKind::ScoreTrend => "Score Trend (7-point Moving Average)",
            ChartKind::ScoreRangePie => "Score Range Distribution",
            ChartKind::MistakeHeatmap => "Mistake Correction Trends Across Quizzes",
            ChartKind::ScoreScatter => "Score vs Submission Time",
        }
    }

    pub fn render(self, table: &NormalizedTable) -> Result<String, InsightError> {
        let started = Instant::now();
        let result = match self {
            ChartKind::ScoreProgression => render_score_progression(table),
            ChartKind::ScoreDistribution => render_score_distribution(table),
            ChartKind::ScoreTrend => render_score_trend(table),
            ChartKind::ScoreRangePie => render_score_range_pie(table),
            ChartKind::MistakeHeatmap => render_mistake_heatmap(table),
            ChartKind::ScoreScatter => render_score_scatter(table),
        };

        match &result {
            Ok(image) => tracing::debug!(
                chart = self.key(),
                encoded_bytes = image.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "chart rendered"
            ),
            Err(err) => tracing::error!(chart = self.key(), error = %err, "chart rendering failed"),
        }
        result
    }
}

fn epoch_seconds(at: NaiveDateTime) -> f64 {
    let utc = at.and_utc();
    utc.timestamp() as f64 + f64::from(utc.timestamp_subsec_nanos()) / 1e9
}

/// X range covering every timestamp with a little breathing room. A single
/// instant gets one day either side.
fn time_range<'a>(stamps: impl IntoIterator<Item = &'a NaiveDateTime>) -> Range<f64> {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for stamp in stamps {
        let x = epoch_seconds(*stamp);
        min = min.min(x);
        max = max.max(x);
    }

    if !min.is_finite() {
        return 0.0..86_400.0;
    }
    let span = max - min;
    if span <= 0.0 {
        return (min - 86_400.0)..(max + 86_400.0);
    }
    let pad = span * 0.05;
    (min - pad)..(max + pad)
}

/// Tick label for an epoch-seconds position; drops the clock once the axis
/// spans more than a day.
fn time_label(seconds: f64, axis: &Range<f64>) -> String {
    let Some(at) = DateTime::from_timestamp(seconds.round() as i64, 0) else {
        return String::new();
    };
    if axis.end - axis.start > 86_400.0 {
        at.format("%Y-%m-%d").to_string()
    } else {
        at.format("%m-%d %H:%M").to_string()
    }
}

fn score_axis(scores: impl IntoIterator<Item = f64>) -> Range<f64> {
    let (mut min, mut max) = (0.0f64, 100.0f64);
    for score in scores {
        min = min.min(score);
        max = max.max(score);
    }
    (min - 5.0)..(max + 5.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{normalize_payload, parse_timestamp};

    #[test]
    fn every_chart_rejects_empty_table() {
        let table = NormalizedTable::default();
        for kind in ChartKind::ALL {
            let err = kind.render(&table).unwrap_err();
            assert!(matches!(err, InsightError::Render { .. }), "{kind:?}: {err}");
        }
    }

    #[test]
    fn every_chart_renders_a_single_record() {
        let table = normalize_payload(
            br#"[{"quiz": {"title": "Algebra"}, "score": 72, "mistakes_corrected": 3, "submitted_at": "2024-01-01T10:00:00"}]"#,
        )
        .unwrap();

        for kind in ChartKind::ALL {
            let image = kind.render(&table).unwrap();
            let (width, height, _) = canvas::tests::decode(&image);
            assert!(width > 0 && height > 0, "{kind:?}");
        }
    }

    #[test]
    fn every_chart_renders_out_of_range_scores() {
        let table = normalize_payload(
            br#"[
                {"quiz": {"title": "Algebra"}, "score": 120, "submitted_at": "2024-01-01"},
                {"quiz": {"title": "Algebra"}, "score": -10, "submitted_at": "2024-01-02"}
            ]"#,
        )
        .unwrap();

        for kind in ChartKind::ALL {
            assert!(kind.render(&table).is_ok(), "{kind:?}");
        }
    }

    #[test]
    fn keys_are_unique() {
        let keys: std::collections::BTreeSet<_> = ChartKind::ALL.iter().map(|kind| kind.key()).collect();
        assert_eq!(keys.len(), ChartKind::ALL.len());
    }

    #[test]
    fn single_instant_gets_padded_range() {
        let at = parse_timestamp("2024-01-01").unwrap();
        let range = time_range([&at]);
        assert_eq!(range.end - range.start, 2.0 * 86_400.0);
        assert_eq!(time_label(epoch_seconds(at), &range), "2024-01-01");
    }

    #[test]
    fn short_spans_show_clock_time() {
        let morning = parse_timestamp("2024-01-01T09:00:00").unwrap();
        let evening = parse_timestamp("2024-01-01T18:30:00").unwrap();
        let range = time_range([&morning, &evening]);
        assert_eq!(time_label(epoch_seconds(evening), &range), "01-01 18:30");
    }

    #[test]
    fn score_axis_always_covers_percentages() {
        assert_eq!(score_axis([50.0]), -5.0..105.0);
        assert_eq!(score_axis([120.0, -10.0]), -15.0..125.0);
    }
}
