use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Nested quiz descriptor as it arrives on the wire. Only the title matters.
#[derive(Debug, Clone, Deserialize)]
pub struct QuizDescriptor {
    pub title: Option<String>,
}

/// One raw submission record, before validation.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionRecord {
    pub quiz: Option<QuizDescriptor>,
    pub score: Option<f64>,
    #[serde(default)]
    pub mistakes_corrected: Option<i64>,
    pub submitted_at: Option<String>,
}

/// A validated submission with the quiz title projected out.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub title: String,
    pub score: f64,
    pub mistakes_corrected: i64,
    pub submitted_at: NaiveDateTime,
}

/// Submissions in ascending `submitted_at` order, ties in input order.
#[derive(Debug, Clone, Default)]
pub struct NormalizedTable {
    rows: Vec<Submission>,
}

impl NormalizedTable {
    pub(crate) fn from_sorted(rows: Vec<Submission>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[Submission] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsightSet {
    pub total_quizzes: usize,
    pub avg_score: f64,
    pub score_progression: BTreeMap<String, Vec<f64>>,
    pub score_trend: BTreeMap<NaiveDateTime, f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ScoreRange {
    Poor,
    Average,
    Good,
    Excellent,
}

impl ScoreRange {
    pub const ALL: [ScoreRange; 4] = [
        ScoreRange::Poor,
        ScoreRange::Average,
        ScoreRange::Good,
        ScoreRange::Excellent,
    ];

    /// Right-open bins, except that 100 belongs to the top bin.
    pub fn classify(score: f64) -> Option<Self> {
        match score {
            s if (0.0..40.0).contains(&s) => Some(ScoreRange::Poor),
            s if (40.0..60.0).contains(&s) => Some(ScoreRange::Average),
            s if (60.0..80.0).contains(&s) => Some(ScoreRange::Good),
            s if (80.0..=100.0).contains(&s) => Some(ScoreRange::Excellent),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ScoreRange::Poor => "Poor (0-40)",
            ScoreRange::Average => "Average (40-60)",
            ScoreRange::Good => "Good (60-80)",
            ScoreRange::Excellent => "Excellent (80-100)",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreBand {
    High,
    Mid,
    Low,
}

impl ScoreBand {
    pub fn of(mean: f64) -> Self {
        if mean > 80.0 {
            ScoreBand::High
        } else if mean >= 60.0 {
            ScoreBand::Mid
        } else {
            ScoreBand::Low
        }
    }
}

/// Per-topic summary used by the markdown report.
#[derive(Debug, Clone)]
pub struct TopicSummary {
    pub title: String,
    pub attempts: usize,
    pub avg_score: f64,
    pub latest_score: f64,
    pub change: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_ranges_are_right_open_with_inclusive_top() {
        assert_eq!(ScoreRange::classify(0.0), Some(ScoreRange::Poor));
        assert_eq!(ScoreRange::classify(39.99), Some(ScoreRange::Poor));
        assert_eq!(ScoreRange::classify(40.0), Some(ScoreRange::Average));
        assert_eq!(ScoreRange::classify(60.0), Some(ScoreRange::Good));
        assert_eq!(ScoreRange::classify(80.0), Some(ScoreRange::Excellent));
        assert_eq!(ScoreRange::classify(100.0), Some(ScoreRange::Excellent));
        assert_eq!(ScoreRange::classify(100.5), None);
        assert_eq!(ScoreRange::classify(-1.0), None);
    }

    #[test]
    fn bands_follow_thresholds() {
        assert_eq!(ScoreBand::of(80.5), ScoreBand::High);
        assert_eq!(ScoreBand::of(80.0), ScoreBand::Mid);
        assert_eq!(ScoreBand::of(60.0), ScoreBand::Mid);
        assert_eq!(ScoreBand::of(59.9), ScoreBand::Low);
    }
}
