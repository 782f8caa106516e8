use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDateTime;

use crate::error::InsightError;
use crate::models::{InsightSet, NormalizedTable, ScoreRange, TopicSummary};

/// Number of grouped points in the trailing trend average.
pub const TREND_WINDOW: usize = 7;

pub fn generate_insights(table: &NormalizedTable) -> Result<InsightSet, InsightError> {
    if table.is_empty() {
        return Err(InsightError::EmptyDataset);
    }

    let rows = table.rows();
    let total_quizzes = rows
        .iter()
        .map(|row| row.title.as_str())
        .collect::<BTreeSet<_>>()
        .len();
    let avg_score = rows.iter().map(|row| row.score).sum::<f64>() / rows.len() as f64;

    let mut score_progression: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for row in rows {
        score_progression
            .entry(row.title.clone())
            .or_default()
            .push(row.score);
    }

    let score_trend = trend_means(table).into_iter().collect();

    Ok(InsightSet {
        total_quizzes,
        avg_score,
        score_progression,
        score_trend,
    })
}

/// Mean score per title, highest first. Equal means stay in title order.
pub fn mean_by_title(table: &NormalizedTable) -> Vec<(String, f64)> {
    let mut sums: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for row in table.rows() {
        let entry = sums.entry(row.title.as_str()).or_insert((0.0, 0));
        entry.0 += row.score;
        entry.1 += 1;
    }

    let mut means: Vec<(String, f64)> = sums
        .into_iter()
        .map(|(title, (total, count))| (title.to_string(), total / count as f64))
        .collect();
    means.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    means
}

/// Mean score per exact submission timestamp, ascending.
pub fn trend_means(table: &NormalizedTable) -> Vec<(NaiveDateTime, f64)> {
    let mut groups: BTreeMap<NaiveDateTime, (f64, usize)> = BTreeMap::new();
    for row in table.rows() {
        let entry = groups.entry(row.submitted_at).or_insert((0.0, 0));
        entry.0 += row.score;
        entry.1 += 1;
    }

    groups
        .into_iter()
        .map(|(at, (total, count))| (at, total / count as f64))
        .collect()
}

/// Trailing mean over `window` points. Position `i` of the output corresponds
/// to input position `i + window - 1`; earlier positions are undefined.
pub fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    if window == 0 || values.len() < window {
        return Vec::new();
    }

    values
        .windows(window)
        .map(|slice| slice.iter().sum::<f64>() / window as f64)
        .collect()
}

/// Rank of each row's timestamp among rows with the same title, aligned with
/// `table.rows()`. Ties take their average rank, truncated to an integer.
pub fn attempt_ranks(table: &NormalizedTable) -> Vec<usize> {
    let rows = table.rows();
    let mut by_title: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (index, row) in rows.iter().enumerate() {
        by_title.entry(row.title.as_str()).or_default().push(index);
    }

    let mut ranks = vec![0usize; rows.len()];
    for indices in by_title.values() {
        // Indices are already chronological because the table is sorted.
        let mut start = 0;
        while start < indices.len() {
            let stamp = rows[indices[start]].submitted_at;
            let mut end = start;
            while end + 1 < indices.len() && rows[indices[end + 1]].submitted_at == stamp {
                end += 1;
            }
            let average = (start + end + 2) as f64 / 2.0;
            for &index in &indices[start..=end] {
                ranks[index] = average.trunc() as usize;
            }
            start = end + 1;
        }
    }
    ranks
}

/// Title x attempt-rank grid of summed corrected mistakes.
#[derive(Debug, Clone, PartialEq)]
pub struct MistakePivot {
    pub titles: Vec<String>,
    pub attempts: Vec<usize>,
    pub cells: Vec<Vec<i64>>,
}

impl MistakePivot {
    pub fn max_cell(&self) -> i64 {
        self.cells.iter().flatten().copied().max().unwrap_or(0)
    }

    pub fn min_cell(&self) -> i64 {
        self.cells.iter().flatten().copied().min().unwrap_or(0)
    }
}

pub fn mistake_pivot(table: &NormalizedTable) -> MistakePivot {
    let ranks = attempt_ranks(table);
    let mut sums: BTreeMap<(&str, usize), i64> = BTreeMap::new();
    for (row, rank) in table.rows().iter().zip(ranks.iter().copied()) {
        let sum = sums.entry((row.title.as_str(), rank)).or_insert(0);
        *sum = sum.saturating_add(row.mistakes_corrected);
    }

    let titles: Vec<String> = sums
        .keys()
        .map(|(title, _)| title.to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let attempts: Vec<usize> = sums
        .keys()
        .map(|(_, rank)| *rank)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let cells = titles
        .iter()
        .map(|title| {
            attempts
                .iter()
                .map(|rank| sums.get(&(title.as_str(), *rank)).copied().unwrap_or(0))
                .collect()
        })
        .collect();

    MistakePivot {
        titles,
        attempts,
        cells,
    }
}

/// Counts per pie bucket. Scores outside [0, 100] are left out.
pub fn score_range_counts(table: &NormalizedTable) -> BTreeMap<ScoreRange, usize> {
    let mut counts: BTreeMap<ScoreRange, usize> =
        ScoreRange::ALL.iter().map(|range| (*range, 0)).collect();
    let mut skipped = 0usize;

    for row in table.rows() {
        match ScoreRange::classify(row.score) {
            Some(range) => *counts.entry(range).or_insert(0) += 1,
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        tracing::warn!(skipped, "scores outside 0-100 left out of the range breakdown");
    }
    counts
}

/// Per-topic attempt summary, in title order.
pub fn summarize_topics(insights: &InsightSet) -> Vec<TopicSummary> {
    insights
        .score_progression
        .iter()
        .filter_map(|(title, scores)| {
            let first = *scores.first()?;
            let latest = *scores.last()?;
            Some(TopicSummary {
                title: title.clone(),
                attempts: scores.len(),
                avg_score: scores.iter().sum::<f64>() / scores.len() as f64,
                latest_score: latest,
                change: latest - first,
            })
        })
        .collect()
}
