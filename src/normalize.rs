use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::error::InsightError;
use crate::models::{NormalizedTable, Submission, SubmissionRecord};

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Decode a raw upload (UTF-8 JSON array of submissions) into a sorted table.
pub fn normalize_payload(payload: &[u8]) -> Result<NormalizedTable, InsightError> {
    let text = std::str::from_utf8(payload)
        .map_err(|err| InsightError::malformed(format!("payload is not UTF-8: {err}")))?;
    let records: Vec<SubmissionRecord> = serde_json::from_str(text)
        .map_err(|err| InsightError::malformed(format!("payload is not a submission list: {err}")))?;
    normalize_records(records)
}

pub fn normalize_records(records: Vec<SubmissionRecord>) -> Result<NormalizedTable, InsightError> {
    let mut rows = Vec::with_capacity(records.len());

    for (index, record) in records.into_iter().enumerate() {
        rows.push(project(index, record)?);
    }

    // Vec::sort_by_key is stable, so equal timestamps keep upload order.
    rows.sort_by_key(|row| row.submitted_at);
    tracing::debug!(rows = rows.len(), "normalized submissions");
    Ok(NormalizedTable::from_sorted(rows))
}

fn project(index: usize, record: SubmissionRecord) -> Result<Submission, InsightError> {
    let title = record
        .quiz
        .and_then(|quiz| quiz.title)
        .filter(|title| !title.trim().is_empty())
        .ok_or_else(|| InsightError::malformed(format!("record {index}: missing quiz.title")))?;
    let score = record
        .score
        .ok_or_else(|| InsightError::malformed(format!("record {index}: missing score")))?;
    let raw_timestamp = record
        .submitted_at
        .ok_or_else(|| InsightError::malformed(format!("record {index}: missing submitted_at")))?;
    let submitted_at = parse_timestamp(&raw_timestamp).ok_or_else(|| {
        InsightError::malformed(format!(
            "record {index}: unparseable submitted_at {raw_timestamp:?}"
        ))
    })?;

    Ok(Submission {
        title,
        score,
        mistakes_corrected: record.mistakes_corrected.unwrap_or(0),
        submitted_at,
    })
}

/// Parse a timestamp at the resolution it was given. Offsets are folded into UTC.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.naive_utc());
    }

    for format in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(parsed);
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}
