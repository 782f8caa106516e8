use std::collections::BTreeMap;
use std::sync::Arc;

use crate::charts::ChartKind;
use crate::error::InsightError;
use crate::insights::generate_insights;
use crate::models::{InsightSet, NormalizedTable};
use crate::normalize::normalize_payload;

/// Everything the core produces for one upload.
#[derive(Debug)]
pub struct Analysis {
    pub table: Arc<NormalizedTable>,
    pub insights: InsightSet,
    pub charts: BTreeMap<ChartKind, Result<String, InsightError>>,
}

impl Analysis {
    pub fn chart(&self, kind: ChartKind) -> Option<&str> {
        self.charts
            .get(&kind)
            .and_then(|result| result.as_ref().ok())
            .map(String::as_str)
    }

    pub fn failed_charts(&self) -> impl Iterator<Item = (ChartKind, &InsightError)> {
        self.charts
            .iter()
            .filter_map(|(kind, result)| result.as_ref().err().map(|err| (*kind, err)))
    }
}

pub async fn analyze_payload(payload: &[u8]) -> Result<Analysis, InsightError> {
    let table = normalize_payload(payload)?;
    analyze_table(table).await
}

/// Run the aggregator and all six renderers over one table. Renderers run on
/// the blocking pool; a failed renderer is recorded without cancelling the
/// others.
pub async fn analyze_table(table: NormalizedTable) -> Result<Analysis, InsightError> {
    if table.is_empty() {
        return Err(InsightError::EmptyDataset);
    }

    let table = Arc::new(table);
    tracing::info!(records = table.len(), "analysing submissions");

    let handles: Vec<_> = ChartKind::ALL
        .into_iter()
        .map(|kind| {
            let table = Arc::clone(&table);
            (kind, tokio::task::spawn_blocking(move || kind.render(&table)))
        })
        .collect();

    let insights = generate_insights(&table)?;

    let mut charts = BTreeMap::new();
    for (kind, handle) in handles {
        let result = match handle.await {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(chart = kind.key(), error = %err, "render task did not complete");
                Err(InsightError::render(kind.key(), format!("render task failed: {err}")))
            }
        };
        charts.insert(kind, result);
    }

    let failed = charts.values().filter(|result| result.is_err()).count();
    tracing::info!(
        total_quizzes = insights.total_quizzes,
        charts = charts.len() - failed,
        failed,
        "analysis complete"
    );

    Ok(Analysis {
        table,
        insights,
        charts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HISTORY: &[u8] = br#"[
        {"quiz": {"title": "Algebra"}, "score": 70, "mistakes_corrected": 2, "submitted_at": "2024-01-02"},
        {"quiz": {"title": "Algebra"}, "score": 90, "mistakes_corrected": 1, "submitted_at": "2024-01-01"},
        {"quiz": {"title": "Optics"}, "score": 58, "mistakes_corrected": 4, "submitted_at": "2024-01-03"}
    ]"#;

    #[tokio::test]
    async fn produces_insights_and_all_charts() {
        let analysis = analyze_payload(HISTORY).await.unwrap();
        assert_eq!(analysis.insights.total_quizzes, 2);
        assert_eq!(analysis.table.len(), 3);
        assert_eq!(analysis.charts.len(), ChartKind::ALL.len());
        for kind in ChartKind::ALL {
            assert!(analysis.chart(kind).is_some_and(|image| !image.is_empty()), "{kind:?}");
        }
        assert_eq!(analysis.failed_charts().count(), 0);
    }

    #[tokio::test]
    async fn empty_upload_is_rejected_before_rendering() {
        let err = analyze_payload(b"[]").await.unwrap_err();
        assert!(matches!(err, InsightError::EmptyDataset));
    }

    #[tokio::test]
    async fn malformed_upload_is_rejected() {
        let err = analyze_payload(br#"[{"score": 1}]"#).await.unwrap_err();
        assert!(matches!(err, InsightError::MalformedInput(_)));
    }
}
