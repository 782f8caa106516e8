use std::collections::BTreeMap;
use std::fmt::Write;

use serde::Serialize;

use crate::charts::ChartKind;
use crate::insights::{score_range_counts, summarize_topics};
use crate::models::{InsightSet, ScoreRange};
use crate::narrative::{build_prompt, NarrativeGenerator};
use crate::pipeline::Analysis;

/// The response document: insights, coaching text and one field per chart.
#[derive(Debug, Serialize)]
pub struct InsightResponse {
    pub insights: InsightSet,
    pub natural_response: Option<String>,
    #[serde(flatten)]
    pub charts: BTreeMap<&'static str, Option<String>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub chart_errors: BTreeMap<&'static str, String>,
}

/// Ask `narrator` (if any) for coaching text. A failed call is logged and
/// leaves the narrative empty so the computed insights still go out.
pub async fn narrate(
    insights: &InsightSet,
    narrator: Option<&dyn NarrativeGenerator>,
    exam: &str,
) -> Option<String> {
    let narrator = narrator?;
    let prompt = build_prompt(insights, exam);
    match narrator.generate(&prompt).await {
        Ok(text) => Some(text),
        Err(err) => {
            tracing::warn!(error = %format!("{err:#}"), "coaching narrative unavailable");
            None
        }
    }
}

pub fn build_response(analysis: &Analysis, natural_response: Option<String>) -> InsightResponse {
    let charts = ChartKind::ALL
        .into_iter()
        .map(|kind| (kind.key(), analysis.chart(kind).map(str::to_string)))
        .collect();
    let chart_errors = analysis
        .failed_charts()
        .map(|(kind, err)| (kind.key(), err.to_string()))
        .collect();

    InsightResponse {
        insights: analysis.insights.clone(),
        natural_response,
        charts,
        chart_errors,
    }
}

pub fn build_report(analysis: &Analysis, natural_response: Option<&str>) -> String {
    let insights = &analysis.insights;
    let rows = analysis.table.rows();
    let mut topics = summarize_topics(insights);
    topics.sort_by(|a, b| {
        b.avg_score
            .partial_cmp(&a.avg_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut output = String::new();
    let _ = writeln!(output, "# Quiz Performance Report");
    if let (Some(first), Some(last)) = (rows.first(), rows.last()) {
        let _ = writeln!(
            output,
            "Generated from {} submissions between {} and {}",
            rows.len(),
            first.submitted_at.date(),
            last.submitted_at.date()
        );
    }
    let _ = writeln!(output);
    let _ = writeln!(output, "## Overview");
    let _ = writeln!(output, "- Quizzes taken: {}", insights.total_quizzes);
    let _ = writeln!(output, "- Average score: {:.2}", insights.avg_score);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Topics");
    for topic in &topics {
        let _ = writeln!(
            output,
            "- {}: {} attempts (avg {:.1}, latest {:.1}, change {:+.1})",
            topic.title, topic.attempts, topic.avg_score, topic.latest_score, topic.change
        );
    }

    let counts = score_range_counts(&analysis.table);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Score Ranges");
    for range in ScoreRange::ALL {
        let _ = writeln!(
            output,
            "- {}: {}",
            range.label(),
            counts.get(&range).copied().unwrap_or(0)
        );
    }

    if let Some(text) = natural_response {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Coaching");
        let _ = writeln!(output, "{}", text.trim());
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Charts");
    for kind in ChartKind::ALL {
        let _ = writeln!(output);
        let _ = writeln!(output, "### {}", kind.title());
        match analysis.charts.get(&kind) {
            Some(Ok(image)) => {
                let _ = writeln!(
                    output,
                    "![{}](data:image/png;base64,{})",
                    kind.title(),
                    image
                );
            }
            Some(Err(err)) => {
                let _ = writeln!(output, "_Chart unavailable: {err}_");
            }
            None => {
                let _ = writeln!(output, "_Chart unavailable_");
            }
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InsightError;
    use crate::pipeline::analyze_payload;
    use async_trait::async_trait;

    const HISTORY: &[u8] = br#"[
        {"quiz": {"title": "Algebra"}, "score": 70, "mistakes_corrected": 2, "submitted_at": "2024-01-02"},
        {"quiz": {"title": "Algebra"}, "score": 90, "mistakes_corrected": 1, "submitted_at": "2024-01-01"},
        {"quiz": {"title": "Optics"}, "score": 45, "mistakes_corrected": 4, "submitted_at": "2024-01-05"}
    ]"#;

    struct CannedNarrator(&'static str);

    #[async_trait]
    impl NarrativeGenerator for CannedNarrator {
        async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
            assert!(prompt.contains("Total Quizzes: 2"));
            Ok(self.0.to_string())
        }
    }

    struct OfflineNarrator;

    #[async_trait]
    impl NarrativeGenerator for OfflineNarrator {
        async fn generate(&self, _prompt: &str) -> anyhow::Result<String> {
            anyhow::bail!("connection refused")
        }
    }

    #[tokio::test]
    async fn response_carries_insights_charts_and_narrative() {
        let analysis = analyze_payload(HISTORY).await.unwrap();
        let narrator = CannedNarrator("Keep going!");
        let narrative = narrate(&analysis.insights, Some(&narrator), "NEET").await;
        let response = build_response(&analysis, narrative);

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["natural_response"], "Keep going!");
        assert_eq!(value["insights"]["total_quizzes"], 2);
        assert_eq!(value["insights"]["score_progression"]["Algebra"][0], 90.0);
        assert_eq!(value["insights"]["score_trend"]["2024-01-01T00:00:00"], 90.0);
        for kind in ChartKind::ALL {
            assert!(value[kind.key()].as_str().is_some_and(|image| !image.is_empty()));
        }
        assert!(value.get("chart_errors").is_none());
    }

    #[tokio::test]
    async fn narrator_failure_keeps_insights() {
        let analysis = analyze_payload(HISTORY).await.unwrap();
        let narrative = narrate(&analysis.insights, Some(&OfflineNarrator), "NEET").await;
        assert!(narrative.is_none());
        assert!(narrate(&analysis.insights, None, "NEET").await.is_none());

        let value = serde_json::to_value(build_response(&analysis, narrative)).unwrap();
        assert!(value["natural_response"].is_null());
    }

    #[tokio::test]
    async fn failed_chart_is_null_with_error() {
        let mut analysis = analyze_payload(HISTORY).await.unwrap();
        analysis.charts.insert(
            ChartKind::ScoreTrend,
            Err(InsightError::render(ChartKind::ScoreTrend.key(), "boom")),
        );

        let value = serde_json::to_value(build_response(&analysis, None)).unwrap();
        assert!(value["score_trend_chart"].is_null());
        assert!(value["chart_errors"]["score_trend_chart"]
            .as_str()
            .unwrap()
            .contains("boom"));
    }

    #[tokio::test]
    async fn report_lists_topics_and_embeds_charts() {
        let analysis = analyze_payload(HISTORY).await.unwrap();
        let report = build_report(&analysis, Some("**Well done**"));

        assert!(report.contains("Generated from 3 submissions between 2024-01-01 and 2024-01-05"));
        assert!(report.contains("- Average score: 68.33"));
        let algebra = report.find("- Algebra: 2 attempts").unwrap();
        let optics = report.find("- Optics: 1 attempts").unwrap();
        assert!(algebra < optics);
        assert!(report.contains("change -20.0"));
        assert!(report.contains("- Average (40-60): 1"));
        assert!(report.contains("## Coaching\n**Well done**"));
        assert_eq!(report.matches("data:image/png;base64,").count(), 6);
    }
}
