use thiserror::Error;

/// Failures surfaced by the insight pipeline.
#[derive(Debug, Error)]
pub enum InsightError {
    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("no submissions to analyse")]
    EmptyDataset,

    #[error("failed to render {chart}: {message}")]
    Render { chart: &'static str, message: String },
}

impl InsightError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedInput(message.into())
    }

    pub fn render(chart: &'static str, message: impl Into<String>) -> Self {
        Self::Render {
            chart,
            message: message.into(),
        }
    }
}
