use std::fmt::Write;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::InsightSet;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_EXAM: &str = "NEET";
const TEMPERATURE: f32 = 0.1;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Turns an insight prompt into free-form coaching text.
#[async_trait]
pub trait NarrativeGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> anyhow::Result<String>;
}

/// Build the tutor prompt. The output depends only on `insights` and `exam`.
pub fn build_prompt(insights: &InsightSet, exam: &str) -> String {
    let progression = insights
        .score_progression
        .iter()
        .map(|(title, scores)| {
            let scores: Vec<String> = scores.iter().map(|score| score.to_string()).collect();
            format!("{title}: [{}]", scores.join(", "))
        })
        .collect::<Vec<_>>()
        .join("; ");
    let trend = insights
        .score_trend
        .iter()
        .map(|(at, mean)| format!("{}: {mean:.2}", at.format("%Y-%m-%d %H:%M:%S")))
        .collect::<Vec<_>>()
        .join("; ");

    let mut prompt = String::new();
    let _ = writeln!(
        prompt,
        "You are an AI tutor analysing a student's quiz performance data. Based on the following insights:"
    );
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "1. Total Quizzes: {}", insights.total_quizzes);
    let _ = writeln!(prompt, "2. Average Score: {:.2}", insights.avg_score);
    let _ = writeln!(prompt, "3. Score Progression by Topic (Title): {progression}");
    let _ = writeln!(prompt, "4. Score Trend Over Time: {trend}");
    let _ = writeln!(prompt);
    let _ = writeln!(
        prompt,
        "Please provide a short, clear, and encouraging response. Focus on:"
    );
    let _ = writeln!(
        prompt,
        "- The student's strengths, weaknesses and areas of improvement, in a positive tone."
    );
    let _ = writeln!(prompt, "- Key insights that will help them improve future performance.");
    let _ = writeln!(prompt, "- Performance gaps between topics.");
    let _ = writeln!(
        prompt,
        "- Actionable next steps such as topics, question types or difficulty levels to focus on."
    );
    let _ = writeln!(prompt, "- The student persona suggested by patterns in the data.");
    let _ = writeln!(
        prompt,
        "- The result the student might expect in the {exam} exam based on these insights."
    );
    let _ = writeln!(
        prompt,
        "- Keep it to a few bullet points and make important words **bold**."
    );
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "Keep the language simple and motivational.");
    prompt
}

#[derive(Debug, Clone)]
pub struct NarratorConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl NarratorConfig {
    /// Read `OPENAI_API_KEY` and the optional `OPENAI_BASE_URL`.
    pub fn from_env(model: &str) -> anyhow::Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .context("OPENAI_API_KEY must be set to generate coaching text (or pass --no-narrative)")?;
        let base_url =
            std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Ok(Self {
            api_key,
            base_url,
            model: model.to_string(),
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

impl ChatResponse {
    fn into_content(self) -> anyhow::Result<String> {
        self.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .context("chat completion returned no choices")
    }
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct ChatCompletionsNarrator {
    client: reqwest::Client,
    config: NarratorConfig,
}

impl ChatCompletionsNarrator {
    pub fn new(config: NarratorConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl NarrativeGenerator for ChatCompletionsNarrator {
    async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: TEMPERATURE,
        };

        tracing::info!(model = %self.config.model, "requesting coaching narrative");
        let response: ChatResponse = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .context("chat completion request failed")?
            .error_for_status()
            .context("chat completion returned an error status")?
            .json()
            .await
            .context("chat completion response was not valid JSON")?;

        response.into_content()
    }
}
