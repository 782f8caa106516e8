use std::path::{Path, PathBuf};

use anyhow::Context;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod charts;
mod error;
mod insights;
mod models;
mod narrative;
mod normalize;
mod pipeline;
mod report;

use narrative::{ChatCompletionsNarrator, NarrativeGenerator, NarratorConfig};

#[derive(Parser)]
#[command(name = "quiz-insights")]
#[command(about = "Performance insights and charts from a learner's quiz history", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the full insight response as JSON
    Analyze {
        #[arg(long)]
        input: PathBuf,
        /// Write the JSON here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
        #[command(flatten)]
        narrative: NarrativeArgs,
    },
    /// Generate a markdown report with embedded charts
    Report {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
        #[command(flatten)]
        narrative: NarrativeArgs,
    },
    /// Print the coaching prompt without calling the text-generation service
    Prompt {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value = narrative::DEFAULT_EXAM)]
        exam: String,
    },
    /// Write each chart as a PNG file
    Charts {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value = "charts")]
        out_dir: PathBuf,
    },
}

#[derive(Args)]
struct NarrativeArgs {
    /// Skip the coaching narrative (no API key needed)
    #[arg(long)]
    no_narrative: bool,
    /// Exam the coaching text projects results for
    #[arg(long, default_value = narrative::DEFAULT_EXAM)]
    exam: String,
    #[arg(long, default_value = narrative::DEFAULT_MODEL)]
    model: String,
}

impl NarrativeArgs {
    fn narrator(&self) -> Option<ChatCompletionsNarrator> {
        if self.no_narrative {
            return None;
        }
        connect(NarratorConfig::from_env(&self.model))
    }
}

/// A narrator that cannot be set up leaves the narrative empty, the same as
/// one that fails mid-request.
fn connect(config: anyhow::Result<NarratorConfig>) -> Option<ChatCompletionsNarrator> {
    match config.and_then(ChatCompletionsNarrator::new) {
        Ok(narrator) => Some(narrator),
        Err(err) => {
            tracing::warn!(error = %format!("{err:#}"), "continuing without coaching narrative");
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            input,
            out,
            narrative,
        } => {
            let narrator = narrative.narrator();
            let analysis = analyze_file(&input).await?;
            let text = report::narrate(
                &analysis.insights,
                narrator.as_ref().map(|n| n as &dyn NarrativeGenerator),
                &narrative.exam,
            )
            .await;
            let response = report::build_response(&analysis, text);
            let json = serde_json::to_string_pretty(&response)?;

            match out {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("Insights written to {}.", path.display());
                }
                None => println!("{json}"),
            }
        }
        Commands::Report {
            input,
            out,
            narrative,
        } => {
            let narrator = narrative.narrator();
            let analysis = analyze_file(&input).await?;
            let text = report::narrate(
                &analysis.insights,
                narrator.as_ref().map(|n| n as &dyn NarrativeGenerator),
                &narrative.exam,
            )
            .await;
            let report = report::build_report(&analysis, text.as_deref());
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Prompt { input, exam } => {
            let payload = read_payload(&input)?;
            let table = normalize::normalize_payload(&payload)?;
            let insights = insights::generate_insights(&table)?;
            println!("{}", narrative::build_prompt(&insights, &exam));
        }
        Commands::Charts { input, out_dir } => {
            let analysis = analyze_file(&input).await?;
            std::fs::create_dir_all(&out_dir)
                .with_context(|| format!("failed to create {}", out_dir.display()))?;

            let mut written = 0usize;
            for kind in charts::ChartKind::ALL {
                let Some(image) = analysis.chart(kind) else {
                    continue;
                };
                let path = out_dir.join(format!("{}.png", kind.key()));
                let bytes = STANDARD.decode(image)?;
                std::fs::write(&path, bytes)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                written += 1;
            }
            println!("Wrote {written} charts to {}.", out_dir.display());
        }
    }

    Ok(())
}

fn read_payload(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

async fn analyze_file(path: &Path) -> anyhow::Result<pipeline::Analysis> {
    let payload = read_payload(path)?;
    let analysis = pipeline::analyze_payload(&payload)
        .await
        .with_context(|| format!("could not analyse {}", path.display()))?;
    for (kind, err) in analysis.failed_charts() {
        tracing::warn!(chart = kind.key(), error = %err, "chart left out of the output");
    }
    Ok(analysis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_analyze_flags() {
        let cli = Cli::try_parse_from([
            "quiz-insights",
            "analyze",
            "--input",
            "history.json",
            "--no-narrative",
            "--exam",
            "JEE",
        ])
        .unwrap();
        match cli.command {
            Commands::Analyze {
                input,
                out,
                narrative,
            } => {
                assert_eq!(input, PathBuf::from("history.json"));
                assert!(out.is_none());
                assert!(narrative.no_narrative);
                assert_eq!(narrative.exam, "JEE");
                assert_eq!(narrative.model, narrative::DEFAULT_MODEL);
                assert!(narrative.narrator().is_none());
            }
            _ => panic!("expected analyze"),
        }
    }

    #[test]
    fn missing_api_key_skips_narrative() {
        let missing = Err(anyhow::anyhow!("OPENAI_API_KEY must be set"));
        assert!(connect(missing).is_none());
    }

    #[test]
    fn configured_narrator_connects() {
        let config = NarratorConfig {
            api_key: "test".to_string(),
            base_url: narrative::DEFAULT_BASE_URL.to_string(),
            model: narrative::DEFAULT_MODEL.to_string(),
        };
        assert!(connect(Ok(config)).is_some());
    }
}
