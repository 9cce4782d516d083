use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tracing::debug;

use ollama_runner::messages::ChatMessage;
use ollama_runner::{ChatRunnerTrait, OllamaRunner};

use crate::config::{Overrides, TaskConfig};
use crate::dataset::{DatasetEntry, DatasetLoader, Gsm8kContent};
use crate::extract;
use crate::progress::ProgressTracker;
use crate::stats::{Outcome, Tally};
use crate::writer::{report_stem, JsonReportWriter};

const SYSTEM_PROMPT: &str = "You are a careful math tutor. Solve the problem step by step, \
then write the final line exactly as '#### <number>'.";

struct Gsm8kPromptBuilder;

impl Gsm8kPromptBuilder {
    fn few_shot() -> Vec<ChatMessage> {
        vec![
            ChatMessage::user(
                "Question: There are 15 trees in the grove. Grove workers will plant trees in the grove today. \
                 After they are done, there will be 21 trees. How many trees did the grove workers plant today?",
            ),
            ChatMessage::assistant(
                "There are 15 trees originally. Then there were 21 trees after some more were planted. \
                 So there must have been 21 - 15 = 6.\n#### 6",
            ),
            ChatMessage::user(
                "Question: If there are 3 cars in the parking lot and 2 more cars arrive, \
                 how many cars are in the parking lot?",
            ),
            ChatMessage::assistant(
                "There are originally 3 cars. 2 more cars arrive. 3 + 2 = 5.\n#### 5",
            ),
            ChatMessage::user(
                "Question: Leah had 32 chocolates and her sister had 42. If they ate 35, \
                 how many pieces do they have left in total?",
            ),
            ChatMessage::assistant(
                "Originally, Leah had 32 chocolates. Her sister had 42. So in total they had 32 + 42 = 74. \
                 After eating 35, they had 74 - 35 = 39.\n#### 39",
            ),
        ]
    }

    fn build_messages(&self, entry: &DatasetEntry<Gsm8kContent>) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(SYSTEM_PROMPT)];
        messages.extend(Self::few_shot());
        messages.push(ChatMessage::user(format!("Question: {}", entry.content.question)));
        messages
    }
}

#[derive(Serialize)]
struct Gsm8kRecord {
    id: usize,
    question: String,
    truth: String,
    prediction: String,
    correct: bool,
    latency_seconds: f64,
    tokens_per_second: f64,
    full_response: String,
}

pub fn run_gsm8k(overrides: &Overrides) -> Result<()> {
    let config = TaskConfig::gsm8k().with_overrides(overrides);

    let loader = DatasetLoader::<Gsm8kContent>::new(
        &config.data.dataset_path,
        &config.data.dataset_url,
    );
    let entries = loader.load_or_download(config.data.limit, config.data.start_from)?;

    let runner = OllamaRunner::new(config.chat.to_ollama_config());
    evaluate(&runner, &entries, &config)?;
    Ok(())
}

fn evaluate<R: ChatRunnerTrait>(
    runner: &R,
    entries: &[DatasetEntry<Gsm8kContent>],
    config: &TaskConfig,
) -> Result<PathBuf> {
    debug!("Running GSM8K over {} questions", entries.len());

    let prompt_builder = Gsm8kPromptBuilder;
    let mut progress = ProgressTracker::new(entries.len());
    let mut tally = Tally::new();

    let stem = report_stem(&config.output.file_prefix, config.chat.temperature, None);
    let mut writer = JsonReportWriter::new(&config.output, stem)?;

    for (idx, entry) in entries.iter().enumerate() {
        let messages = prompt_builder.build_messages(entry);

        let (content, latency, tokens, tps) = match runner.chat(&messages) {
            Ok(outcome) => {
                let tps = outcome.tokens_per_second();
                (outcome.content, outcome.latency, outcome.eval_count, tps)
            }
            Err(err) => {
                debug!("Chat request failed: {}", err);
                (String::new(), Duration::from_secs(0), 0, 0.0)
            }
        };

        // Both sides go through the same numeric normalization so "6"
        // matches "6.0" and "1,000" matches "1000".
        let truth = extract::final_number(&entry.content.ground_truth())
            .and_then(|n| extract::normalize_number(&n))
            .unwrap_or_else(|| entry.content.ground_truth().trim().to_string());

        let parsed = extract::final_number(&content).and_then(|n| extract::normalize_number(&n));
        let (prediction, outcome) = match parsed {
            Some(normalized) if normalized == truth => (normalized, Outcome::Correct),
            Some(normalized) => (normalized, Outcome::Incorrect),
            None => ("INVALID".to_string(), Outcome::Invalid),
        };

        tally.record(&prediction, outcome, None, latency, tokens);
        writer.add_record(&Gsm8kRecord {
            id: idx + 1,
            question: entry.content.question.clone(),
            truth,
            prediction,
            correct: outcome == Outcome::Correct,
            latency_seconds: latency.as_secs_f64(),
            tokens_per_second: tps,
            full_response: content,
        })?;

        progress.add_tokens(tokens);
        progress.update(format!("Q{}", idx + 1));
    }

    let summary = tally.summary();
    let path = writer.close(&config.chat.model, config.chat.temperature, &summary)?;
    progress.finish("GSM8K complete!");

    println!("Accuracy:     {:.2}% ({}/{})", summary.accuracy_pct, summary.correct, summary.total);
    println!("Avg latency:  {:.2}s", summary.avg_latency_seconds);
    println!("Distribution: {:?}", summary.distribution);
    println!("Saved log:    {}", path.display());

    Ok(path)
}
