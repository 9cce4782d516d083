use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tracing::debug;

use ollama_runner::messages::ChatMessage;
use ollama_runner::{ChatRunnerTrait, OllamaRunner};

use crate::config::{Overrides, TaskConfig};
use crate::dataset::{DatasetEntry, DatasetLoader, HellaswagContent};
use crate::extract;
use crate::progress::ProgressTracker;
use crate::stats::{Outcome, Tally};
use crate::util::format_indexed_options;
use crate::writer::{report_stem, JsonReportWriter};

const SYSTEM_PROMPT: &str = "You are given an unfinished sentence and four possible endings, numbered 0 to 3. \
Pick the ending that makes the most sense. Reply with the number of the best ending only.";

struct HellaswagPromptBuilder;

impl HellaswagPromptBuilder {
    fn few_shot() -> Vec<ChatMessage> {
        vec![
            ChatMessage::user(
                "Context: A woman is outside with a bucket and a dog. The dog is running around trying to avoid a bath. She...\n\
                 Endings:\n\
                 [0] rinses the bucket off with soap and blow dries the dog.\n\
                 [1] uses a hose to keep the dog from getting soapy.\n\
                 [2] gets the dog wet, then it runs away again.\n\
                 [3] gets into the bath with the dog.\n\
                 Best ending:",
            ),
            ChatMessage::assistant("2"),
            ChatMessage::user(
                "Context: A man sits at a piano on a stage. He finishes the piece and...\n\
                 Endings:\n\
                 [0] throws the piano into the audience.\n\
                 [1] starts eating the sheet music.\n\
                 [2] stands up and bows as the audience applauds.\n\
                 [3] climbs inside the piano.\n\
                 Best ending:",
            ),
            ChatMessage::assistant("2"),
        ]
    }

    fn build_messages(&self, entry: &DatasetEntry<HellaswagContent>) -> Vec<ChatMessage> {
        let user_prompt = format!(
            "Context: {}\nEndings:\n{}\nBest ending:",
            entry.content.context,
            format_indexed_options(&entry.content.endings)
        );

        let mut messages = vec![ChatMessage::system(SYSTEM_PROMPT)];
        messages.extend(Self::few_shot());
        messages.push(ChatMessage::user(user_prompt));
        messages
    }
}

#[derive(Serialize)]
struct HellaswagRecord {
    id: usize,
    context: String,
    ground_truth_index: usize,
    ground_truth_text: String,
    prediction: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    prediction_text: Option<String>,
    correct: bool,
    full_response: String,
}

pub fn run_hellaswag(overrides: &Overrides) -> Result<()> {
    let config = TaskConfig::hellaswag().with_overrides(overrides);

    let loader = DatasetLoader::<HellaswagContent>::new(
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
    entries: &[DatasetEntry<HellaswagContent>],
    config: &TaskConfig,
) -> Result<PathBuf> {
    debug!("Running HellaSwag over {} questions", entries.len());

    let prompt_builder = HellaswagPromptBuilder;
    let mut progress = ProgressTracker::new(entries.len());
    let mut tally = Tally::new();

    let stem = report_stem(&config.output.file_prefix, config.chat.temperature, None);
    let mut writer = JsonReportWriter::new(&config.output, stem)?;

    for (idx, entry) in entries.iter().enumerate() {
        let messages = prompt_builder.build_messages(entry);

        let (content, latency, tokens) = match runner.chat(&messages) {
            Ok(outcome) => (outcome.content, outcome.latency, outcome.eval_count),
            Err(err) => {
                debug!("Chat request failed: {}", err);
                (String::new(), Duration::from_secs(0), 0)
            }
        };

        let truth = entry.content.label;
        let parsed = extract::option_index(&content, entry.content.endings.len());
        let (prediction, prediction_text, outcome) = match parsed {
            Some(index) if index == truth => (
                index.to_string(),
                Some(entry.content.endings[index].clone()),
                Outcome::Correct,
            ),
            Some(index) => (
                index.to_string(),
                Some(entry.content.endings[index].clone()),
                Outcome::Incorrect,
            ),
            None => ("INVALID".to_string(), None, Outcome::Invalid),
        };

        tally.record(&prediction, outcome, None, latency, tokens);
        writer.add_record(&HellaswagRecord {
            id: idx + 1,
            context: entry.content.context.clone(),
            ground_truth_index: truth,
            ground_truth_text: entry.content.endings[truth].clone(),
            prediction,
            prediction_text,
            correct: outcome == Outcome::Correct,
            full_response: content,
        })?;

        progress.add_tokens(tokens);
        progress.update(format!("Q{}", idx + 1));
    }

    let summary = tally.summary();
    let path = writer.close(&config.chat.model, config.chat.temperature, &summary)?;
    progress.finish("HellaSwag complete!");

    println!("Accuracy:     {:.2}% ({}/{})", summary.accuracy_pct, summary.correct, summary.total);
    println!("Distribution: {:?}", summary.distribution);
    println!("Saved log:    {}", path.display());

    Ok(path)
}
