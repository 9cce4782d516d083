use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, warn};

use ollama_runner::messages::ChatMessage;
use ollama_runner::{ChatRunnerTrait, OllamaRunner};

use crate::config::{Overrides, TaskConfig};
use crate::dataset::{DatasetEntry, DatasetLoader, MmluContent};
use crate::extract;
use crate::progress::ProgressTracker;
use crate::stats::{Outcome, Tally};
use crate::util::format_lettered_options;
use crate::writer::{report_stem, JsonReportWriter};

/// Medical subsets combined into one "Medical MMLU" run.
const MEDICAL_SUBSETS: &[&str] = &[
    "clinical_knowledge",
    "medical_genetics",
    "anatomy",
    "professional_medicine",
    "college_biology",
];

const ANSWER_FORMAT: &str = "Answer the question using the following format:\n\
Reasoning: [Step-by-step logic]\n\
Answer: [Option Letter]";

struct MmluPromptBuilder;

impl MmluPromptBuilder {
    fn cot_example() -> Vec<ChatMessage> {
        vec![
            ChatMessage::user(format!(
                "Question: What is the primary mechanism of action of ibuprofen?\n\
                 Options:\n\
                 (A) Stimulation of mu-opioid receptors\n\
                 (B) Inhibition of cyclooxygenase (COX) enzymes\n\
                 (C) Blockade of sodium channels\n\
                 (D) Antagonism of H1 receptors\n{}",
                ANSWER_FORMAT
            )),
            ChatMessage::assistant(
                "Reasoning: Ibuprofen is a nonsteroidal anti-inflammatory drug (NSAID). \
                 NSAIDs work by inhibiting the cyclooxygenase (COX) enzymes, which converts arachidonic acid to prostaglandins. \
                 Opioids stimulate mu-receptors (A). Local anesthetics block sodium channels (C). Antihistamines block H1 (D). \
                 Therefore, the mechanism is COX inhibition.\n\
                 Answer: B",
            ),
        ]
    }

    fn build_messages(&self, entry: &DatasetEntry<MmluContent>) -> Vec<ChatMessage> {
        let user_prompt = format!(
            "Question: {}\nOptions:\n{}\n{}",
            entry.content.question,
            format_lettered_options(&entry.content.choices),
            ANSWER_FORMAT
        );

        let mut messages = Self::cot_example();
        messages.push(ChatMessage::user(user_prompt));
        messages
    }
}

#[derive(Serialize)]
struct MmluRecord {
    id: usize,
    subset: String,
    question: String,
    truth: String,
    prediction: String,
    correct: bool,
    full_response: String,
}

/// Load `limit` questions from each medical subset, tagging the source.
fn load_subsets(config: &TaskConfig) -> Result<Vec<DatasetEntry<MmluContent>>> {
    let mut all_entries = Vec::new();

    for subset in MEDICAL_SUBSETS.iter() {
        let path = config.data.dataset_path.replace("{subset}", subset);
        let url = config.data.dataset_url.replace("{subset}", subset);
        let loader = DatasetLoader::<MmluContent>::new(&path, &url);

        match loader.load_or_download(config.data.limit, config.data.start_from) {
            Ok(mut entries) => {
                for entry in entries.iter_mut() {
                    entry.content.subject = subset.to_string();
                }
                all_entries.extend(entries);
            }
            Err(err) => warn!("Failed to load subset {}: {}", subset, err),
        }
    }

    if all_entries.is_empty() {
        anyhow::bail!("No MMLU subsets could be loaded");
    }
    Ok(all_entries)
}

pub fn run_mmlu(overrides: &Overrides) -> Result<()> {
    let config = TaskConfig::mmlu().with_overrides(overrides);
    let entries = load_subsets(&config)?;

    let runner = OllamaRunner::new(config.chat.to_ollama_config());
    evaluate(&runner, &entries, &config)?;
    Ok(())
}

fn evaluate<R: ChatRunnerTrait>(
    runner: &R,
    entries: &[DatasetEntry<MmluContent>],
    config: &TaskConfig,
) -> Result<PathBuf> {
    debug!("Running MMLU (medical subsets) over {} questions", entries.len());

    let prompt_builder = MmluPromptBuilder;
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

        let truth = (b'A' + entry.content.answer_index as u8) as char;
        let (prediction, outcome) = match extract::answer_letter(&content, entry.content.choices.len()) {
            Some(letter) if letter == truth => (letter.to_string(), Outcome::Correct),
            Some(letter) => (letter.to_string(), Outcome::Incorrect),
            None => ("INVALID".to_string(), Outcome::Invalid),
        };

        tally.record(&prediction, outcome, None, latency, tokens);
        writer.add_record(&MmluRecord {
            id: idx + 1,
            subset: entry.content.subject.clone(),
            question: entry.content.question.clone(),
            truth: truth.to_string(),
            prediction,
            correct: outcome == Outcome::Correct,
            full_response: content,
        })?;

        progress.add_tokens(tokens);
        progress.update(format!("Q{} [{}]", idx + 1, entry.content.subject));
    }

    let summary = tally.summary();
    let path = writer.close(&config.chat.model, config.chat.temperature, &summary)?;
    progress.finish("MMLU complete!");

    println!("Accuracy:     {:.2}% ({}/{})", summary.accuracy_pct, summary.correct, summary.total);
    println!("Distribution: {:?}", summary.distribution);
    println!("Saved log:    {}", path.display());

    Ok(path)
}
