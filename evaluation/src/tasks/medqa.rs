use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tracing::debug;

use ollama_runner::messages::ChatMessage;
use ollama_runner::{ChatRunnerTrait, OllamaRunner};

use crate::config::{Overrides, TaskConfig};
use crate::dataset::{DatasetEntry, DatasetLoader, UsmleContent};
use crate::extract;
use crate::progress::ProgressTracker;
use crate::stats::{Outcome, Tally};
use crate::util::format_lettered_options;
use crate::writer::{report_stem, JsonReportWriter};

const ANSWER_FORMAT: &str = "Answer the question using the following format:\n\
Reasoning: [Step-by-step logic]\n\
Answer: [Option Letter]";

struct MedQaPromptBuilder;

impl MedQaPromptBuilder {
    /// Chain-of-thought worked example shown before the real question.
    fn cot_example() -> Vec<ChatMessage> {
        vec![
            ChatMessage::user(format!(
                "Question: A 65-year-old man presents with sudden severe tearing chest pain radiating to the back. \
                 BP is 180/110 right arm, 130/70 left arm. Best diagnostic step?\n\
                 Options:\n(A) Echo\n(B) CT Angiography\n(C) MRI\n(D) Coronary Angio\n{}",
                ANSWER_FORMAT
            )),
            ChatMessage::assistant(
                "Reasoning: The patient describes 'tearing' chest pain radiating to the back, which is classic for aortic dissection. \
                 The blood pressure discrepancy between arms further supports this. \
                 Coronary angiography is for heart attacks (MI). MRI is too slow for an emergency. \
                 CT Angiography is the gold standard for diagnosing aortic dissection in a stable patient.\n\
                 Answer: B",
            ),
        ]
    }

    fn build_messages(&self, entry: &DatasetEntry<UsmleContent>) -> Vec<ChatMessage> {
        let user_prompt = format!(
            "Question: {}\nOptions:\n{}\n{}",
            entry.content.question,
            format_lettered_options(&entry.content.options),
            ANSWER_FORMAT
        );

        let mut messages = Self::cot_example();
        messages.push(ChatMessage::user(user_prompt));
        messages
    }
}

#[derive(Serialize)]
struct MedQaRecord {
    id: usize,
    question: String,
    truth: String,
    prediction: String,
    correct: bool,
    latency_seconds: f64,
    tokens_per_second: f64,
    full_response: String,
}

pub fn run_medqa(overrides: &Overrides) -> Result<()> {
    let config = TaskConfig::medqa().with_overrides(overrides);

    let loader = DatasetLoader::<UsmleContent>::new(
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
    entries: &[DatasetEntry<UsmleContent>],
    config: &TaskConfig,
) -> Result<PathBuf> {
    debug!("Running MedQA (CoT) over {} questions", entries.len());

    let prompt_builder = MedQaPromptBuilder;
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

        let (prediction, outcome) = match extract::answer_letter(&content, 4) {
            Some(letter) if letter.to_string() == entry.content.answer_letter => {
                (letter.to_string(), Outcome::Correct)
            }
            Some(letter) => (letter.to_string(), Outcome::Incorrect),
            None => ("INVALID".to_string(), Outcome::Invalid),
        };

        tally.record(&prediction, outcome, None, latency, tokens);
        writer.add_record(&MedQaRecord {
            id: idx + 1,
            question: entry.content.question.clone(),
            truth: entry.content.answer_letter.clone(),
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
    progress.finish("MedQA complete!");

    println!("Accuracy:     {:.2}% ({}/{})", summary.accuracy_pct, summary.correct, summary.total);
    println!("Avg latency:  {:.2}s", summary.avg_latency_seconds);
    println!("Distribution: {:?}", summary.distribution);
    println!("Saved log:    {}", path.display());

    Ok(path)
}
