use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tracing::debug;

use ollama_runner::messages::ChatMessage;
use ollama_runner::{ChatRunnerTrait, OllamaRunner};

use crate::config::{Overrides, TaskConfig};
use crate::dataset::{DatasetEntry, DatasetLoader, MmluProContent};
use crate::extract;
use crate::progress::ProgressTracker;
use crate::stats::{Outcome, Tally};
use crate::util::format_lettered_options;
use crate::writer::{report_stem, JsonReportWriter};

// MMLU-Pro questions carry up to ten options, so the answer letter runs A through J.
const ANSWER_FORMAT: &str = "Answer the question using the following format:\n\
Reasoning: [Step-by-step logic]\n\
Answer: [Option Letter]";

struct MmluProPromptBuilder;

impl MmluProPromptBuilder {
    fn cot_example() -> Vec<ChatMessage> {
        vec![
            ChatMessage::user(format!(
                "Question: A patient presents with severe pruritus after a hiking trip. Examination shows linear vesicles on the forearm. \
                 Which topical agent is most appropriate first-line therapy?\n\
                 Options:\n\
                 (A) Mupirocin\n\
                 (B) Hydrocortisone\n\
                 (C) Nystatin\n\
                 (D) Acyclovir\n\
                 (E) Ketoconazole\n\
                 (F) Bacitracin\n\
                 (G) Permethrin\n\
                 (H) Silver sulfadiazine\n\
                 (I) Tacrolimus\n\
                 (J) Clindamycin\n{}",
                ANSWER_FORMAT
            )),
            ChatMessage::assistant(
                "Reasoning: Linear vesicles after hiking are classic for allergic contact dermatitis from poison ivy. \
                 Contact dermatitis is an inflammatory reaction, so a topical corticosteroid is first line. \
                 Antibacterials (A, F, J), antifungals (C, E), antivirals (D), and antiparasitics (G) do not treat inflammation.\n\
                 Answer: B",
            ),
        ]
    }

    fn build_messages(&self, entry: &DatasetEntry<MmluProContent>) -> Vec<ChatMessage> {
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
struct MmluProRecord {
    id: usize,
    category: String,
    question: String,
    truth: String,
    prediction: String,
    correct: bool,
    full_response: String,
}

pub fn run_mmlu_pro(overrides: &Overrides, category: &str) -> Result<()> {
    let config = TaskConfig::mmlu_pro().with_overrides(overrides);

    let loader = DatasetLoader::<MmluProContent>::new(
        &config.data.dataset_path,
        &config.data.dataset_url,
    );
    // Filter before applying the question limit so the run covers `limit`
    // questions from the requested category, not from the whole file.
    let entries: Vec<_> = loader
        .load_or_download(None, config.data.start_from)?
        .into_iter()
        .filter(|e| e.content.category.eq_ignore_ascii_case(category))
        .take(config.data.limit.unwrap_or(usize::MAX))
        .collect();

    if entries.is_empty() {
        anyhow::bail!("No MMLU-Pro questions found for category '{}'", category);
    }

    let runner = OllamaRunner::new(config.chat.to_ollama_config());
    evaluate(&runner, &entries, &config)?;
    Ok(())
}

fn evaluate<R: ChatRunnerTrait>(
    runner: &R,
    entries: &[DatasetEntry<MmluProContent>],
    config: &TaskConfig,
) -> Result<PathBuf> {
    debug!("Running MMLU-Pro over {} questions", entries.len());

    let prompt_builder = MmluProPromptBuilder;
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
        let n_options = entry.content.options.len();
        let (prediction, outcome) = match extract::answer_letter(&content, n_options) {
            Some(letter) if letter == truth => (letter.to_string(), Outcome::Correct),
            Some(letter) => (letter.to_string(), Outcome::Incorrect),
            None => ("INVALID".to_string(), Outcome::Invalid),
        };

        tally.record(&prediction, outcome, None, latency, tokens);
        writer.add_record(&MmluProRecord {
            id: idx + 1,
            category: entry.content.category.clone(),
            question: entry.content.question.clone(),
            truth: truth.to_string(),
            prediction,
            correct: outcome == Outcome::Correct,
            full_response: content,
        })?;

        progress.add_tokens(tokens);
        progress.update(format!("Q{}", idx + 1));
    }

    let summary = tally.summary();
    let path = writer.close(&config.chat.model, config.chat.temperature, &summary)?;
    progress.finish("MMLU-Pro complete!");

    println!("Accuracy:     {:.2}% ({}/{})", summary.accuracy_pct, summary.correct, summary.total);
    println!("Distribution: {:?}", summary.distribution);
    println!("Saved log:    {}", path.display());

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ollama_runner::MockRunner;
    use serde_json::Value;
    use std::fs::File;

    fn entry(id: usize, n_options: usize, answer_index: usize) -> DatasetEntry<MmluProContent> {
        DatasetEntry {
            id,
            content: MmluProContent {
                question: format!("question {}", id),
                options: (0..n_options).map(|i| format!("option {}", i)).collect(),
                answer_index,
                category: "health".to_string(),
            },
        }
    }

    #[test]
    fn test_prompt_letters_ten_options() {
        let messages = MmluProPromptBuilder.build_messages(&entry(0, 10, 0));
        let user = &messages[2].content;
        assert!(user.contains("(A) option 0"));
        assert!(user.contains("(J) option 9"));
    }

    #[test]
    fn test_evaluate_grades_high_letters() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let overrides = Overrides {
            output_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let config = TaskConfig::mmlu_pro().with_overrides(&overrides);
        let entries = vec![entry(0, 10, 8), entry(1, 10, 0)];
        let runner = MockRunner::with_replies(&[
            "Reasoning: elimination.\nAnswer: I",
            "Reasoning: elimination.\nAnswer: J",
        ]);

        let path = evaluate(&runner, &entries, &config)?;

        let report: Value = serde_json::from_reader(File::open(&path)?)?;
        assert_eq!(report["summary"]["correct"], 1);
        assert_eq!(report["results"][0]["truth"], "I");
        assert_eq!(report["results"][0]["correct"], true);
        assert_eq!(report["results"][1]["prediction"], "J");
        Ok(())
    }
}
