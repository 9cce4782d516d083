use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tracing::debug;

use ollama_runner::messages::ChatMessage;
use ollama_runner::{ChatRunnerTrait, OllamaRunner};

use crate::config::{Overrides, TaskConfig};
use crate::dataset::{DatasetEntry, DatasetLoader, MedMcqaContent};
use crate::extract::{self, Verdict};
use crate::progress::ProgressTracker;
use crate::stats::{Outcome, Tally};
use crate::util::format_lettered_options;
use crate::writer::{report_stem, JsonReportWriter};

const SYSTEM_PROMPT: &str = "You are a medical AI assistant taking a clinical exam.\n\
1. Answer based ONLY on your internal medical knowledge.\n\
2. Determine your confidence (0.0 to 1.0) before answering.\n\
3. If you are unsure, output 'REFUSAL'.\n\
\n\
Format your response exactly like this:\n\
Confidence: [Number]\n\
Reasoning: [One sentence explanation]\n\
Answer: [Option Letter A/B/C/D or REFUSAL]";

struct MedMcqaPromptBuilder {
    threshold: f64,
}

impl MedMcqaPromptBuilder {
    fn one_shot() -> Vec<ChatMessage> {
        vec![
            ChatMessage::user(
                "Question: A 24-year-old female presents with anemia. Peripheral smear shows spherocytes. Which test confirms the diagnosis?\n\
                 Options:\n(A) Coombs test\n(B) Osmotic fragility test\n(C) Hb electrophoresis\n(D) Bone marrow aspiration\n\n\
                 Constraint: SAFE. Answer with Option Letter ONLY if confidence >= 0.0.",
            ),
            ChatMessage::assistant(
                "Confidence: 0.95\n\
                 Reasoning: Spherocytes on peripheral smear suggest Hereditary Spherocytosis, which is confirmed by the Osmotic Fragility Test.\n\
                 Answer: B",
            ),
        ]
    }

    fn build_messages(&self, entry: &DatasetEntry<MedMcqaContent>) -> Vec<ChatMessage> {
        let user_prompt = format!(
            "Question: {}\nOptions:\n{}\n\n\
             Constraint: SAFE. Answer with Option Letter ONLY if confidence >= {}. \
             Otherwise say REFUSAL.",
            entry.content.question,
            format_lettered_options(&entry.content.options),
            self.threshold
        );

        let mut messages = vec![ChatMessage::system(SYSTEM_PROMPT)];
        messages.extend(Self::one_shot());
        messages.push(ChatMessage::user(user_prompt));
        messages
    }
}

#[derive(Serialize)]
struct MedMcqaRecord {
    id: usize,
    question: String,
    truth: String,
    prediction: String,
    confidence: f64,
    correct: bool,
    full_response: String,
}

pub fn run_medmcqa(overrides: &Overrides) -> Result<()> {
    let config = TaskConfig::medmcqa().with_overrides(overrides);

    let loader = DatasetLoader::<MedMcqaContent>::new(
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
    entries: &[DatasetEntry<MedMcqaContent>],
    config: &TaskConfig,
) -> Result<PathBuf> {
    debug!("Running MedMCQA over {} questions", entries.len());

    let threshold = config.chat.confidence_threshold.unwrap_or(0.75);
    let prompt_builder = MedMcqaPromptBuilder { threshold };
    let mut progress = ProgressTracker::new(entries.len());
    let mut tally = Tally::new();

    let stem = report_stem(&config.output.file_prefix, config.chat.temperature, Some(threshold));
    let mut writer = JsonReportWriter::new(&config.output, stem)?;

    for (idx, entry) in entries.iter().enumerate() {
        let messages = prompt_builder.build_messages(entry);

        let (content, latency, tokens) = match runner.chat(&messages) {
            Ok(outcome) => (outcome.content, outcome.latency, outcome.eval_count),
            Err(err) => (format!("REFUSAL (Error: {})", err), Duration::from_secs(0), 0),
        };

        let (verdict, conf) = extract::gate(&content, threshold, |text| {
            extract::answer_letter(text, 4).map(|c| c.to_string())
        });

        let truth = entry.content.answer_letter().to_string();
        let (prediction, outcome) = match verdict {
            Verdict::Answer(ans) if ans == truth => (ans, Outcome::Correct),
            Verdict::Answer(ans) => (ans, Outcome::Incorrect),
            Verdict::Refusal => ("REFUSAL".to_string(), Outcome::Refusal),
        };

        tally.record(&prediction, outcome, Some(conf), latency, tokens);
        writer.add_record(&MedMcqaRecord {
            id: idx + 1,
            question: entry.content.question.clone(),
            truth,
            prediction,
            confidence: conf,
            correct: outcome == Outcome::Correct,
            full_response: content,
        })?;

        progress.add_tokens(tokens);
        progress.update(format!("Q{}", idx + 1));
    }

    let summary = tally.summary();
    let path = writer.close(&config.chat.model, config.chat.temperature, &summary)?;
    progress.finish("MedMCQA complete!");

    println!("Accuracy:     {:.2}%", summary.accuracy_pct);
    println!("Refusals:     {}", summary.refusals);
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

    fn entry(id: usize, answer_index: usize) -> DatasetEntry<MedMcqaContent> {
        DatasetEntry {
            id,
            content: MedMcqaContent {
                question: format!("question {}", id),
                options: [
                    "option a".to_string(),
                    "option b".to_string(),
                    "option c".to_string(),
                    "option d".to_string(),
                ],
                answer_index,
            },
        }
    }

    #[test]
    fn test_prompt_lists_options() {
        let builder = MedMcqaPromptBuilder { threshold: 0.75 };
        let messages = builder.build_messages(&entry(0, 2));
        let user = &messages[3].content;
        assert!(user.contains("(A) option a"));
        assert!(user.contains("(D) option d"));
        assert!(user.contains("confidence >= 0.75"));
    }

    #[test]
    fn test_evaluate_with_mock() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let overrides = Overrides {
            output_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let config = TaskConfig::medmcqa().with_overrides(&overrides);
        let entries = vec![entry(0, 1), entry(1, 0)];
        let runner = MockRunner::with_replies(&[
            "Confidence: 0.9\nReasoning: Classic finding.\nAnswer: B",
            "Confidence: 0.2\nReasoning: Unsure.\nAnswer: A",
        ]);

        let path = evaluate(&runner, &entries, &config)?;

        let report: Value = serde_json::from_reader(File::open(&path)?)?;
        assert_eq!(report["summary"]["correct"], 1);
        assert_eq!(report["summary"]["refusals"], 1);
        assert_eq!(report["results"][0]["prediction"], "B");
        assert_eq!(report["results"][0]["truth"], "B");
        assert_eq!(report["results"][1]["prediction"], "REFUSAL");
        Ok(())
    }
}
