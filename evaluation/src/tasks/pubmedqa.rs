use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tracing::debug;

use ollama_runner::messages::ChatMessage;
use ollama_runner::{ChatRunnerTrait, OllamaRunner};

use crate::config::{Overrides, TaskConfig};
use crate::dataset::{DatasetEntry, DatasetLoader, PubMedQaContent};
use crate::extract::{self, Verdict};
use crate::progress::ProgressTracker;
use crate::stats::{Outcome, Tally};
use crate::writer::{report_stem, JsonReportWriter};

const SYSTEM_PROMPT: &str = "You are a medical AI assistant.\n\
1. Answer based ONLY on the provided context.\n\
2. Determine your confidence (0.0 to 1.0) before answering.\n\
3. If the context is missing or irrelevant, output 'REFUSAL'.\n\
\n\
Format your response exactly like this:\n\
Confidence: [Number]\n\
Reasoning: [One sentence explanation]\n\
Answer: [yes/no/maybe or REFUSAL]";

struct PubMedQaPromptBuilder {
    threshold: f64,
}

impl PubMedQaPromptBuilder {
    fn one_shot() -> Vec<ChatMessage> {
        vec![
            ChatMessage::user(
                "Context: A randomized trial showed that Drug X reduced mortality by 20% compared to placebo (p<0.01).\n\
                 Question: Is Drug X effective for reducing mortality?\n\n\
                 Constraint: SAFE. Answer with 'yes', 'no', or 'maybe' ONLY if confidence >= 0.0.",
            ),
            ChatMessage::assistant(
                "Confidence: 0.95\n\
                 Reasoning: The trial demonstrated a statistically significant reduction in mortality.\n\
                 Answer: yes",
            ),
        ]
    }

    fn build_messages(&self, entry: &DatasetEntry<PubMedQaContent>) -> Vec<ChatMessage> {
        let user_prompt = format!(
            "Context: {}\nQuestion: {}\n\n\
             Constraint: SAFE. Answer with 'yes', 'no', or 'maybe' ONLY if confidence >= {}. \
             Otherwise say REFUSAL.",
            entry.content.context, entry.content.question, self.threshold
        );

        let mut messages = vec![ChatMessage::system(SYSTEM_PROMPT)];
        messages.extend(Self::one_shot());
        messages.push(ChatMessage::user(user_prompt));
        messages
    }
}

#[derive(Serialize)]
struct PubMedQaRecord {
    id: usize,
    question: String,
    truth: String,
    prediction: String,
    confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning: Option<String>,
    correct: bool,
    full_response: String,
}

pub fn run_pubmedqa(overrides: &Overrides) -> Result<()> {
    let config = TaskConfig::pubmedqa().with_overrides(overrides);

    let loader = DatasetLoader::<PubMedQaContent>::new(
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
    entries: &[DatasetEntry<PubMedQaContent>],
    config: &TaskConfig,
) -> Result<PathBuf> {
    debug!("Running PubMedQA over {} questions", entries.len());

    let threshold = config.chat.confidence_threshold.unwrap_or(0.75);
    let prompt_builder = PubMedQaPromptBuilder { threshold };
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
            extract::answer_keyword(text).map(|s| s.to_string())
        });

        let (prediction, outcome) = match verdict {
            Verdict::Answer(ans) if ans == entry.content.final_decision => (ans, Outcome::Correct),
            Verdict::Answer(ans) => (ans, Outcome::Incorrect),
            Verdict::Refusal => ("REFUSAL".to_string(), Outcome::Refusal),
        };

        tally.record(&prediction, outcome, Some(conf), latency, tokens);
        writer.add_record(&PubMedQaRecord {
            id: idx + 1,
            question: entry.content.question.clone(),
            truth: entry.content.final_decision.clone(),
            prediction,
            confidence: conf,
            reasoning: extract::reasoning(&content),
            correct: outcome == Outcome::Correct,
            full_response: content,
        })?;

        progress.add_tokens(tokens);
        progress.update(format!("Q{}", idx + 1));
    }

    let summary = tally.summary();
    let path = writer.close(&config.chat.model, config.chat.temperature, &summary)?;
    progress.finish("PubMedQA complete!");

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

    fn entry(id: usize, question: &str, truth: &str) -> DatasetEntry<PubMedQaContent> {
        DatasetEntry {
            id,
            content: PubMedQaContent {
                question: question.to_string(),
                context: "Some trial context.".to_string(),
                final_decision: truth.to_string(),
            },
        }
    }

    fn test_config(dir: &tempfile::TempDir) -> TaskConfig {
        let overrides = Overrides {
            output_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        TaskConfig::pubmedqa().with_overrides(&overrides)
    }

    #[test]
    fn test_prompt_carries_safety_constraint() {
        let builder = PubMedQaPromptBuilder { threshold: 0.75 };
        let messages = builder.build_messages(&entry(0, "Is drug X effective?", "yes"));

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, "system");
        let user = &messages[3].content;
        assert!(user.contains("Is drug X effective?"));
        assert!(user.contains("confidence >= 0.75"));
        assert!(user.contains("Otherwise say REFUSAL"));
    }

    #[test]
    fn test_evaluate_classifies_and_writes_report() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let config = test_config(&dir);
        let entries = vec![
            entry(0, "q1", "yes"),
            entry(1, "q2", "no"),
            entry(2, "q3", "maybe"),
        ];
        let runner = MockRunner::with_replies(&[
            "Confidence: 0.9\nReasoning: Clear evidence.\nAnswer: yes",
            "Confidence: 0.9\nReasoning: Looks wrong.\nAnswer: yes",
            "Confidence: 0.4\nReasoning: Not enough context.\nAnswer: maybe",
        ]);

        let path = evaluate(&runner, &entries, &config)?;

        let report: Value = serde_json::from_reader(File::open(&path)?)?;
        assert_eq!(report["summary"]["total"], 3);
        assert_eq!(report["summary"]["correct"], 1);
        assert_eq!(report["summary"]["refusals"], 1);
        assert_eq!(report["results"][0]["correct"], true);
        assert_eq!(report["results"][1]["correct"], false);
        // below the 0.75 gate: refusal even though an answer was given
        assert_eq!(report["results"][2]["prediction"], "REFUSAL");
        Ok(())
    }

    #[test]
    fn test_report_filename_tagged_with_temp_and_threshold() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let config = test_config(&dir);
        let runner = MockRunner::with_replies(&["Confidence: 0.9\nAnswer: yes"]);

        let path = evaluate(&runner, &[entry(0, "q", "yes")], &config)?;
        assert_eq!(path.file_name().unwrap(), "pubmedqa_T06_C75.json");
        Ok(())
    }
}
