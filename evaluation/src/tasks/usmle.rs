use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tracing::debug;

use ollama_runner::messages::ChatMessage;
use ollama_runner::{ChatRunnerTrait, OllamaRunner};

use crate::config::{Overrides, TaskConfig};
use crate::dataset::{DatasetEntry, DatasetLoader, UsmleContent};
use crate::extract::{self, Verdict};
use crate::progress::ProgressTracker;
use crate::stats::{Outcome, Tally};
use crate::util::format_lettered_options;
use crate::writer::{report_stem, JsonReportWriter};

const SAFE_SYSTEM_PROMPT: &str = "You are an expert physician taking the USMLE Step 2 Clinical Knowledge exam.\n\
1. Read the patient vignette carefully.\n\
2. Answer based ONLY on clinical guidelines.\n\
3. Determine your confidence (0.0 to 1.0).\n\
4. If you are unsure, output 'REFUSAL'.\n\
\n\
Format your response exactly like this:\n\
Confidence: [Number]\n\
Reasoning: [Step-by-step clinical reasoning]\n\
Answer: [Option Letter A/B/C/D or REFUSAL]";

const STANDARD_SYSTEM_PROMPT: &str = "You are an expert physician taking the USMLE Step 2 Clinical Knowledge exam.\n\
1. Read the patient vignette carefully.\n\
2. Answer based ONLY on clinical guidelines.\n\
\n\
Format your response exactly like this:\n\
Reasoning: [Step-by-step clinical reasoning]\n\
Answer: [Option Letter A/B/C/D]";

const ONE_SHOT_VIGNETTE: &str = "Question: A 32-year-old woman comes to the office because of a 3-month history of fatigue \
and generalized weakness. She has no history of serious illness. Physical examination shows no abnormalities. \
Laboratory studies show:\nHemoglobin: 9.2 g/dL\nMCV: 72 fL\nFerritin: 10 ng/mL\n\
Which of the following is the most appropriate next step in management?\n\
Options:\n(A) Intravenous iron dextran\n(B) Oral ferrous sulfate\n(C) Erythropoietin injection\n(D) RBC transfusion";

const ONE_SHOT_REASONING: &str = "Reasoning: The patient has iron deficiency anemia (Microcytic anemia with low Ferritin). \
The first-line treatment for stable iron deficiency anemia is oral iron supplementation.\n\
Answer: B";

/// Builds either the confidence-gated ("safe") or the plain exam prompt.
struct UsmlePromptBuilder {
    threshold: Option<f64>,
}

impl UsmlePromptBuilder {
    fn one_shot(&self) -> Vec<ChatMessage> {
        match self.threshold {
            Some(_) => vec![
                ChatMessage::user(format!(
                    "{}\n\nConstraint: SAFE. Answer with Option Letter ONLY if confidence >= 0.0.",
                    ONE_SHOT_VIGNETTE
                )),
                ChatMessage::assistant(format!("Confidence: 0.95\n{}", ONE_SHOT_REASONING)),
            ],
            None => vec![
                ChatMessage::user(format!(
                    "{}\n\nAnswer with the correct Option Letter.",
                    ONE_SHOT_VIGNETTE
                )),
                ChatMessage::assistant(ONE_SHOT_REASONING),
            ],
        }
    }

    fn build_messages(&self, entry: &DatasetEntry<UsmleContent>) -> Vec<ChatMessage> {
        let options = format_lettered_options(&entry.content.options);
        let (system, constraint) = match self.threshold {
            Some(threshold) => (
                SAFE_SYSTEM_PROMPT,
                format!(
                    "Constraint: SAFE. Answer with Option Letter ONLY if confidence >= {}. \
                     Otherwise say REFUSAL.",
                    threshold
                ),
            ),
            None => (
                STANDARD_SYSTEM_PROMPT,
                "Answer with the correct Option Letter.".to_string(),
            ),
        };

        let user_prompt = format!(
            "Question: {}\nOptions:\n{}\n\n{}",
            entry.content.question, options, constraint
        );

        let mut messages = vec![ChatMessage::system(system)];
        messages.extend(self.one_shot());
        messages.push(ChatMessage::user(user_prompt));
        messages
    }
}

#[derive(Serialize)]
struct UsmleRecord {
    id: usize,
    question: String,
    truth: String,
    prediction: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    confidence: Option<f64>,
    correct: bool,
    full_response: String,
}

pub fn run_usmle(overrides: &Overrides, standard: bool) -> Result<()> {
    let config = TaskConfig::usmle(standard).with_overrides(overrides);

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
    let threshold = config.chat.confidence_threshold;
    debug!(
        "Running USMLE ({}) over {} questions",
        if threshold.is_some() { "safe" } else { "standard" },
        entries.len()
    );

    let prompt_builder = UsmlePromptBuilder { threshold };
    let mut progress = ProgressTracker::new(entries.len());
    let mut tally = Tally::new();

    // Both modes use the untagged filename; safe and standard runs are
    // distinguished by the prefix alone.
    let stem = report_stem(&config.output.file_prefix, config.chat.temperature, None);
    let mut writer = JsonReportWriter::new(&config.output, stem)?;

    for (idx, entry) in entries.iter().enumerate() {
        let messages = prompt_builder.build_messages(entry);
        let truth = entry.content.answer_letter.clone();

        let (content, latency, tokens) = match runner.chat(&messages) {
            Ok(outcome) => (outcome.content, outcome.latency, outcome.eval_count),
            Err(err) => {
                let fallback = match threshold {
                    Some(_) => format!("REFUSAL (Error: {})", err),
                    None => String::new(),
                };
                (fallback, Duration::from_secs(0), 0)
            }
        };

        let letter_extractor = |text: &str| extract::answer_letter(text, 4).map(|c| c.to_string());

        let (prediction, outcome, confidence) = match threshold {
            Some(threshold) => {
                let (verdict, conf) = extract::gate(&content, threshold, letter_extractor);
                let (prediction, outcome) = match verdict {
                    Verdict::Answer(ans) if ans == truth => (ans, Outcome::Correct),
                    Verdict::Answer(ans) => (ans, Outcome::Incorrect),
                    Verdict::Refusal => ("REFUSAL".to_string(), Outcome::Refusal),
                };
                (prediction, outcome, Some(conf))
            }
            None => match letter_extractor(&content) {
                Some(ans) if ans == truth => (ans, Outcome::Correct, None),
                Some(ans) => (ans, Outcome::Incorrect, None),
                None => ("INVALID".to_string(), Outcome::Invalid, None),
            },
        };

        tally.record(&prediction, outcome, confidence, latency, tokens);
        writer.add_record(&UsmleRecord {
            id: idx + 1,
            question: entry.content.question.clone(),
            truth,
            prediction,
            confidence,
            correct: outcome == Outcome::Correct,
            full_response: content,
        })?;

        progress.add_tokens(tokens);
        progress.update(format!("Q{}", idx + 1));
    }

    let summary = tally.summary();
    let path = writer.close(&config.chat.model, config.chat.temperature, &summary)?;
    progress.finish("USMLE complete!");

    println!("Accuracy:     {:.2}%", summary.accuracy_pct);
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

    fn entry(id: usize, answer: &str) -> DatasetEntry<UsmleContent> {
        DatasetEntry {
            id,
            content: UsmleContent {
                question: format!("vignette {}", id),
                options: [
                    "a".to_string(),
                    "b".to_string(),
                    "c".to_string(),
                    "d".to_string(),
                ],
                answer_letter: answer.to_string(),
            },
        }
    }

    fn config_in(dir: &tempfile::TempDir, standard: bool) -> TaskConfig {
        let overrides = Overrides {
            output_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        TaskConfig::usmle(standard).with_overrides(&overrides)
    }

    #[test]
    fn test_safe_and_standard_prompts_differ() {
        let safe = UsmlePromptBuilder { threshold: Some(0.75) };
        let standard = UsmlePromptBuilder { threshold: None };
        let e = entry(0, "A");

        let safe_messages = safe.build_messages(&e);
        assert!(safe_messages[0].content.contains("Confidence: [Number]"));
        assert!(safe_messages[3].content.contains("Otherwise say REFUSAL"));

        let standard_messages = standard.build_messages(&e);
        assert!(!standard_messages[0].content.contains("Confidence"));
        assert!(standard_messages[3].content.contains("Answer with the correct Option Letter."));
    }

    #[test]
    fn test_safe_mode_gates_low_confidence() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let config = config_in(&dir, false);
        let entries = vec![entry(0, "B"), entry(1, "C")];
        let runner = MockRunner::with_replies(&[
            "Confidence: 0.9\nReasoning: textbook case.\nAnswer: B",
            "Confidence: 0.5\nReasoning: could be several.\nAnswer: C",
        ]);

        let path = evaluate(&runner, &entries, &config)?;
        assert_eq!(path.file_name().unwrap(), "usmle_T06.json");

        let report: Value = serde_json::from_reader(File::open(&path)?)?;
        assert_eq!(report["summary"]["correct"], 1);
        assert_eq!(report["summary"]["refusals"], 1);
        assert_eq!(report["results"][0]["confidence"], 0.9);
        Ok(())
    }

    #[test]
    fn test_standard_mode_never_refuses() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let config = config_in(&dir, true);
        let entries = vec![entry(0, "B"), entry(1, "C")];
        let runner = MockRunner::with_replies(&[
            // no confidence line at all: still graded in standard mode
            "Reasoning: textbook case.\nAnswer: B",
            "Reasoning: hard to say.\nAnswer: D",
        ]);

        let path = evaluate(&runner, &entries, &config)?;
        assert_eq!(path.file_name().unwrap(), "usmle_standard_T06.json");

        let report: Value = serde_json::from_reader(File::open(&path)?)?;
        assert_eq!(report["summary"]["correct"], 1);
        assert_eq!(report["summary"]["refusals"], 0);
        assert!(report["results"][0].get("confidence").is_none());
        Ok(())
    }
}
