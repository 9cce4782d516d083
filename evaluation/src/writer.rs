use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;

use crate::config::OutputConfig;
use crate::stats::Summary;

/// Report filename stem in the original scripts' convention:
/// `pubmedqa_T06_C75`, `usmle_standard_T06`, plain prefix when untagged.
pub fn report_stem(prefix: &str, temperature: f32, threshold: Option<f64>) -> String {
    let temp_tag = format!("{:?}", temperature).replace('.', "");
    match threshold {
        Some(c) => format!("{}_T{}_C{}", prefix, temp_tag, (c * 100.0).round() as u32),
        None => format!("{}_T{}", prefix, temp_tag),
    }
}

#[derive(Serialize)]
struct Report<'a> {
    model: &'a str,
    temperature: f32,
    summary: &'a Summary,
    results: &'a [Value],
}

/// Collects per-question records and writes one pretty-printed JSON report
/// with the aggregate summary at the top.
pub struct JsonReportWriter {
    output_dir: PathBuf,
    file_stem: String,
    results: Vec<Value>,
}

impl JsonReportWriter {
    pub fn new(config: &OutputConfig, file_stem: String) -> Result<Self> {
        std::fs::create_dir_all(&config.output_dir)
            .context("Failed to create output directory")?;

        Ok(Self {
            output_dir: config.output_dir.clone(),
            file_stem,
            results: Vec::new(),
        })
    }

    pub fn add_record<T: Serialize>(&mut self, record: &T) -> Result<()> {
        let value = serde_json::to_value(record).context("Failed to serialize record")?;
        self.results.push(value);
        Ok(())
    }

    pub fn close(self, model: &str, temperature: f32, summary: &Summary) -> Result<PathBuf> {
        let path = self.output_dir.join(format!("{}.json", self.file_stem));
        let file = File::create(&path)
            .context(format!("Failed to create report file: {:?}", path))?;

        let report = Report {
            model,
            temperature,
            summary,
            results: &self.results,
        };
        serde_json::to_writer_pretty(file, &report)
            .context("Failed to write report")?;

        Ok(path)
    }
}
