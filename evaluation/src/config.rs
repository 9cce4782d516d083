use std::path::PathBuf;
use std::time::Duration;

use ollama_runner::config::OllamaConfig;

const DEFAULT_MODEL: &str = "meditron:7b";
const DEFAULT_API_URL: &str = "http://localhost:11434/api/chat";
const DEFAULT_NUM_CTX: u32 = 4096;
const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.75;

#[derive(Clone)]
pub struct ChatConfig {
    pub api_url: String,
    pub model: String,
    pub temperature: f32,
    pub num_ctx: u32,
    pub timeout_secs: u64,
    /// Present for safe tasks only; answers below it become refusals.
    pub confidence_threshold: Option<f64>,
}

impl ChatConfig {
    fn new(temperature: f32, timeout_secs: u64, confidence_threshold: Option<f64>) -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature,
            num_ctx: DEFAULT_NUM_CTX,
            timeout_secs,
            confidence_threshold,
        }
    }

    pub fn to_ollama_config(&self) -> OllamaConfig {
        OllamaConfig {
            api_url: self.api_url.clone(),
            model: self.model.clone(),
            temperature: self.temperature,
            num_ctx: self.num_ctx,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

#[derive(Clone)]
pub struct DataConfig {
    pub dataset_path: String,
    pub dataset_url: String,
    pub limit: Option<usize>,
    pub start_from: usize,
}

#[derive(Clone)]
pub struct OutputConfig {
    pub output_dir: PathBuf,
    pub file_prefix: String,
}

#[derive(Clone)]
pub struct TaskConfig {
    pub chat: ChatConfig,
    pub data: DataConfig,
    pub output: OutputConfig,
}

impl TaskConfig {
    pub fn pubmedqa() -> Self {
        Self {
            chat: ChatConfig::new(0.6, 120, Some(DEFAULT_CONFIDENCE_THRESHOLD)),
            data: DataConfig {
                dataset_path: "pubmedqa_labeled.csv".to_string(),
                dataset_url: "https://huggingface.co/datasets/qiaojin/PubMedQA/resolve/main/pqa_labeled/train.csv".to_string(),
                limit: Some(50),
                start_from: 0,
            },
            output: OutputConfig {
                output_dir: PathBuf::from("."),
                file_prefix: "pubmedqa".to_string(),
            },
        }
    }

    pub fn medmcqa() -> Self {
        Self {
            chat: ChatConfig::new(0.6, 120, Some(DEFAULT_CONFIDENCE_THRESHOLD)),
            data: DataConfig {
                dataset_path: "medmcqa_validation.csv".to_string(),
                dataset_url: "https://huggingface.co/datasets/openlifescienceai/medmcqa/resolve/main/validation.csv".to_string(),
                limit: Some(50),
                start_from: 0,
            },
            output: OutputConfig {
                output_dir: PathBuf::from("."),
                file_prefix: "medmcqa".to_string(),
            },
        }
    }

    pub fn medqa() -> Self {
        Self {
            chat: ChatConfig::new(0.6, 120, None),
            data: DataConfig {
                dataset_path: "medqa_usmle_test.csv".to_string(),
                dataset_url: "https://huggingface.co/datasets/GBaker/MedQA-USMLE-4-options/resolve/main/test.csv".to_string(),
                limit: Some(50),
                start_from: 0,
            },
            output: OutputConfig {
                output_dir: PathBuf::from("."),
                file_prefix: "medqa_cot_analytics".to_string(),
            },
        }
    }

    /// USMLE vignettes are long; give each question more time.
    pub fn usmle(standard: bool) -> Self {
        let threshold = if standard { None } else { Some(DEFAULT_CONFIDENCE_THRESHOLD) };
        let prefix = if standard { "usmle_standard" } else { "usmle" };
        Self {
            chat: ChatConfig::new(0.6, 180, threshold),
            data: DataConfig {
                dataset_path: "medqa_usmle_test.csv".to_string(),
                dataset_url: "https://huggingface.co/datasets/GBaker/MedQA-USMLE-4-options/resolve/main/test.csv".to_string(),
                limit: Some(25),
                start_from: 0,
            },
            output: OutputConfig {
                output_dir: PathBuf::from("."),
                file_prefix: prefix.to_string(),
            },
        }
    }

    /// `limit` is per medical subset here; the task concatenates five subsets.
    pub fn mmlu() -> Self {
        Self {
            chat: ChatConfig::new(0.6, 120, None),
            data: DataConfig {
                dataset_path: "mmlu_{subset}.csv".to_string(),
                dataset_url: "https://huggingface.co/datasets/cais/mmlu/resolve/main/{subset}/test.csv".to_string(),
                limit: Some(10),
                start_from: 0,
            },
            output: OutputConfig {
                output_dir: PathBuf::from("."),
                file_prefix: "mmlu_standard_analytics".to_string(),
            },
        }
    }

    pub fn mmlu_pro() -> Self {
        Self {
            chat: ChatConfig::new(0.6, 120, None),
            data: DataConfig {
                dataset_path: "mmlu_pro_test.csv".to_string(),
                dataset_url: "https://huggingface.co/datasets/TIGER-Lab/MMLU-Pro/resolve/main/test.csv".to_string(),
                limit: Some(10),
                start_from: 0,
            },
            output: OutputConfig {
                output_dir: PathBuf::from("."),
                file_prefix: "mmlu_pro_analytics".to_string(),
            },
        }
    }

    pub fn gsm8k() -> Self {
        Self {
            chat: ChatConfig::new(0.0, 120, None),
            data: DataConfig {
                dataset_path: "gsm8k_test.csv".to_string(),
                dataset_url: "https://huggingface.co/datasets/openai/gsm8k/resolve/main/main/test.csv".to_string(),
                limit: Some(25),
                start_from: 0,
            },
            output: OutputConfig {
                output_dir: PathBuf::from("."),
                file_prefix: "gsm8k_analytics".to_string(),
            },
        }
    }

    pub fn hellaswag() -> Self {
        Self {
            chat: ChatConfig::new(0.0, 120, None),
            data: DataConfig {
                dataset_path: "hellaswag_validation.csv".to_string(),
                dataset_url: "https://huggingface.co/datasets/Rowan/hellaswag/resolve/main/validation.csv".to_string(),
                limit: Some(25),
                start_from: 0,
            },
            output: OutputConfig {
                output_dir: PathBuf::from("."),
                file_prefix: "hellaswag_analytics".to_string(),
            },
        }
    }

    pub fn with_overrides(mut self, overrides: &Overrides) -> Self {
        if let Some(limit) = overrides.limit {
            self.data.limit = Some(limit);
        }
        if let Some(model) = &overrides.model {
            self.chat.model = model.clone();
        }
        if let Some(temperature) = overrides.temperature {
            self.chat.temperature = temperature;
        }
        if let Some(threshold) = overrides.threshold {
            if self.chat.confidence_threshold.is_some() {
                self.chat.confidence_threshold = Some(threshold);
            }
        }
        if let Some(api_url) = &overrides.api_url {
            self.chat.api_url = api_url.clone();
        }
        if let Some(output_dir) = &overrides.output_dir {
            self.output.output_dir = output_dir.clone();
        }
        self
    }
}

/// CLI-level knobs shared by every task.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub limit: Option<usize>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub threshold: Option<f64>,
    pub api_url: Option<String>,
    pub output_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_apply() {
        let overrides = Overrides {
            limit: Some(5),
            model: Some("llama3:8b".to_string()),
            temperature: Some(0.0),
            threshold: Some(0.9),
            api_url: None,
            output_dir: Some(PathBuf::from("out")),
        };
        let config = TaskConfig::pubmedqa().with_overrides(&overrides);
        assert_eq!(config.data.limit, Some(5));
        assert_eq!(config.chat.model, "llama3:8b");
        assert_eq!(config.chat.temperature, 0.0);
        assert_eq!(config.chat.confidence_threshold, Some(0.9));
        assert_eq!(config.output.output_dir, PathBuf::from("out"));
    }

    #[test]
    fn test_threshold_override_ignored_for_standard_tasks() {
        let overrides = Overrides { threshold: Some(0.9), ..Default::default() };
        let config = TaskConfig::gsm8k().with_overrides(&overrides);
        assert_eq!(config.chat.confidence_threshold, None);
    }

    #[test]
    fn test_usmle_modes() {
        assert!(TaskConfig::usmle(false).chat.confidence_threshold.is_some());
        assert!(TaskConfig::usmle(true).chat.confidence_threshold.is_none());
        assert_eq!(TaskConfig::usmle(true).output.file_prefix, "usmle_standard");
        assert_eq!(TaskConfig::usmle(false).chat.timeout_secs, 180);
    }
}
