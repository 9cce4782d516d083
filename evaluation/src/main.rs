use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod dataset;
mod extract;
mod progress;
mod stats;
mod tasks;
mod util;
mod writer;

use config::Overrides;

#[derive(Parser)]
#[command(name = "medbench", about = "Medical QA benchmarks against a local Ollama server")]
struct Opt {
    /// Maximum number of questions to evaluate
    #[arg(long, global = true)]
    limit: Option<usize>,

    /// Model name as known to the Ollama server
    #[arg(long, global = true)]
    model: Option<String>,

    /// Sampling temperature
    #[arg(long, global = true)]
    temperature: Option<f32>,

    /// Confidence threshold for safe tasks (ignored by standard tasks)
    #[arg(long, global = true)]
    threshold: Option<f64>,

    /// Chat endpoint, e.g. http://localhost:11434/api/chat
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Directory for JSON reports
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    #[command(subcommand)]
    task: Task,
}

#[derive(Subcommand)]
enum Task {
    /// PubMedQA yes/no/maybe with a confidence gate
    Pubmedqa,
    /// MedMCQA four-option exam questions with a confidence gate
    Medmcqa,
    /// MedQA clinical vignettes with chain-of-thought prompting
    Medqa,
    /// USMLE Step 2 CK vignettes
    Usmle {
        /// Grade every answer instead of gating on confidence
        #[arg(long)]
        standard: bool,
    },
    /// MMLU medical subsets
    Mmlu,
    /// MMLU-Pro ten-option questions
    MmluPro {
        /// Category to evaluate
        #[arg(long, default_value = "health")]
        category: String,
    },
    /// GSM8K grade-school math word problems
    Gsm8k,
    /// HellaSwag sentence completion
    Hellaswag,
}

impl Opt {
    fn overrides(&self) -> Overrides {
        Overrides {
            limit: self.limit,
            model: self.model.clone(),
            temperature: self.temperature,
            threshold: self.threshold,
            api_url: self.api_url.clone(),
            output_dir: self.output_dir.clone(),
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let opt = Opt::parse();
    let overrides = opt.overrides();

    match opt.task {
        Task::Pubmedqa => {
            info!("Starting PubMedQA benchmark");
            tasks::pubmedqa::run_pubmedqa(&overrides)
        }
        Task::Medmcqa => {
            info!("Starting MedMCQA benchmark");
            tasks::medmcqa::run_medmcqa(&overrides)
        }
        Task::Medqa => {
            info!("Starting MedQA benchmark");
            tasks::medqa::run_medqa(&overrides)
        }
        Task::Usmle { standard } => {
            info!("Starting USMLE benchmark (standard: {})", standard);
            tasks::usmle::run_usmle(&overrides, standard)
        }
        Task::Mmlu => {
            info!("Starting MMLU benchmark");
            tasks::mmlu::run_mmlu(&overrides)
        }
        Task::MmluPro { category } => {
            info!("Starting MMLU-Pro benchmark (category: {})", category);
            tasks::mmlu_pro::run_mmlu_pro(&overrides, &category)
        }
        Task::Gsm8k => {
            info!("Starting GSM8K benchmark");
            tasks::gsm8k::run_gsm8k(&overrides)
        }
        Task::Hellaswag => {
            info!("Starting HellaSwag benchmark");
            tasks::hellaswag::run_hellaswag(&overrides)
        }
    }
}
