use std::time::Duration;

pub mod config;
pub mod messages;

/// One completed chat exchange with the inference server.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub content: String,
    /// Wall-clock time of the whole request.
    pub latency: Duration,
    /// Tokens generated, as reported by the server.
    pub eval_count: u64,
    /// Pure generation time, as reported by the server.
    pub eval_duration: Duration,
}

impl ChatOutcome {
    pub fn tokens_per_second(&self) -> f64 {
        self.eval_count as f64 / self.eval_duration.as_secs_f64().max(1e-9)
    }
}

pub trait ChatRunnerTrait {
    fn new(config: config::OllamaConfig) -> Self where Self: Sized;
    fn chat(&self, messages: &[messages::ChatMessage]) -> anyhow::Result<ChatOutcome>;
}

pub mod runner;
pub use runner::OllamaRunner;

pub mod mock_runner;
pub use mock_runner::MockRunner;
