use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::debug;

use crate::config::OllamaConfig;
use crate::messages::{ChatMessage, ChatOptions, ChatRequest, ChatResponse};
use crate::{ChatOutcome, ChatRunnerTrait};

/// Blocking chat runner backed by an Ollama-compatible HTTP endpoint.
pub struct OllamaRunner {
    pub config: OllamaConfig,
    client: reqwest::blocking::Client,
}

impl ChatRunnerTrait for OllamaRunner {
    fn new(config: OllamaConfig) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            config,
        }
    }

    fn chat(&self, messages: &[ChatMessage]) -> Result<ChatOutcome> {
        let request = ChatRequest {
            model: &self.config.model,
            messages,
            stream: false,
            options: ChatOptions {
                temperature: self.config.temperature,
                num_ctx: self.config.num_ctx,
            },
        };

        let start = Instant::now();
        let response = self
            .client
            .post(&self.config.api_url)
            .timeout(self.config.timeout)
            .json(&request)
            .send()
            .context("Failed to send chat request")?
            .error_for_status()
            .context("Chat request returned an error status")?;

        let body: ChatResponse = response
            .json()
            .context("Failed to decode chat response")?;
        let latency = start.elapsed();

        debug!(
            "Generated {} tokens in {:.2}s",
            body.eval_count,
            latency.as_secs_f64()
        );

        Ok(ChatOutcome {
            content: body.message.content,
            latency,
            eval_count: body.eval_count,
            // eval_duration is nanoseconds; clamp so tokens_per_second stays finite
            eval_duration: Duration::from_nanos(body.eval_duration.max(1)),
        })
    }
}
