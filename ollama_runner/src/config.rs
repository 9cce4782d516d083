use std::time::Duration;

#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub api_url: String,
    pub model: String,
    pub temperature: f32,
    pub num_ctx: u32,
    pub timeout: Duration,
}

impl OllamaConfig {
    pub fn new() -> Self {
        Self {
            api_url: "http://localhost:11434/api/chat".to_string(),
            model: "meditron:7b".to_string(),
            temperature: 0.0,
            num_ctx: 4096,
            timeout: Duration::from_secs(120),
        }
    }
}
