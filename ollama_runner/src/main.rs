use anyhow::Result;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use ollama_runner::config::OllamaConfig;
use ollama_runner::messages::ChatMessage;
use ollama_runner::{ChatRunnerTrait, OllamaRunner};

fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    let runner = OllamaRunner::new(OllamaConfig::new());
    let messages = vec![
        ChatMessage::system("You are a medical AI assistant."),
        ChatMessage::user("Which enzyme family does ibuprofen inhibit?"),
    ];

    let outcome = runner.chat(&messages)?;
    println!("{}", outcome.content.trim());
    println!(
        "{} tokens in {:.2}s ({:.2} tokens/sec)",
        outcome.eval_count,
        outcome.latency.as_secs_f64(),
        outcome.tokens_per_second()
    );

    Ok(())
}
