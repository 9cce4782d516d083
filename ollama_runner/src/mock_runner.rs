use std::cell::RefCell;
use std::time::Duration;

use anyhow::Result;

use crate::config::OllamaConfig;
use crate::messages::ChatMessage;
use crate::{ChatOutcome, ChatRunnerTrait};

/// Canned-response runner for tests. Replies are served in the order they
/// were queued; once exhausted it keeps returning the last one.
pub struct MockRunner {
    replies: RefCell<Vec<String>>,
}

impl MockRunner {
    pub fn with_replies(replies: &[&str]) -> Self {
        let mut queued: Vec<String> = replies.iter().map(|s| s.to_string()).collect();
        queued.reverse();
        Self { replies: RefCell::new(queued) }
    }
}

impl ChatRunnerTrait for MockRunner {
    fn new(_config: OllamaConfig) -> Self {
        Self::with_replies(&["Answer: A"])
    }

    fn chat(&self, _messages: &[ChatMessage]) -> Result<ChatOutcome> {
        let mut replies = self.replies.borrow_mut();
        let content = if replies.len() > 1 {
            replies.pop().unwrap_or_default()
        } else {
            replies.last().cloned().unwrap_or_default()
        };

        Ok(ChatOutcome {
            content,
            latency: Duration::from_millis(5),
            eval_count: 42,
            eval_duration: Duration::from_millis(100),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replies_in_order() {
        let runner = MockRunner::with_replies(&["first", "second"]);
        assert_eq!(runner.chat(&[]).unwrap().content, "first");
        assert_eq!(runner.chat(&[]).unwrap().content, "second");
        // exhausted: keeps serving the last reply
        assert_eq!(runner.chat(&[]).unwrap().content, "second");
    }

    #[test]
    fn test_tokens_per_second() {
        let runner = MockRunner::new(OllamaConfig::new());
        let outcome = runner.chat(&[]).unwrap();
        assert!((outcome.tokens_per_second() - 420.0).abs() < 1.0);
    }
}
