use serde::{Deserialize, Serialize};

/// A single turn in the chat history, in the Ollama `/api/chat` wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".to_string(), content: content.into() }
    }
}

#[derive(Debug, Serialize)]
pub struct ChatOptions {
    pub temperature: f32,
    pub num_ctx: u32,
}

#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    pub stream: bool,
    pub options: ChatOptions,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub message: ChatMessage,
    /// Tokens generated; absent while the model is still loading.
    #[serde(default)]
    pub eval_count: u64,
    /// Generation time in nanoseconds.
    #[serde(default)]
    pub eval_duration: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let messages = vec![
            ChatMessage::system("You are a medical AI assistant."),
            ChatMessage::user("Is drug X effective?"),
        ];
        let request = ChatRequest {
            model: "meditron:7b",
            messages: &messages,
            stream: false,
            options: ChatOptions { temperature: 0.6, num_ctx: 4096 },
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["model"], "meditron:7b");
        assert_eq!(value["stream"], false);
        assert_eq!(value["options"]["num_ctx"], 4096);
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["content"], "Is drug X effective?");
    }

    #[test]
    fn test_response_with_metrics() {
        let body = r#"{
            "message": {"role": "assistant", "content": "Answer: B"},
            "eval_count": 120,
            "eval_duration": 2000000000
        }"#;
        let response: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.message.content, "Answer: B");
        assert_eq!(response.eval_count, 120);
        assert_eq!(response.eval_duration, 2_000_000_000);
    }

    #[test]
    fn test_response_without_metrics() {
        let body = r#"{"message": {"role": "assistant", "content": "hi"}}"#;
        let response: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.eval_count, 0);
        assert_eq!(response.eval_duration, 0);
    }
}
