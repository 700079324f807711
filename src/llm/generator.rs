//! Text generation seam used by the verification loop.

use std::sync::Arc;

use async_trait::async_trait;

use super::{ChatOptions, Conversation, LlmClient};

/// Produces free text for a prompt in the context of a conversation.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Answer `prompt` and record the turn in `conversation`.
    async fn generate(&self, prompt: &str, conversation: &mut Conversation) -> anyhow::Result<String>;
}

/// [`TextGenerator`] backed by a chat model.
pub struct LlmGenerator {
    client: Arc<dyn LlmClient>,
    model: String,
    options: ChatOptions,
}

impl LlmGenerator {
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>, options: ChatOptions) -> Self {
        Self {
            client,
            model: model.into(),
            options,
        }
    }
}

#[async_trait]
impl TextGenerator for LlmGenerator {
    async fn generate(&self, prompt: &str, conversation: &mut Conversation) -> anyhow::Result<String> {
        let messages = conversation.request(prompt);
        tracing::debug!("Prompting {} with {} messages", self.model, messages.len());

        let response = self
            .client
            .chat_completion(&self.model, &messages, &self.options)
            .await?;
        let served_by = response.model.as_deref().unwrap_or(&self.model);
        if let Some(usage) = &response.usage {
            tracing::debug!(
                "{} used {} prompt + {} completion tokens",
                served_by,
                usage.prompt_tokens,
                usage.completion_tokens
            );
        }
        if response.finish_reason.as_deref() == Some("length") {
            tracing::warn!(
                "{} stopped at the token limit; the answer is probably truncated",
                served_by
            );
        }

        let answer = response.content.unwrap_or_default();
        conversation.push_turn(prompt, answer.clone());
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatMessage, ChatResponse, Role};
    use std::sync::Mutex;

    struct EchoClient {
        seen: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl LlmClient for EchoClient {
        async fn chat_completion(
            &self,
            model: &str,
            messages: &[ChatMessage],
            _options: &ChatOptions,
        ) -> anyhow::Result<ChatResponse> {
            self.seen.lock().unwrap().push(messages.len());
            let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(ChatResponse {
                content: Some(format!("echo: {}", last)),
                finish_reason: Some("stop".to_string()),
                usage: None,
                model: Some(model.to_string()),
            })
        }
    }

    #[tokio::test]
    async fn test_generate_records_turns() {
        let client = Arc::new(EchoClient {
            seen: Mutex::new(Vec::new()),
        });
        let generator = LlmGenerator::new(client.clone(), "test-model", ChatOptions::default());
        let mut conversation = Conversation::new("frame");

        let first = generator.generate("one", &mut conversation).await.unwrap();
        let second = generator.generate("two", &mut conversation).await.unwrap();

        assert_eq!(first, "echo: one");
        assert_eq!(second, "echo: two");
        // frame + prompt, then frame + turn + prompt
        assert_eq!(*client.seen.lock().unwrap(), vec![2, 4]);
        assert_eq!(conversation.turns(), 4);
        assert_eq!(conversation.messages()[2].role, Role::Assistant);
    }
}
