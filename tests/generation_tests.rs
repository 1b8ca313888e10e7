use async_trait::async_trait;
use std::sync::Mutex;
use vignetteer::generation::{GenerateError, Message, Role, TextGenerator, TokenUsage};

/// Mock provider that records token usage into its slot, the way real
/// clients do after parsing a response's `usage` object.
struct MeteredClient {
    usage: Mutex<Option<TokenUsage>>,
}

impl MeteredClient {
    fn new() -> Self {
        Self {
            usage: Mutex::new(None),
        }
    }
}

#[async_trait]
impl TextGenerator for MeteredClient {
    async fn generate(
        &self,
        _system_prompt: &str,
        context: &[Message],
    ) -> Result<String, GenerateError> {
        let input: usize = context.iter().map(|m| m.content.len()).sum();
        if let Ok(mut slot) = self.usage.lock() {
            *slot = Some(TokenUsage {
                input_tokens: input,
                output_tokens: 2,
                total_tokens: input + 2,
            });
        }
        Ok("ok".to_string())
    }

    fn model_name(&self) -> &str {
        "metered-mock"
    }

    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        Some(&self.usage)
    }
}

/// Mock provider that does not track usage at all.
struct UnmeteredClient;

#[async_trait]
impl TextGenerator for UnmeteredClient {
    async fn generate(
        &self,
        _system_prompt: &str,
        _context: &[Message],
    ) -> Result<String, GenerateError> {
        Ok("ok".to_string())
    }

    fn model_name(&self) -> &str {
        "unmetered-mock"
    }
}

#[tokio::test]
async fn test_last_usage_reads_the_slot_after_a_call() {
    let client = MeteredClient::new();
    assert!(client.last_usage().is_none());

    client
        .generate("be terse", &[Message::new(Role::User, "ping")])
        .await
        .unwrap();

    let usage = client.last_usage().unwrap();
    assert_eq!(usage.input_tokens, 4);
    assert_eq!(usage.output_tokens, 2);
    assert_eq!(usage.total_tokens, 6);
}

#[tokio::test]
async fn test_clients_without_a_slot_report_no_usage() {
    let client = UnmeteredClient;
    client
        .generate("be terse", &[Message::new(Role::User, "ping")])
        .await
        .unwrap();
    assert!(client.usage_slot().is_none());
    assert!(client.last_usage().is_none());
}
