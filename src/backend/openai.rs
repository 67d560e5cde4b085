//! One-shot OpenAI chat completion.

use serde::{Deserialize, Serialize};

use super::http::HttpClient;
use super::{BackendError, Completion, MAX_COMPLETION_TOKENS};

pub(crate) const COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";
const MODEL: &str = "gpt-3.5-turbo";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct Usage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
}

/// Send `prompt` as a single user message and return the first choice's text.
pub(crate) async fn complete<C: HttpClient + ?Sized>(
    client: &C,
    api_key: &str,
    prompt: &str,
    temperature: f64,
) -> Result<Completion, BackendError> {
    if api_key.is_empty() {
        return Err(BackendError::MissingApiKey);
    }

    let request = ChatRequest {
        model: MODEL,
        messages: [ChatMessage {
            role: "user",
            content: prompt,
        }],
        temperature,
        max_tokens: MAX_COMPLETION_TOKENS,
    };
    let body = serde_json::to_value(&request).map_err(|e| BackendError::Parse(e.to_string()))?;

    let auth = format!("Bearer {api_key}");
    let headers = [
        ("Authorization", auth.as_str()),
        ("Content-Type", "application/json"),
    ];

    let response = client.post_json(COMPLETIONS_URL, &headers, &body).await?;
    let response: ChatResponse =
        serde_json::from_value(response).map_err(|e| BackendError::Parse(e.to_string()))?;

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| BackendError::Parse("no choices in response".to_string()))?;
    let usage = response.usage.unwrap_or_default();

    Ok(Completion {
        text: choice.message.content.unwrap_or_default(),
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
    })
}
