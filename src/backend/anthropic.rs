//! One-shot Anthropic messages call.

use serde::{Deserialize, Serialize};

use super::http::HttpClient;
use super::{BackendError, Completion, MAX_COMPLETION_TOKENS};

pub(crate) const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const MODEL: &str = "claude-3-haiku-20240307";
const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    messages: [Message<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type", default)]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct Usage {
    #[serde(default)]
    input_tokens: usize,
    #[serde(default)]
    output_tokens: usize,
}

/// Send `prompt` as a single user message and return the joined text blocks.
///
/// A response without text blocks yields empty text, matching the "empty
/// string permitted" dispatch contract.
pub(crate) async fn complete<C: HttpClient + ?Sized>(
    client: &C,
    api_key: &str,
    prompt: &str,
    temperature: f64,
) -> Result<Completion, BackendError> {
    if api_key.is_empty() {
        return Err(BackendError::MissingApiKey);
    }

    let request = MessagesRequest {
        model: MODEL,
        max_tokens: MAX_COMPLETION_TOKENS,
        temperature,
        messages: [Message {
            role: "user",
            content: prompt,
        }],
    };
    let body = serde_json::to_value(&request).map_err(|e| BackendError::Parse(e.to_string()))?;

    let headers = [
        ("x-api-key", api_key),
        ("anthropic-version", API_VERSION),
        ("Content-Type", "application/json"),
    ];

    let response = client.post_json(MESSAGES_URL, &headers, &body).await?;
    let response: MessagesResponse =
        serde_json::from_value(response).map_err(|e| BackendError::Parse(e.to_string()))?;

    let text = response
        .content
        .into_iter()
        .filter_map(|block| {
            if block.block_type == "text" {
                block.text
            } else {
                None
            }
        })
        .collect::<Vec<_>>()
        .join("");
    let usage = response.usage.unwrap_or_default();

    Ok(Completion {
        text,
        prompt_tokens: usage.input_tokens,
        completion_tokens: usage.output_tokens,
    })
}
