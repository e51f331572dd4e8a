//! Outbound Telegram delivery via the Bot API.
//!
//! This crate wraps the single `sendMessage` call the reminder service
//! needs. The API base URL can be overridden with `TELEGRAM_API_BASE_URL`
//! so tests can point at a local mock server.

use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_API_BASE_URL: &str = "https://api.telegram.org";
const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct SendMessageParams {
    pub bot_token: String,
    pub chat_id: i64,
    pub text: String,
    /// Telegram parse mode ("HTML", "MarkdownV2"); plain text when unset.
    pub parse_mode: Option<String>,
    /// Upper bound on the whole request so a stalled send cannot hang the
    /// caller; defaults to 10 seconds.
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct SendResponse {
    pub message_id: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum SendTelegramError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("telegram api error: {0}")]
    Api(String),
    #[error("telegram bot token is empty")]
    MissingToken,
}

/// Request body for the sendMessage API.
#[derive(Debug, Clone, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'a str>,
}

/// Response envelope from the Bot API.
#[derive(Debug, Clone, Deserialize)]
struct ApiResponse {
    ok: bool,
    description: Option<String>,
    result: Option<ApiMessage>,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiMessage {
    message_id: i64,
}

fn api_base_url() -> String {
    dotenvy::dotenv().ok();
    std::env::var("TELEGRAM_API_BASE_URL")
        .ok()
        .map(|value| value.trim().trim_end_matches('/').to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
}

pub fn send_message(params: &SendMessageParams) -> Result<SendResponse, SendTelegramError> {
    let token = params.bot_token.trim();
    if token.is_empty() {
        return Err(SendTelegramError::MissingToken);
    }

    let url = format!("{}/bot{}/sendMessage", api_base_url(), token);
    let request = SendMessageRequest {
        chat_id: params.chat_id,
        text: &params.text,
        parse_mode: params.parse_mode.as_deref(),
    };

    let client = reqwest::blocking::Client::builder()
        .timeout(params.timeout.unwrap_or(DEFAULT_SEND_TIMEOUT))
        .build()?;
    let response = client.post(&url).json(&request).send()?;
    let api_response: ApiResponse = response.json()?;

    if !api_response.ok {
        return Err(SendTelegramError::Api(
            api_response
                .description
                .unwrap_or_else(|| "unknown error".to_string()),
        ));
    }

    let message_id = api_response
        .result
        .map(|message| message.message_id)
        .unwrap_or_default();
    Ok(SendResponse { message_id })
}
