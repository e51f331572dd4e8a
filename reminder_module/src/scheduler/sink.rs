use std::time::Duration;

use tracing::info;

/// "Send a message to this user", isolated behind a trait so one user's
/// delivery failure can never abort the batch and tests can swap in a
/// recording implementation.
pub trait DeliverySink {
    fn send(&self, user_id: i64, text: &str) -> Result<(), DeliveryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("telegram send failed: {0}")]
    Telegram(#[from] send_telegram_module::SendTelegramError),
    #[error("delivery failed: {0}")]
    Other(String),
}

/// Production sink: one Telegram `sendMessage` call per notification, with a
/// bounded request timeout so a stalled send surfaces as a failure instead
/// of hanging the tick.
#[derive(Debug, Clone)]
pub struct TelegramSink {
    bot_token: String,
    timeout: Duration,
}

impl TelegramSink {
    pub fn new(bot_token: String, timeout: Duration) -> Self {
        Self { bot_token, timeout }
    }
}

impl DeliverySink for TelegramSink {
    fn send(&self, user_id: i64, text: &str) -> Result<(), DeliveryError> {
        let params = send_telegram_module::SendMessageParams {
            bot_token: self.bot_token.clone(),
            chat_id: user_id,
            text: text.to_string(),
            parse_mode: None,
            timeout: Some(self.timeout),
        };
        let response = send_telegram_module::send_message(&params)?;
        info!(
            "sent telegram message {} to chat {}",
            response.message_id, user_id
        );
        Ok(())
    }
}
