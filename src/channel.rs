//! Outbound channel: the trait the publisher talks to and its Telegram
//! implementation.
use async_trait::async_trait;
use reqwest::Url;
use std::fmt;
use std::time::Duration;
use teloxide::payloads::setters::*;
use teloxide::prelude::*;
use teloxide::types::{
    InlineKeyboardButton, InlineKeyboardMarkup, InputFile, MessageId, ParseMode, Recipient,
};
use teloxide::{ApiError, RequestError};
use thiserror::Error;

use crate::model::Keyboard;

#[derive(Debug, Error)]
pub enum ChannelError {
    /// Throttled; the API asks us to wait before the next request.
    #[error("rate limited, retry after {0:?}")]
    RetryAfter(Duration),
    /// The message no longer exists or can't be removed any more.
    #[error("message already gone: {0}")]
    MessageGone(String),
    #[error("channel request failed: {0}")]
    Other(String),
}

#[async_trait]
pub trait Channel: Send + Sync {
    /// Send one photo with an HTML caption and keyboard. Returns the message id.
    async fn send_photo(
        &self,
        photo_url: &str,
        caption: &str,
        keyboard: &Keyboard,
    ) -> Result<i32, ChannelError>;

    /// Send an HTML text message without link previews. Returns the message id.
    async fn send_text(&self, text: &str, keyboard: &Keyboard) -> Result<i32, ChannelError>;

    async fn delete_message(&self, message_id: i32) -> Result<(), ChannelError>;
}

#[derive(Clone)]
pub struct TelegramChannel {
    bot: Bot,
    chat: Recipient,
}

impl fmt::Debug for TelegramChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramChannel")
            .field("chat", &self.chat)
            .finish_non_exhaustive()
    }
}

impl TelegramChannel {
    pub fn new(bot: Bot, channel_id: &str) -> Self {
        Self {
            bot,
            chat: parse_recipient(channel_id),
        }
    }
}

/// Numeric ids address the chat directly; anything else is an `@username`.
pub fn parse_recipient(channel_id: &str) -> Recipient {
    let trimmed = channel_id.trim();
    match trimmed.parse::<i64>() {
        Ok(id) => Recipient::Id(ChatId(id)),
        Err(_) => Recipient::ChannelUsername(trimmed.to_string()),
    }
}

fn to_markup(keyboard: &Keyboard) -> Result<InlineKeyboardMarkup, ChannelError> {
    let mut rows = Vec::with_capacity(keyboard.rows.len());
    for row in &keyboard.rows {
        let mut buttons = Vec::with_capacity(row.len());
        for button in row {
            let url = Url::parse(&button.url).map_err(|err| {
                ChannelError::Other(format!("invalid button url {}: {}", button.url, err))
            })?;
            buttons.push(InlineKeyboardButton::url(button.text.clone(), url));
        }
        rows.push(buttons);
    }
    Ok(InlineKeyboardMarkup::new(rows))
}

impl From<RequestError> for ChannelError {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::RetryAfter(wait) => ChannelError::RetryAfter(wait),
            RequestError::Api(api) if is_gone(&api) => ChannelError::MessageGone(api.to_string()),
            other => ChannelError::Other(other.to_string()),
        }
    }
}

fn is_gone(err: &ApiError) -> bool {
    matches!(
        err,
        ApiError::MessageToDeleteNotFound
            | ApiError::MessageCantBeDeleted
            | ApiError::MessageIdInvalid
    )
}

#[async_trait]
impl Channel for TelegramChannel {
    async fn send_photo(
        &self,
        photo_url: &str,
        caption: &str,
        keyboard: &Keyboard,
    ) -> Result<i32, ChannelError> {
        let photo = Url::parse(photo_url).map_err(|err| {
            ChannelError::Other(format!("invalid image url {}: {}", photo_url, err))
        })?;
        let msg = self
            .bot
            .send_photo(self.chat.clone(), InputFile::url(photo))
            .caption(caption)
            .parse_mode(ParseMode::Html)
            .reply_markup(to_markup(keyboard)?)
            .await?;
        Ok(msg.id.0)
    }

    async fn send_text(&self, text: &str, keyboard: &Keyboard) -> Result<i32, ChannelError> {
        let msg = self
            .bot
            .send_message(self.chat.clone(), text)
            .parse_mode(ParseMode::Html)
            .reply_markup(to_markup(keyboard)?)
            .disable_web_page_preview(true)
            .await?;
        Ok(msg.id.0)
    }

    async fn delete_message(&self, message_id: i32) -> Result<(), ChannelError> {
        self.bot
            .delete_message(self.chat.clone(), MessageId(message_id))
            .await?;
        Ok(())
    }
}
