#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;
use tg_catalogbot::channel::{Channel, ChannelError};
use tg_catalogbot::db;
use tg_catalogbot::model::{Keyboard, NewProduct};
use tg_catalogbot::publisher::{PublishSettings, Publisher, Sleeper};
use tokio::sync::Mutex;

pub const MANAGER_URL: &str = "https://t.me/manager";
pub const PACING: Duration = Duration::from_millis(1500);

pub async fn setup_pool() -> sqlx::SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Photo { url: String, caption: String, keyboard: Keyboard },
    Text { text: String, keyboard: Keyboard },
    Delete(i32),
}

/// Channel fake: replays queued results and records every request.
#[derive(Clone)]
pub struct RecordingChannel {
    send_responses: Arc<Mutex<VecDeque<Result<i32, ChannelError>>>>,
    delete_responses: Arc<Mutex<VecDeque<Result<(), ChannelError>>>>,
    calls: Arc<Mutex<Vec<Call>>>,
    next_id: Arc<AtomicI32>,
}

impl Default for RecordingChannel {
    fn default() -> Self {
        Self {
            send_responses: Default::default(),
            delete_responses: Default::default(),
            calls: Default::default(),
            next_id: Arc::new(AtomicI32::new(1000)),
        }
    }
}

impl RecordingChannel {
    pub fn with_send_responses(responses: Vec<Result<i32, ChannelError>>) -> Self {
        Self {
            send_responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            ..Default::default()
        }
    }

    pub async fn push_delete_responses(&self, responses: Vec<Result<(), ChannelError>>) {
        self.delete_responses.lock().await.extend(responses);
    }

    pub async fn calls(&self) -> Vec<Call> {
        self.calls.lock().await.clone()
    }

    pub async fn deleted(&self) -> Vec<i32> {
        self.calls()
            .await
            .into_iter()
            .filter_map(|c| match c {
                Call::Delete(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub async fn sends(&self) -> usize {
        self.calls()
            .await
            .iter()
            .filter(|c| !matches!(c, Call::Delete(_)))
            .count()
    }

    async fn pop_send(&self) -> Result<i32, ChannelError> {
        let mut guard = self.send_responses.lock().await;
        guard
            .pop_front()
            .unwrap_or_else(|| Ok(self.next_id.fetch_add(1, Ordering::SeqCst)))
    }
}

#[async_trait::async_trait]
impl Channel for RecordingChannel {
    async fn send_photo(
        &self,
        photo_url: &str,
        caption: &str,
        keyboard: &Keyboard,
    ) -> Result<i32, ChannelError> {
        self.calls.lock().await.push(Call::Photo {
            url: photo_url.to_string(),
            caption: caption.to_string(),
            keyboard: keyboard.clone(),
        });
        self.pop_send().await
    }

    async fn send_text(&self, text: &str, keyboard: &Keyboard) -> Result<i32, ChannelError> {
        self.calls.lock().await.push(Call::Text {
            text: text.to_string(),
            keyboard: keyboard.clone(),
        });
        self.pop_send().await
    }

    async fn delete_message(&self, message_id: i32) -> Result<(), ChannelError> {
        self.calls.lock().await.push(Call::Delete(message_id));
        let mut guard = self.delete_responses.lock().await;
        guard.pop_front().unwrap_or(Ok(()))
    }
}

/// Records requested waits and returns immediately.
#[derive(Clone, Default)]
pub struct RecordingSleeper {
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub async fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().await.push(duration);
    }
}

pub fn settings() -> PublishSettings {
    PublishSettings {
        max_retries: 3,
        pacing: PACING,
        manager_url: MANAGER_URL.into(),
    }
}

pub fn publisher(
    pool: &sqlx::SqlitePool,
    channel: &RecordingChannel,
    sleeper: &RecordingSleeper,
) -> Arc<Publisher> {
    Arc::new(Publisher::new(
        pool.clone(),
        Arc::new(channel.clone()),
        Arc::new(sleeper.clone()),
        settings(),
    ))
}

pub fn product(name: &str, stock: Option<i64>) -> NewProduct {
    NewProduct {
        name: name.into(),
        url: Some(format!("https://shop.example.com/{}", name.to_lowercase())),
        description: Some("<p>Nice</p>".into()),
        visible: true,
        stock,
        ..Default::default()
    }
}

pub async fn needs_update(pool: &sqlx::SqlitePool, product_id: i64) -> bool {
    sqlx::query_scalar("SELECT needs_update FROM products WHERE id = ?")
        .bind(product_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

pub async fn message_ids(pool: &sqlx::SqlitePool, product_id: i64) -> Vec<i32> {
    db::posted_messages(pool, product_id)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.message_id)
        .collect()
}
