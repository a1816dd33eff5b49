use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use condeval_cache::Weigh;

use crate::{InvalidationRouter, CHANNELS};

/// Reconnect attempts before the subscriber gives up for good.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 10;

const BACKOFF_CAP: Duration = Duration::from_secs(10);

/// Exponential reconnect delay: 1 s, 2 s, 4 s, ... capped at 10 s.
pub fn backoff_delay(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(10);
    Duration::from_secs(1u64 << exp).min(BACKOFF_CAP)
}

/// Where the pub/sub endpoint lives.
#[derive(Clone, Debug)]
pub struct BusConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: i64,
}

impl Default for BusConfig {
    fn default() -> Self {
        BusConfig {
            host: "localhost".to_string(),
            port: 6379,
            password: None,
            db: 0,
        }
    }
}

impl BusConfig {
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) if !password.is_empty() => format!(
                "redis://:{password}@{}:{}/{}",
                self.host, self.port, self.db
            ),
            _ => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

/// Subscribes to every invalidation channel and feeds messages to the
/// router, reconnecting with backoff when the connection drops.
///
/// Shutdown is cooperative: cancelling the token ends the message loop
/// and suppresses further reconnects.
pub struct RedisSubscriber<V: Clone + Weigh> {
    config: BusConfig,
    router: Arc<InvalidationRouter<V>>,
    token: CancellationToken,
    connected: Arc<AtomicBool>,
}

impl<V: Clone + Weigh + Send + Sync + 'static> RedisSubscriber<V> {
    pub fn new(
        config: BusConfig,
        router: Arc<InvalidationRouter<V>>,
        token: CancellationToken,
    ) -> Self {
        RedisSubscriber {
            config,
            router,
            token,
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared connectivity flag, for the readiness probe.
    pub fn connected_flag(&self) -> Arc<AtomicBool> {
        self.connected.clone()
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Connect-listen-reconnect until cancelled or out of attempts.
    pub async fn run(self) {
        let mut attempt: u32 = 0;
        loop {
            if self.token.is_cancelled() {
                break;
            }
            match self.listen().await {
                Ok(()) => break,
                Err(err) => {
                    // A drop after a healthy subscription restarts the
                    // attempt counter.
                    if self.connected.swap(false, Ordering::Relaxed) {
                        attempt = 0;
                    }
                    attempt += 1;
                    if attempt > MAX_RECONNECT_ATTEMPTS {
                        tracing::error!(
                            error = %err,
                            attempts = MAX_RECONNECT_ATTEMPTS,
                            "bus unreachable, giving up on reconnection"
                        );
                        break;
                    }
                    let delay = backoff_delay(attempt);
                    tracing::warn!(
                        error = %err,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "bus connection lost, reconnecting"
                    );
                    tokio::select! {
                        _ = self.token.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
        self.connected.store(false, Ordering::Relaxed);
    }

    async fn listen(&self) -> Result<(), redis::RedisError> {
        let client = redis::Client::open(self.config.url())?;
        let mut pubsub = client.get_async_pubsub().await?;
        for channel in CHANNELS {
            pubsub.subscribe(channel).await?;
        }
        self.connected.store(true, Ordering::Relaxed);
        tracing::info!(url = %self.config.url_redacted(), "subscribed to invalidation channels");

        let mut messages = pubsub.on_message();
        loop {
            tokio::select! {
                _ = self.token.cancelled() => return Ok(()),
                message = messages.next() => match message {
                    Some(message) => {
                        let channel = message.get_channel_name().to_string();
                        let payload: String = message.get_payload().unwrap_or_default();
                        self.router.dispatch(&channel, &payload).await;
                    }
                    None => {
                        return Err(redis::RedisError::from((
                            redis::ErrorKind::IoError,
                            "pubsub stream ended",
                        )));
                    }
                }
            }
        }
    }
}

impl BusConfig {
    /// The endpoint without credentials, for logs.
    fn url_redacted(&self) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, self.db)
    }
}
