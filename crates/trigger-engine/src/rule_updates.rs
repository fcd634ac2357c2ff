use async_trait::async_trait;
use futures::{Stream, StreamExt};
use redis::aio::PubSub;
use std::pin::Pin;
use trigger_repo::InvalidationHint;

/// Best-effort push invalidation for [`trigger_repo::RuleRepository`]
/// over the `trigger:rules:update` pub/sub channel (spec.md §4.3,
/// §6). Never a correctness dependency — the version counter in
/// `trigger-store` is — so a dropped connection here only slows down
/// how quickly other workers notice a rule change, it never produces
/// a stale read.
pub struct RedisInvalidationHint {
    stream: Pin<Box<dyn Stream<Item = redis::Msg> + Send>>,
}

impl RedisInvalidationHint {
    pub async fn subscribe(redis_url: &str, channel: &str) -> redis::RedisResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let mut pubsub: PubSub = client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;
        Ok(Self {
            stream: Box::pin(pubsub.into_on_message()),
        })
    }
}

#[async_trait]
impl InvalidationHint for RedisInvalidationHint {
    async fn recv(&mut self) -> Option<()> {
        self.stream.next().await.map(|_| ())
    }
}
