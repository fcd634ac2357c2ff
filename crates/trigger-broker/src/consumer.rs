use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{Connection, ConnectionProperties};
use tokio_util::sync::CancellationToken;
use trigger_config::{trg_debug, trg_error, trg_warn};
use trigger_types::Event;

use crate::error::{BrokerError, BrokerResult};

/// What the handler decided about one delivered message.
///
/// `Ack` covers both "processed successfully" and "malformed, drop it"
/// (spec.md §7 `MalformedEvent` is acked and dropped, not retried);
/// `NackRequeue` is reserved for systemic failures where redelivery
/// might succeed later (store unreachable, worker crash).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    NackRequeue,
}

/// The event-handler side of the broker boundary. Implemented by an
/// adapter in the binary crate that wraps
/// `trigger_core::EventHandler::handle`; kept as a trait here so this
/// crate never depends on `trigger-core` (the dependency points the
/// other way: the binary wires broker → handler, not the reverse).
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, event: Event) -> Disposition;
}

/// AMQP ingress adapter (spec.md §6): a single-queue consumer that
/// decodes JSON events, dispatches them to a [`MessageHandler`] under
/// a per-message deadline, and acks/nacks per its
/// [`Disposition`] — the teacher's accept-loop-plus-cancellation shape
/// (`wf-runtime::receiver::Receiver::run`) ported from a raw TCP
/// frame loop to a `lapin` consumer stream.
pub struct EventConsumer {
    connection: Connection,
    queue: String,
    prefetch: u16,
    message_deadline: Duration,
}

impl EventConsumer {
    pub async fn connect(amqp_url: &str, queue: &str) -> BrokerResult<Self> {
        let connection = Connection::connect(amqp_url, ConnectionProperties::default()).await?;
        Ok(Self {
            connection,
            queue: queue.to_string(),
            prefetch: 32,
            message_deadline: Duration::from_secs(60),
        })
    }

    pub fn with_prefetch(mut self, prefetch: u16) -> Self {
        self.prefetch = prefetch;
        self
    }

    pub fn with_message_deadline(mut self, deadline: Duration) -> Self {
        self.message_deadline = deadline;
        self
    }

    /// Consume until `cancel` fires, dispatching every message to
    /// `handler`. Returns once the consumer stream closes or
    /// cancellation is observed.
    pub async fn run(self, handler: Arc<dyn MessageHandler>, cancel: CancellationToken) -> BrokerResult<()> {
        let channel = self.connection.create_channel().await?;
        channel
            .basic_qos(self.prefetch, BasicQosOptions::default())
            .await?;
        channel
            .queue_declare(&self.queue, QueueDeclareOptions::default(), FieldTable::default())
            .await?;

        let mut consumer = channel
            .basic_consume(
                &self.queue,
                "trigger-engine",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    trg_debug!(sys, "broker consumer shutting down");
                    return Ok(());
                }
                next = consumer.next() => {
                    let Some(delivery) = next else {
                        trg_warn!(sys, "broker consumer stream closed");
                        return Ok(());
                    };
                    let delivery = delivery?;
                    let tag = delivery.delivery_tag;

                    let disposition = match serde_json::from_slice::<Event>(&delivery.data) {
                        Ok(event) => {
                            match tokio::time::timeout(self.message_deadline, handler.handle(event)).await {
                                Ok(d) => d,
                                Err(_) => {
                                    trg_error!(sys, "handler exceeded message deadline, nacking for redelivery");
                                    Disposition::NackRequeue
                                }
                            }
                        }
                        Err(e) => {
                            trg_warn!(sys, error = %e, "malformed event, acking and dropping");
                            Disposition::Ack
                        }
                    };

                    match disposition {
                        Disposition::Ack => {
                            channel.basic_ack(tag, BasicAckOptions::default()).await?;
                        }
                        Disposition::NackRequeue => {
                            channel
                                .basic_nack(tag, BasicNackOptions { requeue: true, ..Default::default() })
                                .await?;
                        }
                    }
                }
            }
        }
    }
}
