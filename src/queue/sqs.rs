//! # Amazon SQS transport
//!
//! [`SqsQueue::connect_pool`] resolves the queue URL once by name and then
//! builds one independent client per pool worker, all pointing at that URL.
//!
//! Partial batch-delete results are reported as [`QueueError::PartialDelete`];
//! messages without a receipt handle cannot be acknowledged and are skipped.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_sqs::config::Region;
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::types::DeleteMessageBatchRequestEntry;
use aws_sdk_sqs::Client;
use tracing::{info, warn};

use crate::error::QueueError;
use crate::queue::{DeleteEntry, DeleteHandle, MessageBatch, QueueClient, QueueMessage};

/// Connection parameters shared by every client of the pool.
#[derive(Clone, Debug, Default)]
pub struct SqsOptions {
    /// Queue name, resolved to a URL at startup.
    pub queue_name: String,
    /// Region override (`None` = SDK default chain).
    pub region: Option<String>,
    /// Endpoint override, e.g. a local SQS emulator.
    pub endpoint: Option<String>,
}

/// One SQS client handle bound to a resolved queue URL.
pub struct SqsQueue {
    client: Client,
    queue_url: Arc<str>,
}

impl SqsQueue {
    /// Builds `connections` independent clients and resolves the queue URL once.
    ///
    /// Fails with [`QueueError::Resolve`] if the queue cannot be found.
    pub async fn connect_pool(
        opts: &SqsOptions,
        connections: usize,
    ) -> Result<Vec<Arc<dyn QueueClient>>, QueueError> {
        let mut clients = Vec::with_capacity(connections);
        for _ in 0..connections {
            clients.push(Self::client(opts).await);
        }

        let first = clients.first().ok_or_else(|| QueueError::Resolve {
            queue: opts.queue_name.clone(),
            reason: "no connections requested".into(),
        })?;
        let queue_url: Arc<str> = Self::resolve(first, &opts.queue_name).await?.into();
        info!(
            queue = %opts.queue_name,
            url = %queue_url,
            connections,
            "resolved source queue"
        );

        Ok(clients
            .into_iter()
            .map(|client| {
                Arc::new(SqsQueue {
                    client,
                    queue_url: Arc::clone(&queue_url),
                }) as Arc<dyn QueueClient>
            })
            .collect())
    }

    async fn client(opts: &SqsOptions) -> Client {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &opts.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(endpoint) = &opts.endpoint {
            loader = loader.endpoint_url(endpoint.clone());
        }
        Client::new(&loader.load().await)
    }

    async fn resolve(client: &Client, name: &str) -> Result<String, QueueError> {
        let out = client
            .get_queue_url()
            .queue_name(name)
            .send()
            .await
            .map_err(|e| QueueError::Resolve {
                queue: name.to_owned(),
                reason: DisplayErrorContext(e).to_string(),
            })?;
        out.queue_url()
            .map(str::to_owned)
            .ok_or_else(|| QueueError::Resolve {
                queue: name.to_owned(),
                reason: "empty queue url".into(),
            })
    }
}

#[async_trait]
impl QueueClient for SqsQueue {
    async fn receive(
        &self,
        max_messages: usize,
        wait: Duration,
    ) -> Result<MessageBatch, QueueError> {
        let out = self
            .client
            .receive_message()
            .queue_url(self.queue_url.as_ref())
            .max_number_of_messages(max_messages as i32)
            .wait_time_seconds(wait.as_secs() as i32)
            .send()
            .await
            .map_err(|e| QueueError::Receive {
                reason: DisplayErrorContext(e).to_string(),
            })?;

        let mut messages = Vec::with_capacity(out.messages().len());
        for m in out.messages() {
            let (Some(id), Some(receipt)) = (m.message_id(), m.receipt_handle()) else {
                warn!(message_id = ?m.message_id(), "sqs message without receipt handle skipped");
                continue;
            };
            let body = m.body().unwrap_or_default().as_bytes().to_vec();
            messages.push(QueueMessage::new(id, body, DeleteHandle::new(receipt)));
        }
        Ok(MessageBatch::new(messages))
    }

    async fn delete_batch(&self, entries: &[DeleteEntry]) -> Result<(), QueueError> {
        let total = entries.len();
        let request = entries
            .iter()
            .map(|e| {
                DeleteMessageBatchRequestEntry::builder()
                    .id(e.id())
                    .receipt_handle(e.handle().as_str())
                    .build()
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| QueueError::Delete {
                reason: e.to_string(),
            })?;

        let out = self
            .client
            .delete_message_batch()
            .queue_url(self.queue_url.as_ref())
            .set_entries(Some(request))
            .send()
            .await
            .map_err(|e| QueueError::Delete {
                reason: DisplayErrorContext(e).to_string(),
            })?;

        match out.failed().len() {
            0 => Ok(()),
            failed => Err(QueueError::PartialDelete { failed, total }),
        }
    }

    fn name(&self) -> &'static str {
        "sqs"
    }
}
