use std::{future::Future, sync::Arc, time::Duration};

use tokio::task::JoinSet;
use tracing::{error, warn};

use super::RelayEngine;
use crate::{
    domain::{ChatId, MessageRef, UserId},
    errors::Error,
    messaging::{
        port::{send_payload, MessagingPort},
        types::Payload,
    },
    Result,
};

/// Result of delivering one payload to one target.
#[derive(Debug)]
pub(crate) struct DeliveryReport {
    pub target: UserId,
    pub result: Result<MessageRef>,
}

impl RelayEngine {
    /// Deliver `payload` to every target concurrently, each send bounded by the send timeout.
    ///
    /// Reports come back in `targets` order. Returns only once every send has finished
    /// or timed out.
    pub(crate) async fn fan_out(&self, targets: &[UserId], payload: &Payload) -> Vec<DeliveryReport> {
        let mut set = JoinSet::new();
        for (idx, target) in targets.iter().copied().enumerate() {
            let messenger = Arc::clone(&self.messenger);
            let payload = payload.clone();
            let timeout = self.cfg.send_timeout;
            set.spawn(async move {
                let result = deliver(messenger.as_ref(), timeout, target, &payload).await;
                (idx, result)
            });
        }

        let mut results: Vec<Option<Result<MessageRef>>> = targets.iter().map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, result)) => {
                    if let Err(e) = &result {
                        warn!(chat = targets[idx].0, "delivery failed: {e}");
                    }
                    results[idx] = Some(result);
                }
                Err(e) => error!("delivery task failed: {e}"),
            }
        }

        targets
            .iter()
            .zip(results)
            .map(|(target, result)| DeliveryReport {
                target: *target,
                result: result.unwrap_or_else(|| {
                    Err(Error::Delivery {
                        target: target.0,
                        reason: "delivery task aborted".to_string(),
                    })
                }),
            })
            .collect()
    }

    /// Single timed delivery (direct sends, resend).
    pub(crate) async fn deliver_one(&self, target: UserId, payload: &Payload) -> Result<MessageRef> {
        deliver(self.messenger.as_ref(), self.cfg.send_timeout, target, payload).await
    }

    /// Wait for a transport slot for `chat_id`, then bound the call by the send timeout.
    pub(crate) async fn with_timeout<T>(
        &self,
        chat_id: ChatId,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        self.messenger.throttle(Some(chat_id)).await;
        bounded(self.cfg.send_timeout, chat_id.0, fut).await
    }

    /// `with_timeout` for calls not addressed to a chat (callback answers).
    pub(crate) async fn with_global_timeout<T>(
        &self,
        caller: UserId,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        self.messenger.throttle(None).await;
        bounded(self.cfg.send_timeout, caller.0, fut).await
    }
}

async fn deliver(
    messenger: &dyn MessagingPort,
    timeout: Duration,
    target: UserId,
    payload: &Payload,
) -> Result<MessageRef> {
    // Queueing for a slot happens before the timeout starts.
    messenger.throttle(Some(target.into())).await;
    bounded(timeout, target.0, send_payload(messenger, target.into(), payload))
        .await
        .map_err(|e| match e {
            Error::Timeout { .. } | Error::Delivery { .. } => e,
            other => Error::Delivery {
                target: target.0,
                reason: other.to_string(),
            },
        })
}

async fn bounded<T>(
    timeout: Duration,
    target: i64,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout { target }),
    }
}
