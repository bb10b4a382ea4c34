//! Reply delivery
//!
//! Synchronous gateways carry the reply in the webhook response, so nothing
//! is sent. Push gateways get one outbound call per target; every target is
//! attempted independently and failures are logged, never propagated.

use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use tokio::task::JoinHandle;

use crate::Result;
use crate::channels::{Channel, OutgoingMessage};
use crate::retry::{RetryPolicy, retry};

/// Where a reply should go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Returned as the body of the inbound request
    Inline,
    /// A single conversation on the push gateway
    Chat(String),
    /// Every configured recipient of the push gateway
    Recipients,
}

/// A synthesized reply on its way out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyMessage {
    pub text: String,
    pub destination: Destination,
}

impl ReplyMessage {
    #[must_use]
    pub const fn new(text: String, destination: Destination) -> Self {
        Self { text, destination }
    }
}

/// Outcome of one dispatch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Text to return in the inbound response, for inline replies
    pub inline: Option<String>,
    /// Targets an outbound call was made for
    pub attempted: usize,
    /// Targets that accepted the message
    pub delivered: usize,
    /// Targets that could not be reached
    pub failed: Vec<String>,
}

/// Sends replies through one gateway
pub struct DeliveryDispatcher {
    channel: Arc<dyn Channel>,
    recipients: Vec<String>,
    policy: RetryPolicy,
}

impl DeliveryDispatcher {
    /// Create a dispatcher for `channel` with a (possibly empty) recipient list
    #[must_use]
    pub fn new(channel: Arc<dyn Channel>, recipients: Vec<String>) -> Self {
        Self {
            channel,
            recipients,
            policy: RetryPolicy::fixed(2, std::time::Duration::from_millis(500)),
        }
    }

    /// Override the retry policy applied to each outbound call
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Configured push recipients
    #[must_use]
    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    /// Deliver `reply`
    ///
    /// Never fails: per-target errors are logged and listed in the report.
    pub async fn send(&self, reply: &ReplyMessage) -> DeliveryReport {
        let targets: Vec<&str> = match &reply.destination {
            Destination::Inline => {
                return DeliveryReport {
                    inline: Some(reply.text.clone()),
                    ..DeliveryReport::default()
                };
            }
            Destination::Chat(id) => vec![id.as_str()],
            Destination::Recipients => self.recipients.iter().map(String::as_str).collect(),
        };

        if targets.is_empty() {
            tracing::warn!(
                channel = self.channel.name(),
                "no recipients configured, reply dropped"
            );
        }

        let results = join_all(targets.iter().map(|target| self.deliver(target, &reply.text))).await;

        let mut report = DeliveryReport {
            attempted: targets.len(),
            ..DeliveryReport::default()
        };
        for (target, result) in targets.iter().zip(results) {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        channel = self.channel.name(),
                        recipient = *target,
                        error = %e,
                        "delivery failed"
                    );
                    report.failed.push((*target).to_string());
                }
            }
        }

        tracing::debug!(
            channel = self.channel.name(),
            attempted = report.attempted,
            delivered = report.delivered,
            "reply dispatched"
        );
        report
    }

    /// Wait for `reply` and deliver it on a background task
    ///
    /// The caller does not have to wait: generation latency stays off the
    /// inbound request.
    pub fn spawn_send<F>(self: &Arc<Self>, reply: F) -> JoinHandle<DeliveryReport>
    where
        F: Future<Output = ReplyMessage> + Send + 'static,
    {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            let reply = reply.await;
            dispatcher.send(&reply).await
        })
    }

    async fn deliver(&self, target: &str, text: &str) -> Result<()> {
        retry(&self.policy, "delivery", || {
            self.channel
                .send(OutgoingMessage::text(target.to_string(), text.to_string()))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::Error;

    /// Records every send; fails for targets in `failing`
    struct RecordingChannel {
        failing: Vec<&'static str>,
        sent: Mutex<Vec<OutgoingMessage>>,
    }

    impl RecordingChannel {
        fn new(failing: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                failing,
                sent: Mutex::new(Vec::new()),
            })
        }

        fn targets(&self) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|m| m.channel_id.clone())
                .collect()
        }
    }

    #[async_trait]
    impl Channel for RecordingChannel {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn send(&self, message: OutgoingMessage) -> Result<()> {
            let fail = self.failing.contains(&message.channel_id.as_str());
            self.sent.lock().unwrap().push(message);
            if fail {
                Err(Error::Channel("recipient unreachable".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn recipients(ids: &[&str]) -> Vec<String> {
        ids.iter().map(ToString::to_string).collect()
    }

    #[tokio::test]
    async fn inline_reply_makes_no_calls() {
        let channel = RecordingChannel::new(vec![]);
        let dispatcher = DeliveryDispatcher::new(channel.clone(), recipients(&["a"]));

        let report = dispatcher
            .send(&ReplyMessage::new("hey".to_string(), Destination::Inline))
            .await;

        assert_eq!(report.inline.as_deref(), Some("hey"));
        assert_eq!(report.attempted, 0);
        assert!(channel.targets().is_empty());
    }

    #[tokio::test]
    async fn failing_recipient_does_not_block_others() {
        let channel = RecordingChannel::new(vec!["second"]);
        let dispatcher = DeliveryDispatcher::new(
            channel.clone(),
            recipients(&["first", "second", "third"]),
        )
        .with_policy(RetryPolicy::none());

        let report = dispatcher
            .send(&ReplyMessage::new("hey".to_string(), Destination::Recipients))
            .await;

        let mut targets = channel.targets();
        targets.sort();
        assert_eq!(targets, vec!["first", "second", "third"]);
        assert_eq!(report.attempted, 3);
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, vec!["second".to_string()]);
    }

    #[tokio::test]
    async fn failed_delivery_is_retried_per_policy() {
        let channel = RecordingChannel::new(vec!["only"]);
        let dispatcher = DeliveryDispatcher::new(channel.clone(), recipients(&["only"]))
            .with_policy(RetryPolicy::fixed(3, std::time::Duration::from_millis(1)));

        let report = dispatcher
            .send(&ReplyMessage::new("hey".to_string(), Destination::Recipients))
            .await;

        assert_eq!(channel.targets().len(), 3);
        assert_eq!(report.delivered, 0);
    }

    #[tokio::test]
    async fn chat_destination_sends_once() {
        let channel = RecordingChannel::new(vec![]);
        let dispatcher = DeliveryDispatcher::new(channel.clone(), recipients(&["a", "b"]));

        let report = dispatcher
            .send(&ReplyMessage::new(
                "hey".to_string(),
                Destination::Chat("42".to_string()),
            ))
            .await;

        assert_eq!(channel.targets(), vec!["42"]);
        assert_eq!(report.delivered, 1);
    }

    #[tokio::test]
    async fn no_recipients_is_not_an_error() {
        let channel = RecordingChannel::new(vec![]);
        let dispatcher = DeliveryDispatcher::new(channel.clone(), Vec::new());

        let report = dispatcher
            .send(&ReplyMessage::new("hey".to_string(), Destination::Recipients))
            .await;

        assert_eq!(report, DeliveryReport::default());
    }

    #[tokio::test]
    async fn spawned_send_runs_in_background() {
        let channel = RecordingChannel::new(vec![]);
        let dispatcher = Arc::new(DeliveryDispatcher::new(channel.clone(), Vec::new()));

        let handle = dispatcher.spawn_send(async {
            ReplyMessage::new("later".to_string(), Destination::Chat("7".to_string()))
        });

        let report = handle.await.unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(channel.targets(), vec!["7"]);
    }
}
