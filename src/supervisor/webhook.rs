//! Webhook reconciliation
//!
//! The push gateway's webhook registration can silently drift (expired TLS,
//! a manual `setWebhook`, a platform-side reset). The reconciler re-derives
//! the registration from the live gateway every cycle and repairs it when
//! it no longer points at us.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::retry::{RetryPolicy, retry, with_timeout};
use crate::{Error, Result};

/// A gateway whose inbound webhook can be inspected and re-registered
#[async_trait]
pub trait WebhookRegistry: Send + Sync {
    /// Gateway name, for logs
    fn gateway(&self) -> &'static str;

    /// Currently registered webhook URL, `None` when nothing is registered
    async fn current_webhook(&self) -> Result<Option<String>>;

    /// Register `url` as the webhook, replacing whatever is there
    async fn register_webhook(&self, url: &str) -> Result<()>;
}

/// Reconciler state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileState {
    /// Not checked yet, or the last check failed
    Unknown,
    /// Registration matched on the last check
    Verified,
    /// A re-registration is in flight
    Repairing,
}

impl ReconcileState {
    const fn as_u8(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Verified => 1,
            Self::Repairing => 2,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Verified,
            2 => Self::Repairing,
            _ => Self::Unknown,
        }
    }
}

/// Expected vs. observed registration for one cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookRegistration {
    pub expected_url: String,
    pub observed_url: Option<String>,
}

impl WebhookRegistration {
    /// Whether the gateway points at the expected URL
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.observed_url.as_deref() == Some(self.expected_url.as_str())
    }
}

/// Result of one reconciliation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Registration already matched; nothing was changed
    Verified,
    /// Registration was missing or wrong and has been replaced
    Repaired { previous: Option<String> },
}

/// Periodically verifies and repairs a gateway's webhook registration
pub struct WebhookReconciler {
    registry: Arc<dyn WebhookRegistry>,
    expected_url: String,
    interval: Duration,
    call_timeout: Duration,
    policy: RetryPolicy,
    state: AtomicU8,
}

impl WebhookReconciler {
    /// Create a reconciler with default timing (15 min cycle, 10 s calls,
    /// 3 attempts 2 s apart)
    #[must_use]
    pub fn new(registry: Arc<dyn WebhookRegistry>, expected_url: impl Into<String>) -> Self {
        Self {
            registry,
            expected_url: expected_url.into(),
            interval: Duration::from_secs(15 * 60),
            call_timeout: Duration::from_secs(10),
            policy: RetryPolicy::fixed(3, Duration::from_secs(2)),
            state: AtomicU8::new(ReconcileState::Unknown.as_u8()),
        }
    }

    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    #[must_use]
    pub const fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> ReconcileState {
        ReconcileState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn expected_url(&self) -> &str {
        &self.expected_url
    }

    fn set_state(&self, state: ReconcileState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Read the live registration from the gateway
    ///
    /// # Errors
    ///
    /// Returns error if the gateway cannot be queried within the retry budget
    pub async fn observe(&self) -> Result<WebhookRegistration> {
        let observed_url = retry(&self.policy, "webhook check", || {
            with_timeout(self.call_timeout, self.registry.current_webhook())
        })
        .await?;

        Ok(WebhookRegistration {
            expected_url: self.expected_url.clone(),
            observed_url,
        })
    }

    /// Run one verify/repair pass
    ///
    /// Makes a single re-registration call when the registration drifted and
    /// none when it matches.
    ///
    /// # Errors
    ///
    /// Returns `Error::Webhook` if the gateway could not be queried or the
    /// repair failed
    pub async fn reconcile_once(&self) -> Result<ReconcileOutcome> {
        let gateway = self.registry.gateway();

        let registration = match self.observe().await {
            Ok(registration) => registration,
            Err(e) => {
                self.set_state(ReconcileState::Unknown);
                return Err(Error::Webhook(format!("{gateway}: check failed: {e}")));
            }
        };

        if registration.is_consistent() {
            self.set_state(ReconcileState::Verified);
            tracing::debug!(gateway, url = %registration.expected_url, "webhook verified");
            return Ok(ReconcileOutcome::Verified);
        }

        self.set_state(ReconcileState::Repairing);
        tracing::warn!(
            gateway,
            expected = %registration.expected_url,
            observed = ?registration.observed_url,
            "webhook registration drifted, re-registering"
        );

        let repaired = retry(&self.policy, "webhook repair", || {
            with_timeout(
                self.call_timeout,
                self.registry.register_webhook(&self.expected_url),
            )
        })
        .await;

        match repaired {
            Ok(()) => {
                self.set_state(ReconcileState::Verified);
                tracing::info!(gateway, url = %self.expected_url, "webhook re-registered");
                Ok(ReconcileOutcome::Repaired {
                    previous: registration.observed_url,
                })
            }
            Err(e) => {
                self.set_state(ReconcileState::Unknown);
                Err(Error::Webhook(format!("{gateway}: repair failed: {e}")))
            }
        }
    }

    /// Reconcile immediately, then once per interval, forever
    pub async fn run(self: Arc<Self>) {
        tracing::info!(
            gateway = self.registry.gateway(),
            interval_secs = self.interval.as_secs(),
            "webhook reconciler started"
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            if let Err(e) = self.reconcile_once().await {
                tracing::warn!(error = %e, "webhook reconciliation failed, will retry next cycle");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    use super::*;

    /// In-memory registry counting every call
    #[derive(Default)]
    struct MockRegistry {
        url: Mutex<Option<String>>,
        fail_checks: AtomicUsize,
        checks: AtomicUsize,
        registrations: AtomicUsize,
    }

    impl MockRegistry {
        fn with_url(url: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                url: Mutex::new(url.map(ToString::to_string)),
                ..Self::default()
            })
        }
    }

    #[async_trait]
    impl WebhookRegistry for MockRegistry {
        fn gateway(&self) -> &'static str {
            "mock"
        }

        async fn current_webhook(&self) -> Result<Option<String>> {
            self.checks.fetch_add(1, Ordering::SeqCst);
            if self
                .fail_checks
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(Error::Channel("handshake failure".to_string()));
            }
            Ok(self.url.lock().unwrap().clone())
        }

        async fn register_webhook(&self, url: &str) -> Result<()> {
            self.registrations.fetch_add(1, Ordering::SeqCst);
            *self.url.lock().unwrap() = Some(url.to_string());
            Ok(())
        }
    }

    const EXPECTED: &str = "https://bot.example/telegram";

    fn reconciler(registry: Arc<MockRegistry>) -> WebhookReconciler {
        WebhookReconciler::new(registry, EXPECTED)
            .with_retry_policy(RetryPolicy::fixed(3, Duration::from_millis(1)))
    }

    #[tokio::test]
    async fn matching_registration_makes_no_repair() {
        let registry = MockRegistry::with_url(Some(EXPECTED));
        let reconciler = reconciler(registry.clone());
        assert_eq!(reconciler.state(), ReconcileState::Unknown);

        let outcome = reconciler.reconcile_once().await.unwrap();

        assert_eq!(outcome, ReconcileOutcome::Verified);
        assert_eq!(reconciler.state(), ReconcileState::Verified);
        assert_eq!(registry.checks.load(Ordering::SeqCst), 1);
        assert_eq!(registry.registrations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn drifted_registration_is_repaired_once() {
        let registry = MockRegistry::with_url(Some("https://old.example/hook"));
        let reconciler = reconciler(registry.clone());

        let outcome = reconciler.reconcile_once().await.unwrap();

        assert_eq!(
            outcome,
            ReconcileOutcome::Repaired {
                previous: Some("https://old.example/hook".to_string())
            }
        );
        assert_eq!(registry.registrations.load(Ordering::SeqCst), 1);
        assert_eq!(registry.url.lock().unwrap().as_deref(), Some(EXPECTED));
        assert_eq!(reconciler.state(), ReconcileState::Verified);

        // Next cycle sees the repaired registration
        let outcome = reconciler.reconcile_once().await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Verified);
        assert_eq!(registry.registrations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_registration_is_repaired() {
        let registry = MockRegistry::with_url(None);
        let reconciler = reconciler(registry.clone());

        let outcome = reconciler.reconcile_once().await.unwrap();

        assert_eq!(outcome, ReconcileOutcome::Repaired { previous: None });
        assert_eq!(registry.registrations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_check_failure_is_retried() {
        let registry = MockRegistry::with_url(Some(EXPECTED));
        registry.fail_checks.store(2, Ordering::SeqCst);
        let reconciler = reconciler(registry.clone());

        let outcome = reconciler.reconcile_once().await.unwrap();

        assert_eq!(outcome, ReconcileOutcome::Verified);
        assert_eq!(registry.checks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_checks_leave_state_unknown() {
        let registry = MockRegistry::with_url(Some(EXPECTED));
        registry.fail_checks.store(10, Ordering::SeqCst);
        let reconciler = reconciler(registry.clone());

        let err = reconciler.reconcile_once().await.unwrap_err();

        assert!(matches!(err, Error::Webhook(_)));
        assert_eq!(reconciler.state(), ReconcileState::Unknown);
        assert_eq!(registry.checks.load(Ordering::SeqCst), 3);
        assert_eq!(registry.registrations.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn registration_consistency() {
        let registration = WebhookRegistration {
            expected_url: EXPECTED.to_string(),
            observed_url: None,
        };
        assert!(!registration.is_consistent());

        let registration = WebhookRegistration {
            observed_url: Some(EXPECTED.to_string()),
            ..registration
        };
        assert!(registration.is_consistent());
    }
}
