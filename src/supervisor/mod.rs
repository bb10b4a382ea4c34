//! Self-healing background loops
//!
//! Long-lived loops (webhook reconciliation, liveness pings) run as
//! independent tokio tasks. Each is wrapped by [`spawn_supervised`], which
//! restarts it after a panic so a bug in a background loop never takes the
//! request path down with it.

pub mod liveness;
pub mod webhook;

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

pub use liveness::LivenessPinger;
pub use webhook::{
    ReconcileOutcome, ReconcileState, WebhookReconciler, WebhookRegistration, WebhookRegistry,
};

/// When and how often a panicked task is restarted
#[derive(Debug, Clone)]
pub struct RestartPolicy {
    /// Pause before restarting
    pub delay: Duration,
    /// Give up after this many restarts (`None` = never)
    pub max_restarts: Option<u32>,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(5),
            max_restarts: None,
        }
    }
}

/// Spawn the future built by `factory`, rebuilding it whenever it panics
///
/// A task that returns normally is not restarted.
pub fn spawn_supervised<F, Fut>(
    name: &'static str,
    policy: RestartPolicy,
    mut factory: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut restarts = 0u32;

        loop {
            match tokio::spawn(factory()).await {
                Ok(()) => {
                    tracing::info!(task = name, "background task finished");
                    return;
                }
                Err(e) if e.is_panic() => {
                    restarts += 1;
                    if policy.max_restarts.is_some_and(|max| restarts > max) {
                        tracing::error!(task = name, restarts, "background task keeps panicking, giving up");
                        return;
                    }

                    tracing::error!(task = name, restarts, "background task panicked, restarting");
                    tokio::time::sleep(policy.delay).await;
                }
                Err(e) => {
                    tracing::warn!(task = name, error = %e, "background task cancelled");
                    return;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn quick_policy(max_restarts: Option<u32>) -> RestartPolicy {
        RestartPolicy {
            delay: Duration::from_millis(1),
            max_restarts,
        }
    }

    #[tokio::test]
    async fn restarts_after_panic() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();

        let handle = spawn_supervised("flaky", quick_policy(None), move || {
            let counter = counter.clone();
            async move {
                let run = counter.fetch_add(1, Ordering::SeqCst);
                assert!(run > 0, "first run panics");
            }
        });

        handle.await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn normal_exit_is_not_restarted() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();

        spawn_supervised("oneshot", quick_policy(None), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })
        .await
        .unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_restarts() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();

        spawn_supervised("broken", quick_policy(Some(2)), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                panic!("always broken");
            }
        })
        .await
        .unwrap();

        // First run plus two restarts
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }
}
