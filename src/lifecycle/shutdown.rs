//! Programmatic stop handle for [`Application::serve`](crate::Application::serve).

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

/// Stop handle for a served application.
///
/// Clones share one flag. Once triggered it stays triggered, so a future
/// taken from [`Shutdown::signalled`] after the trigger resolves at once.
#[derive(Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl std::fmt::Debug for Shutdown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shutdown")
            .field("triggered", &self.is_triggered())
            .finish()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Future that resolves once the handle is triggered, or every handle
    /// has been dropped. Pass it as the `shutdown` argument of `serve`.
    pub fn signalled(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.tx.subscribe();
        async move {
            loop {
                let stopped = *rx.borrow_and_update();
                if stopped || rx.changed().await.is_err() {
                    return;
                }
            }
        }
    }

    /// Ask the server to stop.
    pub fn trigger(&self) {
        if !self.tx.send_replace(true) {
            tracing::info!("Shutdown requested");
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Futures from [`Shutdown::signalled`] still waiting.
    pub fn waiting(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_signalled_resolves_after_trigger() {
        let shutdown = Shutdown::new();
        let waiter = tokio::spawn(shutdown.signalled());
        assert_eq!(shutdown.waiting(), 1);

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("shutdown not observed")
            .unwrap();
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_earlier_trigger() {
        let shutdown = Shutdown::new();
        shutdown.clone().trigger();

        tokio::time::timeout(Duration::from_secs(1), shutdown.signalled())
            .await
            .expect("trigger was missed");
    }
}
