//! Startup/shutdown orchestration over an ordered list of extensions.
//!
//! # Responsibilities
//! - Run every extension's setup in order, each under a deadline
//! - Merge contributed state and publish it to request handlers
//! - Tear down started extensions in reverse order, best-effort
//! - Close the registry after the last teardown
//!
//! # Design Decisions
//! - Fail fast on startup: the first setup error stops the sequence
//! - A failed startup unwinds whatever already started before returning
//! - Shutdown never stops early; every failure is logged and reported
//! - Only one startup may be active at a time
//! - A startup cancelled mid-setup unwinds in the background before the
//!   lifespan accepts another startup

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use thiserror::Error;

use crate::config::Settings;
use crate::lifecycle::extension::{Extension, LifecycleContext};
use crate::lifecycle::state::LifespanState;
use crate::observability::metrics;
use crate::registry::Registry;
use crate::BoxError;

/// Errors that abort a lifespan startup.
#[derive(Debug, Error)]
pub enum LifespanError {
    #[error("Extension '{extension}' failed to start: {source}")]
    Setup {
        extension: String,
        #[source]
        source: BoxError,
    },

    #[error("Extension '{extension}' did not start within {secs}s")]
    SetupTimeout { extension: String, secs: u64 },

    #[error("Extension state key collision from '{extension}': {}", .keys.join(", "))]
    StateCollision { extension: String, keys: Vec<String> },

    #[error("Lifespan is already running")]
    AlreadyRunning,
}

/// A teardown that exceeded its deadline.
#[derive(Debug, Error)]
#[error("Extension '{extension}' did not stop within {secs}s")]
pub struct TeardownTimeout {
    pub extension: String,
    pub secs: u64,
}

/// One failed step during shutdown.
#[derive(Debug)]
pub struct TeardownFailure {
    /// Extension name, or `registry:<hook>` for a registry close hook.
    pub name: String,
    pub error: BoxError,
}

/// Outcome of a shutdown.
#[derive(Debug, Default)]
pub struct ShutdownReport {
    /// Extensions whose teardown succeeded, in the order they stopped.
    pub stopped: Vec<String>,
    pub failures: Vec<TeardownFailure>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

struct LifespanInner {
    extensions: Vec<Arc<dyn Extension>>,
    context: LifecycleContext,
    published: Arc<ArcSwap<LifespanState>>,
    running: AtomicBool,
}

/// Composite lifespan for a fixed, ordered set of extensions.
#[derive(Clone)]
pub struct Lifespan {
    inner: Arc<LifespanInner>,
}

impl std::fmt::Debug for Lifespan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifespan")
            .field("extensions", &self.extension_names())
            .field("running", &self.is_running())
            .finish()
    }
}

impl Lifespan {
    pub fn new(extensions: Vec<Arc<dyn Extension>>, settings: Arc<Settings>, registry: Registry) -> Self {
        Self {
            inner: Arc::new(LifespanInner {
                extensions,
                context: LifecycleContext::new(settings, registry),
                published: Arc::new(ArcSwap::from_pointee(LifespanState::default())),
                running: AtomicBool::new(false),
            }),
        }
    }

    /// Registry shared with every extension; use it for test overrides.
    pub fn registry(&self) -> &Registry {
        self.inner.context.registry()
    }

    pub fn settings(&self) -> &Settings {
        self.inner.context.settings()
    }

    pub fn extension_names(&self) -> Vec<&str> {
        self.inner.extensions.iter().map(|e| e.name()).collect()
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// State published by the current run (empty when not running).
    pub fn state(&self) -> Arc<LifespanState> {
        self.inner.published.load_full()
    }

    pub(crate) fn published(&self) -> Arc<ArcSwap<LifespanState>> {
        self.inner.published.clone()
    }

    /// Run every extension's setup in order.
    ///
    /// On failure, extensions that already started are torn down in reverse
    /// order and the registry is closed before the error is returned. The
    /// extension whose setup failed is not torn down.
    pub async fn startup(&self) -> Result<LifespanGuard, LifespanError> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Err(LifespanError::AlreadyRunning);
        }

        let ctx = &self.inner.context;
        let secs = ctx.settings().startup_timeout_secs;
        let deadline = Duration::from_secs(secs);
        let begun = Instant::now();

        let mut attempt = StartupAttempt {
            lifespan: self.clone(),
            entered: Vec::with_capacity(self.inner.extensions.len()),
            armed: true,
        };
        let mut state = LifespanState::default();

        for extension in &self.inner.extensions {
            let name = extension.name().to_string();
            let started = Instant::now();
            tracing::info!(extension = %name, "Starting extension");

            let contributed = match tokio::time::timeout(deadline, extension.setup(ctx)).await {
                Ok(Ok(contributed)) => contributed,
                Ok(Err(source)) => {
                    metrics::record_extension(&name, "setup", false, started);
                    tracing::error!(extension = %name, error = %source, "Extension failed to start");
                    self.unwind(attempt.disarm()).await;
                    return Err(LifespanError::Setup { extension: name, source });
                }
                Err(_) => {
                    metrics::record_extension(&name, "setup", false, started);
                    tracing::error!(extension = %name, timeout_secs = secs, "Extension startup timed out");
                    self.unwind(attempt.disarm()).await;
                    return Err(LifespanError::SetupTimeout { extension: name, secs });
                }
            };

            metrics::record_extension(&name, "setup", true, started);
            attempt.entered.push(extension.clone());

            if let Err(e) = state.merge(&name, contributed) {
                tracing::error!(extension = %name, error = %e, "Extension state rejected");
                self.unwind(attempt.disarm()).await;
                return Err(e);
            }
        }

        let entered = attempt.disarm();
        let state = Arc::new(state);
        self.inner.published.store(state.clone());

        tracing::info!(
            extensions = entered.len(),
            state_keys = state.len(),
            services = ctx.registry().len(),
            elapsed_ms = begun.elapsed().as_millis() as u64,
            "Lifespan started"
        );

        Ok(LifespanGuard {
            lifespan: self.clone(),
            entered,
            state,
            finished: false,
        })
    }

    async fn unwind(&self, entered: Vec<Arc<dyn Extension>>) {
        let report = self.teardown_all(entered).await;
        if !report.is_clean() {
            tracing::warn!(failures = report.failures.len(), "Cleanup after failed startup was incomplete");
        }
    }

    async fn teardown_all(&self, entered: Vec<Arc<dyn Extension>>) -> ShutdownReport {
        let ctx = &self.inner.context;
        let secs = ctx.settings().shutdown_timeout_secs;
        let deadline = Duration::from_secs(secs);
        let mut report = ShutdownReport::default();

        for extension in entered.iter().rev() {
            let name = extension.name().to_string();
            let started = Instant::now();
            tracing::info!(extension = %name, "Stopping extension");

            let error: Option<BoxError> = match tokio::time::timeout(deadline, extension.teardown(ctx)).await {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e),
                Err(_) => Some(Box::new(TeardownTimeout {
                    extension: name.clone(),
                    secs,
                })),
            };

            metrics::record_extension(&name, "teardown", error.is_none(), started);
            match error {
                None => report.stopped.push(name),
                Some(error) => {
                    tracing::error!(extension = %name, error = %error, "Extension failed to stop cleanly");
                    report.failures.push(TeardownFailure { name, error });
                }
            }
        }

        for (hook, error) in ctx.registry().close().await {
            report.failures.push(TeardownFailure {
                name: format!("registry:{hook}"),
                error,
            });
        }

        self.inner.published.store(Arc::new(LifespanState::default()));
        self.inner.running.store(false, Ordering::SeqCst);
        report
    }
}

/// Extensions entered by a startup still in progress.
///
/// Dropped while armed means the startup future was cancelled: the entered
/// extensions are unwound on the current runtime, and `running` stays set
/// until that finishes.
struct StartupAttempt {
    lifespan: Lifespan,
    entered: Vec<Arc<dyn Extension>>,
    armed: bool,
}

impl StartupAttempt {
    fn disarm(&mut self) -> Vec<Arc<dyn Extension>> {
        self.armed = false;
        std::mem::take(&mut self.entered)
    }
}

impl Drop for StartupAttempt {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let entered = std::mem::take(&mut self.entered);
        let names: Vec<&str> = entered.iter().map(|e| e.name()).collect();
        tracing::warn!(extensions = ?names, "Startup cancelled before completing");

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let lifespan = self.lifespan.clone();
                handle.spawn(async move { lifespan.unwind(entered).await });
            }
            Err(_) => {
                tracing::warn!("No runtime left to unwind on; teardown skipped");
                self.lifespan.inner.running.store(false, Ordering::SeqCst);
            }
        }
    }
}

/// A started lifespan. Call [`LifespanGuard::shutdown`] to stop it.
#[must_use = "dropping the guard skips extension teardown"]
pub struct LifespanGuard {
    lifespan: Lifespan,
    entered: Vec<Arc<dyn Extension>>,
    state: Arc<LifespanState>,
    finished: bool,
}

impl std::fmt::Debug for LifespanGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifespanGuard")
            .field("entered", &self.entered.len())
            .field("state", &self.state)
            .finish()
    }
}

impl LifespanGuard {
    /// Merged state of every started extension.
    pub fn state(&self) -> &Arc<LifespanState> {
        &self.state
    }

    pub fn registry(&self) -> &Registry {
        self.lifespan.registry()
    }

    /// Tear down in reverse order, then close the registry.
    pub async fn shutdown(mut self) -> ShutdownReport {
        self.finished = true;
        let entered = std::mem::take(&mut self.entered);
        let report = self.lifespan.teardown_all(entered).await;

        if report.is_clean() {
            tracing::info!(stopped = report.stopped.len(), "Lifespan stopped");
        } else {
            tracing::warn!(
                stopped = report.stopped.len(),
                failures = report.failures.len(),
                "Lifespan stopped with failures"
            );
        }
        report
    }
}

impl Drop for LifespanGuard {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(
                extensions = self.entered.len(),
                "Lifespan guard dropped without shutdown; teardown skipped"
            );
            self.lifespan.inner.published.store(Arc::new(LifespanState::default()));
            self.lifespan.inner.running.store(false, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::state::ExtensionState;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    #[derive(Clone, Copy, PartialEq)]
    enum Fail {
        Never,
        Setup,
        Teardown,
        Hang,
        HangFirst,
        HangTeardown,
    }

    struct Stub {
        name: &'static str,
        key: Option<&'static str>,
        fail: Fail,
        attempts: AtomicUsize,
        log: Log,
    }

    impl Stub {
        fn new(name: &'static str, log: &Log) -> Self {
            Self {
                name,
                key: None,
                fail: Fail::Never,
                attempts: AtomicUsize::new(0),
                log: log.clone(),
            }
        }

        fn key(mut self, key: &'static str) -> Self {
            self.key = Some(key);
            self
        }

        fn fail(mut self, fail: Fail) -> Self {
            self.fail = fail;
            self
        }
    }

    #[async_trait]
    impl Extension for Stub {
        fn name(&self) -> &str {
            self.name
        }

        async fn setup(&self, _ctx: &LifecycleContext) -> Result<ExtensionState, BoxError> {
            self.log.lock().unwrap().push(format!("setup:{}", self.name));
            let first = self.attempts.fetch_add(1, Ordering::SeqCst) == 0;
            let hang = match self.fail {
                Fail::Setup => return Err(format!("{} exploded", self.name).into()),
                Fail::Hang => true,
                Fail::HangFirst => first,
                _ => false,
            };
            if hang {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }

            let mut state = ExtensionState::new();
            if let Some(key) = self.key {
                state.insert(key, self.name.to_string());
            }
            Ok(state)
        }

        async fn teardown(&self, _ctx: &LifecycleContext) -> Result<(), BoxError> {
            self.log.lock().unwrap().push(format!("teardown:{}", self.name));
            match self.fail {
                Fail::Teardown => Err(format!("{} refused to stop", self.name).into()),
                Fail::HangTeardown => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(())
                }
                _ => Ok(()),
            }
        }
    }

    fn lifespan(extensions: Vec<Stub>, settings: Settings) -> Lifespan {
        let extensions = extensions
            .into_iter()
            .map(|e| Arc::new(e) as Arc<dyn Extension>)
            .collect();
        Lifespan::new(extensions, Arc::new(settings), Registry::new())
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn test_setup_in_order_teardown_in_reverse() {
        let log = Log::default();
        let lifespan = lifespan(
            vec![
                Stub::new("a", &log).key("a_key"),
                Stub::new("b", &log),
                Stub::new("c", &log).key("c_key"),
            ],
            Settings::default(),
        );

        let guard = lifespan.startup().await.unwrap();
        assert_eq!(*guard.state().get::<String>("a_key").unwrap(), "a");
        assert_eq!(lifespan.state().len(), 2);
        assert!(lifespan.is_running());

        let report = guard.shutdown().await;
        assert!(report.is_clean());
        assert_eq!(report.stopped, vec!["c", "b", "a"]);
        assert_eq!(
            entries(&log),
            vec!["setup:a", "setup:b", "setup:c", "teardown:c", "teardown:b", "teardown:a"]
        );
        assert!(lifespan.state().is_empty());
        assert!(!lifespan.is_running());
    }

    #[tokio::test]
    async fn test_failed_setup_unwinds_started_extensions_only() {
        let log = Log::default();
        let lifespan = lifespan(
            vec![
                Stub::new("a", &log),
                Stub::new("b", &log),
                Stub::new("c", &log).fail(Fail::Setup),
                Stub::new("d", &log),
            ],
            Settings::default(),
        );

        let err = lifespan.startup().await.unwrap_err();
        assert!(matches!(err, LifespanError::Setup { ref extension, .. } if extension == "c"));
        assert_eq!(
            entries(&log),
            vec!["setup:a", "setup:b", "setup:c", "teardown:b", "teardown:a"]
        );
        assert!(!lifespan.is_running());
    }

    #[tokio::test]
    async fn test_state_collision_tears_down_colliding_extension() {
        let log = Log::default();
        let lifespan = lifespan(
            vec![
                Stub::new("a", &log).key("shared"),
                Stub::new("b", &log).key("shared"),
            ],
            Settings::default(),
        );

        let err = lifespan.startup().await.unwrap_err();
        match err {
            LifespanError::StateCollision { extension, keys } => {
                assert_eq!(extension, "b");
                assert_eq!(keys, vec!["shared".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(
            entries(&log),
            vec!["setup:a", "setup:b", "teardown:b", "teardown:a"]
        );
    }

    #[tokio::test]
    async fn test_teardown_failure_does_not_stop_the_rest() {
        let log = Log::default();
        let lifespan = lifespan(
            vec![
                Stub::new("a", &log),
                Stub::new("b", &log).fail(Fail::Teardown),
                Stub::new("c", &log),
            ],
            Settings::default(),
        );

        let report = lifespan.startup().await.unwrap().shutdown().await;
        assert_eq!(report.stopped, vec!["c", "a"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].name, "b");
        assert_eq!(report.failures[0].error.to_string(), "b refused to stop");
    }

    #[tokio::test]
    async fn test_setup_timeout() {
        let log = Log::default();
        let settings = Settings {
            startup_timeout_secs: 1,
            ..Settings::default()
        };
        let lifespan = lifespan(
            vec![Stub::new("a", &log), Stub::new("slow", &log).fail(Fail::Hang)],
            settings,
        );

        let err = lifespan.startup().await.unwrap_err();
        assert!(matches!(err, LifespanError::SetupTimeout { ref extension, secs: 1 } if extension == "slow"));
        assert_eq!(entries(&log), vec!["setup:a", "setup:slow", "teardown:a"]);
    }

    #[tokio::test]
    async fn test_teardown_timeout_is_reported_and_rest_still_stop() {
        let log = Log::default();
        let settings = Settings {
            shutdown_timeout_secs: 1,
            ..Settings::default()
        };
        let lifespan = lifespan(
            vec![
                Stub::new("a", &log),
                Stub::new("stuck", &log).fail(Fail::HangTeardown),
                Stub::new("c", &log),
            ],
            settings,
        );

        let report = lifespan.startup().await.unwrap().shutdown().await;
        assert_eq!(report.stopped, vec!["c", "a"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].name, "stuck");
        let timeout = report.failures[0].error.downcast_ref::<TeardownTimeout>().unwrap();
        assert_eq!(timeout.secs, 1);
        assert_eq!(
            entries(&log),
            vec!["setup:a", "setup:stuck", "setup:c", "teardown:c", "teardown:stuck", "teardown:a"]
        );
        assert!(!lifespan.is_running());
    }

    #[tokio::test]
    async fn test_dropped_guard_resets_without_teardown() {
        let log = Log::default();
        let lifespan = lifespan(vec![Stub::new("a", &log).key("a_key")], Settings::default());

        let guard = lifespan.startup().await.unwrap();
        assert_eq!(lifespan.state().len(), 1);
        drop(guard);

        assert!(!lifespan.is_running());
        assert!(lifespan.state().is_empty());
        assert_eq!(entries(&log), vec!["setup:a"]);
    }

    #[tokio::test]
    async fn test_cancelled_startup_unwinds_and_can_restart() {
        let log = Log::default();
        let lifespan = lifespan(
            vec![Stub::new("a", &log), Stub::new("slow", &log).fail(Fail::HangFirst)],
            Settings::default(),
        );

        let cancelled = tokio::time::timeout(Duration::from_millis(20), lifespan.startup()).await;
        assert!(cancelled.is_err());

        for _ in 0..100 {
            if !lifespan.is_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!lifespan.is_running());
        assert_eq!(entries(&log), vec!["setup:a", "setup:slow", "teardown:a"]);

        let guard = lifespan.startup().await.unwrap();
        guard.shutdown().await;
        assert_eq!(
            entries(&log),
            vec![
                "setup:a",
                "setup:slow",
                "teardown:a",
                "setup:a",
                "setup:slow",
                "teardown:slow",
                "teardown:a"
            ]
        );
    }

    #[tokio::test]
    async fn test_second_startup_rejected_while_running() {
        let log = Log::default();
        let lifespan = lifespan(vec![Stub::new("a", &log)], Settings::default());

        let guard = lifespan.startup().await.unwrap();
        assert!(matches!(lifespan.startup().await, Err(LifespanError::AlreadyRunning)));
        guard.shutdown().await;

        let again = lifespan.startup().await.unwrap();
        again.shutdown().await;
    }

    #[tokio::test]
    async fn test_registry_closes_after_extensions() {
        let log = Log::default();
        let lifespan = lifespan(vec![Stub::new("a", &log)], Settings::default());

        let hook_log = log.clone();
        lifespan.registry().on_close("pool", move || async move {
            hook_log.lock().unwrap().push("close:pool".to_string());
            Ok::<(), BoxError>(())
        });

        lifespan.startup().await.unwrap().shutdown().await;
        assert_eq!(entries(&log), vec!["setup:a", "teardown:a", "close:pool"]);
    }
}
