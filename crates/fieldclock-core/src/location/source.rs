//! Permission handling, one-shot fixes with IP fallback, and the watch loop.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{LocationData, LocationProvider};
use crate::error::LocationError;

/// Identifies an active watch subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchHandle(Uuid);

struct ActiveWatch {
    handle: WatchHandle,
    task: JoinHandle<()>,
}

/// Front door to the selected [`LocationProvider`].
///
/// At most one watch is active at a time: `start_watching` while a watch is
/// running hands back the running watch's handle.
pub struct LocationSource {
    primary: Arc<dyn LocationProvider>,
    fallback: Option<Arc<dyn LocationProvider>>,
    cadence: Duration,
    timeout: Duration,
    watch: Mutex<Option<ActiveWatch>>,
}

impl LocationSource {
    pub fn new(primary: Arc<dyn LocationProvider>, cadence: Duration, timeout: Duration) -> Self {
        Self {
            primary,
            fallback: None,
            cadence: cadence.max(Duration::from_millis(1)),
            timeout: timeout.max(Duration::from_millis(1)),
            watch: Mutex::new(None),
        }
    }

    /// Provider consulted when the primary cannot produce a one-shot fix.
    pub fn with_fallback(mut self, fallback: Option<Arc<dyn LocationProvider>>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.primary.name()
    }

    pub async fn check_permissions(&self) -> bool {
        self.primary.check_permissions().await
    }

    /// Ask the platform for access.
    ///
    /// # Errors
    /// `PermissionDenied` when the platform refuses.
    pub async fn request_permissions(&self) -> Result<bool, LocationError> {
        match self.primary.request_permissions().await {
            Ok(true) => Ok(true),
            Ok(false) => Err(LocationError::PermissionDenied),
            Err(e) => Err(e),
        }
    }

    /// One fix from the primary provider, falling back to the IP provider
    /// once when the primary is unavailable or times out.
    ///
    /// # Errors
    /// `PositionUnknown` when both attempts fail; other primary errors
    /// (permission, end of stream) are returned unchanged.
    pub async fn get_current_position(&self) -> Result<LocationData, LocationError> {
        let err = match self.fix_from(&self.primary).await {
            Ok(fix) => return Ok(fix),
            Err(e) if e.is_recoverable() => e,
            Err(e) => return Err(e),
        };

        let Some(fallback) = &self.fallback else {
            return Err(LocationError::PositionUnknown(err.to_string()));
        };

        warn!(
            provider = self.primary.name(),
            error = %err,
            "Primary location provider failed, trying IP fallback"
        );
        self.fix_from(fallback)
            .await
            .map_err(|fallback_err| {
                LocationError::PositionUnknown(format!("{err}; fallback: {fallback_err}"))
            })
    }

    async fn fix_from(
        &self,
        provider: &Arc<dyn LocationProvider>,
    ) -> Result<LocationData, LocationError> {
        match tokio::time::timeout(self.timeout, provider.current_position()).await {
            Ok(result) => result,
            Err(_) => Err(LocationError::Timeout {
                timeout_secs: self.timeout.as_secs(),
            }),
        }
    }

    /// Start pushing fixes at the configured cadence.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_watching<F, E>(&self, on_fix: F, on_error: E) -> WatchHandle
    where
        F: Fn(LocationData) + Send + Sync + 'static,
        E: Fn(LocationError) + Send + Sync + 'static,
    {
        let mut guard = match self.watch.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(active) = guard.as_ref() {
            if !active.task.is_finished() {
                debug!("Watch already active, returning existing handle");
                return active.handle;
            }
        }

        let handle = WatchHandle(Uuid::new_v4());
        let provider = Arc::clone(&self.primary);
        let cadence = self.cadence;
        let timeout = self.timeout;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cadence);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match tokio::time::timeout(timeout, provider.current_position()).await {
                    Ok(Ok(fix)) => on_fix(fix),
                    Ok(Err(LocationError::StreamEnded)) => {
                        on_error(LocationError::StreamEnded);
                        break;
                    }
                    Ok(Err(e)) => on_error(e),
                    Err(_) => on_error(LocationError::Timeout {
                        timeout_secs: timeout.as_secs(),
                    }),
                }
            }
        });

        *guard = Some(ActiveWatch { handle, task });
        handle
    }

    /// Cancel delivery for `handle`. Returns false if it was not the active watch.
    pub fn stop_watching(&self, handle: WatchHandle) -> bool {
        let mut guard = match self.watch.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match guard.take() {
            Some(active) if active.handle == handle => {
                active.task.abort();
                true
            }
            other => {
                *guard = other;
                false
            }
        }
    }

    pub fn is_watching(&self) -> bool {
        self.watch
            .lock()
            .map(|guard| guard.as_ref().is_some_and(|w| !w.task.is_finished()))
            .unwrap_or(false)
    }
}

impl Drop for LocationSource {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.watch.lock() {
            if let Some(active) = guard.take() {
                active.task.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::{FixedProvider, ReplayProvider};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Unavailable;

    #[async_trait]
    impl LocationProvider for Unavailable {
        fn name(&self) -> &str {
            "unavailable"
        }
        async fn check_permissions(&self) -> bool {
            true
        }
        async fn request_permissions(&self) -> Result<bool, LocationError> {
            Ok(false)
        }
        async fn current_position(&self) -> Result<LocationData, LocationError> {
            Err(LocationError::PositionUnavailable("no satellites".into()))
        }
    }

    fn source(primary: Arc<dyn LocationProvider>) -> LocationSource {
        LocationSource::new(primary, Duration::from_millis(5), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn falls_back_to_ip_provider() {
        let fallback: Arc<dyn LocationProvider> =
            Arc::new(FixedProvider::new(48.1, 11.5, 10_000.0));
        let source = source(Arc::new(Unavailable)).with_fallback(Some(fallback));
        let fix = source.get_current_position().await.unwrap();
        assert_eq!(fix.accuracy_meters, 10_000.0);
    }

    #[tokio::test]
    async fn position_unknown_without_fallback() {
        let source = source(Arc::new(Unavailable));
        assert!(matches!(
            source.get_current_position().await,
            Err(LocationError::PositionUnknown(_))
        ));
    }

    #[tokio::test]
    async fn refused_permission_is_denied() {
        let source = source(Arc::new(Unavailable));
        assert_eq!(
            source.request_permissions().await,
            Err(LocationError::PermissionDenied)
        );
    }

    #[tokio::test]
    async fn second_start_returns_existing_handle() {
        let source = source(Arc::new(FixedProvider::new(1.0, 2.0, 5.0)));
        let first = source.start_watching(|_| {}, |_| {});
        let second = source.start_watching(|_| {}, |_| {});
        assert_eq!(first, second);
        assert!(source.stop_watching(first));
        assert!(!source.is_watching());
        assert!(!source.stop_watching(first));
    }

    #[tokio::test]
    async fn watch_delivers_fixes_until_stream_ends() {
        let fixes = (0..3).map(|i| LocationData::new(1.0, 2.0, 5.0, i * 1000));
        let source = source(Arc::new(ReplayProvider::from_fixes(fixes)));
        let delivered = Arc::new(AtomicUsize::new(0));
        let (done_tx, done_rx) = tokio::sync::oneshot::channel::<()>();
        let done_tx = Mutex::new(Some(done_tx));

        let counter = Arc::clone(&delivered);
        source.start_watching(
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
            move |err| {
                if err == LocationError::StreamEnded {
                    if let Some(tx) = done_tx.lock().unwrap().take() {
                        let _ = tx.send(());
                    }
                }
            },
        );

        tokio::time::timeout(Duration::from_secs(2), done_rx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivered.load(Ordering::SeqCst), 3);
    }
}
