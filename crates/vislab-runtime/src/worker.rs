//! Background forecast worker.
//!
//! Model selection takes seconds, so the dashboard hands it to a tokio
//! task: requests go in through one `mpsc` channel and
//! [`ForecastUpdate`]s come back through another. The fit itself runs on
//! the blocking pool. When several requests queue up while a fit is
//! running only the newest one is served.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use tokio::sync::mpsc;
use vislab_core::models::Metric;
use vislab_forecast::{ArimaOrder, Forecast};

use crate::error::{Result, RuntimeError};
use crate::session_cache::SessionCache;

// ── Public types ──────────────────────────────────────────────────────────────

/// One forecast selection from the dashboard.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastRequest {
    pub state: String,
    pub metric: Metric,
    pub steps: usize,
    pub alpha: f64,
}

impl ForecastRequest {
    pub fn new(state: impl Into<String>, metric: Metric, steps: usize, alpha: f64) -> Self {
        Self {
            state: state.into(),
            metric,
            steps,
            alpha,
        }
    }
}

/// Progress of a request, forwarded to the UI.
#[derive(Debug, Clone)]
pub enum ForecastUpdate {
    Started(ForecastRequest),
    Ready {
        request: ForecastRequest,
        forecast: Arc<Forecast>,
        order: Option<ArimaOrder>,
        seconds: f64,
    },
    Failed {
        request: ForecastRequest,
        message: String,
    },
}

impl ForecastUpdate {
    pub fn request(&self) -> &ForecastRequest {
        match self {
            Self::Started(request) => request,
            Self::Ready { request, .. } | Self::Failed { request, .. } => request,
        }
    }
}

/// Cache shared between the worker and the UI thread.
pub type SharedCache = Arc<Mutex<SessionCache>>;

/// Lock the shared cache. A panic during a fit leaves the cache itself
/// consistent (entries are inserted only after success), so poisoning is
/// ignored.
pub fn lock_cache(cache: &SharedCache) -> MutexGuard<'_, SessionCache> {
    cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Forecast, selected order and elapsed seconds.
type Fitted = (Arc<Forecast>, Option<ArimaOrder>, f64);

// ── ForecastWorker ────────────────────────────────────────────────────────────

pub struct ForecastWorker {
    cache: SharedCache,
}

impl ForecastWorker {
    pub fn new(cache: SharedCache) -> Self {
        Self { cache }
    }

    /// Spawn the worker loop.
    ///
    /// Returns the request sender, the update receiver and a handle that
    /// aborts the loop. The loop also exits once every sender is dropped.
    pub fn start(
        self,
    ) -> (
        mpsc::Sender<ForecastRequest>,
        mpsc::Receiver<ForecastUpdate>,
        ForecastHandle,
    ) {
        let (req_tx, req_rx) = mpsc::channel(16);
        let (update_tx, update_rx) = mpsc::channel(16);

        let handle = tokio::spawn(async move {
            self.worker_loop(req_rx, update_tx).await;
        });

        (req_tx, update_rx, ForecastHandle { handle })
    }

    async fn worker_loop(
        self,
        mut requests: mpsc::Receiver<ForecastRequest>,
        updates: mpsc::Sender<ForecastUpdate>,
    ) {
        while let Some(mut request) = requests.recv().await {
            while let Ok(newer) = requests.try_recv() {
                tracing::debug!(state = %request.state, "superseded forecast request dropped");
                request = newer;
            }

            if updates.send(ForecastUpdate::Started(request.clone())).await.is_err() {
                break;
            }

            let update = match self.run(request.clone()).await {
                Ok((forecast, order, seconds)) => ForecastUpdate::Ready {
                    request,
                    forecast,
                    order,
                    seconds,
                },
                Err(e) => ForecastUpdate::Failed {
                    request,
                    message: e.to_string(),
                },
            };

            if updates.send(update).await.is_err() {
                tracing::debug!("forecast update channel closed; exiting loop");
                break;
            }
        }
    }

    async fn run(&self, request: ForecastRequest) -> Result<Fitted> {
        let cache = Arc::clone(&self.cache);
        tokio::task::spawn_blocking(move || -> Result<Fitted> {
            let start = Instant::now();
            let mut cache = lock_cache(&cache);
            cache.set_alpha(request.alpha);
            let forecast = cache.forecast(&request.state, request.metric, request.steps)?;
            let order = cache.model(&request.state, request.metric)?.order();
            Ok((forecast, order, start.elapsed().as_secs_f64()))
        })
        .await
        .map_err(|e| RuntimeError::Task(e.to_string()))?
    }
}

// ── ForecastHandle ────────────────────────────────────────────────────────────

/// Handle to the background worker task.
pub struct ForecastHandle {
    handle: tokio::task::JoinHandle<()>,
}

impl ForecastHandle {
    /// Abort the worker loop; a fit already on the blocking pool runs to
    /// completion but its result is discarded.
    pub fn abort(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::session_cache::tests::cache;

    fn worker() -> (ForecastWorker, SharedCache) {
        let shared = Arc::new(Mutex::new(cache()));
        (ForecastWorker::new(Arc::clone(&shared)), shared)
    }

    async fn next(rx: &mut mpsc::Receiver<ForecastUpdate>) -> ForecastUpdate {
        tokio::time::timeout(Duration::from_secs(30), rx.recv())
            .await
            .expect("timed out waiting for update")
            .expect("channel closed before update")
    }

    // ── request / update ──────────────────────────────────────────────────

    #[test]
    fn test_update_request_accessor() {
        let request = ForecastRequest::new("Texas", Metric::Covid19, 10, 0.05);
        let update = ForecastUpdate::Failed {
            request: request.clone(),
            message: "boom".into(),
        };
        assert_eq!(update.request(), &request);
        assert_eq!(ForecastUpdate::Started(request.clone()).request().steps, 10);
    }

    // ── async: forecasts ──────────────────────────────────────────────────

    #[tokio::test]
    async fn test_worker_sends_started_then_ready() {
        let (worker, shared) = worker();
        let (tx, mut rx, handle) = worker.start();

        tx.send(ForecastRequest::new("Texas", Metric::Covid19, 6, 0.05))
            .await
            .unwrap();

        assert!(matches!(next(&mut rx).await, ForecastUpdate::Started(_)));
        match next(&mut rx).await {
            ForecastUpdate::Ready { forecast, order, .. } => {
                assert_eq!(forecast.values.len(), 6);
                assert!(order.is_some());
            }
            other => panic!("expected Ready, got {other:?}"),
        }
        assert_eq!(lock_cache(&shared).len(), 3);

        handle.abort();
    }

    #[tokio::test]
    async fn test_worker_reports_failure() {
        let (worker, _shared) = worker();
        let (tx, mut rx, handle) = worker.start();

        tx.send(ForecastRequest::new("Atlantis", Metric::Covid19, 6, 0.05))
            .await
            .unwrap();

        assert!(matches!(next(&mut rx).await, ForecastUpdate::Started(_)));
        match next(&mut rx).await {
            ForecastUpdate::Failed { request, message } => {
                assert_eq!(request.state, "Atlantis");
                assert!(message.contains("Atlantis"));
            }
            other => panic!("expected Failed, got {other:?}"),
        }

        handle.abort();
    }

    #[tokio::test]
    async fn test_worker_exits_when_senders_dropped() {
        let (worker, _shared) = worker();
        let (tx, _rx, handle) = worker.start();
        drop(tx);

        tokio::time::timeout(Duration::from_secs(5), async {
            while !handle.is_finished() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("worker did not exit");
    }

    #[tokio::test]
    async fn test_worker_start_and_abort() {
        let (worker, _shared) = worker();
        let (_tx, _rx, handle) = worker.start();
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.abort();
    }
}
