//! Periodic live-location polling for an order detail view.
//!
//! Every tick re-checks the cached order status before fetching, so an
//! order that turned terminal between two ticks is never polled again.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::BackendApi;
use crate::engine::coordinator::StatusObservation;
use crate::engine::task::TaskGuard;
use crate::error::AppError;
use crate::models::event::LifecycleEvent;
use crate::models::location::LiveLocation;
use crate::models::order::OrderId;
use crate::observability::metrics::Metrics;
use crate::state::Store;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PollReport {
    pub order_id: OrderId,
    pub active: bool,
    pub latest: Option<LiveLocation>,
    /// Most recent fetch failure; kept until the session ends.
    pub last_error: Option<String>,
    pub ticks: u64,
    pub failures: u64,
}

impl PollReport {
    fn new(order_id: OrderId) -> Self {
        Self {
            order_id,
            active: true,
            latest: None,
            last_error: None,
            ticks: 0,
            failures: 0,
        }
    }
}

struct PollingHandle {
    session_id: Uuid,
    interval: Duration,
    report_rx: watch::Receiver<PollReport>,
    task: TaskGuard,
}

pub struct LivePoller {
    backend: Arc<dyn BackendApi>,
    store: Arc<Store>,
    sessions: Arc<DashMap<OrderId, PollingHandle>>,
    finished: Arc<DashMap<OrderId, PollReport>>,
    observations_tx: mpsc::UnboundedSender<StatusObservation>,
    events_tx: broadcast::Sender<LifecycleEvent>,
    metrics: Metrics,
}

impl LivePoller {
    pub fn new(
        backend: Arc<dyn BackendApi>,
        store: Arc<Store>,
        observations_tx: mpsc::UnboundedSender<StatusObservation>,
        events_tx: broadcast::Sender<LifecycleEvent>,
        metrics: Metrics,
    ) -> Self {
        Self {
            backend,
            store,
            sessions: Arc::new(DashMap::new()),
            finished: Arc::new(DashMap::new()),
            observations_tx,
            events_tx,
            metrics,
        }
    }

    /// Starts polling `order_id`. Returns `None` without polling when the order is terminal.
    pub fn start(
        &self,
        order_id: &OrderId,
        interval: Duration,
    ) -> Result<Option<watch::Receiver<PollReport>>, AppError> {
        if interval.is_zero() {
            return Err(AppError::BadRequest("poll interval must be > 0".to_string()));
        }

        let status = self
            .store
            .order_status(order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

        if status.is_terminal() {
            debug!(order_id = %order_id, status = %status, "order is terminal; polling suppressed");
            return Ok(None);
        }

        if let Some(existing) = self.sessions.get(order_id) {
            if existing.interval == interval && existing.report_rx.borrow().active {
                return Ok(Some(existing.report_rx.clone()));
            }
        }

        let session_id = Uuid::new_v4();
        let (report_tx, report_rx) = watch::channel(PollReport::new(order_id.clone()));

        let task = TaskGuard::spawn(poll_loop(PollLoop {
            session_id,
            order_id: order_id.clone(),
            interval,
            backend: self.backend.clone(),
            store: self.store.clone(),
            sessions: self.sessions.clone(),
            finished: self.finished.clone(),
            report_tx,
            observations_tx: self.observations_tx.clone(),
            events_tx: self.events_tx.clone(),
            metrics: self.metrics.clone(),
        }));

        self.finished.remove(order_id);
        // Replacing an existing handle drops its guard, which aborts the old loop.
        self.sessions.insert(
            order_id.clone(),
            PollingHandle {
                session_id,
                interval,
                report_rx: report_rx.clone(),
                task,
            },
        );

        info!(order_id = %order_id, interval = ?interval, "live polling started");
        Ok(Some(report_rx))
    }

    /// Cancels polling for `order_id`. Returns whether a session was running.
    pub async fn stop(&self, order_id: &OrderId) -> bool {
        let Some((_, handle)) = self.sessions.remove(order_id) else {
            return false;
        };

        let PollingHandle {
            report_rx, task, ..
        } = handle;
        task.shutdown().await;

        let mut report = report_rx.borrow().clone();
        report.active = false;
        self.finished.insert(order_id.clone(), report);

        let _ = self.events_tx.send(LifecycleEvent::PollingStopped {
            order_id: order_id.clone(),
        });
        info!(order_id = %order_id, "live polling stopped");
        true
    }

    pub fn is_active(&self, order_id: &OrderId) -> bool {
        self.sessions.contains_key(order_id)
    }

    /// Latest report for a running session, or the final one of a finished session.
    pub fn report(&self, order_id: &OrderId) -> Option<PollReport> {
        if let Some(handle) = self.sessions.get(order_id) {
            return Some(handle.report_rx.borrow().clone());
        }
        self.finished.get(order_id).map(|entry| entry.value().clone())
    }
}

struct PollLoop {
    session_id: Uuid,
    order_id: OrderId,
    interval: Duration,
    backend: Arc<dyn BackendApi>,
    store: Arc<Store>,
    sessions: Arc<DashMap<OrderId, PollingHandle>>,
    finished: Arc<DashMap<OrderId, PollReport>>,
    report_tx: watch::Sender<PollReport>,
    observations_tx: mpsc::UnboundedSender<StatusObservation>,
    events_tx: broadcast::Sender<LifecycleEvent>,
    metrics: Metrics,
}

impl PollLoop {
    /// Ends this session on its own, leaving a newer session for the same order untouched.
    fn finish(&self, mut report: PollReport) {
        report.active = false;
        self.report_tx.send_replace(report.clone());
        self.finished.insert(self.order_id.clone(), report);
        let _ = self.events_tx.send(LifecycleEvent::PollingStopped {
            order_id: self.order_id.clone(),
        });
        info!(order_id = %self.order_id, "live polling stopped: order is terminal");

        // Removing the handle drops the guard that owns this task, so this must come last.
        self.sessions
            .remove_if(&self.order_id, |_, handle| handle.session_id == self.session_id);
    }
}

async fn poll_loop(ctx: PollLoop) {
    let mut interval = tokio::time::interval(ctx.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut report = PollReport::new(ctx.order_id.clone());

    loop {
        interval.tick().await;

        let terminal = ctx
            .store
            .order_status(&ctx.order_id)
            .is_none_or(|status| status.is_terminal());
        if terminal {
            ctx.metrics
                .poll_ticks_total
                .with_label_values(&["suppressed"])
                .inc();
            ctx.finish(report);
            return;
        }

        report.ticks += 1;
        match ctx.backend.fetch_live_location(&ctx.order_id).await {
            Ok(snapshot) => {
                ctx.metrics
                    .poll_ticks_total
                    .with_label_values(&["success"])
                    .inc();

                let terminal = StatusObservation::from_snapshot(&ctx.order_id, &snapshot)
                    .filter(|observation| observation.status.is_terminal());
                report.latest = Some(snapshot);

                if let Some(observation) = terminal {
                    let _ = ctx.observations_tx.send(observation);
                    ctx.finish(report);
                    return;
                }
            }
            Err(err) => {
                ctx.metrics
                    .poll_ticks_total
                    .with_label_values(&["error"])
                    .inc();
                report.failures += 1;
                report.last_error = Some(err.to_string());
                warn!(order_id = %ctx.order_id, error = %err, "live location fetch failed; polling continues");
            }
        }

        ctx.report_tx.send_replace(report.clone());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::{broadcast, mpsc};

    use super::LivePoller;
    use crate::backend::memory::{ops, InMemoryBackend};
    use crate::backend::BackendError;
    use crate::engine::coordinator::StatusObservation;
    use crate::error::AppError;
    use crate::models::order::{DeliveryOrder, OrderId, OrderStatus};
    use crate::observability::metrics::Metrics;
    use crate::state::Store;

    struct Fixture {
        poller: LivePoller,
        backend: Arc<InMemoryBackend>,
        store: Arc<Store>,
        observations_rx: mpsc::UnboundedReceiver<StatusObservation>,
    }

    fn fixture() -> Fixture {
        let backend = Arc::new(InMemoryBackend::new());
        let store = Arc::new(Store::default());
        let (observations_tx, observations_rx) = mpsc::unbounded_channel();
        let (events_tx, _) = broadcast::channel(64);
        let poller = LivePoller::new(
            backend.clone(),
            store.clone(),
            observations_tx,
            events_tx,
            Metrics::new(),
        );
        Fixture {
            poller,
            backend,
            store,
            observations_rx,
        }
    }

    fn seed(fx: &Fixture, id: &str, status: OrderStatus) -> OrderId {
        let mut order = DeliveryOrder::new(OrderId::from(id));
        order.status = status;
        fx.backend.seed_order(order.clone());
        fx.store.upsert_order(order);
        OrderId::from(id)
    }

    const TICK: Duration = Duration::from_millis(10);

    #[tokio::test]
    async fn start_is_a_no_op_for_terminal_orders() {
        let fx = fixture();
        let id = seed(&fx, "done", OrderStatus::Delivered);

        assert!(fx.poller.start(&id, TICK).unwrap().is_none());
        assert!(!fx.poller.is_active(&id));
        assert_eq!(fx.backend.calls(ops::LIVE_LOCATION), 0);
    }

    #[tokio::test]
    async fn zero_interval_is_rejected() {
        let fx = fixture();
        let id = seed(&fx, "a", OrderStatus::Accepted);
        assert!(matches!(
            fx.poller.start(&id, Duration::ZERO),
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn failures_are_recorded_and_polling_continues() {
        let fx = fixture();
        let id = seed(&fx, "a", OrderStatus::Onway);
        fx.backend
            .fail_next(ops::LIVE_LOCATION, BackendError::Network("timeout".to_string()));

        fx.poller.start(&id, TICK).unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;

        let report = fx.poller.report(&id).unwrap();
        assert!(report.active);
        assert_eq!(report.failures, 1);
        assert!(report.last_error.unwrap().contains("timeout"));
        assert!(report.ticks >= 3);
        assert!(report.latest.is_some());

        assert!(fx.poller.stop(&id).await);
        assert!(!fx.poller.stop(&id).await);
    }

    #[tokio::test]
    async fn local_terminal_status_suppresses_next_tick() {
        let fx = fixture();
        let id = seed(&fx, "a", OrderStatus::Onway);

        fx.poller.start(&id, TICK).unwrap();
        tokio::time::sleep(Duration::from_millis(35)).await;

        if let Some(mut order) = fx.store.orders.get_mut(&id) {
            order.status = OrderStatus::Delivered;
        }
        tokio::time::sleep(Duration::from_millis(30)).await;
        let calls_after_terminal = fx.backend.calls(ops::LIVE_LOCATION);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fx.backend.calls(ops::LIVE_LOCATION), calls_after_terminal);
        assert!(!fx.poller.is_active(&id));
        assert!(!fx.poller.report(&id).unwrap().active);
    }

    #[tokio::test]
    async fn server_side_cancellation_is_forwarded_and_stops_polling() {
        let mut fx = fixture();
        let id = seed(&fx, "a", OrderStatus::Accepted);

        fx.poller.start(&id, TICK).unwrap();
        tokio::time::sleep(Duration::from_millis(25)).await;
        fx.backend.cancel_order(&id, Some("shop closed"));

        let observation = tokio::time::timeout(Duration::from_millis(200), fx.observations_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(observation.order_id, id);
        assert_eq!(observation.status, OrderStatus::Cancelled);
        assert_eq!(observation.reason.as_deref(), Some("shop closed"));
        assert!(observation.cancelled_at.is_some());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!fx.poller.is_active(&id));
    }

    #[tokio::test]
    async fn restarting_with_same_interval_reuses_the_session() {
        let fx = fixture();
        let id = seed(&fx, "a", OrderStatus::Accepted);

        let first = fx.poller.start(&id, TICK).unwrap().unwrap();
        let second = fx.poller.start(&id, TICK).unwrap().unwrap();
        assert!(first.same_channel(&second));

        fx.poller.stop(&id).await;
    }
}
