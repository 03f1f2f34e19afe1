//! Drives orders and returns through their lifecycles.
//!
//! Planning is delegated to the pure state machines. Each accepted request
//! runs to completion in its own task, so a caller that goes away mid-flight
//! never leaves tracking running for an order that already reached a
//! terminal status.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashSet;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::backend::{BackendApi, BackendError};
use crate::engine::effect::{observed_terminal_effects, Effect};
use crate::engine::order_machine::{plan_transition, OrderEvent, TransitionPlan};
use crate::engine::polling::{LivePoller, PollReport};
use crate::engine::return_machine::{plan_return, ReturnEvent, ReturnPlan, ReturnStep};
use crate::engine::tracking::{LocationTracker, TrackingSession};
use crate::error::AppError;
use crate::models::event::LifecycleEvent;
use crate::models::location::LiveLocation;
use crate::models::order::{DeliveryOrder, HistoryFilter, OrderId, OrderStatus};
use crate::models::return_request::{ReturnId, ReturnRequest};
use crate::observability::metrics::Metrics;
use crate::state::Store;

/// A status the backend reported outside of a local transition request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusObservation {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub reason: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl StatusObservation {
    /// `None` when the snapshot carries no status.
    pub fn from_snapshot(order_id: &OrderId, snapshot: &LiveLocation) -> Option<Self> {
        Some(Self {
            order_id: order_id.clone(),
            status: snapshot.status?,
            reason: snapshot.reason.clone(),
            cancelled_at: snapshot.cancelled_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransitionOutcome {
    pub order: DeliveryOrder,
    /// Effects the UI driver still has to carry out.
    pub effects: Vec<Effect>,
    pub tracking: Option<TrackingSession>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CancelledBanner {
    pub reason: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderView {
    pub order: DeliveryOrder,
    pub controls_enabled: bool,
    pub in_flight: bool,
    pub banner: Option<CancelledBanner>,
    pub tracking: bool,
    pub polling: bool,
}

/// Marks an order or return as having a request in flight until dropped.
struct InFlightGuard {
    in_flight: Arc<DashSet<String>>,
    key: String,
}

impl InFlightGuard {
    fn acquire(in_flight: &Arc<DashSet<String>>, key: String) -> Result<Self, AppError> {
        if !in_flight.insert(key.clone()) {
            return Err(AppError::TransitionInProgress(key));
        }
        Ok(Self {
            in_flight: in_flight.clone(),
            key,
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.key);
    }
}

fn order_key(id: &OrderId) -> String {
    format!("order:{id}")
}

fn return_key(id: &ReturnId) -> String {
    format!("return:{id}")
}

pub struct Coordinator {
    backend: Arc<dyn BackendApi>,
    store: Arc<Store>,
    tracker: Arc<LocationTracker>,
    poller: Arc<LivePoller>,
    in_flight: Arc<DashSet<String>>,
    events_tx: broadcast::Sender<LifecycleEvent>,
    metrics: Metrics,
}

impl Coordinator {
    pub fn new(
        backend: Arc<dyn BackendApi>,
        store: Arc<Store>,
        tracker: Arc<LocationTracker>,
        poller: Arc<LivePoller>,
        events_tx: broadcast::Sender<LifecycleEvent>,
        metrics: Metrics,
    ) -> Self {
        Self {
            backend,
            store,
            tracker,
            poller,
            in_flight: Arc::new(DashSet::new()),
            events_tx,
            metrics,
        }
    }

    pub fn tracker(&self) -> &LocationTracker {
        &self.tracker
    }

    pub fn poller(&self) -> &LivePoller {
        &self.poller
    }

    pub async fn request_transition(
        self: &Arc<Self>,
        order_id: &OrderId,
        event: OrderEvent,
    ) -> Result<TransitionOutcome, AppError> {
        let guard = InFlightGuard::acquire(&self.in_flight, order_key(order_id))?;
        let order = self.load_order(order_id).await?;

        let plan = match plan_transition(&order, &event) {
            Ok(plan) => plan,
            Err(err) => {
                self.metrics
                    .transitions_total
                    .with_label_values(&[event.name(), err.kind()])
                    .inc();
                return Err(err);
            }
        };

        let this = Arc::clone(self);
        let task = tokio::spawn(async move {
            let _guard = guard;
            this.execute_transition(event, plan).await
        });

        task.await
            .map_err(|err| AppError::Internal(format!("transition task failed: {err}")))?
    }

    async fn execute_transition(
        &self,
        event: OrderEvent,
        plan: TransitionPlan,
    ) -> Result<TransitionOutcome, AppError> {
        let started = Instant::now();
        let order_id = plan.update.order_id.clone();

        let updated = match self.backend.update_order_status(&plan.update).await {
            Ok(updated) => updated,
            Err(err) => {
                self.metrics
                    .transitions_total
                    .with_label_values(&[event.name(), "backend_error"])
                    .inc();
                warn!(order_id = %order_id, event = event.name(), error = %err, "status update failed");
                return Err(err.into());
            }
        };

        // The order finished elsewhere; the planned effects no longer apply.
        if updated.is_terminal() && updated.status != plan.target() {
            warn!(
                order_id = %order_id,
                event = event.name(),
                status = %updated.status,
                "order reached a terminal status before the update landed"
            );
            let warning = format!("order is already {} on the backend", updated.status);
            let (order, effects) = self.apply_observed(updated).await;
            return Ok(TransitionOutcome {
                order,
                effects: effects.into_iter().filter(Effect::is_ui).collect(),
                tracking: self.tracker.current().await,
                warnings: vec![warning],
            });
        }

        let mut warnings = Vec::new();
        if updated.status != plan.target() {
            warn!(
                order_id = %order_id,
                expected = %plan.target(),
                actual = %updated.status,
                "backend returned an unexpected status"
            );
            warnings.push(format!(
                "backend reports status {} instead of {}",
                updated.status,
                plan.target()
            ));
        }

        let order = self.merge_snapshot(updated);
        self.store.upsert_order(order.clone());

        if plan.from != order.status {
            let _ = self.events_tx.send(LifecycleEvent::OrderTransitioned {
                order_id: order_id.clone(),
                from: plan.from,
                to: order.status,
                at: Utc::now(),
            });
        }

        warnings.extend(self.run_effects(&plan.effects).await);

        self.metrics
            .transitions_total
            .with_label_values(&[event.name(), "success"])
            .inc();
        self.metrics
            .transition_latency_seconds
            .with_label_values(&[event.name()])
            .observe(started.elapsed().as_secs_f64());

        info!(
            order_id = %order_id,
            event = event.name(),
            from = %plan.from,
            to = %order.status,
            "order transitioned"
        );

        Ok(TransitionOutcome {
            order,
            effects: plan.effects.into_iter().filter(Effect::is_ui).collect(),
            tracking: self.tracker.current().await,
            warnings,
        })
    }

    /// Executes tracking and polling effects; returns warnings for the driver.
    async fn run_effects(&self, effects: &[Effect]) -> Vec<String> {
        let mut warnings = Vec::new();

        for effect in effects {
            match effect {
                Effect::StartTracking { order_id } | Effect::EnsureTracking { order_id } => {
                    if let Err(err) = self.tracker.start(order_id).await {
                        warn!(order_id = %order_id, error = %err, "tracking not started");
                        warnings.push(err.to_string());
                    }
                }
                Effect::StopTracking { order_id } => {
                    self.tracker.stop_for(order_id).await;
                }
                Effect::StopPolling { order_id } => {
                    self.poller.stop(order_id).await;
                }
                Effect::LeaveDetail { .. }
                | Effect::ShowCancelledBanner { .. }
                | Effect::DisableControls { .. } => {}
            }
        }

        warnings
    }

    /// Keeps locally known fields the backend snapshot does not carry.
    fn merge_snapshot(&self, mut snapshot: DeliveryOrder) -> DeliveryOrder {
        if let Some(previous) = self.store.order(&snapshot.id) {
            if snapshot.rider_location.is_none() {
                snapshot.rider_location = previous.rider_location;
            }
            if snapshot.items.is_empty() {
                snapshot.items = previous.items;
            }
        }
        if snapshot.status == OrderStatus::Cancelled && snapshot.cancelled_at.is_none() {
            snapshot.cancelled_at = Some(Utc::now());
        }
        snapshot
    }

    /// Merges a snapshot that came from the backend rather than from a local request.
    ///
    /// A terminal status stops tracking and polling for the order; the UI
    /// effects are returned for the driver.
    pub async fn apply_observed(&self, snapshot: DeliveryOrder) -> (DeliveryOrder, Vec<Effect>) {
        let was_terminal = self
            .store
            .order_status(&snapshot.id)
            .is_some_and(OrderStatus::is_terminal);

        let order = self.merge_snapshot(snapshot);
        self.store.upsert_order(order.clone());

        if !order.is_terminal() {
            return (order, Vec::new());
        }

        let effects = observed_terminal_effects(&order);
        self.run_effects(&effects).await;

        if !was_terminal {
            if order.status == OrderStatus::Cancelled {
                let _ = self.events_tx.send(LifecycleEvent::OrderCancelled {
                    order_id: order.id.clone(),
                    reason: order.reason.clone(),
                    at: order.cancelled_at.unwrap_or_else(Utc::now),
                });
            }
            info!(order_id = %order.id, status = %order.status, "terminal status observed from backend");
        }

        (order, effects)
    }

    pub async fn observe_status(&self, observation: StatusObservation) -> Vec<Effect> {
        let Some(mut order) = self.store.order(&observation.order_id) else {
            warn!(order_id = %observation.order_id, "status observed for unknown order");
            return Vec::new();
        };
        if order.is_terminal() {
            return Vec::new();
        }

        order.status = observation.status;
        if observation.reason.is_some() {
            order.reason = observation.reason;
        }
        if observation.cancelled_at.is_some() {
            order.cancelled_at = observation.cancelled_at;
        }
        order.updated_at = Utc::now();
        let (_, effects) = self.apply_observed(order).await;
        effects
    }

    pub async fn refresh_active_orders(&self) -> Result<Vec<DeliveryOrder>, AppError> {
        let orders = self.backend.fetch_active_orders().await?;
        let mut merged = Vec::with_capacity(orders.len());

        for order in orders {
            let (order, _) = self.apply_observed(order).await;
            merged.push(order);
        }

        let active: HashSet<OrderId> = merged.iter().map(|order| order.id.clone()).collect();
        self.reconcile_missing(&active).await;

        Ok(merged)
    }

    /// Cached orders that dropped out of the active list have reached a terminal
    /// status on the backend; look each one up so tracking and polling stop.
    async fn reconcile_missing(&self, active: &HashSet<OrderId>) {
        let missing: Vec<OrderId> = self
            .store
            .orders
            .iter()
            .filter(|entry| !entry.value().is_terminal() && !active.contains(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();

        for order_id in missing {
            let observation = match self.backend.fetch_live_location(&order_id).await {
                Ok(snapshot) => match StatusObservation::from_snapshot(&order_id, &snapshot) {
                    Some(observation) if observation.status.is_terminal() => observation,
                    _ => {
                        debug!(order_id = %order_id, "order missing from active list but not terminal");
                        continue;
                    }
                },
                Err(BackendError::NotFound(_)) => {
                    warn!(order_id = %order_id, "order vanished from backend; treating as cancelled");
                    StatusObservation {
                        order_id,
                        status: OrderStatus::Cancelled,
                        reason: None,
                        cancelled_at: None,
                    }
                }
                Err(err) => {
                    warn!(order_id = %order_id, error = %err, "could not reconcile order missing from active list");
                    continue;
                }
            };

            self.observe_status(observation).await;
        }
    }

    pub async fn order_history(&self, filter: HistoryFilter) -> Result<Vec<DeliveryOrder>, AppError> {
        Ok(self.backend.fetch_order_history(filter).await?)
    }

    /// Finds an order in the local cache, then in the active list, then in history.
    async fn load_order(&self, order_id: &OrderId) -> Result<DeliveryOrder, AppError> {
        if let Some(order) = self.store.order(order_id) {
            return Ok(order);
        }

        self.refresh_active_orders().await?;
        if let Some(order) = self.store.order(order_id) {
            return Ok(order);
        }

        for filter in [HistoryFilter::Delivered, HistoryFilter::Failed] {
            let history = self.backend.fetch_order_history(filter).await?;
            if let Some(order) = history.into_iter().find(|order| &order.id == order_id) {
                self.store.upsert_order(order.clone());
                return Ok(order);
            }
        }

        Err(AppError::NotFound(format!("order {order_id} not found")))
    }

    pub async fn order_view(&self, order_id: &OrderId) -> Result<OrderView, AppError> {
        let order = self.load_order(order_id).await?;
        let in_flight = self.in_flight.contains(&order_key(order_id));
        let tracking = self
            .tracker
            .current()
            .await
            .is_some_and(|session| &session.order_id == order_id);

        let banner = (order.status == OrderStatus::Cancelled).then(|| CancelledBanner {
            reason: order.reason.clone(),
            cancelled_at: order.cancelled_at,
        });

        Ok(OrderView {
            controls_enabled: !order.is_terminal() && !in_flight,
            in_flight,
            banner,
            tracking,
            polling: self.poller.is_active(order_id),
            order,
        })
    }

    pub async fn start_polling(
        &self,
        order_id: &OrderId,
        interval: Duration,
    ) -> Result<Option<watch::Receiver<PollReport>>, AppError> {
        self.load_order(order_id).await?;
        self.poller.start(order_id, interval)
    }

    pub async fn request_return_transition(
        self: &Arc<Self>,
        return_id: &ReturnId,
        event: ReturnEvent,
    ) -> Result<ReturnRequest, AppError> {
        let guard = InFlightGuard::acquire(&self.in_flight, return_key(return_id))?;
        let request = self.load_return(return_id).await?;

        let plan = match plan_return(request.status, event) {
            Ok(plan) => plan,
            Err(err) => {
                self.metrics
                    .transitions_total
                    .with_label_values(&[event.name(), err.kind()])
                    .inc();
                return Err(err);
            }
        };

        let this = Arc::clone(self);
        let task = tokio::spawn(async move {
            let _guard = guard;
            this.execute_return(request, event, plan).await
        });

        task.await
            .map_err(|err| AppError::Internal(format!("return task failed: {err}")))?
    }

    async fn execute_return(
        &self,
        request: ReturnRequest,
        event: ReturnEvent,
        plan: ReturnPlan,
    ) -> Result<ReturnRequest, AppError> {
        let return_id = request.id.clone();
        let mut current = request;

        for step in &plan.steps {
            let result = match *step {
                ReturnStep::Accept { tolerate_failure } => {
                    match self.backend.accept_return(&return_id).await {
                        Ok(accepted) => Ok(accepted),
                        Err(err) if tolerate_failure => {
                            warn!(return_id = %return_id, error = %err, "implicit accept failed; treating return as already accepted");
                            Ok(current.clone())
                        }
                        Err(err) => Err(err),
                    }
                }
                ReturnStep::SetStatus(status) => {
                    self.backend.update_return_status(&return_id, status).await
                }
            };

            current = match result {
                Ok(updated) => updated,
                Err(err) => {
                    self.metrics
                        .transitions_total
                        .with_label_values(&[event.name(), "backend_error"])
                        .inc();
                    error!(return_id = %return_id, event = event.name(), error = %err, "return update failed");
                    return Err(err.into());
                }
            };
        }

        self.store.upsert_return(current.clone());
        let _ = self.events_tx.send(LifecycleEvent::ReturnTransitioned {
            return_id: return_id.clone(),
            from: plan.from,
            to: current.status,
            at: Utc::now(),
        });
        self.metrics
            .transitions_total
            .with_label_values(&[event.name(), "success"])
            .inc();

        info!(
            return_id = %return_id,
            event = event.name(),
            from = %plan.from,
            to = %current.status,
            "return transitioned"
        );
        Ok(current)
    }

    pub async fn pending_returns(&self) -> Result<Vec<ReturnRequest>, AppError> {
        let returns = self.backend.fetch_pending_returns().await?;
        for request in &returns {
            self.store.upsert_return(request.clone());
        }
        Ok(returns)
    }

    async fn load_return(&self, return_id: &ReturnId) -> Result<ReturnRequest, AppError> {
        if let Some(request) = self.store.return_request(return_id) {
            return Ok(request);
        }

        self.pending_returns().await?;
        self.store
            .return_request(return_id)
            .ok_or_else(|| AppError::NotFound(format!("return {return_id} not found")))
    }

    pub async fn register_push_token(&self, token: &str) -> Result<(), AppError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AppError::BadRequest("push token cannot be empty".to_string()));
        }
        self.backend.register_push_token(token).await?;
        info!("push token registered");
        Ok(())
    }
}

/// Applies backend status observations (e.g. from live polling) until the channel closes.
pub async fn run_status_observer(
    coordinator: Arc<Coordinator>,
    mut observations_rx: mpsc::UnboundedReceiver<StatusObservation>,
) {
    info!("status observer started");

    while let Some(observation) = observations_rx.recv().await {
        let effects = coordinator.observe_status(observation.clone()).await;
        if !effects.is_empty() {
            info!(
                order_id = %observation.order_id,
                status = %observation.status,
                effects = effects.len(),
                "applied observed status"
            );
        }
    }

    warn!("status observer stopped: channel closed");
}
