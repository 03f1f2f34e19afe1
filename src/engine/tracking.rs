//! Background rider-location reporting.
//!
//! At most one session exists at a time. Starting a session for another
//! order stops the current one first; starting for the same order is a no-op.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::BackendApi;
use crate::config::TrackingSettings;
use crate::device::LocationProvider;
use crate::engine::task::TaskGuard;
use crate::error::AppError;
use crate::geo::is_meaningful_move;
use crate::models::event::LifecycleEvent;
use crate::models::location::GeoPoint;
use crate::models::order::OrderId;
use crate::observability::metrics::Metrics;
use crate::state::Store;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackingSession {
    pub session_id: Uuid,
    pub order_id: OrderId,
    pub started_at: DateTime<Utc>,
}

struct ActiveTracking {
    session: TrackingSession,
    task: TaskGuard,
}

pub struct LocationTracker {
    provider: Arc<dyn LocationProvider>,
    backend: Arc<dyn BackendApi>,
    store: Arc<Store>,
    settings: TrackingSettings,
    active: Mutex<Option<ActiveTracking>>,
    events_tx: broadcast::Sender<LifecycleEvent>,
    metrics: Metrics,
}

impl LocationTracker {
    pub fn new(
        provider: Arc<dyn LocationProvider>,
        backend: Arc<dyn BackendApi>,
        store: Arc<Store>,
        settings: TrackingSettings,
        events_tx: broadcast::Sender<LifecycleEvent>,
        metrics: Metrics,
    ) -> Self {
        Self {
            provider,
            backend,
            store,
            settings,
            active: Mutex::new(None),
            events_tx,
            metrics,
        }
    }

    pub async fn start(&self, order_id: &OrderId) -> Result<TrackingSession, AppError> {
        let mut active = self.active.lock().await;

        if let Some(current) = active.as_ref() {
            if &current.session.order_id == order_id && !current.task.is_finished() {
                debug!(order_id = %order_id, "tracking already active for order");
                return Ok(current.session.clone());
            }
        }

        let permissions = self.provider.request_permissions().await;
        if !permissions.allows_tracking() {
            warn!(
                order_id = %order_id,
                foreground = permissions.foreground,
                background = permissions.background,
                "location permission denied; tracking not started"
            );
            return Err(AppError::PermissionDenied {
                foreground: permissions.foreground,
                background: permissions.background,
            });
        }

        if let Some(previous) = active.take() {
            self.teardown(previous).await;
        }

        let session = TrackingSession {
            session_id: Uuid::new_v4(),
            order_id: order_id.clone(),
            started_at: Utc::now(),
        };

        let task = TaskGuard::spawn(report_loop(ReportLoop {
            order_id: order_id.clone(),
            provider: self.provider.clone(),
            backend: self.backend.clone(),
            store: self.store.clone(),
            settings: self.settings,
            metrics: self.metrics.clone(),
        }));

        *active = Some(ActiveTracking {
            session: session.clone(),
            task,
        });
        self.metrics.tracking_sessions_active.set(1);
        let _ = self.events_tx.send(LifecycleEvent::TrackingStarted {
            session_id: session.session_id,
            order_id: order_id.clone(),
        });

        info!(order_id = %order_id, session_id = %session.session_id, "tracking started");
        Ok(session)
    }

    /// Stops whatever session is active. Safe to call when none is.
    pub async fn stop(&self) -> Option<TrackingSession> {
        let mut active = self.active.lock().await;
        let previous = active.take()?;
        let session = previous.session.clone();
        self.teardown(previous).await;
        Some(session)
    }

    /// Stops the active session only if it reports for `order_id`.
    pub async fn stop_for(&self, order_id: &OrderId) -> Option<TrackingSession> {
        let mut active = self.active.lock().await;
        if active
            .as_ref()
            .is_some_and(|current| &current.session.order_id == order_id)
        {
            let previous = active.take()?;
            let session = previous.session.clone();
            self.teardown(previous).await;
            return Some(session);
        }
        None
    }

    pub async fn current(&self) -> Option<TrackingSession> {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|current| current.session.clone())
    }

    async fn teardown(&self, previous: ActiveTracking) {
        previous.task.shutdown().await;
        self.metrics.tracking_sessions_active.set(0);
        let _ = self.events_tx.send(LifecycleEvent::TrackingStopped {
            session_id: previous.session.session_id,
            order_id: previous.session.order_id.clone(),
        });
        info!(
            order_id = %previous.session.order_id,
            session_id = %previous.session.session_id,
            "tracking stopped"
        );
    }
}

struct ReportLoop {
    order_id: OrderId,
    provider: Arc<dyn LocationProvider>,
    backend: Arc<dyn BackendApi>,
    store: Arc<Store>,
    settings: TrackingSettings,
    metrics: Metrics,
}

async fn report_loop(ctx: ReportLoop) {
    let mut interval = tokio::time::interval(ctx.settings.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // Only advanced after the backend accepted a fix, so failed reports are retried.
    let mut last_reported: Option<GeoPoint> = None;

    loop {
        interval.tick().await;

        let Some(position) = ctx.provider.current_position().await else {
            continue;
        };

        if !is_meaningful_move(last_reported.as_ref(), &position, ctx.settings.min_distance_m) {
            continue;
        }

        match ctx.backend.report_location(&position).await {
            Ok(()) => {
                last_reported = Some(position);
                ctx.store.set_rider_location(&ctx.order_id, position);
                ctx.metrics
                    .location_reports_total
                    .with_label_values(&["success"])
                    .inc();
                debug!(order_id = %ctx.order_id, lat = position.lat, lng = position.lng, "location reported");
            }
            Err(err) => {
                ctx.metrics
                    .location_reports_total
                    .with_label_values(&["error"])
                    .inc();
                warn!(order_id = %ctx.order_id, error = %err, "location report failed; will retry");
            }
        }
    }
}
