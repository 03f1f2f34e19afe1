use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};

use crate::backend::BackendApi;
use crate::config::Config;
use crate::device::DeviceFeed;
use crate::engine::coordinator::{Coordinator, StatusObservation};
use crate::engine::polling::LivePoller;
use crate::engine::tracking::LocationTracker;
use crate::models::event::LifecycleEvent;
use crate::models::location::GeoPoint;
use crate::models::order::{DeliveryOrder, OrderId, OrderStatus};
use crate::models::return_request::{ReturnId, ReturnRequest};
use crate::observability::metrics::Metrics;

/// Local snapshots of the orders and returns the rider has seen.
#[derive(Default)]
pub struct Store {
    pub orders: DashMap<OrderId, DeliveryOrder>,
    pub returns: DashMap<ReturnId, ReturnRequest>,
}

impl Store {
    pub fn order(&self, id: &OrderId) -> Option<DeliveryOrder> {
        self.orders.get(id).map(|entry| entry.value().clone())
    }

    pub fn order_status(&self, id: &OrderId) -> Option<OrderStatus> {
        self.orders.get(id).map(|entry| entry.value().status)
    }

    pub fn upsert_order(&self, order: DeliveryOrder) {
        self.orders.insert(order.id.clone(), order);
    }

    pub fn set_rider_location(&self, id: &OrderId, point: GeoPoint) {
        if let Some(mut order) = self.orders.get_mut(id) {
            order.rider_location = Some(point);
        }
    }

    pub fn return_request(&self, id: &ReturnId) -> Option<ReturnRequest> {
        self.returns.get(id).map(|entry| entry.value().clone())
    }

    pub fn upsert_return(&self, request: ReturnRequest) {
        self.returns.insert(request.id.clone(), request);
    }
}

pub struct AppState {
    pub store: Arc<Store>,
    pub coordinator: Arc<Coordinator>,
    pub device: Arc<DeviceFeed>,
    pub events_tx: broadcast::Sender<LifecycleEvent>,
    pub metrics: Metrics,
    pub default_poll_interval: Duration,
}

impl AppState {
    pub fn new(
        backend: Arc<dyn BackendApi>,
        config: &Config,
    ) -> (Self, mpsc::UnboundedReceiver<StatusObservation>) {
        let (events_tx, _unused_rx) = broadcast::channel(config.event_buffer_size.max(1));
        let (observations_tx, observations_rx) = mpsc::unbounded_channel();
        let metrics = Metrics::new();
        let store = Arc::new(Store::default());
        let device = Arc::new(DeviceFeed::default());

        let tracker = Arc::new(LocationTracker::new(
            device.clone(),
            backend.clone(),
            store.clone(),
            config.tracking,
            events_tx.clone(),
            metrics.clone(),
        ));

        let poller = Arc::new(LivePoller::new(
            backend.clone(),
            store.clone(),
            observations_tx,
            events_tx.clone(),
            metrics.clone(),
        ));

        let coordinator = Arc::new(Coordinator::new(
            backend,
            store.clone(),
            tracker,
            poller,
            events_tx.clone(),
            metrics.clone(),
        ));

        (
            Self {
                store,
                coordinator,
                device,
                events_tx,
                metrics,
                default_poll_interval: Duration::from_millis(config.poll_interval_ms),
            },
            observations_rx,
        )
    }
}
