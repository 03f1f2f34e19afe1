//! Offline backend kept entirely in process memory.
//!
//! Used when no `BACKEND_URL` is configured and by the test suite. Besides
//! the `BackendApi` surface it exposes seeding, server-side cancellation
//! and fault injection.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use crate::backend::{BackendApi, BackendError, StatusUpdate};
use crate::models::location::{GeoPoint, LiveLocation};
use crate::models::order::{DeliveryOrder, HistoryFilter, OrderId, OrderStatus};
use crate::models::return_request::{ReturnId, ReturnRequest, ReturnStatus};

/// Operation names used for fault injection and call counting.
pub mod ops {
    pub const ACTIVE_ORDERS: &str = "fetch_active_orders";
    pub const ORDER_HISTORY: &str = "fetch_order_history";
    pub const UPDATE_ORDER: &str = "update_order_status";
    pub const LIVE_LOCATION: &str = "fetch_live_location";
    pub const REPORT_LOCATION: &str = "report_location";
    pub const PENDING_RETURNS: &str = "fetch_pending_returns";
    pub const ACCEPT_RETURN: &str = "accept_return";
    pub const UPDATE_RETURN: &str = "update_return_status";
    pub const PUSH_TOKEN: &str = "register_push_token";
}

#[derive(Default)]
pub struct InMemoryBackend {
    orders: DashMap<OrderId, DeliveryOrder>,
    returns: DashMap<ReturnId, ReturnRequest>,
    calls: DashMap<&'static str, usize>,
    faults: Mutex<HashMap<&'static str, VecDeque<BackendError>>>,
    reported: Mutex<Vec<GeoPoint>>,
    push_tokens: Mutex<Vec<String>>,
    update_delay: Mutex<Option<Duration>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_order(&self, order: DeliveryOrder) {
        self.orders.insert(order.id.clone(), order);
    }

    pub fn seed_return(&self, request: ReturnRequest) {
        self.returns.insert(request.id.clone(), request);
    }

    pub fn order(&self, id: &OrderId) -> Option<DeliveryOrder> {
        self.orders.get(id).map(|entry| entry.value().clone())
    }

    pub fn return_request(&self, id: &ReturnId) -> Option<ReturnRequest> {
        self.returns.get(id).map(|entry| entry.value().clone())
    }

    /// Cancels an order the way a customer or admin would, outside the rider's control.
    pub fn cancel_order(&self, id: &OrderId, reason: Option<&str>) {
        if let Some(mut order) = self.orders.get_mut(id) {
            let now = Utc::now();
            order.status = OrderStatus::Cancelled;
            order.reason = reason.map(str::to_string);
            order.cancelled_at = Some(now);
            order.updated_at = now;
        }
    }

    /// Queues an error returned by the next call to `op`.
    pub fn fail_next(&self, op: &'static str, err: BackendError) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.entry(op).or_default().push_back(err);
        }
    }

    /// Slows down order status updates so overlapping requests can be observed.
    pub fn set_update_delay(&self, delay: Option<Duration>) {
        if let Ok(mut slot) = self.update_delay.lock() {
            *slot = delay;
        }
    }

    pub fn calls(&self, op: &str) -> usize {
        self.calls.get(op).map(|entry| *entry.value()).unwrap_or(0)
    }

    pub fn reported_locations(&self) -> Vec<GeoPoint> {
        self.reported
            .lock()
            .map(|reported| reported.clone())
            .unwrap_or_default()
    }

    pub fn push_tokens(&self) -> Vec<String> {
        self.push_tokens
            .lock()
            .map(|tokens| tokens.clone())
            .unwrap_or_default()
    }

    fn enter(&self, op: &'static str) -> Result<(), BackendError> {
        *self.calls.entry(op).or_insert(0) += 1;

        let fault = self
            .faults
            .lock()
            .ok()
            .and_then(|mut faults| faults.get_mut(op).and_then(VecDeque::pop_front));

        match fault {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn order_or_not_found(&self, id: &OrderId) -> Result<DeliveryOrder, BackendError> {
        self.order(id)
            .ok_or_else(|| BackendError::NotFound(format!("order {id} not found")))
    }
}

#[async_trait]
impl BackendApi for InMemoryBackend {
    async fn fetch_active_orders(&self) -> Result<Vec<DeliveryOrder>, BackendError> {
        self.enter(ops::ACTIVE_ORDERS)?;
        Ok(self
            .orders
            .iter()
            .filter(|entry| !entry.value().is_terminal())
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn fetch_order_history(
        &self,
        filter: HistoryFilter,
    ) -> Result<Vec<DeliveryOrder>, BackendError> {
        self.enter(ops::ORDER_HISTORY)?;
        Ok(self
            .orders
            .iter()
            .filter(|entry| filter.matches(entry.value().status))
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn update_order_status(
        &self,
        update: &StatusUpdate,
    ) -> Result<DeliveryOrder, BackendError> {
        self.enter(ops::UPDATE_ORDER)?;

        let delay = self.update_delay.lock().ok().and_then(|slot| *slot);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut order = self
            .orders
            .get_mut(&update.order_id)
            .ok_or_else(|| BackendError::NotFound(format!("order {} not found", update.order_id)))?;

        // A finished order stays finished; the caller learns about it from the snapshot.
        if order.is_terminal() {
            return Ok(order.clone());
        }

        let changed = order.status != update.status
            || (update.reason.is_some() && order.reason != update.reason)
            || (update.eta_minutes.is_some() && order.eta_minutes != update.eta_minutes);
        if !changed {
            return Ok(order.clone());
        }

        order.status = update.status;
        if update.reason.is_some() {
            order.reason = update.reason.clone();
        }
        if update.eta_minutes.is_some() {
            order.eta_minutes = update.eta_minutes;
        }
        order.updated_at = Utc::now();

        Ok(order.clone())
    }

    async fn fetch_live_location(&self, order_id: &OrderId) -> Result<LiveLocation, BackendError> {
        self.enter(ops::LIVE_LOCATION)?;
        let order = self.order_or_not_found(order_id)?;

        Ok(LiveLocation {
            order_id: order.id,
            status: Some(order.status),
            shop: order.shop_location,
            rider: order.rider_location,
            customer: order.customer_location,
            reason: order.reason,
            cancelled_at: order.cancelled_at,
            fetched_at: Utc::now(),
        })
    }

    async fn report_location(&self, point: &GeoPoint) -> Result<(), BackendError> {
        self.enter(ops::REPORT_LOCATION)?;

        for mut order in self.orders.iter_mut() {
            if matches!(order.status, OrderStatus::Accepted | OrderStatus::Onway) {
                order.rider_location = Some(*point);
            }
        }

        if let Ok(mut reported) = self.reported.lock() {
            reported.push(*point);
        }
        Ok(())
    }

    async fn fetch_pending_returns(&self) -> Result<Vec<ReturnRequest>, BackendError> {
        self.enter(ops::PENDING_RETURNS)?;
        Ok(self
            .returns
            .iter()
            .filter(|entry| !entry.value().status.is_terminal())
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn accept_return(&self, return_id: &ReturnId) -> Result<ReturnRequest, BackendError> {
        self.enter(ops::ACCEPT_RETURN)?;

        let mut request = self
            .returns
            .get_mut(return_id)
            .ok_or_else(|| BackendError::NotFound(format!("return {return_id} not found")))?;

        if request.status != ReturnStatus::Pending {
            return Err(BackendError::Rejected {
                status: 409,
                message: format!("return {return_id} already accepted"),
            });
        }

        request.status = ReturnStatus::Accepted;
        request.updated_at = Utc::now();
        Ok(request.clone())
    }

    async fn update_return_status(
        &self,
        return_id: &ReturnId,
        status: ReturnStatus,
    ) -> Result<ReturnRequest, BackendError> {
        self.enter(ops::UPDATE_RETURN)?;

        let mut request = self
            .returns
            .get_mut(return_id)
            .ok_or_else(|| BackendError::NotFound(format!("return {return_id} not found")))?;

        request.status = status;
        request.updated_at = Utc::now();
        Ok(request.clone())
    }

    async fn register_push_token(&self, token: &str) -> Result<(), BackendError> {
        self.enter(ops::PUSH_TOKEN)?;
        if let Ok(mut tokens) = self.push_tokens.lock() {
            tokens.push(token.to_string());
        }
        Ok(())
    }
}
