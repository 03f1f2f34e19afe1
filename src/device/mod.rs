//! Device location collaborator.
//!
//! The platform location API is out of process; the rider UI pushes the
//! permission state and position fixes into a [`DeviceFeed`], which the
//! tracking session reads through [`LocationProvider`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::models::location::GeoPoint;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PermissionStatus {
    pub foreground: bool,
    pub background: bool,
}

impl PermissionStatus {
    pub fn granted() -> Self {
        Self {
            foreground: true,
            background: true,
        }
    }

    /// Tracking needs both; background reports continue while the app is suspended.
    pub fn allows_tracking(&self) -> bool {
        self.foreground && self.background
    }
}

#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn request_permissions(&self) -> PermissionStatus;

    async fn current_position(&self) -> Option<GeoPoint>;
}

pub struct DeviceFeed {
    permissions: watch::Sender<PermissionStatus>,
    position: watch::Sender<Option<GeoPoint>>,
}

impl DeviceFeed {
    pub fn new(initial: PermissionStatus) -> Self {
        let (permissions, _) = watch::channel(initial);
        let (position, _) = watch::channel(None);
        Self {
            permissions,
            position,
        }
    }

    pub fn set_permissions(&self, status: PermissionStatus) {
        self.permissions.send_replace(status);
    }

    pub fn permissions(&self) -> PermissionStatus {
        *self.permissions.borrow()
    }

    pub fn push_position(&self, point: GeoPoint) {
        self.position.send_replace(Some(point));
    }

    pub fn last_position(&self) -> Option<GeoPoint> {
        *self.position.borrow()
    }
}

impl Default for DeviceFeed {
    fn default() -> Self {
        Self::new(PermissionStatus::default())
    }
}

#[async_trait]
impl LocationProvider for DeviceFeed {
    async fn request_permissions(&self) -> PermissionStatus {
        self.permissions()
    }

    async fn current_position(&self) -> Option<GeoPoint> {
        self.last_position()
    }
}

#[cfg(test)]
mod tests {
    use super::{DeviceFeed, LocationProvider, PermissionStatus};
    use crate::models::location::GeoPoint;

    #[tokio::test]
    async fn feed_reflects_latest_values() {
        let feed = DeviceFeed::default();
        assert!(!feed.request_permissions().await.allows_tracking());
        assert!(feed.current_position().await.is_none());

        feed.set_permissions(PermissionStatus::granted());
        feed.push_position(GeoPoint { lat: 1.0, lng: 2.0 });
        feed.push_position(GeoPoint { lat: 3.0, lng: 4.0 });

        assert!(feed.request_permissions().await.allows_tracking());
        assert_eq!(
            feed.current_position().await,
            Some(GeoPoint { lat: 3.0, lng: 4.0 })
        );
    }

    #[test]
    fn foreground_alone_is_not_enough() {
        let status = PermissionStatus {
            foreground: true,
            background: false,
        };
        assert!(!status.allows_tracking());
    }
}
