// libs/scheduling-cell/src/stores/cache.rs

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::models::{
    ExclusionWindow, Resource, ResourceKind, RoomType, ServiceConstraints, WeeklyTemplate,
};
use crate::stores::{ResourceDirectory, StoreError};

struct CachedEntry<T> {
    value: T,
    fetched_at: Instant,
}

impl<T: Clone> CachedEntry<T> {
    fn fresh_value(&self, ttl: Duration) -> Option<T> {
        (self.fetched_at.elapsed() < ttl).then(|| self.value.clone())
    }
}

/// Short-TTL cache over a `ResourceDirectory` for the read-mostly template
/// and exclusion data. Resources, service constraints, and room listings
/// pass straight through, and appointment reads are never cached anywhere:
/// staleness there directly causes double-booking.
pub struct CachedResourceDirectory {
    inner: Arc<dyn ResourceDirectory>,
    ttl: Duration,
    templates: RwLock<HashMap<(Uuid, ResourceKind), CachedEntry<WeeklyTemplate>>>,
    exclusions: RwLock<HashMap<(Uuid, ResourceKind), CachedEntry<Vec<ExclusionWindow>>>>,
}

impl CachedResourceDirectory {
    pub fn new(inner: Arc<dyn ResourceDirectory>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            templates: RwLock::new(HashMap::new()),
            exclusions: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl ResourceDirectory for CachedResourceDirectory {
    async fn get_resource(&self, id: Uuid, kind: ResourceKind) -> Result<Resource, StoreError> {
        self.inner.get_resource(id, kind).await
    }

    async fn get_weekly_template(
        &self,
        resource_id: Uuid,
        kind: ResourceKind,
    ) -> Result<WeeklyTemplate, StoreError> {
        if let Some(entry) = self.templates.read().await.get(&(resource_id, kind)) {
            if let Some(template) = entry.fresh_value(self.ttl) {
                debug!(%resource_id, "weekly template served from cache");
                return Ok(template);
            }
        }

        let template = self.inner.get_weekly_template(resource_id, kind).await?;
        self.templates.write().await.insert(
            (resource_id, kind),
            CachedEntry {
                value: template.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(template)
    }

    async fn get_exclusion_windows(
        &self,
        resource_id: Uuid,
        kind: ResourceKind,
    ) -> Result<Vec<ExclusionWindow>, StoreError> {
        if let Some(entry) = self.exclusions.read().await.get(&(resource_id, kind)) {
            if let Some(windows) = entry.fresh_value(self.ttl) {
                debug!(%resource_id, "exclusion windows served from cache");
                return Ok(windows);
            }
        }

        let windows = self.inner.get_exclusion_windows(resource_id, kind).await?;
        self.exclusions.write().await.insert(
            (resource_id, kind),
            CachedEntry {
                value: windows.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(windows)
    }

    async fn get_service_constraints(
        &self,
        service_id: Uuid,
    ) -> Result<ServiceConstraints, StoreError> {
        self.inner.get_service_constraints(service_id).await
    }

    async fn list_bookable_rooms(&self, room_type: RoomType) -> Result<Vec<Resource>, StoreError> {
        self.inner.list_bookable_rooms(room_type).await
    }
}
