use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::AppError;
use crate::models::order::Order;
use crate::models::rider::RiderProfile;

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    profile: Option<RiderProfile>,
    #[serde(default)]
    pending_orders: Vec<Order>,
}

/// Durable mirror of the last-known profile and pending-offer set. Read once
/// at startup to warm the reconciler before the first network round trip;
/// overwritten after every reconciler mutation. Never a source of truth once
/// live data arrives.
#[derive(Clone)]
pub struct SnapshotCache {
    path: PathBuf,
}

impl SnapshotCache {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub async fn load(&self) -> Result<(Option<RiderProfile>, Vec<Order>), AppError> {
        if !self.path.exists() {
            return Ok((None, Vec::new()));
        }

        let raw = fs::read(&self.path)
            .await
            .map_err(|err| AppError::Cache(format!("read {}: {err}", self.path.display())))?;
        let cached: CacheFile = serde_json::from_slice(&raw)
            .map_err(|err| AppError::Cache(format!("parse {}: {err}", self.path.display())))?;

        Ok((cached.profile, cached.pending_orders))
    }

    pub async fn save_profile(&self, profile: &RiderProfile) -> Result<(), AppError> {
        let mut cached = self.read_or_default().await;
        cached.profile = Some(profile.clone());
        self.write(&cached).await
    }

    pub async fn save_pending(&self, pending: &[Order]) -> Result<(), AppError> {
        let mut cached = self.read_or_default().await;
        cached.pending_orders = pending.to_vec();
        self.write(&cached).await
    }

    pub async fn clear(&self) -> Result<(), AppError> {
        if self.path.exists() {
            fs::remove_file(&self.path)
                .await
                .map_err(|err| AppError::Cache(format!("remove {}: {err}", self.path.display())))?;
        }
        Ok(())
    }

    async fn read_or_default(&self) -> CacheFile {
        match self.load().await {
            Ok((profile, pending_orders)) => CacheFile {
                profile,
                pending_orders,
            },
            Err(_) => CacheFile::default(),
        }
    }

    async fn write(&self, cached: &CacheFile) -> Result<(), AppError> {
        let raw = serde_json::to_vec_pretty(cached)
            .map_err(|err| AppError::Cache(format!("serialize cache: {err}")))?;

        // write-then-rename so a crash mid-write never truncates the cache
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &raw)
            .await
            .map_err(|err| AppError::Cache(format!("write {}: {err}", tmp.display())))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|err| AppError::Cache(format!("rename {}: {err}", tmp.display())))?;

        Ok(())
    }
}
