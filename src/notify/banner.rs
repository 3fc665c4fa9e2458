use crate::notify::Severity;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Mutex, PoisonError};
use tracing::info;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Banner {
    pub id: u64,
    pub title: String,
    pub message: String,
    pub severity: Severity,
    pub shown_at: DateTime<Utc>,
    /// Non-positive means the banner stays until dismissed.
    pub duration_ms: i64,
}

/// Presents transient messages inside the application.
pub trait MessagePresenter: Send + Sync {
    fn present(&self, banner: Banner);

    /// Returns false when the banner was already gone.
    fn dismiss(&self, id: u64) -> bool;
}

/// Visible banners, newest first, read by the local API.
#[derive(Debug, Default)]
pub struct BannerBoard {
    banners: Mutex<Vec<Banner>>,
}

impl BannerBoard {
    pub fn list(&self) -> Vec<Banner> {
        self.banners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl MessagePresenter for BannerBoard {
    fn present(&self, banner: Banner) {
        info!(
            banner_id = banner.id,
            severity = ?banner.severity,
            title = %banner.title,
            "in-app notification shown"
        );

        self.banners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(0, banner);
    }

    fn dismiss(&self, id: u64) -> bool {
        let mut banners = self.banners.lock().unwrap_or_else(PoisonError::into_inner);
        let before = banners.len();
        banners.retain(|banner| banner.id != id);
        banners.len() != before
    }
}
