//! In-process event store

use crate::error::StoreError;
use crate::stats::{SiteStats, TopPath, TOP_PATHS_LIMIT};
use crate::{EventRowId, EventStore, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use event_envelope::EventEnvelope;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

/// A persisted row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEvent {
    pub id: EventRowId,
    pub event: EventEnvelope,
}

/// Event store kept in memory, with the same aggregation rules as PostgreSQL
///
/// [`MemoryEventStore::set_available`] simulates the database going away.
#[derive(Debug)]
pub struct MemoryEventStore {
    rows: Mutex<Vec<StoredEvent>>,
    available: AtomicBool,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self { rows: Mutex::new(Vec::new()), available: AtomicBool::new(true) }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// All rows in storage order
    pub fn rows(&self) -> Vec<StoredEvent> {
        self.rows.lock().clone()
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory event store is offline".to_string()))
        }
    }
}

impl Default for MemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn insert_event(&self, event: &EventEnvelope) -> Result<EventRowId> {
        self.check_available()?;
        let mut rows = self.rows.lock();
        let id = rows.len() as EventRowId + 1;
        rows.push(StoredEvent { id, event: event.clone() });
        Ok(id)
    }

    async fn site_stats(&self, site_id: &str, date: NaiveDate) -> Result<SiteStats> {
        self.check_available()?;
        let rows = self.rows.lock();
        let matching = rows
            .iter()
            .map(|row| &row.event)
            .filter(|event| event.site_id == site_id && event.timestamp.date_naive() == date);

        let mut total_views = 0i64;
        let mut users = HashSet::new();
        // path -> (views, position of first occurrence)
        let mut paths: HashMap<&str, (i64, usize)> = HashMap::new();
        for event in matching {
            let first_seen = paths.len();
            paths.entry(event.path.as_str()).or_insert((0, first_seen)).0 += 1;
            users.insert(event.user_id.as_str());
            total_views += 1;
        }

        let mut ranked: Vec<(&str, (i64, usize))> = paths.into_iter().collect();
        ranked.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));

        Ok(SiteStats {
            site_id: site_id.to_string(),
            date,
            total_views,
            unique_users: users.len() as i64,
            top_paths: ranked
                .into_iter()
                .take(TOP_PATHS_LIMIT)
                .map(|(path, (views, _))| TopPath { path: path.to_string(), views })
                .collect(),
        })
    }

    async fn ping(&self) -> Result<()> {
        self.check_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn event(site: &str, path: &str, user: &str, day: u32, hour: u32) -> EventEnvelope {
        EventEnvelope::new(
            site,
            "pageview",
            path,
            user,
            Utc.with_ymd_and_hms(2024, 1, day, hour, 0, 0).unwrap(),
        )
        .unwrap()
    }

    fn jan(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[tokio::test]
    async fn test_single_event_stats() {
        let store = MemoryEventStore::new();
        store.insert_event(&event("abc", "/home", "u1", 1, 10)).await.unwrap();

        let stats = store.site_stats("abc", jan(1)).await.unwrap();
        assert_eq!(stats.total_views, 1);
        assert_eq!(stats.unique_users, 1);
        assert_eq!(stats.top_paths, vec![TopPath { path: "/home".to_string(), views: 1 }]);
    }

    #[tokio::test]
    async fn test_filters_by_site_and_utc_day() {
        let store = MemoryEventStore::new();
        store.insert_event(&event("abc", "/a", "u1", 1, 0)).await.unwrap();
        store.insert_event(&event("abc", "/a", "u1", 1, 23)).await.unwrap();
        store.insert_event(&event("abc", "/a", "u1", 2, 0)).await.unwrap();
        store.insert_event(&event("other", "/a", "u1", 1, 12)).await.unwrap();

        let stats = store.site_stats("abc", jan(1)).await.unwrap();
        assert_eq!(stats.total_views, 2);
        assert_eq!(store.site_stats("abc", jan(3)).await.unwrap(), SiteStats::empty("abc", jan(3)));
    }

    #[tokio::test]
    async fn test_top_paths_sorted_truncated_and_stable_on_ties() {
        let store = MemoryEventStore::new();
        // 12 distinct paths; /p0 gets 12 views, /p1 11, ... /p11 1. Then /tie-a and
        // /tie-b share a count that is above the cut.
        for i in 0..12u32 {
            for v in 0..(12 - i) {
                store
                    .insert_event(&event("s", &format!("/p{i}"), &format!("u{v}"), 5, 9))
                    .await
                    .unwrap();
            }
        }
        for path in ["/tie-a", "/tie-b"] {
            for _ in 0..7 {
                store.insert_event(&event("s", path, "u0", 5, 9)).await.unwrap();
            }
        }

        let stats = store.site_stats("s", jan(5)).await.unwrap();
        assert_eq!(stats.total_views, 78 + 14);
        assert_eq!(stats.unique_users, 12);
        assert_eq!(stats.top_paths.len(), TOP_PATHS_LIMIT);

        let views: Vec<i64> = stats.top_paths.iter().map(|p| p.views).collect();
        let mut sorted = views.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(views, sorted);

        let names: Vec<&str> = stats.top_paths.iter().map(|p| p.path.as_str()).collect();
        // /p5 (7 views) was stored before the tie paths, which keep insertion order.
        assert_eq!(&names[4..8], &["/p4", "/p5", "/tie-a", "/tie-b"]);
    }

    #[tokio::test]
    async fn test_duplicates_are_kept() {
        let store = MemoryEventStore::new();
        let e = event("abc", "/home", "u1", 1, 10);
        let first = store.insert_event(&e).await.unwrap();
        let second = store.insert_event(&e).await.unwrap();
        assert_ne!(first, second);
        let rows = store.rows();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.event == e));
    }

    #[tokio::test]
    async fn test_offline_store_errors() {
        let store = MemoryEventStore::new();
        store.set_available(false);
        let err = store.insert_event(&event("abc", "/", "u", 1, 1)).await.unwrap_err();
        assert!(err.is_transient());
        tokio_test::assert_err!(store.site_stats("abc", jan(1)).await);
        assert!(store.rows().is_empty());
    }
}
