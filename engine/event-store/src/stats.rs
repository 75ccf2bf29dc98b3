//! Site statistics model

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Maximum number of paths reported in [`SiteStats::top_paths`]
pub const TOP_PATHS_LIMIT: usize = 10;

/// Views of a single path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopPath {
    pub path: String,
    pub views: i64,
}

/// Aggregated statistics for one site on one day; recomputed per request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteStats {
    pub site_id: String,
    pub date: NaiveDate,
    pub total_views: i64,
    pub unique_users: i64,
    pub top_paths: Vec<TopPath>,
}

impl SiteStats {
    /// Statistics for a day with no recorded events
    pub fn empty(site_id: impl Into<String>, date: NaiveDate) -> Self {
        Self { site_id: site_id.into(), date, total_views: 0, unique_users: 0, top_paths: Vec::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serializes_date_as_calendar_day() {
        let stats = SiteStats {
            site_id: "abc".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            total_views: 1,
            unique_users: 1,
            top_paths: vec![TopPath { path: "/home".to_string(), views: 1 }],
        };
        assert_eq!(
            serde_json::to_value(&stats).unwrap(),
            json!({
                "site_id": "abc",
                "date": "2024-01-01",
                "total_views": 1,
                "unique_users": 1,
                "top_paths": [{"path": "/home", "views": 1}]
            })
        );
    }
}
