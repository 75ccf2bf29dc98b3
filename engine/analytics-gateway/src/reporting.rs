//! `GET /stats` - per-site daily statistics

use crate::error::{handle_rejection, GatewayError};
use crate::server::health_route;
use chrono::NaiveDate;
use event_store::EventStore;
use std::collections::HashMap;
use std::sync::Arc;
use warp::Filter;

/// Parsed `GET /stats` query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsQuery {
    pub site_id: String,
    pub date: NaiveDate,
}

impl StatsQuery {
    /// Validate raw query parameters
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, GatewayError> {
        let site_id = match params.get("site_id").map(|s| s.trim()) {
            Some(site_id) if !site_id.is_empty() => site_id.to_string(),
            Some(_) => {
                return Err(GatewayError::InvalidQuery {
                    field: "site_id",
                    message: "must not be empty".to_string(),
                })
            }
            None => {
                return Err(GatewayError::InvalidQuery {
                    field: "site_id",
                    message: "is required".to_string(),
                })
            }
        };

        let raw_date = params.get("date").ok_or_else(|| GatewayError::InvalidQuery {
            field: "date",
            message: "is required".to_string(),
        })?;
        let date = NaiveDate::parse_from_str(raw_date, "%Y-%m-%d").map_err(|e| {
            GatewayError::InvalidQuery {
                field: "date",
                message: format!("expected YYYY-MM-DD, got {raw_date:?} ({e})"),
            }
        })?;

        Ok(Self { site_id, date })
    }
}

/// Compute statistics for one site and day
pub async fn get_stats(
    params: HashMap<String, String>,
    store: Arc<dyn EventStore>,
) -> Result<impl warp::Reply, warp::Rejection> {
    metrics::increment_counter!("stats_requests_total");
    let query = StatsQuery::from_params(&params).map_err(warp::reject::custom)?;

    match store.site_stats(&query.site_id, query.date).await {
        Ok(stats) => {
            tracing::debug!(
                site_id = %query.site_id,
                date = %query.date,
                total_views = stats.total_views,
                "Computed site stats"
            );
            Ok(warp::reply::json(&stats))
        }
        Err(e) => {
            tracing::error!(site_id = %query.site_id, date = %query.date, "Stats query failed: {}", e);
            Err(warp::reject::custom(GatewayError::from(e)))
        }
    }
}

/// Routes of the reporting service
pub fn reporting_routes(
    store: Arc<dyn EventStore>,
) -> impl warp::Filter<Extract = impl warp::Reply, Error = std::convert::Infallible> + Clone {
    let store_filter = warp::any().map(move || store.clone());

    let stats = warp::path("stats")
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<HashMap<String, String>>())
        .and(store_filter)
        .and_then(get_stats);

    stats.or(health_route("reporting")).recover(handle_rejection)
}
