//! PostgreSQL event store

use crate::config::{is_plain_identifier, StoreConfig};
use crate::error::StoreError;
use crate::stats::{SiteStats, TopPath, TOP_PATHS_LIMIT};
use crate::{EventRowId, EventStore, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use event_envelope::EventEnvelope;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgConnection, PgPool};
use std::str::FromStr;
use tracing::{debug, info};

const INSERT_EVENT: &str = r#"
    INSERT INTO website_events (site_id, event_type, path, user_id, "timestamp")
    VALUES ($1, $2, $3, $4, $5)
    RETURNING id
"#;

const COUNT_VIEWS: &str = r#"
    SELECT COUNT(*) FROM website_events
    WHERE site_id = $1 AND ("timestamp" AT TIME ZONE 'UTC')::date = $2
"#;

const COUNT_USERS: &str = r#"
    SELECT COUNT(DISTINCT user_id) FROM website_events
    WHERE site_id = $1 AND ("timestamp" AT TIME ZONE 'UTC')::date = $2
"#;

// Ties go to the path that was stored first.
const TOP_PATHS: &str = r#"
    SELECT path, COUNT(*) AS views FROM website_events
    WHERE site_id = $1 AND ("timestamp" AT TIME ZONE 'UTC')::date = $2
    GROUP BY path
    ORDER BY views DESC, MIN(id) ASC
    LIMIT $3
"#;

/// Event store backed by a sqlx PostgreSQL pool
///
/// Every call checks a connection out of the pool for its own duration; the
/// connection goes back on drop, on success and on error alike.
#[derive(Debug, Clone)]
pub struct PgEventStore {
    pool: PgPool,
    schema: String,
    consistent_stats: bool,
}

impl PgEventStore {
    /// Build the pool without touching the database
    ///
    /// Connections are opened on demand, so an unreachable database surfaces
    /// as a per-call [`StoreError`] instead of a startup failure.
    pub fn connect_lazy(config: &StoreConfig) -> Result<Self> {
        config.validate().map_err(StoreError::Config)?;
        let options = PgConnectOptions::from_str(&config.url)?
            .options([("search_path", config.schema.as_str())]);
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout())
            .connect_lazy_with(options);
        Ok(Self::from_pool(pool, &config.schema, config.consistent_stats))
    }

    /// Wrap an existing pool whose connections already use `schema`
    pub fn from_pool(pool: PgPool, schema: &str, consistent_stats: bool) -> Self {
        Self { pool, schema: schema.to_string(), consistent_stats }
    }

    /// Create the schema if needed and apply the embedded migrations
    pub async fn migrate(&self) -> Result<()> {
        if !is_plain_identifier(&self.schema) {
            return Err(StoreError::Config(format!("invalid schema name {:?}", self.schema)));
        }
        sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS \"{}\"", self.schema))
            .execute(&self.pool)
            .await?;
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!(schema = %self.schema, "Event store migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Close the pool, waiting for checked-out connections to return
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

async fn aggregate(conn: &mut PgConnection, site_id: &str, date: NaiveDate) -> Result<SiteStats> {
    let total_views: i64 =
        sqlx::query_scalar(COUNT_VIEWS).bind(site_id).bind(date).fetch_one(&mut *conn).await?;

    let unique_users: i64 =
        sqlx::query_scalar(COUNT_USERS).bind(site_id).bind(date).fetch_one(&mut *conn).await?;

    let rows: Vec<(String, i64)> = sqlx::query_as(TOP_PATHS)
        .bind(site_id)
        .bind(date)
        .bind(TOP_PATHS_LIMIT as i64)
        .fetch_all(&mut *conn)
        .await?;

    Ok(SiteStats {
        site_id: site_id.to_string(),
        date,
        total_views,
        unique_users,
        top_paths: rows.into_iter().map(|(path, views)| TopPath { path, views }).collect(),
    })
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn insert_event(&self, event: &EventEnvelope) -> Result<EventRowId> {
        let mut conn = self.pool.acquire().await?;
        let id: i64 = sqlx::query_scalar(INSERT_EVENT)
            .bind(&event.site_id)
            .bind(&event.event_type)
            .bind(&event.path)
            .bind(&event.user_id)
            .bind(event.timestamp)
            .fetch_one(&mut *conn)
            .await?;
        debug!(id, site_id = %event.site_id, "Inserted event row");
        Ok(id)
    }

    async fn site_stats(&self, site_id: &str, date: NaiveDate) -> Result<SiteStats> {
        if !self.consistent_stats {
            let mut conn = self.pool.acquire().await?;
            return aggregate(&mut conn, site_id, date).await;
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;
        let stats = aggregate(&mut tx, site_id, date).await?;
        tx.commit().await?;
        Ok(stats)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
