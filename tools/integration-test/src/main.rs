//! Analytics pipeline smoke test
//!
//! Posts a burst of events for a fresh site to a running ingestion service,
//! then polls the reporting service until the worker has stored them all.

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde_json::{json, Value};
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "integration-test")]
#[command(about = "End-to-end smoke test for a running analytics deployment")]
struct Args {
    /// Base URL of the ingestion service
    #[arg(long, default_value = "http://127.0.0.1:8000")]
    ingest_url: String,

    /// Base URL of the reporting service
    #[arg(long, default_value = "http://127.0.0.1:8001")]
    report_url: String,

    /// Seconds to wait for events to become visible in /stats
    #[arg(long, default_value = "30")]
    timeout_secs: u64,
}

const PATHS: [&str; 3] = ["/home", "/pricing", "/home"];
const USERS: [&str; 3] = ["u1", "u2", "u1"];

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let client = reqwest::Client::builder().timeout(Duration::from_secs(5)).build()?;

    println!("🚀 Starting analytics smoke test");

    // Test 1: Health checks
    println!("🏥 Test 1: Health checks...");
    for base in [&args.ingest_url, &args.report_url] {
        let resp = client.get(format!("{base}/health")).send().await.with_context(|| format!("{base} unreachable"))?;
        if !resp.status().is_success() {
            bail!("{base}/health returned {}", resp.status());
        }
    }
    println!("✅ Both services healthy");

    // Test 2: Invalid events are rejected
    println!("\n🔍 Test 2: Rejecting an incomplete event...");
    let resp = client
        .post(format!("{}/event", args.ingest_url))
        .json(&json!({"site_id": "smoke", "event_type": "pageview"}))
        .send()
        .await?;
    if resp.status().as_u16() != 422 {
        bail!("expected 422 for an incomplete event, got {}", resp.status());
    }
    println!("✅ Incomplete event rejected");

    // Test 3: Valid events are accepted
    let site_id = format!("smoke-{}", uuid::Uuid::new_v4());
    let today = chrono::Utc::now();
    println!("\n📨 Test 3: Posting {} events for {}...", PATHS.len(), site_id);
    for (path, user) in PATHS.iter().zip(USERS) {
        let resp = client
            .post(format!("{}/event", args.ingest_url))
            .json(&json!({
                "site_id": site_id,
                "event_type": "pageview",
                "path": path,
                "user_id": user,
                "timestamp": today.to_rfc3339()
            }))
            .send()
            .await?;
        if resp.status().as_u16() != 202 {
            bail!("event rejected with {}: {}", resp.status(), resp.text().await.unwrap_or_default());
        }
    }
    println!("✅ Events accepted");

    // Test 4: Stats reflect the events once processed
    println!("\n📊 Test 4: Waiting for stats...");
    let url = format!("{}/stats", args.report_url);
    let date = today.format("%Y-%m-%d").to_string();
    let deadline = Instant::now() + Duration::from_secs(args.timeout_secs);
    let stats = loop {
        let stats: Value = client
            .get(&url)
            .query(&[("site_id", site_id.as_str()), ("date", date.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if stats["total_views"].as_u64() == Some(PATHS.len() as u64) {
            break stats;
        }
        if Instant::now() >= deadline {
            bail!("events not visible after {}s: {}", args.timeout_secs, stats);
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    };

    if stats["unique_users"] != 2 {
        bail!("expected 2 unique users: {}", stats);
    }
    if stats["top_paths"][0] != json!({"path": "/home", "views": 2}) {
        bail!("unexpected top paths: {}", stats);
    }
    println!("✅ Stats: {}", stats);

    println!("\n🎉 Smoke test passed");
    Ok(())
}
