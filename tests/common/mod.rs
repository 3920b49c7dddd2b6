//! Shared fixture helpers for integration tests.

use chrono::{DateTime, Utc};
use qfos::model::{BotCategory, Provider, Request};

/// Build a minimal `Request` with the fields the bundler/embedder/refiner
/// actually look at; everything else gets an innocuous default.
#[must_use]
pub fn req(id: u64, provider: &str, ts_ms: i64, path: &str) -> Request {
    Request {
        id,
        timestamp: ts(ts_ms),
        client_ip: "203.0.113.1".to_string(),
        method: "GET".to_string(),
        host: "example.com".to_string(),
        path: path.to_string(),
        status_code: 200,
        user_agent: "GPTBot/1.0".to_string(),
        provider: Provider::new(provider),
        bot_category: BotCategory::Crawler,
        query_string: None,
        response_bytes: None,
        request_bytes: None,
        response_time_ms: None,
        cache_status: None,
        edge_location: None,
        referer: None,
        protocol: None,
        ssl_protocol: None,
    }
}

#[must_use]
pub fn ts(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).expect("valid timestamp")
}
