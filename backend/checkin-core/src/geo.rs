// src/geo.rs

use crate::api_client::CheckinError;
use crate::context::AppContext;
use crate::models::lenient;
use serde::Deserialize;
use tracing::{error, info, warn};

pub const SEARCH_RESULT_LIMIT: u32 = 5;
pub const SEARCH_LANGUAGE: &str = "zh-TW";

/// One geocoding hit.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlaceResult {
    #[serde(deserialize_with = "lenient::string")]
    pub display_name: String,
    #[serde(deserialize_with = "lenient::opt_f64")]
    pub lat: Option<f64>,
    #[serde(rename = "lon", deserialize_with = "lenient::opt_f64")]
    pub lng: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct IpReply {
    ip: String,
}

async fn fetch_places(ctx: &AppContext, query: &str) -> Result<Vec<PlaceResult>, CheckinError> {
    let limit = SEARCH_RESULT_LIMIT.to_string();
    let response = ctx
        .client
        .http()
        .get(&ctx.client.config().nominatim_url)
        .query(&[
            ("format", "json"),
            ("q", query),
            ("limit", limit.as_str()),
            ("accept-language", SEARCH_LANGUAGE),
        ])
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(CheckinError::Http { status, body });
    }
    Ok(response.json::<Vec<PlaceResult>>().await?)
}

/// Place search for the location admin. Failures are reported and yield
/// an empty list.
pub async fn search_location(ctx: &AppContext, query: &str) -> Vec<PlaceResult> {
    let query = query.trim();
    if query.is_empty() {
        return Vec::new();
    }

    info!("Searching places for '{}'", query);
    match fetch_places(ctx, query).await {
        Ok(results) => {
            if results.is_empty() {
                ctx.notifier
                    .warning(&ctx.t_or("LOCATION_NOT_FOUND", "找不到相關地點"));
            }
            results
        }
        Err(e) => {
            error!("Place search failed: {}", e);
            ctx.notifier
                .error(&ctx.t_or("LOCATION_SEARCH_FAILED", "搜尋失敗，請檢查網路連線"));
            Vec::new()
        }
    }
}

/// Best-effort public IP lookup.
pub async fn public_ip(ctx: &AppContext) -> Option<String> {
    let result = async {
        let response = ctx
            .client
            .http()
            .get(&ctx.client.config().ipify_url)
            .query(&[("format", "json")])
            .send()
            .await?
            .error_for_status()?;
        response.json::<IpReply>().await
    }
    .await;

    match result {
        Ok(reply) if !reply.ip.is_empty() => Some(reply.ip),
        Ok(_) => None,
        Err(e) => {
            warn!("Could not determine public IP: {}", e);
            None
        }
    }
}
