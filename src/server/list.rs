// Admin listing: GET /api/fingerprint/list?prefix=&limit=&cursor=
//
// Authorization is checked before the namespace is touched. Keys are resolved
// concurrently; values that are gone or not JSON are dropped from the page.
// Pages are independent reads with no snapshot across them.

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{auth, EdgeContext, EdgeRequest, EdgeResponse, LIST_CORS};
use crate::config::DEFAULT_LIST_LIMIT;
use crate::error::{FingerprintError, Result};
use crate::storage::{KvNamespace, ListOptions};

const DEFAULT_PREFIX: &str = "visitor:";

/// One resolved key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListedVisitor {
    pub key: String,
    pub data: Value,
}

/// Response body of the listing endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitorPage {
    pub count: usize,
    pub visitors: Vec<ListedVisitor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    pub has_more: bool,
}

pub(super) async fn handle(ctx: &EdgeContext, req: &EdgeRequest) -> EdgeResponse {
    match req.method.as_str() {
        "OPTIONS" => return EdgeResponse::preflight(&LIST_CORS),
        "GET" => {}
        other => {
            return EdgeResponse::error(
                &FingerprintError::MethodNotAllowed(other.to_string()),
                &LIST_CORS,
            )
        }
    }

    if let Err(e) = auth::authorize(req, &ctx.config.admin_secret) {
        return EdgeResponse::error(&e, &LIST_CORS);
    }

    let kv = match ctx.fingerprints.as_deref() {
        Some(kv) => kv,
        None => return EdgeResponse::error(&FingerprintError::StorageUnavailable, &LIST_CORS),
    };

    match list_visitors(kv, list_options(req)).await {
        Ok(page) => EdgeResponse::json(200, &page, &LIST_CORS),
        Err(e) => {
            log::error!("List fingerprints error: {}", e);
            EdgeResponse::json(500, &json!({ "error": e.to_string() }), &LIST_CORS)
        }
    }
}

fn list_options(req: &EdgeRequest) -> ListOptions {
    ListOptions {
        prefix: Some(
            req.query("prefix")
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
        ),
        limit: Some(parse_limit(req.query("limit").as_deref())),
        cursor: req.query("cursor").filter(|c| !c.is_empty()),
    }
}

/// Leading decimal digits of `raw`, or the default page size
fn parse_limit(raw: Option<&str>) -> usize {
    let digits: String = raw
        .unwrap_or_default()
        .trim_start()
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().unwrap_or(DEFAULT_LIST_LIMIT)
}

async fn list_visitors(kv: &dyn KvNamespace, options: ListOptions) -> Result<VisitorPage> {
    let listing = kv.list(options).await?;

    let values = try_join_all(listing.keys.iter().map(|key| kv.get(&key.name))).await?;

    let visitors: Vec<ListedVisitor> = listing
        .keys
        .into_iter()
        .zip(values)
        .filter_map(|(key, value)| {
            let data = serde_json::from_str(&value?).ok()?;
            Some(ListedVisitor {
                key: key.name,
                data,
            })
        })
        .collect();

    Ok(VisitorPage {
        count: visitors.len(),
        visitors,
        cursor: listing.cursor,
        has_more: !listing.list_complete,
    })
}
