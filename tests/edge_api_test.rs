//! Edge endpoint tests
//!
//! Drive the router end to end against the in-memory namespace.
//!
//! Run with: cargo test --test edge_api_test

use std::cell::Cell;
use std::rc::Rc;

use futures::executor::block_on;
use futures::FutureExt;
use serde_json::{json, Value};

use visitor_fp::runtime::ManualClock;
use visitor_fp::server::{
    profile_key, route, BackgroundTask, EdgeContext, EdgeRequest, EdgeResponse, EventRelay,
    MemoryRelay, RelayEvent, VisitorProfile, CONFIG_CACHE_TTL_MS,
};
use visitor_fp::storage::PutOptions;
use visitor_fp::{EdgeConfig, KvNamespace, MemoryKv};

const SECRET: &str = "admin123";

fn context(kv: &Rc<MemoryKv>) -> EdgeContext {
    EdgeContext::new(EdgeConfig::default()).with_fingerprints(kv.clone())
}

fn send(ctx: &EdgeContext, req: EdgeRequest) -> EdgeResponse {
    block_on(route(ctx, &req))
}

fn post_fingerprint(body: Value) -> EdgeRequest {
    EdgeRequest::new("POST", "https://paint.toth.ink/api/fingerprint")
        .with_header("Content-Type", "application/json")
        .with_header("CF-Connecting-IP", "203.0.113.7")
        .with_header("CF-IPCountry", "US")
        .with_header("User-Agent", "Mozilla/5.0 (X11; Linux x86_64)")
        .with_cf(json!({"city": "Portland", "region": "Oregon", "asn": 64500}))
        .with_body(body.to_string())
}

fn stored_profile(kv: &MemoryKv, visitor_id: &str) -> VisitorProfile {
    let raw = block_on(kv.get(&profile_key(visitor_id)))
        .unwrap()
        .expect("profile stored");
    serde_json::from_str(&raw).unwrap()
}

// ===== Ingestion =====

#[test]
fn post_without_visitor_id_still_succeeds() {
    let kv = Rc::new(MemoryKv::new());
    let ctx = context(&kv);

    let resp = send(&ctx, post_fingerprint(json!({"components": {}, "page": "/"})));
    assert_eq!(resp.status, 200);
    let body = resp.json_body().unwrap();
    assert_eq!(body["success"], true);
    let visitor_id = body["visitorId"].as_str().unwrap();
    assert!(!visitor_id.is_empty());

    let keys = kv.keys();
    assert_eq!(keys.len(), 3, "{:?}", keys);
    assert!(keys.iter().any(|k| k.starts_with(&format!("fp:{}:", visitor_id))));
    assert!(keys.contains(&format!("visitor:{}", visitor_id)));
    assert!(keys.contains(&format!("ip:203.0.113.7:{}", visitor_id)));
}

#[test]
fn ingestion_response_is_minimal() {
    let kv = Rc::new(MemoryKv::new());
    let ctx = context(&kv);

    let resp = send(&ctx, post_fingerprint(json!({"visitorId": "abc", "confidence": 0.7})));
    assert_eq!(resp.json_body().unwrap(), json!({"success": true, "visitorId": "abc"}));
    assert_eq!(resp.header("Access-Control-Allow-Origin"), Some("*"));
    assert_eq!(resp.header("Content-Type"), Some("application/json"));
}

#[test]
fn enriched_record_uses_transport_metadata() {
    let kv = Rc::new(MemoryKv::new());
    let ctx = context(&kv);

    send(
        &ctx,
        post_fingerprint(json!({
            "visitorId": "v1",
            "components": {"canvas": "data:image/png;base64,AAAA"},
            "confidence": 0.85,
            "sessionId": "s1",
            "page": "/services",
            "ip": "10.9.9.9"
        })),
    );

    let record_key = kv
        .keys()
        .into_iter()
        .find(|k| k.starts_with("fp:v1:"))
        .unwrap();
    let record: Value =
        serde_json::from_str(&block_on(kv.get(&record_key)).unwrap().unwrap()).unwrap();

    assert_eq!(record["serverSignals"]["ip"], "203.0.113.7");
    assert_eq!(record["serverSignals"]["city"], "Portland");
    assert_eq!(record["serverSignals"]["asn"], 64500);
    assert_eq!(record["clientSignals"]["canvas"], "data:image/png;base64,AAAA");
    assert_eq!(record["confidence"], 0.85);
    assert_eq!(record["sessionId"], "s1");
    assert_eq!(record["page"], "/services");
    assert_eq!(record["raw"]["ip"], "203.0.113.7");

    let profile = stored_profile(&kv, "v1");
    assert_eq!(profile.visits.len(), 1);
    assert_eq!(profile.visits[0].country.as_deref(), Some("US"));
    assert_eq!(profile.fingerprint["canvas"], "data:image/png;base64,AAAA");
    assert_eq!(profile.fingerprint["userAgent"], "Mozilla/5.0 (X11; Linux x86_64)");
}

#[test]
fn profile_keeps_the_100_most_recent_visits() {
    let kv = Rc::new(MemoryKv::new());
    let ctx = context(&kv).with_clock(Rc::new(ManualClock::with_step(1_700_000_000_000, 1_000)));

    for n in 0..105 {
        let resp = send(
            &ctx,
            post_fingerprint(json!({"visitorId": "v1", "page": format!("/p{}", n)})),
        );
        assert_eq!(resp.status, 200);
    }

    let profile = stored_profile(&kv, "v1");
    assert_eq!(profile.visits.len(), 100);
    assert_eq!(profile.visits[0].page.as_deref(), Some("/p5"));
    assert_eq!(profile.visits[99].page.as_deref(), Some("/p104"));
    assert!(profile
        .visits
        .windows(2)
        .all(|pair| pair[0].timestamp < pair[1].timestamp));
    assert_eq!(profile.last_seen.as_deref(), Some(profile.visits[99].timestamp.as_str()));

    let records = kv.keys().into_iter().filter(|k| k.starts_with("fp:v1:")).count();
    assert_eq!(records, 105);
}

#[test]
fn unreadable_profile_is_replaced() {
    let kv = Rc::new(MemoryKv::new());
    block_on(kv.put("visitor:v1", "{broken", PutOptions::default())).unwrap();
    let ctx = context(&kv);

    let resp = send(&ctx, post_fingerprint(json!({"visitorId": "v1"})));
    assert_eq!(resp.status, 200);
    assert_eq!(stored_profile(&kv, "v1").visits.len(), 1);
}

#[test]
fn records_expire_after_retention() {
    let clock = Rc::new(ManualClock::new(1_700_000_000_000));
    let kv = Rc::new(MemoryKv::with_clock(clock.clone()));
    let ctx = context(&kv).with_clock(clock.clone());

    send(&ctx, post_fingerprint(json!({"visitorId": "v1"})));
    assert_eq!(kv.keys().len(), 3);

    clock.advance(90 * 24 * 60 * 60 * 1000);
    assert_eq!(kv.keys(), vec!["visitor:v1".to_string()]);

    clock.advance(275 * 24 * 60 * 60 * 1000);
    assert!(kv.keys().is_empty());
}

#[test]
fn invalid_body_is_generic_500() {
    let kv = Rc::new(MemoryKv::new());
    let ctx = context(&kv);

    for body in ["{not json", "", "null"] {
        let req = EdgeRequest::new("POST", "/api/fingerprint").with_body(body);
        let resp = send(&ctx, req);
        assert_eq!(resp.status, 500, "body {:?}", body);
        assert_eq!(resp.json_body().unwrap(), json!({"error": "Internal error"}));
    }
    assert_eq!(kv.writes(), 0);
}

#[test]
fn failed_write_does_not_block_the_others() {
    let kv = Rc::new(MemoryKv::new());
    kv.fail_writes_with_prefix("visitor:");
    let relay = Rc::new(MemoryRelay::new());
    let config = EdgeConfig {
        relay_url: Some("https://relay.example/hook".into()),
        ..Default::default()
    };
    let ctx = EdgeContext::new(config)
        .with_fingerprints(kv.clone())
        .with_relay(relay.clone());

    let resp = send(&ctx, post_fingerprint(json!({"visitorId": "v1"})));
    assert_eq!(resp.status, 500);
    assert_eq!(resp.json_body().unwrap(), json!({"error": "Internal error"}));

    let keys = kv.keys();
    assert!(keys.iter().any(|k| k.starts_with("fp:v1:")));
    assert!(keys.contains(&"ip:203.0.113.7:v1".to_string()));
    assert!(!keys.contains(&"visitor:v1".to_string()));
    assert!(relay.events().is_empty());
}

#[test]
fn missing_namespace_still_answers_success() {
    let ctx = EdgeContext::new(EdgeConfig::default());
    let resp = send(&ctx, post_fingerprint(json!({"visitorId": "v1"})));
    assert_eq!(resp.status, 200);
    assert_eq!(resp.json_body().unwrap()["visitorId"], "v1");
}

#[test]
fn relay_receives_tagged_event() {
    let kv = Rc::new(MemoryKv::new());
    let relay = Rc::new(MemoryRelay::new());
    let config = EdgeConfig {
        relay_url: Some("https://relay.example/hook".into()),
        ..Default::default()
    };
    let ctx = EdgeContext::new(config)
        .with_fingerprints(kv.clone())
        .with_relay(relay.clone());

    send(&ctx, post_fingerprint(json!({"visitorId": "v1"})));

    let events = relay.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].source, "paint.toth.ink");
    assert_eq!(events[0].kind, "fingerprint");
    assert_eq!(events[0].data["visitorId"], "v1");
    assert_eq!(events[0].data["serverSignals"]["country"], "US");
}

#[test]
fn relay_is_silent_when_unconfigured() {
    let kv = Rc::new(MemoryKv::new());
    let relay = Rc::new(MemoryRelay::new());
    let ctx = context(&kv).with_relay(relay.clone());

    send(&ctx, post_fingerprint(json!({"visitorId": "v1"})));
    assert!(relay.events().is_empty());
}

/// Relay whose hand-off is a task that flips a flag when it runs
struct FlagRelay {
    delivered: Rc<Cell<bool>>,
}

impl EventRelay for FlagRelay {
    fn dispatch(&self, _event: RelayEvent) -> Option<BackgroundTask> {
        let delivered = self.delivered.clone();
        Some(async move { delivered.set(true) }.boxed_local())
    }
}

#[test]
fn relay_work_is_queued_for_the_host_not_run_inline() {
    let kv = Rc::new(MemoryKv::new());
    let delivered = Rc::new(Cell::new(false));
    let config = EdgeConfig {
        relay_url: Some("https://relay.example/hook".into()),
        ..Default::default()
    };
    let ctx = EdgeContext::new(config)
        .with_fingerprints(kv.clone())
        .with_relay(Rc::new(FlagRelay {
            delivered: delivered.clone(),
        }));

    let resp = send(&ctx, post_fingerprint(json!({"visitorId": "v1"})));
    assert_eq!(resp.status, 200);
    assert!(!delivered.get());
    assert_eq!(ctx.background.len(), 1);

    for task in ctx.background.take() {
        block_on(task);
    }
    assert!(delivered.get());
    assert!(ctx.background.is_empty());
}

#[test]
fn configured_fetch_relay_leaves_one_task_per_ingest() {
    let kv = Rc::new(MemoryKv::new());
    let config = EdgeConfig {
        relay_url: Some("https://relay.example/hook".into()),
        ..Default::default()
    };
    let ctx = EdgeContext::new(config).with_fingerprints(kv.clone());

    send(&ctx, post_fingerprint(json!({"visitorId": "v1"})));
    send(&ctx, post_fingerprint(json!({"visitorId": "v2"})));
    assert_eq!(ctx.background.take().len(), 2);

    let unconfigured = context(&kv);
    send(&unconfigured, post_fingerprint(json!({"visitorId": "v3"})));
    assert!(unconfigured.background.is_empty());
}

// ===== Admin listing =====

fn list_request(query: &str) -> EdgeRequest {
    EdgeRequest::new(
        "GET",
        format!("https://paint.toth.ink/api/fingerprint/list{}", query),
    )
}

#[test]
fn list_without_authorization_reads_nothing() {
    let kv = Rc::new(MemoryKv::new());
    let ctx = context(&kv);

    let resp = send(&ctx, list_request(""));
    assert_eq!(resp.status, 401);
    assert_eq!(resp.json_body().unwrap(), json!({"error": "Unauthorized"}));

    let resp = send(
        &ctx,
        list_request("").with_header("Authorization", "Bearer wrong"),
    );
    assert_eq!(resp.status, 401);
    assert_eq!(kv.reads(), 0);
}

#[test]
fn list_returns_profiles_page_by_page() {
    let kv = Rc::new(MemoryKv::new());
    let ctx = context(&kv);
    for id in ["a", "b", "c"] {
        send(&ctx, post_fingerprint(json!({"visitorId": id})));
    }

    let resp = send(
        &ctx,
        list_request("?limit=2").with_header("Authorization", format!("Bearer {}", SECRET)),
    );
    assert_eq!(resp.status, 200);
    let page = resp.json_body().unwrap();
    assert_eq!(page["count"], 2);
    assert_eq!(page["visitors"][0]["key"], "visitor:a");
    assert_eq!(page["visitors"][1]["key"], "visitor:b");
    assert_eq!(page["visitors"][0]["data"]["visits"].as_array().unwrap().len(), 1);
    assert_eq!(page["hasMore"], true);
    let cursor = page["cursor"].as_str().unwrap().to_string();

    let resp = send(
        &ctx,
        list_request(&format!("?limit=2&cursor={}", cursor))
            .with_header("Authorization", format!("Bearer {}", SECRET)),
    );
    let page = resp.json_body().unwrap();
    assert_eq!(page["count"], 1);
    assert_eq!(page["visitors"][0]["key"], "visitor:c");
    assert_eq!(page["hasMore"], false);
    assert!(page.get("cursor").is_none());
}

#[test]
fn list_by_custom_prefix() {
    let kv = Rc::new(MemoryKv::new());
    let ctx = context(&kv);
    send(&ctx, post_fingerprint(json!({"visitorId": "a"})));

    let resp = send(
        &ctx,
        list_request("?prefix=fp%3A").with_header("Authorization", format!("Bearer {}", SECRET)),
    );
    let page = resp.json_body().unwrap();
    assert_eq!(page["count"], 1);
    assert!(page["visitors"][0]["key"].as_str().unwrap().starts_with("fp:a:"));
    assert_eq!(page["visitors"][0]["data"]["visitorId"], "a");
}

#[test]
fn list_without_namespace_is_500() {
    let ctx = EdgeContext::new(EdgeConfig::default());
    let resp = send(
        &ctx,
        list_request("").with_header("Authorization", format!("Bearer {}", SECRET)),
    );
    assert_eq!(resp.status, 500);
    assert_eq!(resp.json_body().unwrap(), json!({"error": "KV not available"}));
}

#[test]
fn list_honours_configured_secret() {
    let kv = Rc::new(MemoryKv::new());
    let config = EdgeConfig {
        admin_secret: "s3cret".into(),
        ..Default::default()
    };
    let ctx = EdgeContext::new(config).with_fingerprints(kv.clone());

    let default_secret = send(
        &ctx,
        list_request("").with_header("Authorization", "Bearer admin123"),
    );
    assert_eq!(default_secret.status, 401);

    let configured = send(
        &ctx,
        list_request("").with_header("Authorization", "Bearer s3cret"),
    );
    assert_eq!(configured.status, 200);
}

// ===== Site config =====

fn config_context(kv: &Rc<MemoryKv>) -> EdgeContext {
    EdgeContext::new(EdgeConfig::default()).with_site_config(kv.clone())
}

fn put_config(body: &str) -> EdgeRequest {
    EdgeRequest::new("PUT", "https://paint.toth.ink/api/config/update")
        .with_header("Authorization", format!("Bearer {}", SECRET))
        .with_body(body)
}

#[test]
fn config_put_then_get_is_byte_identical() {
    let kv = Rc::new(MemoryKv::new());
    let ctx = config_context(&kv);
    let document = "{ \"site\": {\"name\": \"Paint To Think\"},\n  \"services\": [ ],  \"z\": 1.50 }";

    let resp = send(&ctx, put_config(document));
    assert_eq!(resp.status, 200);
    assert_eq!(
        resp.json_body().unwrap(),
        json!({"success": true, "message": "Config updated successfully"})
    );

    let resp = send(&ctx, EdgeRequest::new("GET", "/api/config/get"));
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body.as_deref(), Some(document));

    // a fresh isolate reads the stored bytes, not a re-serialization
    let cold = config_context(&kv);
    let resp = send(&cold, EdgeRequest::new("GET", "/api/config/get"));
    assert_eq!(resp.body.as_deref(), Some(document));
}

#[test]
fn config_update_from_another_isolate_shows_after_cache_ttl() {
    let kv = Rc::new(MemoryKv::new());
    let clock = Rc::new(ManualClock::new(1_700_000_000_000));
    let isolate_a = config_context(&kv).with_clock(clock.clone());
    let isolate_b = config_context(&kv).with_clock(clock.clone());

    assert_eq!(send(&isolate_b, put_config(r#"{"v":1}"#)).status, 200);
    let warm = send(&isolate_a, EdgeRequest::new("GET", "/api/config/get"));
    assert_eq!(warm.body.as_deref(), Some(r#"{"v":1}"#));

    assert_eq!(send(&isolate_b, put_config(r#"{"v":2}"#)).status, 200);
    clock.advance(CONFIG_CACHE_TTL_MS - 1);
    let cached = send(&isolate_a, EdgeRequest::new("GET", "/api/config/get"));
    assert_eq!(cached.body.as_deref(), Some(r#"{"v":1}"#));

    clock.advance(1);
    let fresh = send(&isolate_a, EdgeRequest::new("GET", "/api/config/get"));
    assert_eq!(fresh.body.as_deref(), Some(r#"{"v":2}"#));
}

#[test]
fn config_get_defaults_when_nothing_stored() {
    let kv = Rc::new(MemoryKv::new());
    let ctx = config_context(&kv);

    let resp = send(&ctx, EdgeRequest::new("GET", "/api/config/get"));
    assert_eq!(resp.status, 200);
    let body = resp.json_body().unwrap();
    assert_eq!(body["site"]["name"], "Paint To Think");
    assert_eq!(body["theme"]["fonts"]["primary"], "Geist");
}

#[test]
fn config_update_requires_secret() {
    let kv = Rc::new(MemoryKv::new());
    let ctx = config_context(&kv);

    let req = EdgeRequest::new("PUT", "/api/config/update").with_body("{}");
    let resp = send(&ctx, req);
    assert_eq!(resp.status, 401);
    assert_eq!(resp.json_body().unwrap(), json!({"error": "Unauthorized"}));
    assert_eq!(kv.writes(), 0);
}

#[test]
fn config_update_rejects_invalid_json() {
    let kv = Rc::new(MemoryKv::new());
    let ctx = config_context(&kv);

    let resp = send(&ctx, put_config("{\"site\":"));
    assert_eq!(resp.status, 500);
    assert_eq!(resp.json_body().unwrap(), json!({"error": "Internal error"}));
    assert_eq!(kv.writes(), 0);
    assert!(ctx.config_cache.get(0).is_none());
}

#[test]
fn config_update_without_namespace_is_500() {
    let ctx = EdgeContext::new(EdgeConfig::default());
    let resp = send(&ctx, put_config("{}"));
    assert_eq!(resp.status, 500);
    assert_eq!(resp.json_body().unwrap(), json!({"error": "KV not available"}));
}

// ===== Methods and preflight =====

#[test]
fn wrong_methods_are_405() {
    let kv = Rc::new(MemoryKv::new());
    let ctx = context(&kv).with_site_config(kv.clone());

    let cases = [
        EdgeRequest::new("GET", "/api/fingerprint"),
        EdgeRequest::new("PUT", "/api/fingerprint"),
        EdgeRequest::new("POST", "/api/fingerprint/list"),
        EdgeRequest::new("POST", "/api/config/get"),
        EdgeRequest::new("GET", "/api/config/update"),
        EdgeRequest::new("GET", "/api/config/delete"),
    ];
    for req in cases {
        let label = format!("{} {}", req.method, req.url);
        let resp = send(&ctx, req);
        assert_eq!(resp.status, 405, "{}", label);
        assert_eq!(
            resp.json_body().unwrap(),
            json!({"error": "Method not allowed"}),
            "{}",
            label
        );
    }
    assert_eq!(kv.reads(), 0);
    assert_eq!(kv.writes(), 0);
}

#[test]
fn preflight_is_empty_with_cors_everywhere() {
    let kv = Rc::new(MemoryKv::new());
    let ctx = context(&kv).with_site_config(kv.clone());

    let expected_methods = [
        ("/api/fingerprint", "POST, OPTIONS"),
        ("/api/fingerprint/list", "GET, OPTIONS"),
        ("/api/config/get", "GET, PUT, OPTIONS"),
        ("/api/config/update", "GET, PUT, OPTIONS"),
        ("/api/config", "GET, OPTIONS"),
    ];
    for (path, methods) in expected_methods {
        let resp = send(&ctx, EdgeRequest::new("OPTIONS", path));
        assert!((200..300).contains(&resp.status), "{}", path);
        assert!(resp.body.is_none(), "{}", path);
        assert_eq!(resp.header("Access-Control-Allow-Origin"), Some("*"), "{}", path);
        assert_eq!(resp.header("Access-Control-Allow-Methods"), Some(methods), "{}", path);
    }

    let list = send(&ctx, EdgeRequest::new("OPTIONS", "/api/fingerprint/list"));
    assert_eq!(
        list.header("Access-Control-Allow-Headers"),
        Some("Content-Type, Authorization")
    );
    assert_eq!(kv.reads(), 0);
}
