// Site configuration: GET /api/config/get, PUT /api/config/update,
// GET /api/config (status)
//
// Reads go cache -> `config` key -> built-in default. Updates are stored
// byte-for-byte as submitted and replace the cached document, so a read after
// an update returns exactly the submitted bytes. A cached document expires
// after `CONFIG_CACHE_TTL_MS`, after which an update made through another
// isolate becomes visible here.

use std::cell::RefCell;

use serde_json::{json, Value};

use super::{auth, EdgeContext, EdgeRequest, EdgeResponse, CONFIG_CORS, STATUS_CORS};
use crate::error::{FingerprintError, Result};
use crate::storage::PutOptions;

/// Key of the site configuration document
pub const CONFIG_KEY: &str = "config";

/// Lifetime of a cached document, matching the store's own propagation
/// window
pub const CONFIG_CACHE_TTL_MS: u64 = 60_000;

/// Cached site configuration document, owned by the edge context
#[derive(Debug, Default)]
pub struct ConfigCache {
    /// Document and the clock reading it was filled at
    document: RefCell<Option<(String, u64)>>,
}

impl ConfigCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached document, unless it was filled `CONFIG_CACHE_TTL_MS` or more
    /// before `now_ms`
    pub fn get(&self, now_ms: u64) -> Option<String> {
        let mut slot = self.document.borrow_mut();
        let fresh = matches!(
            slot.as_ref(),
            Some((_, filled_at)) if now_ms.saturating_sub(*filled_at) < CONFIG_CACHE_TTL_MS
        );
        if !fresh {
            slot.take();
            return None;
        }
        slot.as_ref().map(|(document, _)| document.clone())
    }

    pub fn replace(&self, document: String, now_ms: u64) {
        *self.document.borrow_mut() = Some((document, now_ms));
    }

    pub fn invalidate(&self) {
        self.document.borrow_mut().take();
    }
}

pub(super) async fn handle(ctx: &EdgeContext, req: &EdgeRequest, action: &str) -> EdgeResponse {
    if req.method == "OPTIONS" {
        return EdgeResponse::preflight(&CONFIG_CORS);
    }

    let outcome = match (action, req.method.as_str()) {
        ("get", "GET") => read_config(ctx).await,
        ("update", "PUT") => update_config(ctx, req).await,
        (_, method) => Err(FingerprintError::MethodNotAllowed(method.to_string())),
    };

    match outcome {
        Ok(body) => EdgeResponse::raw_json(200, body, &CONFIG_CORS),
        Err(e) => {
            if e.status() == 500 {
                log::error!("Config API error: {}", e);
            }
            EdgeResponse::error(&e, &CONFIG_CORS)
        }
    }
}

async fn read_config(ctx: &EdgeContext) -> Result<String> {
    if let Some(cached) = ctx.config_cache.get(ctx.clock.now_ms()) {
        return Ok(cached);
    }

    if let Some(kv) = ctx.site_config.as_deref() {
        if let Some(stored) = kv.get(CONFIG_KEY).await? {
            ctx.config_cache.replace(stored.clone(), ctx.clock.now_ms());
            return Ok(stored);
        }
    }

    Ok(default_site_config().to_string())
}

async fn update_config(ctx: &EdgeContext, req: &EdgeRequest) -> Result<String> {
    auth::authorize(req, &ctx.config.admin_secret)?;

    let body = req.body.as_deref().unwrap_or_default();
    serde_json::from_str::<Value>(body)?;

    let kv = ctx
        .site_config
        .as_deref()
        .ok_or(FingerprintError::StorageUnavailable)?;
    kv.put(CONFIG_KEY, body, PutOptions::default()).await?;
    ctx.config_cache.replace(body.to_string(), ctx.clock.now_ms());
    log::info!("Site config updated ({} bytes)", body.len());

    Ok(json!({ "success": true, "message": "Config updated successfully" }).to_string())
}

/// Readiness probe of the config API
pub(super) fn status(ctx: &EdgeContext, req: &EdgeRequest) -> EdgeResponse {
    let response = if req.method == "OPTIONS" {
        EdgeResponse::preflight(&STATUS_CORS)
    } else {
        EdgeResponse::json(
            200,
            &json!({
                "success": true,
                "message": "Config API ready",
                "timestamp": ctx.clock.now_ms(),
            }),
            &STATUS_CORS,
        )
    };
    response
        .with_header("Cache-Control", "public, max-age=300, s-maxage=3600")
        .with_header("X-Content-Type-Options", "nosniff")
}

/// Configuration served before any update has been stored
pub fn default_site_config() -> Value {
    json!({
        "site": {
            "name": "Paint To Think",
            "tagline": "Commercial & Residential Construction",
            "tag": "Portland, Oregon",
            "description": "Commercial and residential construction company based in Portland, Oregon with over 30 years of experience",
            "email": "da@paint.toth.ink",
            "phone": "(503) 998-9294",
            "address": "Portland, Oregon",
            "copyright": "© Paint To Think, 2000"
        },
        "navigation": {
            "main": [
                { "label": "Home", "href": "/", "icon": "home" },
                { "label": "About", "href": "/about", "icon": "info" },
                { "label": "Services", "href": "/services", "icon": "briefcase" },
                { "label": "Contact", "href": "/contact", "icon": "mail" }
            ]
        },
        "services": [
            {
                "id": "service-1",
                "title": "Framing",
                "description": "Structural framing services",
                "image": "/img/framing.jpg",
                "details": "Expert structural framing for residential and commercial projects"
            },
            {
                "id": "service-2",
                "title": "Windows & Doors",
                "description": "Installation and replacement",
                "image": "/img/windows.jpg",
                "details": "Professional installation and Portland's favorite window vendors"
            },
            {
                "id": "service-3",
                "title": "Decks & Outdoor",
                "description": "Refined deck designs for those long rain and hot seasons",
                "image": "/img/decks.jpg",
                "details": "Beautiful custom decks and outdoor living spaces"
            },
            {
                "id": "service-4",
                "title": "Drywall & Finishing",
                "description": "Interior wall services",
                "image": "/img/drywall.jpg",
                "details": "Professional drywall installation and finishing"
            },
            {
                "id": "service-5",
                "title": "Commercial Construction",
                "description": "Commercial construction for all building types",
                "image": "/img/hood.jpg",
                "details": "Commercial build out and renovation including retail, office, restuarants, and grow operations"
            },
            {
                "id": "service-6",
                "title": "Commercial Maintenaince",
                "description": "Routine maintenance services for commercial properties",
                "image": "/img/services.jpg",
                "details": "Dedicated services for maintaining properties including retirement homes, apartments, and retail stores."
            }
        ],
        "about": {
            "content": "Paint To Think is a commercial and residential construction company based in Portland, Oregon with over 30 years of experience. We specialize in residential remodels, commercial builds, and maintenance services.",
            "experience": "30+ years",
            "projects": "500+",
            "services": [
                "Roofing",
                "Siding",
                "Windows & Doors",
                "Kitchen Remodeling",
                "Bathroom Remodeling",
                "Additions",
                "Decks & Outdoor Spaces",
                "Commercial Construction",
                "Restaurant Build-outs",
                "Office Renovations",
                "Maintenance Services",
                "Large Grow Ops"
            ]
        },
        "theme": {
            "colors": {
                "primary": "#111111",
                "secondary": "#666666",
                "accent": "#0066cc"
            },
            "fonts": {
                "primary": "Geist"
            }
        }
    })
}
