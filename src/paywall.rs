// src/paywall.rs
use crate::auth;
use crate::billing::{BillingError, SubscriptionSync};
use crate::config::Config;
use crate::entitlement::EntitlementContext;
use crate::error::AppError;
use crate::gate;
use crate::models::SearchRequest;
use crate::search::SearchService;
use crate::store::EntitlementStore;
use crate::tier::Tier;
use crate::usage::{self, Quota, Reservation};
use actix_web::{HttpRequest, HttpResponse, get, post, web};
use chrono::Utc;
use serde_json::json;

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| AppError::BadRequest(err.to_string()).into()),
    );
    cfg.service(health);
    cfg.service(list_tiers);
    cfg.service(get_entitlement);
    cfg.service(check_access);
    cfg.service(check_gate);
    cfg.service(sync_subscription);
    cfg.service(run_search);
}

/// Builds the caller's entitlement context for this request.
async fn load_context(
    req: &HttpRequest,
    config: &Config,
    store: &dyn EntitlementStore,
) -> EntitlementContext {
    let user = auth::get_user_from_request(req, config);
    EntitlementContext::load(store, user, Utc::now().date_naive()).await
}

fn parse_tier(raw: &str) -> Result<Tier, AppError> {
    raw.parse::<Tier>()
        .map_err(|e| AppError::BadRequest(e.to_string()))
}

fn quota_exceeded(tier: Tier, quota: Quota) -> AppError {
    AppError::QuotaExceeded {
        quota,
        upgrade: gate::upgrade_path(tier).map(gate::offer_for),
    }
}

fn entitlement_body(ctx: &EntitlementContext) -> serde_json::Value {
    json!({
        "entitlement": ctx,
        "sign_in_required": ctx.user().is_none(),
        "can_search": ctx.can_search(),
    })
}

#[get("/health")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({"status": "ok"}))
}

#[get("/tiers")]
pub async fn list_tiers() -> HttpResponse {
    HttpResponse::Ok().json(gate::catalog())
}

#[get("/entitlement")]
pub async fn get_entitlement(
    store: web::Data<dyn EntitlementStore>,
    config: web::Data<Config>,
    req: HttpRequest,
) -> HttpResponse {
    let ctx = load_context(&req, &config, store.get_ref()).await;
    HttpResponse::Ok().json(entitlement_body(&ctx))
}

#[get("/entitlement/access/{tier}")]
pub async fn check_access(
    store: web::Data<dyn EntitlementStore>,
    config: web::Data<Config>,
    req: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let required = parse_tier(&path.into_inner())?;
    let ctx = load_context(&req, &config, store.get_ref()).await;

    Ok(HttpResponse::Ok().json(json!({
        "required": required,
        "tier": ctx.tier(),
        "has_access": ctx.has_feature_access(required),
        "sign_in_required": ctx.user().is_none(),
    })))
}

#[get("/gate/{tier}")]
pub async fn check_gate(
    store: web::Data<dyn EntitlementStore>,
    config: web::Data<Config>,
    req: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let required = parse_tier(&path.into_inner())?;
    let ctx = load_context(&req, &config, store.get_ref()).await;
    Ok(HttpResponse::Ok().json(gate::gate(required, &ctx)))
}

#[post("/subscription/sync")]
pub async fn sync_subscription(
    store: web::Data<dyn EntitlementStore>,
    sync: web::Data<SubscriptionSync>,
    config: web::Data<Config>,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    let user = auth::get_user_from_request(&req, &config).ok_or(AppError::Unauthorized)?;

    // The stored subscription stays authoritative when the provider is unreachable.
    let synced = match sync.sync(store.get_ref(), &user).await {
        Ok(_) => true,
        Err(BillingError::NotConfigured) => {
            tracing::debug!("Subscription sync skipped, no payment provider configured");
            false
        }
        Err(e) => {
            tracing::error!("Subscription sync failed for user {}: {}", user.id, e);
            false
        }
    };

    let ctx = EntitlementContext::load(store.get_ref(), Some(user), Utc::now().date_naive()).await;
    let mut body = entitlement_body(&ctx);
    body["synced"] = json!(synced);
    Ok(HttpResponse::Ok().json(body))
}

#[post("/search")]
pub async fn run_search(
    store: web::Data<dyn EntitlementStore>,
    service: web::Data<SearchService>,
    config: web::Data<Config>,
    req: HttpRequest,
    body: web::Json<SearchRequest>,
) -> Result<HttpResponse, AppError> {
    let query = body
        .query
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing search query".to_string()))?
        .to_string();

    let today = Utc::now().date_naive();
    let user = auth::get_user_from_request(&req, &config);
    let ctx = EntitlementContext::load(store.get_ref(), user, today).await;
    let EntitlementContext::Authenticated {
        user, tier, quota, ..
    } = ctx
    else {
        return Err(AppError::Unauthorized);
    };

    // Cheap early exit; the reservation below is what enforces the limit.
    if !quota.can_search() {
        return Err(quota_exceeded(tier, quota));
    }

    let (mut quota, held) =
        match usage::reserve_search(store.get_ref(), user.id, tier, today).await {
            Ok(Reservation::Granted(after)) => (after, true),
            Ok(Reservation::Exhausted(after)) => return Err(quota_exceeded(tier, after)),
            Ok(Reservation::Unmetered) => (Quota::Unlimited, false),
            Err(e) => {
                tracing::warn!("Failed to record search for user {}: {}", user.id, e);
                (quota, false)
            }
        };

    let max = config.search_result_limit.max(1);
    let limit = body.limit.unwrap_or(max).clamp(1, max);
    let outcome = service.search(&query, limit).await;

    // An outage of every source does not cost the user a search.
    if held && outcome.all_failed() {
        match usage::release_search(store.get_ref(), user.id, tier, today).await {
            Ok(Some(count)) => quota = usage::remaining(tier, count, count),
            Ok(None) => {}
            Err(e) => tracing::warn!("Failed to release search for user {}: {}", user.id, e),
        }
    }

    tracing::info!(
        "Search by {} ({}) returned {} papers",
        user.id,
        tier,
        outcome.papers.len()
    );

    Ok(HttpResponse::Ok().json(json!({
        "query": query,
        "tier": tier,
        "quota": quota,
        "results": outcome.papers,
        "failed_sources": outcome.failed_sources,
    })))
}
