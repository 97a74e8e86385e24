//! REST surface for the router provisioning operations.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::caller::Caller;
use crate::categories::{self, NewCategory};
use crate::centroids::{self, BackfillReport, CentroidInput, CentroidSummary};
use crate::error::OpsError;
use crate::links::{self, LinkInput, LinkedCentroid, LinkedPrompt};
use crate::model::{category, centroid, prompt, prompt_centroid, tenant};
use crate::model_sync::{self, SyncReport};
use crate::prompts::{self, CreatedPrompt, NewPrompt, Page, PromptQuery};
use crate::provisioning::{self, ProvisioningPolicy, SweepReport};
use crate::routing::{self, RoutingTest};
use crate::tenants;

pub struct AppState {
    pub db: DatabaseConnection,
    pub http: reqwest::Client,
    pub router_api_url: String,
    pub policy: ProvisioningPolicy,
}

type ApiResult<T> = Result<Json<T>, OpsError>;

/// Simple liveness endpoint for orchestration.
async fn health() -> &'static str {
    "OK"
}

/* ---------------- DTOs ---------------- */

#[derive(Deserialize)]
struct TenantInput {
    name: String,
}

#[derive(Deserialize, Default)]
struct EnsureCategoryInput {
    name: Option<String>,
}

#[derive(Deserialize)]
struct DeletePromptsInput {
    ids: Vec<Uuid>,
}

#[derive(Serialize)]
struct Deleted {
    deleted: u64,
}

#[derive(Serialize)]
struct ModelSyncResult {
    slug: String,
    linked: u64,
}

/* ---------------- Tenants ---------------- */

async fn list_tenants(State(state): State<Arc<AppState>>, _caller: Caller) -> ApiResult<Vec<tenant::Model>> {
    Ok(Json(tenants::list_tenants(&state.db).await?))
}

async fn create_tenant(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(input): Json<TenantInput>,
) -> ApiResult<tenant::Model> {
    Ok(Json(tenants::create_tenant(&state.db, &caller, &input.name).await?))
}

/* ---------------- Categories ---------------- */

async fn list_categories(State(state): State<Arc<AppState>>, _caller: Caller) -> ApiResult<Vec<category::Model>> {
    Ok(Json(categories::get_categories(&state.db).await?))
}

async fn create_category(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(input): Json<NewCategory>,
) -> Result<(StatusCode, Json<category::Model>), OpsError> {
    let created = categories::create_category(&state.db, &caller, input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn ensure_category(
    Path(slug): Path<String>,
    State(state): State<Arc<AppState>>,
    caller: Caller,
    input: Option<Json<EnsureCategoryInput>>,
) -> ApiResult<category::Model> {
    let input = input.map(|Json(i)| i).unwrap_or_default();
    Ok(Json(
        categories::ensure_category(&state.db, &caller, &slug, input.name.as_deref()).await?,
    ))
}

async fn sync_category_models(
    Path(slug): Path<String>,
    State(state): State<Arc<AppState>>,
    _caller: Caller,
) -> ApiResult<ModelSyncResult> {
    let linked = model_sync::sync_category_to_models(&state.db, &slug).await;
    Ok(Json(ModelSyncResult { slug, linked }))
}

/* ---------------- Centroids ---------------- */

async fn list_centroids(
    Path(tenant_id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
    _caller: Caller,
) -> ApiResult<Vec<CentroidSummary>> {
    Ok(Json(centroids::list_centroids(&state.db, tenant_id).await?))
}

async fn get_centroid(
    Path((tenant_id, centroid_id)): Path<(Uuid, Uuid)>,
    State(state): State<Arc<AppState>>,
    _caller: Caller,
) -> ApiResult<centroid::Model> {
    tenants::require_tenant(&state.db, tenant_id).await?;
    Ok(Json(centroids::get_centroid(&state.db, tenant_id, centroid_id).await?))
}

async fn delete_centroid(
    Path((tenant_id, centroid_id)): Path<(Uuid, Uuid)>,
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<StatusCode, OpsError> {
    centroids::delete_centroid(&state.db, &caller, tenant_id, centroid_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn centroid_prompts(
    Path((tenant_id, centroid_id)): Path<(Uuid, Uuid)>,
    State(state): State<Arc<AppState>>,
    _caller: Caller,
) -> ApiResult<Vec<LinkedPrompt>> {
    Ok(Json(links::list_centroid_prompts(&state.db, tenant_id, centroid_id).await?))
}

async fn upsert_centroid(
    Path((tenant_id, family)): Path<(Uuid, String)>,
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(input): Json<CentroidInput>,
) -> ApiResult<centroid::Model> {
    Ok(Json(
        centroids::upsert_centroid(&state.db, &caller, tenant_id, &family, input).await?,
    ))
}

async fn backfill_centroids(
    Path(tenant_id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> ApiResult<BackfillReport> {
    Ok(Json(
        centroids::create_missing_centroids_for_categories(&state.db, &caller, tenant_id).await?,
    ))
}

/* ---------------- Prompts ---------------- */

async fn list_prompts(
    Path(tenant_id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
    _caller: Caller,
    Query(query): Query<PromptQuery>,
) -> ApiResult<Page<prompt::Model>> {
    Ok(Json(prompts::list_prompts(&state.db, tenant_id, query).await?))
}

async fn create_prompt(
    Path(tenant_id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(input): Json<NewPrompt>,
) -> Result<(StatusCode, Json<CreatedPrompt>), OpsError> {
    let created = prompts::create_prompt(&state.db, &caller, tenant_id, input, state.policy).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn delete_prompts(
    Path(tenant_id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(input): Json<DeletePromptsInput>,
) -> ApiResult<Deleted> {
    let deleted = prompts::delete_prompts(&state.db, &caller, tenant_id, &input.ids).await?;
    Ok(Json(Deleted { deleted }))
}

async fn delete_prompt(
    Path((tenant_id, prompt_id)): Path<(Uuid, Uuid)>,
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<StatusCode, OpsError> {
    prompts::delete_prompt(&state.db, &caller, tenant_id, prompt_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn prompt_links(
    Path((tenant_id, prompt_id)): Path<(Uuid, Uuid)>,
    State(state): State<Arc<AppState>>,
    _caller: Caller,
) -> ApiResult<Vec<LinkedCentroid>> {
    Ok(Json(links::list_prompt_links(&state.db, tenant_id, prompt_id).await?))
}

async fn auto_link(
    Path(tenant_id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> ApiResult<SweepReport> {
    Ok(Json(
        provisioning::auto_link_existing_prompts(&state.db, &caller, tenant_id, state.policy).await?,
    ))
}

/* ---------------- Links ---------------- */

async fn link_prompt(
    Path(tenant_id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(input): Json<LinkInput>,
) -> ApiResult<prompt_centroid::Model> {
    Ok(Json(links::link_prompt(&state.db, &caller, tenant_id, input).await?))
}

async fn unlink_prompt(
    Path((tenant_id, link_id)): Path<(Uuid, Uuid)>,
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> ApiResult<prompt_centroid::Model> {
    Ok(Json(links::unlink_prompt(&state.db, &caller, tenant_id, link_id).await?))
}

/* ---------------- Models & router ---------------- */

async fn sync_models(
    Path(tenant_id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> ApiResult<SyncReport> {
    Ok(Json(
        model_sync::sync_all_models_to_categories(&state.db, &caller, tenant_id, state.policy).await?,
    ))
}

async fn test_routing(
    Path(tenant_id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(input): Json<RoutingTest>,
) -> ApiResult<Value> {
    Ok(Json(
        routing::test_prompt_routing(&state.db, &state.http, &state.router_api_url, &caller, tenant_id, input).await?,
    ))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/tenants", get(list_tenants).post(create_tenant))
        .route("/categories", get(list_categories).post(create_category))
        .route("/categories/:slug", put(ensure_category))
        .route("/categories/:slug/sync-models", post(sync_category_models))
        .route("/tenants/:tenant_id/centroids", get(list_centroids))
        .route(
            "/tenants/:tenant_id/centroids/:centroid_id",
            get(get_centroid).delete(delete_centroid),
        )
        .route("/tenants/:tenant_id/centroids/:centroid_id/prompts", get(centroid_prompts))
        .route("/tenants/:tenant_id/families/:family", put(upsert_centroid))
        .route("/tenants/:tenant_id/centroid-backfill", post(backfill_centroids))
        .route(
            "/tenants/:tenant_id/prompts",
            get(list_prompts).post(create_prompt).delete(delete_prompts),
        )
        .route("/tenants/:tenant_id/prompts/:prompt_id", delete(delete_prompt))
        .route("/tenants/:tenant_id/prompts/:prompt_id/links", get(prompt_links))
        .route("/tenants/:tenant_id/auto-link", post(auto_link))
        .route("/tenants/:tenant_id/links", post(link_prompt))
        .route("/tenants/:tenant_id/links/:link_id", delete(unlink_prompt))
        .route("/tenants/:tenant_id/models/sync", post(sync_models))
        .route("/tenants/:tenant_id/router/test", post(test_routing))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::Utc;
    use sea_orm::{DbBackend, MockDatabase};
    use serde_json::json;
    use tower::ServiceExt;

    fn state(db: DatabaseConnection) -> Arc<AppState> {
        Arc::new(AppState {
            db,
            http: reqwest::Client::new(),
            router_api_url: "http://router.invalid".into(),
            policy: ProvisioningPolicy::default(),
        })
    }

    #[tokio::test]
    async fn health_ok() {
        let app = router(state(MockDatabase::new(DbBackend::Postgres).into_connection()));
        let res = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(res.status().is_success());
    }

    #[tokio::test]
    async fn missing_identity_is_rejected_before_any_query() {
        let app = router(state(MockDatabase::new(DbBackend::Postgres).into_connection()));
        let res = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/tenants/{}/prompts", Uuid::new_v4()))
                    .header("content-type", "application/json")
                    .body(Body::from(json!({"prompt": "x", "category": "pii"}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn categories_are_listed_for_identified_callers() {
        let now = Utc::now();
        let db = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([[category::Model {
                id: Uuid::new_v4(),
                slug: "jailbreak".into(),
                name: "Jailbreak".into(),
                description: None,
                severity: "high".into(),
                tier_recommendation: "T2".into(),
                color: "red".into(),
                metadata: json!({}),
                created_at: now,
                updated_at: now,
            }]])
            .into_connection();
        let app = router(state(db));
        let res = app
            .oneshot(
                Request::builder()
                    .uri("/categories")
                    .header("x-user-id", "admin")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_tenant_is_not_found() {
        let db = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([Vec::<tenant::Model>::new()])
            .into_connection();
        let app = router(state(db));
        let res = app
            .oneshot(
                Request::builder()
                    .uri(format!("/tenants/{}/centroids", Uuid::new_v4()))
                    .header("x-user-id", "admin")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
