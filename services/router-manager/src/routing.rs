//! Pass-through to the external routing-evaluation service.

use sea_orm::DatabaseConnection;
use serde::Deserialize;
use serde_json::Value;
use shared::router_client::{self, DEFAULT_TOP_K};
use tracing::info;
use uuid::Uuid;

use crate::caller::Caller;
use crate::error::{OpsError, Result};
use crate::tenants::require_tenant;

#[derive(Debug, Clone, Deserialize)]
pub struct RoutingTest {
    pub prompt: String,
    pub top_k: Option<u32>,
}

pub async fn test_prompt_routing(
    db: &DatabaseConnection,
    http: &reqwest::Client,
    router_api_url: &str,
    caller: &Caller,
    tenant_id: Uuid,
    input: RoutingTest,
) -> Result<Value> {
    let prompt = input.prompt.trim();
    if prompt.is_empty() {
        return Err(OpsError::Validation("prompt text required".into()));
    }
    let top_k = input.top_k.unwrap_or(DEFAULT_TOP_K).max(1);
    require_tenant(db, tenant_id).await?;

    info!(%tenant_id, top_k, user = %caller.user_id, "testing prompt routing");
    Ok(router_client::test_prompt(http, router_api_url, &tenant_id.to_string(), prompt, top_k).await?)
}
