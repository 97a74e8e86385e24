//! Example prompts used to seed and exercise the router.

use chrono::Utc;
use sea_orm::sea_query::{Expr, Func, LikeExpr};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::caller::Caller;
use crate::categories::normalize_slug;
use crate::error::{OpsError, Result};
use crate::model::{centroid, prompt, prompt_centroid};
use crate::model_sync;
use crate::provisioning::{self, ProvisioningPolicy};
use crate::tenants::require_tenant;

pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const MAX_PAGE_SIZE: u64 = 100;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PromptQuery {
    pub q: Option<String>,
    pub category: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: u64,
    pub total_pages: u64,
    pub page: u64,
    pub limit: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPrompt {
    pub prompt: String,
    pub category: Option<String>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedPrompt {
    #[serde(flatten)]
    pub prompt: prompt::Model,
    /// Centroid the prompt was auto-linked to, if any.
    pub centroid: Option<centroid::Model>,
    pub link: Option<prompt_centroid::Model>,
}

pub async fn get_prompt<C: ConnectionTrait>(db: &C, tenant_id: Uuid, prompt_id: Uuid) -> Result<prompt::Model> {
    prompt::Entity::find_by_id(prompt_id)
        .filter(prompt::Column::TenantId.eq(tenant_id))
        .one(db)
        .await?
        .ok_or_else(|| OpsError::NotFound(format!("prompt {prompt_id} not found")))
}

/// Makes `%`, `_` and the escape character itself match literally.
fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Offset pagination with optional case-insensitive text search and exact category match.
pub async fn list_prompts(db: &DatabaseConnection, tenant_id: Uuid, query: PromptQuery) -> Result<Page<prompt::Model>> {
    require_tenant(db, tenant_id).await?;

    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = (page - 1)
        .checked_mul(limit)
        .filter(|offset| i64::try_from(*offset).is_ok())
        .ok_or_else(|| OpsError::Validation(format!("page {page} is out of range")))?;

    let mut select = prompt::Entity::find().filter(prompt::Column::TenantId.eq(tenant_id));
    if let Some(q) = query.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        select = select.filter(
            Expr::expr(Func::lower(Expr::col(prompt::Column::Prompt)))
                .like(LikeExpr::new(format!("%{}%", escape_like(&q.to_lowercase()))).escape('\\')),
        );
    }
    if let Some(category) = query.category.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        select = select.filter(prompt::Column::Category.eq(category.to_lowercase()));
    }

    let total = select.clone().count(db).await?;
    let data = select
        .order_by_desc(prompt::Column::CreatedAt)
        .order_by_asc(prompt::Column::Id)
        .offset(offset)
        .limit(limit)
        .all(db)
        .await?;

    Ok(Page {
        data,
        total,
        total_pages: total.div_ceil(limit),
        page,
        limit,
    })
}

/// Stores a prompt; a categorized prompt is auto-linked in the same transaction.
pub async fn create_prompt(
    db: &DatabaseConnection,
    caller: &Caller,
    tenant_id: Uuid,
    input: NewPrompt,
    policy: ProvisioningPolicy,
) -> Result<CreatedPrompt> {
    let text = input.prompt.trim();
    if text.is_empty() {
        return Err(OpsError::Validation("prompt text required".into()));
    }
    let category = match input.category.as_deref().map(str::trim) {
        Some(label) if !label.is_empty() => Some(normalize_slug(label)?),
        _ => None,
    };

    let txn = db.begin().await?;
    require_tenant(&txn, tenant_id).await?;

    let model = prompt::ActiveModel {
        id: Set(Uuid::new_v4()),
        tenant_id: Set(tenant_id),
        prompt: Set(text.to_string()),
        category: Set(category),
        is_active: Set(true),
        metadata: Set(input.metadata.unwrap_or_else(|| json!({}))),
        created_by: Set(caller.user_id.clone()),
        created_at: Set(Utc::now()),
    };
    let prompt = model.insert(&txn).await?;
    let auto = provisioning::auto_link_prompt_in(&txn, caller, tenant_id, &prompt, policy).await?;
    txn.commit().await?;

    info!(%tenant_id, prompt_id = %prompt.id, category = ?prompt.category, "prompt created");
    if auto.category_created {
        if let Some(centroid) = &auto.centroid {
            model_sync::sync_category_to_models(db, &centroid.family).await;
        }
    }

    Ok(CreatedPrompt {
        prompt,
        centroid: auto.centroid,
        link: auto.link,
    })
}

/// Hard delete of a single prompt.
pub async fn delete_prompt(db: &DatabaseConnection, caller: &Caller, tenant_id: Uuid, prompt_id: Uuid) -> Result<()> {
    if delete_prompts(db, caller, tenant_id, &[prompt_id]).await? == 0 {
        return Err(OpsError::NotFound(format!("prompt {prompt_id} not found")));
    }
    Ok(())
}

/// Hard delete by id list; links of the deleted prompts are deactivated.
pub async fn delete_prompts(db: &DatabaseConnection, caller: &Caller, tenant_id: Uuid, ids: &[Uuid]) -> Result<u64> {
    if ids.is_empty() {
        return Ok(0);
    }

    let txn = db.begin().await?;
    require_tenant(&txn, tenant_id).await?;

    prompt_centroid::Entity::update_many()
        .col_expr(prompt_centroid::Column::IsActive, Expr::value(false))
        .filter(prompt_centroid::Column::TenantId.eq(tenant_id))
        .filter(prompt_centroid::Column::PromptId.is_in(ids.iter().copied()))
        .exec(&txn)
        .await?;
    let res = prompt::Entity::delete_many()
        .filter(prompt::Column::TenantId.eq(tenant_id))
        .filter(prompt::Column::Id.is_in(ids.iter().copied()))
        .exec(&txn)
        .await?;
    txn.commit().await?;

    info!(%tenant_id, deleted = res.rows_affected, user = %caller.user_id, "prompts deleted");
    Ok(res.rows_affected)
}
