//! Prompt to centroid associations.
//!
//! `(prompt_id, centroid_id)` is unique in storage. Removing a link only
//! flips `is_active`; the row stays for history.

use chrono::Utc;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, TransactionTrait};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::caller::Caller;
use crate::centroids::get_centroid;
use crate::error::{OpsError, Result};
use crate::model::{centroid, prompt, prompt_centroid};
use crate::prompts::get_prompt;
use crate::tenants::require_tenant;

pub const DEFAULT_WEIGHT: f64 = 1.0;

#[derive(Debug, Clone, Deserialize)]
pub struct LinkInput {
    pub prompt_id: Uuid,
    pub centroid_id: Uuid,
    pub weight: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkedPrompt {
    pub link_id: Uuid,
    pub weight: f64,
    pub prompt: prompt::Model,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkedCentroid {
    pub link_id: Uuid,
    pub weight: f64,
    pub centroid: centroid::Model,
}

fn new_link(caller: &Caller, tenant_id: Uuid, prompt_id: Uuid, centroid_id: Uuid, weight: f64) -> prompt_centroid::ActiveModel {
    prompt_centroid::ActiveModel {
        id: Set(Uuid::new_v4()),
        tenant_id: Set(tenant_id),
        prompt_id: Set(prompt_id),
        centroid_id: Set(centroid_id),
        weight: Set(weight),
        is_active: Set(true),
        created_by: Set(caller.user_id.clone()),
        created_at: Set(Utc::now()),
    }
}

async fn find_pair<C: ConnectionTrait>(db: &C, prompt_id: Uuid, centroid_id: Uuid) -> Result<prompt_centroid::Model> {
    prompt_centroid::Entity::find()
        .filter(prompt_centroid::Column::PromptId.eq(prompt_id))
        .filter(prompt_centroid::Column::CentroidId.eq(centroid_id))
        .one(db)
        .await?
        .ok_or_else(|| OpsError::NotFound(format!("link {prompt_id}/{centroid_id} not found")))
}

/// Inserts an active link with the default weight unless the pair already
/// has a row, active or not. Returns whether a row was inserted.
pub async fn insert_link_if_missing<C: ConnectionTrait>(
    db: &C,
    caller: &Caller,
    tenant_id: Uuid,
    prompt_id: Uuid,
    centroid_id: Uuid,
) -> Result<bool> {
    let inserted = prompt_centroid::Entity::insert(new_link(caller, tenant_id, prompt_id, centroid_id, DEFAULT_WEIGHT))
        .on_conflict(
            OnConflict::columns([prompt_centroid::Column::PromptId, prompt_centroid::Column::CentroidId])
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;
    Ok(inserted > 0)
}

/// Links a prompt to a centroid, or re-weights and reactivates an existing link.
pub async fn link_prompt(db: &DatabaseConnection, caller: &Caller, tenant_id: Uuid, input: LinkInput) -> Result<prompt_centroid::Model> {
    let weight = input.weight.unwrap_or(DEFAULT_WEIGHT);
    if !(weight > 0.0 && weight.is_finite()) {
        return Err(OpsError::Validation("weight must be > 0".into()));
    }

    let txn = db.begin().await?;
    require_tenant(&txn, tenant_id).await?;
    get_prompt(&txn, tenant_id, input.prompt_id).await?;
    get_centroid(&txn, tenant_id, input.centroid_id).await?;

    prompt_centroid::Entity::insert(new_link(caller, tenant_id, input.prompt_id, input.centroid_id, weight))
        .on_conflict(
            OnConflict::columns([prompt_centroid::Column::PromptId, prompt_centroid::Column::CentroidId])
                .update_columns([prompt_centroid::Column::Weight, prompt_centroid::Column::IsActive])
                .to_owned(),
        )
        .exec_without_returning(&txn)
        .await?;
    let link = find_pair(&txn, input.prompt_id, input.centroid_id).await?;
    txn.commit().await?;

    info!(%tenant_id, link_id = %link.id, weight, user = %caller.user_id, "prompt linked");
    Ok(link)
}

/// Soft delete: the row is kept with `is_active = false`.
pub async fn unlink_prompt(db: &DatabaseConnection, caller: &Caller, tenant_id: Uuid, link_id: Uuid) -> Result<prompt_centroid::Model> {
    require_tenant(db, tenant_id).await?;

    let res = prompt_centroid::Entity::update_many()
        .col_expr(prompt_centroid::Column::IsActive, Expr::value(false))
        .filter(prompt_centroid::Column::Id.eq(link_id))
        .filter(prompt_centroid::Column::TenantId.eq(tenant_id))
        .exec(db)
        .await?;
    if res.rows_affected == 0 {
        return Err(OpsError::NotFound(format!("link {link_id} not found")));
    }

    info!(%tenant_id, %link_id, user = %caller.user_id, "prompt unlinked");
    prompt_centroid::Entity::find_by_id(link_id)
        .one(db)
        .await?
        .ok_or_else(|| OpsError::NotFound(format!("link {link_id} not found")))
}

/// Prompts actively linked to a centroid.
pub async fn list_centroid_prompts(db: &DatabaseConnection, tenant_id: Uuid, centroid_id: Uuid) -> Result<Vec<LinkedPrompt>> {
    require_tenant(db, tenant_id).await?;
    get_centroid(db, tenant_id, centroid_id).await?;

    let links = prompt_centroid::Entity::find()
        .filter(prompt_centroid::Column::CentroidId.eq(centroid_id))
        .filter(prompt_centroid::Column::IsActive.eq(true))
        .all(db)
        .await?;
    if links.is_empty() {
        return Ok(Vec::new());
    }

    let mut prompts: std::collections::HashMap<Uuid, prompt::Model> = prompt::Entity::find()
        .filter(prompt::Column::TenantId.eq(tenant_id))
        .filter(prompt::Column::Id.is_in(links.iter().map(|l| l.prompt_id)))
        .all(db)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    Ok(links
        .into_iter()
        .filter_map(|link| {
            prompts.remove(&link.prompt_id).map(|prompt| LinkedPrompt {
                link_id: link.id,
                weight: link.weight,
                prompt,
            })
        })
        .collect())
}

/// Centroids a prompt is actively linked to.
pub async fn list_prompt_links(db: &DatabaseConnection, tenant_id: Uuid, prompt_id: Uuid) -> Result<Vec<LinkedCentroid>> {
    require_tenant(db, tenant_id).await?;
    get_prompt(db, tenant_id, prompt_id).await?;

    let links = prompt_centroid::Entity::find()
        .filter(prompt_centroid::Column::PromptId.eq(prompt_id))
        .filter(prompt_centroid::Column::IsActive.eq(true))
        .all(db)
        .await?;
    if links.is_empty() {
        return Ok(Vec::new());
    }

    let mut centroids: std::collections::HashMap<Uuid, centroid::Model> = centroid::Entity::find()
        .filter(centroid::Column::TenantId.eq(tenant_id))
        .filter(centroid::Column::Id.is_in(links.iter().map(|l| l.centroid_id)))
        .all(db)
        .await?
        .into_iter()
        .map(|c| (c.id, c))
        .collect();

    Ok(links
        .into_iter()
        .filter_map(|link| {
            centroids.remove(&link.centroid_id).map(|centroid| LinkedCentroid {
                link_id: link.id,
                weight: link.weight,
                centroid,
            })
        })
        .collect())
}
