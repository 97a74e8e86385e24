//! Per-tenant centroid store.
//!
//! A centroid belongs to exactly one category through `family == slug`. The
//! pair `(tenant_id, family)` is unique, so writes are upserts on that key.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::caller::Caller;
use crate::categories::{self, normalize_slug};
use crate::error::{OpsError, Result};
use crate::model::{centroid, prompt_centroid};
use crate::model_sync;
use crate::tenants::require_tenant;

/// Similarity cutoff for centroids created without an explicit threshold.
pub const DEFAULT_THRESHOLD: f64 = 0.3;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CentroidInput {
    pub centroid: Option<Vec<f32>>,
    pub threshold: Option<f64>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CentroidSummary {
    #[serde(flatten)]
    pub centroid: centroid::Model,
    pub prompt_count: i64,
}

#[derive(Debug, Clone)]
pub struct CentroidUpsert {
    pub centroid: centroid::Model,
    /// The family's category did not exist before this upsert.
    pub category_created: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackfillReport {
    pub created: usize,
    pub centroids: Vec<centroid::Model>,
}

fn validate_threshold(threshold: f64) -> Result<f64> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(OpsError::Validation("threshold must be between 0 and 1".into()));
    }
    Ok(threshold)
}

/// Decodes the stored embedding back into floats.
pub fn decode_vector(model: &centroid::Model) -> Option<Vec<f32>> {
    model
        .centroid
        .as_deref()
        .and_then(|raw| serde_json::from_str(raw).ok())
}

pub async fn find_active<C: ConnectionTrait>(db: &C, tenant_id: Uuid, family: &str) -> Result<Option<centroid::Model>> {
    Ok(centroid::Entity::find()
        .filter(centroid::Column::TenantId.eq(tenant_id))
        .filter(centroid::Column::Family.eq(family))
        .filter(centroid::Column::IsActive.eq(true))
        .one(db)
        .await?)
}

async fn find_by_family<C: ConnectionTrait>(db: &C, tenant_id: Uuid, family: &str) -> Result<centroid::Model> {
    centroid::Entity::find()
        .filter(centroid::Column::TenantId.eq(tenant_id))
        .filter(centroid::Column::Family.eq(family))
        .one(db)
        .await?
        .ok_or_else(|| OpsError::NotFound(format!("centroid {family} not found")))
}

pub async fn get_centroid<C: ConnectionTrait>(db: &C, tenant_id: Uuid, centroid_id: Uuid) -> Result<centroid::Model> {
    centroid::Entity::find_by_id(centroid_id)
        .filter(centroid::Column::TenantId.eq(tenant_id))
        .one(db)
        .await?
        .ok_or_else(|| OpsError::NotFound(format!("centroid {centroid_id} not found")))
}

/// Centroids of a tenant with their number of active prompt links.
pub async fn list_centroids(db: &DatabaseConnection, tenant_id: Uuid) -> Result<Vec<CentroidSummary>> {
    require_tenant(db, tenant_id).await?;

    let centroids = centroid::Entity::find()
        .filter(centroid::Column::TenantId.eq(tenant_id))
        .order_by_asc(centroid::Column::Family)
        .all(db)
        .await?;

    let counts: HashMap<Uuid, i64> = prompt_centroid::Entity::find()
        .select_only()
        .column(prompt_centroid::Column::CentroidId)
        .column_as(Expr::col(prompt_centroid::Column::Id).count(), "prompt_count")
        .filter(prompt_centroid::Column::TenantId.eq(tenant_id))
        .filter(prompt_centroid::Column::IsActive.eq(true))
        .group_by(prompt_centroid::Column::CentroidId)
        .into_tuple::<(Uuid, i64)>()
        .all(db)
        .await?
        .into_iter()
        .collect();

    Ok(centroids
        .into_iter()
        .map(|c| CentroidSummary {
            prompt_count: counts.get(&c.id).copied().unwrap_or(0),
            centroid: c,
        })
        .collect())
}

/// Upsert on `(tenant_id, family)` inside the caller's connection or transaction.
///
/// Ensures the family's category first. An existing row gets its vector,
/// threshold and metadata replaced and is reactivated.
pub async fn upsert_centroid_in<C: ConnectionTrait>(
    db: &C,
    caller: &Caller,
    tenant_id: Uuid,
    family: &str,
    input: CentroidInput,
) -> Result<CentroidUpsert> {
    let family = normalize_slug(family)?;
    let threshold = validate_threshold(input.threshold.unwrap_or(DEFAULT_THRESHOLD))?;
    let metadata = input.metadata.unwrap_or_else(|| json!({}));
    let vector = input
        .centroid
        .map(|v| serde_json::to_string(&v))
        .transpose()
        .map_err(|e| OpsError::Validation(format!("invalid centroid vector: {e}")))?;

    let category = categories::ensure_category_in(
        db,
        &family,
        None,
        Some(&format!("Risk category for {family} detection")),
    )
    .await?;

    let now = Utc::now();
    let model = centroid::ActiveModel {
        id: Set(Uuid::new_v4()),
        tenant_id: Set(tenant_id),
        family: Set(family.clone()),
        centroid: Set(vector),
        threshold: Set(threshold),
        is_active: Set(true),
        metadata: Set(metadata),
        created_by: Set(caller.user_id.clone()),
        updated_by: Set(Some(caller.user_id.clone())),
        created_at: Set(now),
        updated_at: Set(now),
    };
    centroid::Entity::insert(model)
        .on_conflict(
            OnConflict::columns([centroid::Column::TenantId, centroid::Column::Family])
                .update_columns([
                    centroid::Column::Centroid,
                    centroid::Column::Threshold,
                    centroid::Column::Metadata,
                    centroid::Column::IsActive,
                    centroid::Column::UpdatedBy,
                    centroid::Column::UpdatedAt,
                ])
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;

    let centroid = find_by_family(db, tenant_id, &family).await?;
    info!(%tenant_id, family = %centroid.family, centroid_id = %centroid.id, "centroid upserted");
    Ok(CentroidUpsert {
        centroid,
        category_created: category.created,
    })
}

pub async fn upsert_centroid(
    db: &DatabaseConnection,
    caller: &Caller,
    tenant_id: Uuid,
    family: &str,
    input: CentroidInput,
) -> Result<centroid::Model> {
    let txn = db.begin().await?;
    require_tenant(&txn, tenant_id).await?;
    let upsert = upsert_centroid_in(&txn, caller, tenant_id, family, input).await?;
    txn.commit().await?;

    if upsert.category_created {
        model_sync::sync_category_to_models(db, &upsert.centroid.family).await;
    }
    Ok(upsert.centroid)
}

/// Hard delete scoped to the tenant. Links pointing at the centroid are deactivated.
pub async fn delete_centroid(db: &DatabaseConnection, caller: &Caller, tenant_id: Uuid, centroid_id: Uuid) -> Result<()> {
    let txn = db.begin().await?;
    require_tenant(&txn, tenant_id).await?;

    let deleted = centroid::Entity::delete_many()
        .filter(centroid::Column::Id.eq(centroid_id))
        .filter(centroid::Column::TenantId.eq(tenant_id))
        .exec(&txn)
        .await?;
    if deleted.rows_affected == 0 {
        return Err(OpsError::NotFound(format!("centroid {centroid_id} not found")));
    }

    let links = prompt_centroid::Entity::update_many()
        .col_expr(prompt_centroid::Column::IsActive, Expr::value(false))
        .filter(prompt_centroid::Column::CentroidId.eq(centroid_id))
        .exec(&txn)
        .await?;
    txn.commit().await?;

    info!(%tenant_id, %centroid_id, deactivated_links = links.rows_affected, user = %caller.user_id, "centroid deleted");
    Ok(())
}

/// Gives every category without an active centroid in this tenant one with the
/// default threshold. Families that only have an inactive centroid get it back.
pub async fn create_missing_centroids_for_categories(
    db: &DatabaseConnection,
    caller: &Caller,
    tenant_id: Uuid,
) -> Result<BackfillReport> {
    let txn = db.begin().await?;
    require_tenant(&txn, tenant_id).await?;

    let existing: HashSet<String> = centroid::Entity::find()
        .filter(centroid::Column::TenantId.eq(tenant_id))
        .filter(centroid::Column::IsActive.eq(true))
        .all(&txn)
        .await?
        .into_iter()
        .map(|c| c.family)
        .collect();

    let missing: Vec<String> = categories::get_categories(&txn)
        .await?
        .into_iter()
        .map(|c| c.slug)
        .filter(|slug| !existing.contains(slug))
        .collect();

    let mut created = Vec::with_capacity(missing.len());
    for family in missing {
        let now = Utc::now();
        let model = centroid::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(tenant_id),
            family: Set(family.clone()),
            centroid: Set(None),
            threshold: Set(DEFAULT_THRESHOLD),
            is_active: Set(true),
            metadata: Set(json!({ "auto_created": true })),
            created_by: Set(caller.user_id.clone()),
            updated_by: Set(Some(caller.user_id.clone())),
            created_at: Set(now),
            updated_at: Set(now),
        };
        centroid::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([centroid::Column::TenantId, centroid::Column::Family])
                    .update_columns([
                        centroid::Column::IsActive,
                        centroid::Column::UpdatedBy,
                        centroid::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&txn)
            .await?;
        created.push(find_by_family(&txn, tenant_id, &family).await?);
    }
    txn.commit().await?;

    info!(%tenant_id, created = created.len(), "backfilled missing centroids");
    Ok(BackfillReport {
        created: created.len(),
        centroids: created,
    })
}
