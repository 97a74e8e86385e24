//! Links external models to risk categories by their declared `family` slugs.
//!
//! `sync_category_to_models` runs as a side effect of category creation and
//! never fails its caller: every error is logged and swallowed.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, TransactionTrait};
use serde::Serialize;
use strum_macros::{Display, EnumString};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::caller::Caller;
use crate::categories::{self, find_by_slug};
use crate::error::Result;
use crate::model::{category, model_category_link, onnx_model};
use crate::provisioning::ProvisioningPolicy;
use crate::tenants::require_tenant;

/// Stored discriminator of a model-category link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum EntityKind {
    OnnxModel,
}

/// Typed form of the `(entity_type, entity_id)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkedEntity {
    OnnxModel(Uuid),
}

impl LinkedEntity {
    pub fn kind(&self) -> EntityKind {
        match self {
            LinkedEntity::OnnxModel(_) => EntityKind::OnnxModel,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            LinkedEntity::OnnxModel(id) => *id,
        }
    }

    /// `None` for discriminators this service does not know.
    pub fn from_parts(entity_type: &str, entity_id: Uuid) -> Option<Self> {
        match entity_type.parse::<EntityKind>().ok()? {
            EntityKind::OnnxModel => Some(LinkedEntity::OnnxModel(entity_id)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub synced_count: u64,
    pub total_models: u64,
}

/// Slugs listed in the model's `family` array; anything that is not a string is ignored.
pub fn declared_families(model: &onnx_model::Model) -> Vec<&str> {
    model
        .family
        .as_array()
        .map(|items| items.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default()
}

fn new_link(entity: LinkedEntity, category_id: Uuid) -> model_category_link::ActiveModel {
    model_category_link::ActiveModel {
        id: Set(Uuid::new_v4()),
        entity_type: Set(entity.kind().to_string()),
        entity_id: Set(entity.id()),
        category_id: Set(category_id),
        created_at: Set(Utc::now()),
    }
}

fn link_conflict() -> OnConflict {
    OnConflict::columns([
        model_category_link::Column::EntityType,
        model_category_link::Column::EntityId,
        model_category_link::Column::CategoryId,
    ])
    .do_nothing()
    .to_owned()
}

async fn linked_entities<C: ConnectionTrait>(db: &C, category_id: Uuid) -> Result<HashSet<LinkedEntity>> {
    Ok(model_category_link::Entity::find()
        .filter(model_category_link::Column::CategoryId.eq(category_id))
        .all(db)
        .await?
        .into_iter()
        .filter_map(|link| LinkedEntity::from_parts(&link.entity_type, link.entity_id))
        .collect())
}

/// Links every active model declaring `slug` to that category. Returns the
/// number of new links; 0 when the category is unknown or anything failed.
pub async fn sync_category_to_models<C: ConnectionTrait>(db: &C, slug: &str) -> u64 {
    match try_sync_category(db, slug).await {
        Ok(linked) => linked,
        Err(e) => {
            error!(slug, "model sync for category failed: {e}");
            0
        }
    }
}

/// Runs [`sync_category_to_models`] for each slug.
pub async fn sync_categories_to_models<C: ConnectionTrait>(db: &C, slugs: &[String]) -> u64 {
    let mut linked = 0;
    for slug in slugs {
        linked += sync_category_to_models(db, slug).await;
    }
    linked
}

async fn try_sync_category<C: ConnectionTrait>(db: &C, slug: &str) -> Result<u64> {
    let Some(category) = find_by_slug(db, slug).await? else {
        warn!(slug, "category not found; skipping model sync");
        return Ok(0);
    };

    let already = linked_entities(db, category.id).await?;
    let missing: Vec<model_category_link::ActiveModel> = onnx_model::Entity::find()
        .filter(onnx_model::Column::IsActive.eq(true))
        .all(db)
        .await?
        .iter()
        .filter(|model| declared_families(model).contains(&slug))
        .map(|model| LinkedEntity::OnnxModel(model.id))
        .filter(|entity| !already.contains(entity))
        .map(|entity| new_link(entity, category.id))
        .collect();
    if missing.is_empty() {
        return Ok(0);
    }

    let linked = model_category_link::Entity::insert_many(missing)
        .on_conflict(link_conflict())
        .exec_without_returning(db)
        .await?;
    info!(slug, linked, "linked models to category");
    Ok(linked)
}

/// Full scan of a tenant's active models.
///
/// Declared slugs without a category are skipped unless
/// `policy.category_on_model_sync` allows creating them.
pub async fn sync_all_models_to_categories(
    db: &DatabaseConnection,
    caller: &Caller,
    tenant_id: Uuid,
    policy: ProvisioningPolicy,
) -> Result<SyncReport> {
    let txn = db.begin().await?;
    require_tenant(&txn, tenant_id).await?;

    let models = onnx_model::Entity::find()
        .filter(onnx_model::Column::TenantId.eq(tenant_id))
        .filter(onnx_model::Column::IsActive.eq(true))
        .all(&txn)
        .await?;

    let mut report = SyncReport {
        synced_count: 0,
        total_models: models.len() as u64,
    };
    let mut known: HashMap<String, Option<category::Model>> = HashMap::new();
    let mut new_categories = Vec::new();

    for model in &models {
        for slug in declared_families(model) {
            if !known.contains_key(slug) {
                let mut found = find_by_slug(&txn, slug).await?;
                if found.is_none() && policy.category_on_model_sync {
                    let ensured = categories::ensure_category_in(&txn, slug, None, None).await?;
                    if ensured.created {
                        new_categories.push(ensured.record.slug.clone());
                    }
                    found = Some(ensured.record);
                }
                known.insert(slug.to_string(), found);
            }
            let Some(category) = known.get(slug).and_then(Option::as_ref) else {
                continue;
            };

            let inserted = model_category_link::Entity::insert(new_link(LinkedEntity::OnnxModel(model.id), category.id))
                .on_conflict(link_conflict())
                .exec_without_returning(&txn)
                .await?;
            report.synced_count += inserted;
        }
    }
    txn.commit().await?;

    info!(
        %tenant_id,
        synced = report.synced_count,
        total_models = report.total_models,
        user = %caller.user_id,
        "synced models to categories"
    );
    sync_categories_to_models(db, &new_categories).await;
    Ok(report)
}
