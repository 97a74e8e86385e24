//! Global risk-category registry.
//!
//! Categories are keyed by `slug`. They are either created explicitly by an
//! administrator or auto-created the first time a centroid or prompt refers to
//! an unknown slug. Creating a category asks the model linker to attach any
//! models that already declare the slug; callers run that pass after their
//! own transaction has committed (see `model_sync::sync_categories_to_models`).

use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use strum_macros::{Display, EnumString};
use tracing::info;
use uuid::Uuid;

use crate::caller::Caller;
use crate::colors::{color_for_slug, name_from_slug};
use crate::error::{OpsError, Result};
use crate::model::category;
use crate::model_sync;

pub const DEFAULT_TIER: &str = "T1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Result of a get-or-create; `created` is true only for the call that inserted the row.
#[derive(Debug, Clone)]
pub struct Ensured<T> {
    pub record: T,
    pub created: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCategory {
    pub slug: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub severity: Option<Severity>,
    pub tier_recommendation: Option<String>,
    pub color: Option<String>,
    pub metadata: Option<Value>,
}

/// Trimmed, lowercased slug; shared by categories, centroid families and prompt labels.
pub fn normalize_slug(raw: &str) -> Result<String> {
    let slug = raw.trim().to_lowercase();
    if slug.is_empty() {
        return Err(OpsError::Validation("category slug required".into()));
    }
    if !slug.chars().any(char::is_alphanumeric) {
        return Err(OpsError::Validation(format!("category slug {slug:?} has no letters or digits")));
    }
    Ok(slug)
}

/// All categories ordered by display name.
pub async fn get_categories<C: ConnectionTrait>(db: &C) -> Result<Vec<category::Model>> {
    Ok(category::Entity::find()
        .order_by_asc(category::Column::Name)
        .all(db)
        .await?)
}

pub async fn find_by_slug<C: ConnectionTrait>(db: &C, slug: &str) -> Result<Option<category::Model>> {
    Ok(category::Entity::find()
        .filter(category::Column::Slug.eq(slug))
        .one(db)
        .await?)
}

/// Get-or-create by slug without the model sync side effect.
///
/// Concurrent callers race on the unique slug constraint; the loser reads the
/// winner's row.
pub async fn ensure_category_in<C: ConnectionTrait>(
    db: &C,
    slug: &str,
    name: Option<&str>,
    description: Option<&str>,
) -> Result<Ensured<category::Model>> {
    let slug = normalize_slug(slug)?;
    if let Some(existing) = find_by_slug(db, &slug).await? {
        return Ok(Ensured { record: existing, created: false });
    }

    let now = Utc::now();
    let model = category::ActiveModel {
        id: Set(Uuid::new_v4()),
        slug: Set(slug.clone()),
        name: Set(name
            .map(str::to_string)
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| name_from_slug(&slug))),
        description: Set(description.map(str::to_string)),
        severity: Set(Severity::Medium.to_string()),
        tier_recommendation: Set(DEFAULT_TIER.to_string()),
        color: Set(color_for_slug(&slug).to_string()),
        metadata: Set(json!({ "auto_created": true })),
        created_at: Set(now),
        updated_at: Set(now),
    };
    let inserted = category::Entity::insert(model)
        .on_conflict(OnConflict::column(category::Column::Slug).do_nothing().to_owned())
        .exec_without_returning(db)
        .await?;

    let record = find_by_slug(db, &slug)
        .await?
        .ok_or_else(|| OpsError::NotFound(format!("category {slug} not found")))?;
    if inserted > 0 {
        info!(slug = %record.slug, color = %record.color, "auto-created risk category");
    }
    Ok(Ensured { record, created: inserted > 0 })
}

/// Idempotent get-or-create; a freshly created category is synced to models.
pub async fn ensure_category(
    db: &DatabaseConnection,
    caller: &Caller,
    slug: &str,
    name: Option<&str>,
) -> Result<category::Model> {
    let ensured = ensure_category_in(db, slug, name, None).await?;
    if ensured.created {
        info!(slug = %ensured.record.slug, user = %caller.user_id, "category ensured");
        model_sync::sync_category_to_models(db, &ensured.record.slug).await;
    }
    Ok(ensured.record)
}

/// Explicit administrator creation. Fails with `Conflict` if the slug is taken.
pub async fn create_category(
    db: &DatabaseConnection,
    caller: &Caller,
    input: NewCategory,
) -> Result<category::Model> {
    let slug = normalize_slug(&input.slug)?;
    let now = Utc::now();

    let mut metadata = input.metadata.unwrap_or_else(|| json!({}));
    if !metadata.is_object() {
        return Err(OpsError::Validation("metadata must be an object".into()));
    }
    metadata["auto_created"] = json!(false);

    let model = category::ActiveModel {
        id: Set(Uuid::new_v4()),
        slug: Set(slug.clone()),
        name: Set(input
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| name_from_slug(&slug))),
        description: Set(input.description),
        severity: Set(input.severity.unwrap_or(Severity::Medium).to_string()),
        tier_recommendation: Set(input.tier_recommendation.unwrap_or_else(|| DEFAULT_TIER.to_string())),
        color: Set(input.color.unwrap_or_else(|| color_for_slug(&slug).to_string())),
        metadata: Set(metadata),
        created_at: Set(now),
        updated_at: Set(now),
    };
    let inserted = category::Entity::insert(model)
        .on_conflict(OnConflict::column(category::Column::Slug).do_nothing().to_owned())
        .exec_without_returning(db)
        .await?;
    if inserted == 0 {
        return Err(OpsError::Conflict(format!("category {slug} already exists")));
    }

    let record = find_by_slug(db, &slug)
        .await?
        .ok_or_else(|| OpsError::NotFound(format!("category {slug} not found")))?;
    info!(slug = %record.slug, user = %caller.user_id, "category created");
    model_sync::sync_category_to_models(db, &record.slug).await;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn slugs_are_normalized() {
        assert_eq!(normalize_slug("  Jailbreak ").unwrap(), "jailbreak");
        assert!(matches!(normalize_slug("   "), Err(OpsError::Validation(_))));
    }

    #[test]
    fn separator_only_slugs_are_rejected() {
        for raw in ["--", "_", " -_ "] {
            assert!(matches!(normalize_slug(raw), Err(OpsError::Validation(_))), "{raw:?}");
        }
        assert_eq!(normalize_slug("-pii-").unwrap(), "-pii-");
    }

    #[test]
    fn severity_round_trips_through_strings() {
        assert_eq!(Severity::Critical.to_string(), "critical");
        assert_eq!(Severity::from_str("medium").unwrap(), Severity::Medium);
    }
}
