//! Auto-provisioning of centroids and prompt links.
//!
//! Given a categorized prompt, make sure the category, a centroid for its
//! family and an active link exist, reusing whatever is already there. Which
//! paths may create missing centroids or categories is decided by
//! [`ProvisioningPolicy`].

use std::collections::HashMap;

use sea_orm::{ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, TransactionTrait};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared::config::Settings;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::caller::Caller;
use crate::centroids::{self, CentroidInput, DEFAULT_THRESHOLD};
use crate::error::Result;
use crate::links;
use crate::model::{centroid, prompt, prompt_centroid};
use crate::model_sync;
use crate::tenants::require_tenant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningPolicy {
    /// Single-prompt auto-link creates the family's centroid when missing.
    pub centroid_on_prompt: bool,
    /// The bulk sweep creates missing centroids instead of skipping prompts.
    pub centroid_on_sweep: bool,
    /// Full model sync creates categories a model declares but nobody registered.
    pub category_on_model_sync: bool,
}

impl Default for ProvisioningPolicy {
    fn default() -> Self {
        Self {
            centroid_on_prompt: true,
            centroid_on_sweep: false,
            category_on_model_sync: false,
        }
    }
}

impl From<&Settings> for ProvisioningPolicy {
    fn from(settings: &Settings) -> Self {
        Self {
            centroid_on_prompt: settings.provision_centroid_on_prompt,
            centroid_on_sweep: settings.provision_centroid_on_sweep,
            category_on_model_sync: settings.provision_category_on_model_sync,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AutoLink {
    pub centroid: Option<centroid::Model>,
    pub link: Option<prompt_centroid::Model>,
    pub link_created: bool,
    /// The centroid's category was auto-created; models still need syncing.
    pub category_created: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub linked: u64,
    pub skipped: u64,
    pub centroids_created: u64,
}

fn auto_centroid_input(family: &str) -> CentroidInput {
    CentroidInput {
        centroid: None,
        threshold: Some(DEFAULT_THRESHOLD),
        metadata: Some(json!({
            "description": format!("Auto-created for {family} prompts"),
            "auto_created": true,
        })),
    }
}

/// Links one prompt to the active centroid of its category.
///
/// Uncategorized prompts are left alone. A missing centroid is created when
/// `policy.centroid_on_prompt` allows it; otherwise the prompt stays unlinked.
pub async fn auto_link_prompt_in<C: ConnectionTrait>(
    db: &C,
    caller: &Caller,
    tenant_id: Uuid,
    prompt: &prompt::Model,
    policy: ProvisioningPolicy,
) -> Result<AutoLink> {
    let Some(family) = prompt.category.as_deref() else {
        return Ok(AutoLink::default());
    };

    let mut category_created = false;
    let centroid = match centroids::find_active(db, tenant_id, family).await? {
        Some(existing) => existing,
        None if policy.centroid_on_prompt => {
            let upsert = centroids::upsert_centroid_in(db, caller, tenant_id, family, auto_centroid_input(family)).await?;
            category_created = upsert.category_created;
            info!(%tenant_id, family, centroid_id = %upsert.centroid.id, "auto-created centroid for prompt");
            upsert.centroid
        }
        None => {
            warn!(%tenant_id, family, prompt_id = %prompt.id, "no active centroid for prompt category; not linking");
            return Ok(AutoLink::default());
        }
    };

    let link_created = links::insert_link_if_missing(db, caller, tenant_id, prompt.id, centroid.id).await?;
    let link = prompt_centroid::Entity::find()
        .filter(prompt_centroid::Column::PromptId.eq(prompt.id))
        .filter(prompt_centroid::Column::CentroidId.eq(centroid.id))
        .one(db)
        .await?;
    debug!(prompt_id = %prompt.id, centroid_id = %centroid.id, link_created, "prompt auto-linked");

    Ok(AutoLink {
        centroid: Some(centroid),
        link,
        link_created,
        category_created,
    })
}

/// Reconciliation sweep over every active categorized prompt of a tenant.
///
/// Prompts whose family has no active centroid are skipped unless
/// `policy.centroid_on_sweep` is set. Existing links, including deactivated
/// ones, are never touched, so a second run reports `linked: 0`.
pub async fn auto_link_existing_prompts(
    db: &DatabaseConnection,
    caller: &Caller,
    tenant_id: Uuid,
    policy: ProvisioningPolicy,
) -> Result<SweepReport> {
    let txn = db.begin().await?;
    require_tenant(&txn, tenant_id).await?;

    let prompts = prompt::Entity::find()
        .filter(prompt::Column::TenantId.eq(tenant_id))
        .filter(prompt::Column::IsActive.eq(true))
        .filter(prompt::Column::Category.is_not_null())
        .all(&txn)
        .await?;

    let mut report = SweepReport::default();
    let mut resolved: HashMap<String, Option<centroid::Model>> = HashMap::new();
    let mut new_categories = Vec::new();

    for prompt in &prompts {
        let Some(family) = prompt.category.as_deref().filter(|f| !f.is_empty()) else {
            continue;
        };

        if !resolved.contains_key(family) {
            let mut found = centroids::find_active(&txn, tenant_id, family).await?;
            if found.is_none() && policy.centroid_on_sweep {
                let upsert = centroids::upsert_centroid_in(&txn, caller, tenant_id, family, auto_centroid_input(family)).await?;
                if upsert.category_created {
                    new_categories.push(upsert.centroid.family.clone());
                }
                report.centroids_created += 1;
                found = Some(upsert.centroid);
            }
            resolved.insert(family.to_string(), found);
        }

        match resolved.get(family).and_then(Option::as_ref) {
            Some(centroid) => {
                if links::insert_link_if_missing(&txn, caller, tenant_id, prompt.id, centroid.id).await? {
                    report.linked += 1;
                }
            }
            None => report.skipped += 1,
        }
    }
    txn.commit().await?;

    info!(
        %tenant_id,
        scanned = prompts.len(),
        linked = report.linked,
        skipped = report.skipped,
        "auto-linked existing prompts"
    );
    model_sync::sync_categories_to_models(db, &new_categories).await;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_follows_settings() {
        let settings = Settings {
            provision_centroid_on_sweep: true,
            ..Settings::default()
        };
        let policy = ProvisioningPolicy::from(&settings);
        assert!(policy.centroid_on_prompt);
        assert!(policy.centroid_on_sweep);
        assert!(!policy.category_on_model_sync);
        assert_eq!(ProvisioningPolicy::from(&Settings::default()), ProvisioningPolicy::default());
    }

    #[test]
    fn auto_centroid_metadata_is_marked() {
        let input = auto_centroid_input("pii");
        let metadata = input.metadata.unwrap();
        assert_eq!(metadata["auto_created"], true);
        assert_eq!(metadata["description"], "Auto-created for pii prompts");
        assert_eq!(input.threshold, Some(DEFAULT_THRESHOLD));
    }
}
