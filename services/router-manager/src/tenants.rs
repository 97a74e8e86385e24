//! Tenant registry. Every per-tenant operation resolves its tenant here first.

use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use tracing::info;
use uuid::Uuid;

use crate::caller::Caller;
use crate::error::{OpsError, Result};
use crate::model::tenant;

pub async fn require_tenant<C: ConnectionTrait>(db: &C, tenant_id: Uuid) -> Result<tenant::Model> {
    tenant::Entity::find_by_id(tenant_id)
        .one(db)
        .await?
        .ok_or_else(|| OpsError::NotFound(format!("tenant {tenant_id} not found")))
}

/// Creates a tenant, idempotent per unique name.
pub async fn create_tenant<C: ConnectionTrait>(db: &C, caller: &Caller, name: &str) -> Result<tenant::Model> {
    let name = name.trim();
    if name.is_empty() {
        return Err(OpsError::Validation("tenant name required".into()));
    }

    let model = tenant::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        created_by: Set(caller.user_id.clone()),
        created_at: Set(Utc::now()),
    };
    let inserted = tenant::Entity::insert(model)
        .on_conflict(OnConflict::column(tenant::Column::Name).do_nothing().to_owned())
        .exec_without_returning(db)
        .await?;

    let tenant = tenant::Entity::find()
        .filter(tenant::Column::Name.eq(name))
        .one(db)
        .await?
        .ok_or_else(|| OpsError::NotFound(format!("tenant {name} not found")))?;
    if inserted > 0 {
        info!(tenant_id = %tenant.id, name, user = %caller.user_id, "tenant created");
    }
    Ok(tenant)
}

/// All tenants alphabetically.
pub async fn list_tenants<C: ConnectionTrait>(db: &C) -> Result<Vec<tenant::Model>> {
    Ok(tenant::Entity::find()
        .order_by_asc(tenant::Column::Name)
        .all(db)
        .await?)
}
