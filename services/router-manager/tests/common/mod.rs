#![allow(dead_code)]

use chrono::Utc;
use router_manager::caller::Caller;
use router_manager::model::{onnx_model, tenant};
use router_manager::schema::ensure_schema;
use router_manager::tenants;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};
use serde_json::Value;
use uuid::Uuid;

/// Fresh in-memory database with the router schema and one tenant.
pub async fn setup() -> (DatabaseConnection, tenant::Model) {
    let mut opts = ConnectOptions::new("sqlite::memory:".to_owned());
    opts.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opts).await.expect("connect sqlite");
    ensure_schema(&db).await.expect("schema");
    let tenant = tenants::create_tenant(&db, &admin(), "acme").await.expect("tenant");
    (db, tenant)
}

pub fn admin() -> Caller {
    Caller::resolve(Some("user_admin")).expect("caller")
}

pub async fn register_model(db: &DatabaseConnection, tenant_id: Uuid, name: &str, family: Value) -> onnx_model::Model {
    onnx_model::ActiveModel {
        id: Set(Uuid::new_v4()),
        tenant_id: Set(tenant_id),
        name: Set(name.to_string()),
        family: Set(family),
        is_active: Set(true),
        created_at: Set(Utc::now()),
    }
    .insert(db)
    .await
    .expect("model")
}
