//! Idempotent schema bootstrap.
//!
//! Tables are derived from the entity definitions so the same code path works
//! against Postgres in production and SQLite in tests. Uniqueness of the
//! natural keys lives in the database so that every upsert can rely on
//! `ON CONFLICT` instead of a read-then-write check.

use sea_orm::sea_query::{Index, IndexCreateStatement, TableCreateStatement};
use sea_orm::{ConnectionTrait, DbErr, Schema};
use tracing::info;

use crate::model::{category, centroid, model_category_link, onnx_model, prompt, prompt_centroid, tenant};

pub async fn ensure_schema<C: ConnectionTrait>(db: &C) -> Result<(), DbErr> {
    let schema = Schema::new(db.get_database_backend());

    let tables: Vec<TableCreateStatement> = vec![
        schema.create_table_from_entity(tenant::Entity),
        schema.create_table_from_entity(category::Entity),
        schema.create_table_from_entity(centroid::Entity),
        schema.create_table_from_entity(prompt::Entity),
        schema.create_table_from_entity(prompt_centroid::Entity),
        schema.create_table_from_entity(onnx_model::Entity),
        schema.create_table_from_entity(model_category_link::Entity),
    ];
    for mut stmt in tables {
        stmt.if_not_exists();
        db.execute(db.get_database_backend().build(&stmt)).await?;
    }

    for stmt in unique_indexes() {
        db.execute(db.get_database_backend().build(&stmt)).await?;
    }

    info!("router schema ensured");
    Ok(())
}

fn unique_indexes() -> Vec<IndexCreateStatement> {
    vec![
        Index::create()
            .if_not_exists()
            .name("ux_router_centroids_tenant_family")
            .table(centroid::Entity)
            .col(centroid::Column::TenantId)
            .col(centroid::Column::Family)
            .unique()
            .to_owned(),
        Index::create()
            .if_not_exists()
            .name("ux_router_prompt_centroids_pair")
            .table(prompt_centroid::Entity)
            .col(prompt_centroid::Column::PromptId)
            .col(prompt_centroid::Column::CentroidId)
            .unique()
            .to_owned(),
        Index::create()
            .if_not_exists()
            .name("ux_model_category_links_entity")
            .table(model_category_link::Entity)
            .col(model_category_link::Column::EntityType)
            .col(model_category_link::Column::EntityId)
            .col(model_category_link::Column::CategoryId)
            .unique()
            .to_owned(),
        Index::create()
            .if_not_exists()
            .name("ix_router_prompts_tenant_category")
            .table(prompt::Entity)
            .col(prompt::Column::TenantId)
            .col(prompt::Column::Category)
            .to_owned(),
    ]
}
