mod common;

use common::{admin, setup};
use router_manager::categories;
use router_manager::centroids::{self, CentroidInput};
use router_manager::model::{centroid, prompt_centroid};
use router_manager::prompts::{self, NewPrompt};
use router_manager::provisioning::{auto_link_existing_prompts, ProvisioningPolicy};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};

fn new_prompt(text: &str, category: Option<&str>) -> NewPrompt {
    NewPrompt {
        prompt: text.to_string(),
        category: category.map(str::to_string),
        metadata: None,
    }
}

#[tokio::test]
async fn categorized_prompt_gets_centroid_and_link() {
    let (db, tenant) = setup().await;
    let caller = admin();

    let created = prompts::create_prompt(&db, &caller, tenant.id, new_prompt("x", Some("newcat")), ProvisioningPolicy::default())
        .await
        .unwrap();

    let active_centroids = centroid::Entity::find()
        .filter(centroid::Column::TenantId.eq(tenant.id))
        .filter(centroid::Column::Family.eq("newcat"))
        .filter(centroid::Column::IsActive.eq(true))
        .all(&db)
        .await
        .unwrap();
    assert_eq!(active_centroids.len(), 1);
    let centroid = &active_centroids[0];
    assert_eq!(centroid.threshold, 0.3);
    assert_eq!(centroid.metadata["auto_created"], true);
    assert_eq!(centroid.metadata["description"], "Auto-created for newcat prompts");

    let links = prompt_centroid::Entity::find()
        .filter(prompt_centroid::Column::PromptId.eq(created.prompt.id))
        .filter(prompt_centroid::Column::CentroidId.eq(centroid.id))
        .filter(prompt_centroid::Column::IsActive.eq(true))
        .all(&db)
        .await
        .unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].weight, 1.0);
    assert_eq!(created.link.as_ref().map(|l| l.id), Some(links[0].id));

    let category = categories::find_by_slug(&db, "newcat").await.unwrap().unwrap();
    assert_eq!(category.metadata["auto_created"], true);
    assert_eq!(category.description.as_deref(), Some("Risk category for newcat detection"));
}

#[tokio::test]
async fn second_prompt_reuses_existing_centroid() {
    let (db, tenant) = setup().await;
    let caller = admin();
    let policy = ProvisioningPolicy::default();

    let first = prompts::create_prompt(&db, &caller, tenant.id, new_prompt("a", Some("pii")), policy).await.unwrap();
    let second = prompts::create_prompt(&db, &caller, tenant.id, new_prompt("b", Some("PII ")), policy).await.unwrap();

    assert_eq!(second.prompt.category.as_deref(), Some("pii"));
    assert_eq!(
        first.centroid.map(|c| c.id),
        second.centroid.map(|c| c.id)
    );
    let count = centroid::Entity::find()
        .filter(centroid::Column::TenantId.eq(tenant.id))
        .count(&db)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn uncategorized_prompt_is_not_linked() {
    let (db, tenant) = setup().await;
    let created = prompts::create_prompt(&db, &admin(), tenant.id, new_prompt("plain", None), ProvisioningPolicy::default())
        .await
        .unwrap();
    assert!(created.centroid.is_none());
    assert!(created.link.is_none());
    assert_eq!(prompt_centroid::Entity::find().count(&db).await.unwrap(), 0);
}

#[tokio::test]
async fn prompt_policy_can_disable_centroid_creation() {
    let (db, tenant) = setup().await;
    let policy = ProvisioningPolicy {
        centroid_on_prompt: false,
        ..ProvisioningPolicy::default()
    };
    let created = prompts::create_prompt(&db, &admin(), tenant.id, new_prompt("x", Some("toxicity")), policy)
        .await
        .unwrap();
    assert!(created.link.is_none());
    assert_eq!(centroid::Entity::find().count(&db).await.unwrap(), 0);
    assert!(categories::find_by_slug(&db, "toxicity").await.unwrap().is_none());
}

#[tokio::test]
async fn sweep_links_once_and_skips_families_without_centroid() {
    let (db, tenant) = setup().await;
    let caller = admin();
    let no_create = ProvisioningPolicy {
        centroid_on_prompt: false,
        ..ProvisioningPolicy::default()
    };

    prompts::create_prompt(&db, &caller, tenant.id, new_prompt("a", Some("jailbreak")), no_create).await.unwrap();
    prompts::create_prompt(&db, &caller, tenant.id, new_prompt("b", Some("jailbreak")), no_create).await.unwrap();
    prompts::create_prompt(&db, &caller, tenant.id, new_prompt("c", Some("legal")), no_create).await.unwrap();
    prompts::create_prompt(&db, &caller, tenant.id, new_prompt("d", None), no_create).await.unwrap();

    centroids::upsert_centroid(&db, &caller, tenant.id, "jailbreak", CentroidInput::default())
        .await
        .unwrap();

    let first = auto_link_existing_prompts(&db, &caller, tenant.id, ProvisioningPolicy::default()).await.unwrap();
    assert_eq!(first.linked, 2);
    assert_eq!(first.skipped, 1);
    assert_eq!(first.centroids_created, 0);

    let second = auto_link_existing_prompts(&db, &caller, tenant.id, ProvisioningPolicy::default()).await.unwrap();
    assert_eq!(second.linked, 0);
    assert_eq!(prompt_centroid::Entity::find().count(&db).await.unwrap(), 2);
}

#[tokio::test]
async fn sweep_policy_can_create_missing_centroids() {
    let (db, tenant) = setup().await;
    let caller = admin();
    let no_create = ProvisioningPolicy {
        centroid_on_prompt: false,
        ..ProvisioningPolicy::default()
    };
    prompts::create_prompt(&db, &caller, tenant.id, new_prompt("a", Some("bias")), no_create).await.unwrap();

    let eager = ProvisioningPolicy {
        centroid_on_sweep: true,
        ..ProvisioningPolicy::default()
    };
    let report = auto_link_existing_prompts(&db, &caller, tenant.id, eager).await.unwrap();
    assert_eq!(report.linked, 1);
    assert_eq!(report.centroids_created, 1);
    assert_eq!(report.skipped, 0);
    assert!(centroids::find_active(&db, tenant.id, "bias").await.unwrap().is_some());
}

#[tokio::test]
async fn sweep_does_not_revive_unlinked_pairs() {
    let (db, tenant) = setup().await;
    let caller = admin();
    let created = prompts::create_prompt(&db, &caller, tenant.id, new_prompt("a", Some("safety")), ProvisioningPolicy::default())
        .await
        .unwrap();
    let link = created.link.unwrap();
    router_manager::links::unlink_prompt(&db, &caller, tenant.id, link.id).await.unwrap();

    let report = auto_link_existing_prompts(&db, &caller, tenant.id, ProvisioningPolicy::default()).await.unwrap();
    assert_eq!(report.linked, 0);
    let row = prompt_centroid::Entity::find_by_id(link.id).one(&db).await.unwrap().unwrap();
    assert!(!row.is_active);
}
