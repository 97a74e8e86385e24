//! Router provisioning for ControlNet: risk categories, per-tenant centroids,
//! router prompts and the links between them, plus the reconciliation jobs
//! that keep those tables consistent.

pub mod api;
pub mod caller;
pub mod categories;
pub mod centroids;
pub mod colors;
pub mod error;
pub mod links;
pub mod model;
pub mod model_sync;
pub mod prompts;
pub mod provisioning;
pub mod routing;
pub mod schema;
pub mod tenants;
