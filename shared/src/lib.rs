//! Shared building blocks for the ControlNet services: environment driven
//! settings, database URL helpers and the client for the external
//! routing-evaluation service.

pub mod config;
pub mod db;
pub mod router_client;
